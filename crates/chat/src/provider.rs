//! Upstream completion provider client.
//!
//! Speaks the OpenAI-style streaming chat completion protocol: a JSON POST
//! with `stream: true`, answered by server-sent `data: {json}` lines and a
//! final `data: [DONE]` sentinel.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// End-of-stream sentinel payload.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Provider connection settings, supplied by the server configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Full URL of the chat completions endpoint.
    pub api_url: String,
    /// Bearer credential. May be empty for unauthenticated local providers.
    pub api_key: String,
    /// Model identifier sent with every request.
    pub model: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of parsing one upstream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLine {
    /// A non-empty content fragment extracted from the first choice's delta.
    Fragment(String),
    /// The `[DONE]` sentinel: clean end of stream.
    Done,
    /// Anything else: comments, keepalives, malformed or empty payloads.
    Skip,
}

/// Parse one line of the upstream event stream.
///
/// Lines without the `data:` prefix are skipped (SSE comments and
/// keepalives). Payloads that fail to parse as JSON are skipped as well;
/// a malformed transport line must never abort the stream.
pub fn parse_data_line(line: &str) -> DataLine {
    let Some(payload) = line.strip_prefix("data:") else {
        return DataLine::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return DataLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(DataLine::Fragment)
            .unwrap_or(DataLine::Skip),
        Err(_) => DataLine::Skip,
    }
}

/// Client for the upstream completion endpoint.
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl ProviderClient {
    pub fn new(http: reqwest::Client, config: ProviderConfig) -> Self {
        Self { http, config }
    }

    /// Open a streaming completion request for a single user message.
    ///
    /// Returns the raw response so the relay can consume its byte stream.
    /// Connection failures and non-success statuses are both terminal: no
    /// fragment has been produced yet, so the caller reports the error once.
    pub async fn stream_chat(&self, message: &str) -> Result<reqwest::Response, ChatError> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages: vec![WireMessage {
                role: "user",
                content: message,
            }],
            stream: true,
        };

        let mut request = self.http.post(&self.config.api_url).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChatError::Provider(e.to_string()))?;

        response
            .error_for_status()
            .map_err(|e| ChatError::Provider(e.to_string()))
    }
}
