//! Streaming relay service.
//!
//! One relay call runs a single logical pipeline: persist the user turn,
//! open a streaming completion request, forward every extracted fragment to
//! the caller as it arrives while accumulating the full text, and persist
//! the accumulated assistant turn once the stream ends. The fragment stream
//! is produced through an mpsc channel so the HTTP layer can write and
//! flush each item before the next one is requested.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ChatError;
use crate::provider::{parse_data_line, DataLine, ProviderClient};
use crate::store::TranscriptStore;
use crate::types::TurnRole;

/// Relays user messages to the completion provider.
///
/// Each call owns its own accumulator; concurrent calls are fully
/// independent and share only the transcript store.
pub struct RelayService {
    store: Arc<dyn TranscriptStore>,
    provider: ProviderClient,
}

impl RelayService {
    pub fn new(store: Arc<dyn TranscriptStore>, provider: ProviderClient) -> Self {
        Self { store, provider }
    }

    /// Relay one user message.
    ///
    /// Returns a finite, non-restartable stream of content fragments in
    /// upstream extraction order. If the provider cannot be reached or
    /// rejects the request, the error is returned before any fragment is
    /// produced and no assistant turn is ever written; the user turn has
    /// already been persisted at that point.
    pub async fn relay(&self, message: &str) -> Result<BoxStream<'static, String>, ChatError> {
        // The user turn is recorded before contacting the provider, so a
        // crash mid-relay still leaves the last user message on record. A
        // storage failure here is logged but does not block the relay.
        if let Err(e) = self.store.append(TurnRole::User, message).await {
            warn!("failed to persist user turn: {e}");
        }

        let response = self.provider.stream_chat(message).await?;

        let (tx, rx) = mpsc::channel::<String>(64);
        let store = self.store.clone();
        tokio::spawn(pump_upstream(response, tx, store));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Consume the upstream byte stream, forward fragments, persist the result.
///
/// Termination cases: the `[DONE]` sentinel, upstream close or read error
/// after a successful connect, and a dropped downstream receiver. In every
/// case the accumulated text (if any) is appended as the assistant turn;
/// an empty accumulator is never written.
async fn pump_upstream(
    response: reqwest::Response,
    tx: mpsc::Sender<String>,
    store: Arc<dyn TranscriptStore>,
) {
    let mut accumulated = String::new();
    let mut scanner = LineScanner::default();
    let mut upstream = response.bytes_stream();
    let mut terminated = false;

    'read: while let Some(next) = upstream.next().await {
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(e) => {
                // Mid-stream drop: end early, keep what was accumulated.
                debug!("upstream read ended: {e}");
                break;
            }
        };
        scanner.extend(&chunk);
        while let Some(line) = scanner.next_line() {
            match parse_data_line(&line) {
                DataLine::Fragment(fragment) => {
                    accumulated.push_str(&fragment);
                    if tx.send(fragment).await.is_err() {
                        // Downstream consumer is gone; stop reading.
                        terminated = true;
                        break 'read;
                    }
                }
                DataLine::Done => {
                    terminated = true;
                    break 'read;
                }
                DataLine::Skip => {}
            }
        }
    }

    // A final data line without a trailing newline still counts.
    if !terminated {
        if let Some(line) = scanner.remainder() {
            if let DataLine::Fragment(fragment) = parse_data_line(&line) {
                accumulated.push_str(&fragment);
                let _ = tx.send(fragment).await;
            }
        }
    }

    drop(tx);

    if accumulated.is_empty() {
        return;
    }
    if let Err(e) = store.append(TurnRole::Assistant, &accumulated).await {
        warn!("failed to persist assistant turn: {e}");
    }
}

/// Re-chunks an arbitrary byte stream into lines.
///
/// Transport chunks can split a line (or a multi-byte character) anywhere,
/// so bytes are buffered until a newline arrives.
#[derive(Default)]
struct LineScanner {
    buf: Vec<u8>,
}

impl LineScanner {
    fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderConfig;
    use crate::types::ChatTurn;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryStore {
        turns: Mutex<Vec<ChatTurn>>,
    }

    #[async_trait]
    impl TranscriptStore for MemoryStore {
        async fn append(&self, role: TurnRole, content: &str) -> Result<(), ChatError> {
            self.turns.lock().unwrap().push(ChatTurn::new(role, content));
            Ok(())
        }

        async fn history(&self) -> Result<Vec<ChatTurn>, ChatError> {
            Ok(self.turns.lock().unwrap().clone())
        }

        async fn clear(&self) -> Result<(), ChatError> {
            self.turns.lock().unwrap().clear();
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl TranscriptStore for FailingStore {
        async fn append(&self, _role: TurnRole, _content: &str) -> Result<(), ChatError> {
            Err(ChatError::storage("disk full"))
        }

        async fn history(&self) -> Result<Vec<ChatTurn>, ChatError> {
            Err(ChatError::storage("disk full"))
        }

        async fn clear(&self) -> Result<(), ChatError> {
            Err(ChatError::storage("disk full"))
        }
    }

    /// Spawns a one-route upstream that answers every completion request
    /// with a fixed event-stream body. Returns the endpoint URL.
    async fn spawn_upstream(body: &'static str) -> String {
        use axum::routing::post;

        let app = axum::Router::new().route(
            "/v1/chat/completions",
            post(move || async move {
                (
                    [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
                    body,
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn service(store: Arc<dyn TranscriptStore>, api_url: String) -> RelayService {
        let config = ProviderConfig {
            api_url,
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
        };
        RelayService::new(store, ProviderClient::new(reqwest::Client::new(), config))
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 2s");
    }

    #[tokio::test]
    async fn forwards_fragments_in_order_and_persists_full_transcript() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\
                    data: [DONE]\n";
        let url = spawn_upstream(body).await;
        let store = Arc::new(MemoryStore::default());
        let relay = service(store.clone(), url);

        let mut stream = relay.relay("greet me").await.unwrap();
        let mut fragments = Vec::new();
        while let Some(fragment) = stream.next().await {
            fragments.push(fragment);
        }
        assert_eq!(fragments, vec!["Hel", "lo"]);

        wait_until(|| store.turns.lock().unwrap().len() == 2).await;
        let turns = store.turns.lock().unwrap().clone();
        assert_eq!(turns[0], ChatTurn::new(TurnRole::User, "greet me"));
        assert_eq!(turns[1], ChatTurn::new(TurnRole::Assistant, "Hello"));
    }

    #[tokio::test]
    async fn malformed_line_between_valid_lines_is_skipped() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
                    data: {broken json\n\
                    : keepalive comment\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\
                    data: [DONE]\n";
        let url = spawn_upstream(body).await;
        let store = Arc::new(MemoryStore::default());
        let relay = service(store.clone(), url);

        let fragments: Vec<String> = relay.relay("hi").await.unwrap().collect().await;
        assert_eq!(fragments, vec!["a", "b"]);

        wait_until(|| store.turns.lock().unwrap().len() == 2).await;
        assert_eq!(
            store.turns.lock().unwrap()[1],
            ChatTurn::new(TurnRole::Assistant, "ab")
        );
    }

    #[tokio::test]
    async fn empty_completion_persists_no_assistant_turn() {
        let body = "data: [DONE]\n";
        let url = spawn_upstream(body).await;
        let store = Arc::new(MemoryStore::default());
        let relay = service(store.clone(), url);

        let fragments: Vec<String> = relay.relay("hi").await.unwrap().collect().await;
        assert!(fragments.is_empty());

        // Give the pump task time to (not) persist anything.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let turns = store.turns.lock().unwrap().clone();
        assert_eq!(turns, vec![ChatTurn::new(TurnRole::User, "hi")]);
    }

    #[tokio::test]
    async fn connect_failure_is_terminal_and_keeps_user_turn() {
        // Bind and drop a listener to get a port nothing is listening on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = Arc::new(MemoryStore::default());
        let relay = service(store.clone(), format!("http://{addr}/v1/chat/completions"));

        let result = relay.relay("hi").await;
        assert!(matches!(result, Err(ChatError::Provider(_))));

        let turns = store.turns.lock().unwrap().clone();
        assert_eq!(turns, vec![ChatTurn::new(TurnRole::User, "hi")]);
    }

    #[tokio::test]
    async fn upstream_close_without_done_still_persists_accumulated_text() {
        // No [DONE]: the body simply ends after two fragments.
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"tial\"}}]}\n";
        let url = spawn_upstream(body).await;
        let store = Arc::new(MemoryStore::default());
        let relay = service(store.clone(), url);

        let fragments: Vec<String> = relay.relay("hi").await.unwrap().collect().await;
        assert_eq!(fragments, vec!["par", "tial"]);

        wait_until(|| store.turns.lock().unwrap().len() == 2).await;
        assert_eq!(
            store.turns.lock().unwrap()[1],
            ChatTurn::new(TurnRole::Assistant, "partial")
        );
    }

    #[tokio::test]
    async fn dropped_consumer_stops_relay_and_persists_partial_text() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\
                    data: [DONE]\n";
        let url = spawn_upstream(body).await;
        let store = Arc::new(MemoryStore::default());
        let relay = service(store.clone(), url);

        // Drop the stream without reading a single fragment. Fragments are
        // accumulated before each send, so whatever was extracted before
        // the failed send is still persisted. The drop races the buffered
        // sends, so the persisted text is some non-empty prefix of "Hello".
        let stream = relay.relay("hi").await.unwrap();
        drop(stream);

        wait_until(|| store.turns.lock().unwrap().len() == 2).await;
        let assistant = store.turns.lock().unwrap()[1].clone();
        assert_eq!(assistant.role, TurnRole::Assistant);
        assert!(!assistant.content.is_empty());
        assert!("Hello".starts_with(&assistant.content));
    }

    #[tokio::test]
    async fn storage_failure_does_not_abort_the_stream() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\
                    data: [DONE]\n";
        let url = spawn_upstream(body).await;
        let relay = service(Arc::new(FailingStore), url);

        let fragments: Vec<String> = relay.relay("hi").await.unwrap().collect().await;
        assert_eq!(fragments, vec!["ok"]);
    }

    #[tokio::test]
    async fn concurrent_relays_accumulate_independently() {
        let body_a = "data: {\"choices\":[{\"delta\":{\"content\":\"alpha-\"}}]}\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\n\
                      data: [DONE]\n";
        let body_b = "data: {\"choices\":[{\"delta\":{\"content\":\"beta-\"}}]}\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"two\"}}]}\n\
                      data: [DONE]\n";
        let store = Arc::new(MemoryStore::default());
        let relay_a = service(store.clone(), spawn_upstream(body_a).await);
        let relay_b = service(store.clone(), spawn_upstream(body_b).await);

        let (stream_a, stream_b) =
            tokio::join!(relay_a.relay("first"), relay_b.relay("second"));
        let (got_a, got_b): (Vec<String>, Vec<String>) =
            tokio::join!(stream_a.unwrap().collect(), stream_b.unwrap().collect());
        assert_eq!(got_a.concat(), "alpha-one");
        assert_eq!(got_b.concat(), "beta-two");

        wait_until(|| store.turns.lock().unwrap().len() == 4).await;
        let assistants: Vec<String> = store
            .turns
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.role == TurnRole::Assistant)
            .map(|t| t.content.clone())
            .collect();
        assert_eq!(assistants.len(), 2);
        assert!(assistants.contains(&"alpha-one".to_string()));
        assert!(assistants.contains(&"beta-two".to_string()));
    }

    #[test]
    fn line_scanner_handles_split_chunks_and_crlf() {
        let mut scanner = LineScanner::default();
        scanner.extend(b"data: {\"a\"");
        assert!(scanner.next_line().is_none());
        scanner.extend(b": 1}\r\ndata: x\n");
        assert_eq!(scanner.next_line().unwrap(), "data: {\"a\": 1}");
        assert_eq!(scanner.next_line().unwrap(), "data: x");
        assert!(scanner.next_line().is_none());
        scanner.extend(b"tail");
        assert_eq!(scanner.remainder().unwrap(), "tail");
        assert!(scanner.remainder().is_none());
    }
}
