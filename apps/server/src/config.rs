use std::{net::SocketAddr, time::Duration};

use colloquy_chat::ProviderConfig;

/// Server configuration, read from the environment at startup.
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub provider: ProviderConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let listen_addr: SocketAddr = std::env::var("COLLOQUY_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .expect("Invalid COLLOQUY_LISTEN_ADDR");
        let db_path = std::env::var("COLLOQUY_DB_PATH").unwrap_or_else(|_| "./chat.db".into());
        let cors_allow = std::env::var("COLLOQUY_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timeout_ms: u64 = std::env::var("COLLOQUY_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".into())
            .parse()
            .unwrap_or(30000);

        let provider = ProviderConfig {
            api_url: std::env::var("COLLOQUY_PROVIDER_URL")
                .unwrap_or_else(|_| "https://api.deepseek.com/chat/completions".into()),
            api_key: std::env::var("COLLOQUY_PROVIDER_API_KEY").unwrap_or_default(),
            model: std::env::var("COLLOQUY_PROVIDER_MODEL")
                .unwrap_or_else(|_| "deepseek-chat".into()),
        };

        Self {
            listen_addr,
            db_path,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            provider,
        }
    }
}
