use std::sync::Arc;

use colloquy_chat::{ProviderClient, RelayService, TranscriptStore};
use colloquy_storage_sqlite::db::{self, write_actor};
use colloquy_storage_sqlite::TranscriptRepository;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub struct AppState {
    pub store: Arc<dyn TranscriptStore>,
    pub relay: Arc<RelayService>,
}

pub fn init_tracing() {
    let log_format = std::env::var("COLLOQUY_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Build the shared application state: one pool, one writer actor, one
/// provider client, all initialized once at process start.
pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);

    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = write_actor::spawn_writer((*pool).clone());

    let store: Arc<dyn TranscriptStore> = Arc::new(TranscriptRepository::new(pool, writer));

    if config.provider.api_key.is_empty() {
        tracing::warn!("COLLOQUY_PROVIDER_API_KEY is empty; provider requests will be unauthenticated");
    }
    let provider = ProviderClient::new(reqwest::Client::new(), config.provider.clone());
    let relay = Arc::new(RelayService::new(store.clone(), provider));

    Ok(Arc::new(AppState { store, relay }))
}
