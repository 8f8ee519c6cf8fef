//! Transcript store abstraction.
//!
//! The storage crate implements this trait with Diesel/SQLite; tests use
//! in-memory implementations. The relay only depends on the trait.

use async_trait::async_trait;

use crate::error::ChatError;
use crate::types::{ChatTurn, TurnRole};

/// Append-only ordered log of conversation turns.
///
/// All operations go to durable storage; there is no in-memory cache, so
/// `history` always reflects the latest durable state. The implementation
/// is shared process-wide and must serialize concurrent writes itself.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Append one turn at the end of the log.
    async fn append(&self, role: TurnRole, content: &str) -> Result<(), ChatError>;

    /// All turns in creation order. An empty vec is a valid result.
    async fn history(&self) -> Result<Vec<ChatTurn>, ChatError>;

    /// Remove all turns.
    async fn clear(&self) -> Result<(), ChatError>;
}
