//! Colloquy chat relay core.
//!
//! This crate owns the streaming relay between a user message and an
//! OpenAI-style completion provider:
//!
//! - `types`: conversation turn DTOs shared with the HTTP layer
//! - `store`: the `TranscriptStore` trait implemented by the storage crate
//! - `provider`: upstream provider client and `data:` line parsing
//! - `relay`: the relay service that streams fragments and persists the
//!   accumulated transcript
//!
//! The relay yields plain text fragments through a `BoxStream`; the HTTP
//! layer writes each fragment to the client connection as it arrives.

pub mod error;
pub mod provider;
pub mod relay;
pub mod store;
pub mod types;

pub use error::ChatError;
pub use provider::{ProviderClient, ProviderConfig};
pub use relay::RelayService;
pub use store::TranscriptStore;
pub use types::{ChatRequest, ChatTurn, TurnRole};
