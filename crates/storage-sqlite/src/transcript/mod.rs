//! Transcript persistence: the durable append-only log of chat turns.

pub mod model;
pub mod repository;

pub use repository::TranscriptRepository;
