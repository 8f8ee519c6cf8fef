//! Storage-specific error types.
//!
//! Wraps Diesel and r2d2 errors; converted to `ChatError::Storage` at the
//! crate boundary so callers stay database-agnostic.

use colloquy_chat::ChatError;
use diesel::result::Error as DieselError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
}

impl From<StorageError> for ChatError {
    fn from(err: StorageError) -> Self {
        ChatError::Storage(err.to_string())
    }
}
