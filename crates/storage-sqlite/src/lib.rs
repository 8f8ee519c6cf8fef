//! SQLite transcript storage for Colloquy.
//!
//! This crate is the only place where Diesel dependencies exist. It
//! implements the `TranscriptStore` trait from `colloquy-chat` on top of a
//! pooled SQLite database: reads go straight to the pool, writes are
//! serialized through a single-writer actor so concurrent relay calls never
//! contend on the write path.

pub mod db;
pub mod errors;
pub mod schema;
pub mod transcript;

pub use db::{create_pool, get_connection, init, run_migrations, DbConnection, DbPool, WriteHandle};
pub use errors::StorageError;
pub use transcript::TranscriptRepository;
