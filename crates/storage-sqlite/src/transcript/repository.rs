//! Repository for transcript persistence.
//!
//! Implements the `TranscriptStore` trait from `colloquy-chat`. Reads use a
//! pool connection directly; writes go through the single-writer actor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;

use colloquy_chat::{ChatError, ChatTurn, TranscriptStore, TurnRole};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::turns;

use super::model::{NewTurnDB, TurnDB};

/// SQLite implementation of the transcript store.
pub struct TranscriptRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl TranscriptRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn db_to_turn(db: TurnDB) -> Result<ChatTurn, StorageError> {
    let role = TurnRole::parse(&db.role)
        .ok_or_else(|| StorageError::InvalidRow(format!("unknown role '{}'", db.role)))?;
    Ok(ChatTurn::new(role, db.content))
}

#[async_trait]
impl TranscriptStore for TranscriptRepository {
    async fn append(&self, role: TurnRole, content: &str) -> Result<(), ChatError> {
        let row = NewTurnDB {
            role: role.as_str().to_string(),
            content: content.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };

        self.writer
            .exec(move |conn| {
                diesel::insert_into(turns::table).values(&row).execute(conn)?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn history(&self) -> Result<Vec<ChatTurn>, ChatError> {
        let mut conn = get_connection(&self.pool).map_err(ChatError::from)?;

        let rows = turns::table
            .order(turns::id.asc())
            .load::<TurnDB>(&mut conn)
            .map_err(|e| ChatError::from(StorageError::QueryFailed(e)))?;

        rows.into_iter()
            .map(|db| db_to_turn(db).map_err(ChatError::from))
            .collect()
    }

    async fn clear(&self) -> Result<(), ChatError> {
        self.writer
            .exec(|conn| {
                diesel::delete(turns::table).execute(conn)?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, write_actor};

    fn open_repo(db_path: &str) -> TranscriptRepository {
        let path = db::init(db_path).unwrap();
        let pool = db::create_pool(&path).unwrap();
        db::run_migrations(&pool).unwrap();
        let writer = write_actor::spawn_writer((*pool).clone());
        TranscriptRepository::new(pool, writer)
    }

    #[tokio::test]
    async fn history_preserves_append_order() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("test.db");
        let repo = open_repo(db_path.to_str().unwrap());

        repo.append(TurnRole::User, "first").await.unwrap();
        repo.append(TurnRole::Assistant, "second").await.unwrap();
        repo.append(TurnRole::User, "third").await.unwrap();

        let history = repo.history().await.unwrap();
        assert_eq!(
            history,
            vec![
                ChatTurn::new(TurnRole::User, "first"),
                ChatTurn::new(TurnRole::Assistant, "second"),
                ChatTurn::new(TurnRole::User, "third"),
            ]
        );
    }

    #[tokio::test]
    async fn history_survives_pool_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("test.db");

        {
            let repo = open_repo(db_path.to_str().unwrap());
            repo.append(TurnRole::User, "durable").await.unwrap();
        }

        let reopened = open_repo(db_path.to_str().unwrap());
        let history = reopened.history().await.unwrap();
        assert_eq!(history, vec![ChatTurn::new(TurnRole::User, "durable")]);
    }

    #[tokio::test]
    async fn clear_empties_the_log() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("test.db");
        let repo = open_repo(db_path.to_str().unwrap());

        repo.append(TurnRole::User, "hello").await.unwrap();
        repo.append(TurnRole::Assistant, "hi").await.unwrap();
        repo.clear().await.unwrap();

        assert!(repo.history().await.unwrap().is_empty());

        // The log accepts new turns after a clear.
        repo.append(TurnRole::User, "again").await.unwrap();
        assert_eq!(repo.history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_history_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("test.db");
        let repo = open_repo(db_path.to_str().unwrap());

        assert!(repo.history().await.unwrap().is_empty());
    }
}
