//! Database models for the transcript log.

use diesel::prelude::*;

use crate::schema::turns;

/// Database model for a stored turn.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = turns)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TurnDB {
    pub id: i32,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// Insert model; `id` is auto-assigned by SQLite.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = turns)]
pub struct NewTurnDB {
    pub role: String,
    pub content: String,
    pub created_at: String,
}
