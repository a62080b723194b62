//! SQLite-backed record store.
//!
//! ## Layout
//!
//! Every record of every collection lives in one `records` table, keyed by
//! `(collection, id)`, with its field values stored as a JSON object. The
//! schema comes from embedded `sqlx::migrate!` migrations in
//! `server/migrations/`, which also seed the tournament singleton.
//!
//! ## Transactions
//!
//! All reads and writes of a request go through one [`StoreTx`]. Dropping it
//! without [`StoreTx::commit`] rolls everything back. Change notifications are
//! buffered in the transaction and only published after a successful commit.
//!
//! ## Model hooks
//!
//! [`ModelHooks`] run after every update performed through [`StoreTx::save`],
//! on the same transaction, no matter which code path did the save.

mod database;
mod model_hooks;
mod store;

pub use database::Database;
pub use model_hooks::{AfterUpdateHook, ModelHooks};
pub use store::{RecordChange, StoreTx};

use std::time::{SystemTime, UNIX_EPOCH};
use tournament::{Collection, UnknownCollection};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },
    #[error("Cannot expand records of different collections: {expected} and {found}")]
    MixedCollections {
        expected: Collection,
        found: Collection,
    },
    #[error(transparent)]
    UnknownCollection(#[from] UnknownCollection),
}

/// Get the current unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
