//! SQLite database connection pool and migration runner.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::{ModelHooks, PersistenceError, RecordChange, StoreTx};

const CHANGE_CHANNEL_CAPACITY: usize = 256;
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Holds a connection pool to the SQLite database together with the model
/// hooks every transaction runs and the change notification channel.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    hooks: Arc<ModelHooks>,
    changes: broadcast::Sender<RecordChange>,
}

impl Database {
    /// Open (or create) the database at `path`, run migrations, and return
    /// a ready-to-use `Database`.
    pub async fn open(path: &Path, hooks: ModelHooks) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(PersistenceError::Io)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(sqlx::Error::from)?;

        let db = Self::with_pool(pool, hooks);
        db.run_migrations().await?;
        if db.hooks.is_empty() {
            tracing::warn!("No model hooks registered, relation cascades are off");
        }
        tracing::info!(path = %path.display(), hooks = db.hooks.len(), "Database ready");
        Ok(db)
    }

    /// Create an in-memory database for testing. Migrations are applied.
    #[cfg(test)]
    pub async fn new_in_memory(hooks: ModelHooks) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        // A single connection that never expires: the in-memory database
        // lives exactly as long as it does.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(sqlx::Error::from)?;

        let db = Self::with_pool(pool, hooks);
        db.run_migrations().await?;
        Ok(db)
    }

    fn with_pool(pool: SqlitePool, hooks: ModelHooks) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            pool,
            hooks: Arc::new(hooks),
            changes,
        }
    }

    /// Run embedded migrations from `server/migrations/`.
    async fn run_migrations(&self) -> Result<(), PersistenceError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PersistenceError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Start a transaction. Every read and write of one request goes through it.
    ///
    /// Takes the write lock up front, so concurrent requests wait on the busy
    /// timeout rather than fail on a lock upgrade.
    pub async fn begin(&self) -> Result<StoreTx, PersistenceError> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(StoreTx::new(tx, Arc::clone(&self.hooks), self.changes.clone()))
    }

    /// Subscribe to committed record changes.
    pub fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tournament::{Collection, Field};

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::new_in_memory(ModelHooks::new()).await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }

    #[tokio::test]
    async fn test_migrations_seed_tournament() {
        let db = Database::new_in_memory(ModelHooks::new()).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let tournament = tx
            .find_first(Collection::Tournaments)
            .await
            .unwrap()
            .expect("tournament singleton");
        assert_eq!(tournament.data()["title"], "TheTournament");
        assert!(!tournament.get_bool(Field::UseAgeGroups));
        assert!(!tournament.get_bool(Field::UsePlayingLevels));
        assert_eq!(tx.count(Collection::Tournaments).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_file_based() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("data.db");
        let db = Database::open(&db_path, ModelHooks::new()).await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 1);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_reopen_keeps_single_tournament() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("data.db");
        drop(Database::open(&db_path, ModelHooks::new()).await.unwrap());
        let db = Database::open(&db_path, ModelHooks::new()).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        assert_eq!(tx.count(Collection::Tournaments).await.unwrap(), 1);
    }
}
