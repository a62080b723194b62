//! Transactional record access.

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;
use tokio::sync::broadcast;

use tournament::{generate_record_id, Collection, Field, Record};

use super::{now_millis, ModelHooks, PersistenceError};

const SELECT_RECORDS: &str = "SELECT collection, id, data, created, updated FROM records";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// Notification about a committed record write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordChange {
    pub action: ChangeAction,
    pub collection: Collection,
    pub id: String,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    collection: String,
    id: String,
    data: String,
    created: i64,
    updated: i64,
}

impl RecordRow {
    fn into_record(self) -> Result<Record, PersistenceError> {
        let collection: Collection = self.collection.parse()?;
        let data: Map<String, Value> = serde_json::from_str(&self.data)?;
        Ok(Record::from_stored(
            collection,
            self.id,
            data,
            self.created,
            self.updated,
        ))
    }
}

fn json_path(field: Field) -> String {
    format!("$.{}", field.name())
}

/// One store transaction.
///
/// Writes go through [`StoreTx::save`] and [`StoreTx::delete`], which keep
/// relation fields consistent and run the registered model hooks. Nothing is
/// visible to other transactions until [`StoreTx::commit`].
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
    hooks: Arc<ModelHooks>,
    changes: broadcast::Sender<RecordChange>,
    pending: Vec<RecordChange>,
}

impl StoreTx {
    pub(super) fn new(
        tx: Transaction<'static, Sqlite>,
        hooks: Arc<ModelHooks>,
        changes: broadcast::Sender<RecordChange>,
    ) -> Self {
        Self {
            tx,
            hooks,
            changes,
            pending: Vec::new(),
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub async fn find_by_id(
        &mut self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Record>, PersistenceError> {
        let row: Option<RecordRow> =
            sqlx::query_as(&format!("{SELECT_RECORDS} WHERE collection = ? AND id = ?"))
                .bind(collection.name())
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(RecordRow::into_record).transpose()
    }

    /// Like [`StoreTx::find_by_id`], but a missing record is an error.
    pub async fn get(&mut self, collection: Collection, id: &str) -> Result<Record, PersistenceError> {
        self.find_by_id(collection, id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound {
                collection,
                id: id.to_string(),
            })
    }

    /// Records of `collection` with one of `ids`, in store order. Unknown ids are skipped.
    pub async fn find_by_ids(
        &mut self,
        collection: Collection,
        ids: &[String],
    ) -> Result<Vec<Record>, PersistenceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = serde_json::to_string(ids)?;
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "{SELECT_RECORDS} WHERE collection = ? AND id IN (SELECT value FROM json_each(?)) \
             ORDER BY created, rowid"
        ))
        .bind(collection.name())
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }

    pub async fn find_all(&mut self, collection: Collection) -> Result<Vec<Record>, PersistenceError> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "{SELECT_RECORDS} WHERE collection = ? ORDER BY created, rowid"
        ))
        .bind(collection.name())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }

    /// First record of `collection` in store order.
    pub async fn find_first(
        &mut self,
        collection: Collection,
    ) -> Result<Option<Record>, PersistenceError> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "{SELECT_RECORDS} WHERE collection = ? ORDER BY created, rowid LIMIT 1"
        ))
        .bind(collection.name())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(RecordRow::into_record).transpose()
    }

    /// Records whose single-valued `field` equals `value`.
    pub async fn find_by_field(
        &mut self,
        field: Field,
        value: &str,
    ) -> Result<Vec<Record>, PersistenceError> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "{SELECT_RECORDS} WHERE collection = ? AND json_extract(data, ?) = ? \
             ORDER BY created, rowid"
        ))
        .bind(field.collection().name())
        .bind(json_path(field))
        .bind(value)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }

    /// Records whose multi-valued `field` contains `value`.
    pub async fn find_containing(
        &mut self,
        field: Field,
        value: &str,
    ) -> Result<Vec<Record>, PersistenceError> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "{SELECT_RECORDS} WHERE collection = ? \
             AND EXISTS (SELECT 1 FROM json_each(records.data, ?) AS item WHERE item.value = ?) \
             ORDER BY created, rowid"
        ))
        .bind(field.collection().name())
        .bind(json_path(field))
        .bind(value)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }

    pub async fn count(&mut self, collection: Collection) -> Result<i64, PersistenceError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection.name())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.0)
    }

    // ── Writes ─────────────────────────────────────────────────────────

    /// Insert a new record or write back an existing one.
    ///
    /// Updates run the after-update model hooks of the record's collection,
    /// which may save further records. The expansion cache is never stored.
    pub fn save<'a>(&'a mut self, record: &'a mut Record) -> BoxFuture<'a, Result<(), PersistenceError>> {
        Box::pin(async move {
            let now = now_millis();
            let data = serde_json::to_string(record.data())?;

            if record.is_new() {
                if record.id.is_empty() {
                    record.id = generate_record_id();
                }
                sqlx::query(
                    "INSERT INTO records (collection, id, data, created, updated) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(record.collection.name())
                .bind(&record.id)
                .bind(&data)
                .bind(now)
                .bind(now)
                .execute(&mut *self.tx)
                .await?;
                record.created = now;
                record.updated = now;
                record.mark_persisted();
                tracing::debug!(collection = %record.collection, id = %record.id, "Record created");
                self.record_change(ChangeAction::Create, record);
                return Ok(());
            }

            let result = sqlx::query(
                "UPDATE records SET data = ?, updated = ? WHERE collection = ? AND id = ?",
            )
            .bind(&data)
            .bind(now)
            .bind(record.collection.name())
            .bind(&record.id)
            .execute(&mut *self.tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(PersistenceError::NotFound {
                    collection: record.collection,
                    id: record.id.clone(),
                });
            }
            record.updated = now;
            tracing::debug!(collection = %record.collection, id = %record.id, "Record updated");
            self.record_change(ChangeAction::Update, record);

            let hooks = Arc::clone(&self.hooks);
            for hook in hooks.after_update(record.collection) {
                hook.run(&mut *self, &*record).await?;
            }
            Ok(())
        })
    }

    /// Delete a record and drop its id from every relation field that
    /// references it. Referencing records are saved, so their hooks run.
    ///
    /// Deleting a record that is already gone does nothing.
    pub async fn delete(&mut self, record: &Record) -> Result<(), PersistenceError> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
            .bind(record.collection.name())
            .bind(&record.id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            tracing::debug!(collection = %record.collection, id = %record.id, "Record already deleted");
            return Ok(());
        }
        tracing::debug!(collection = %record.collection, id = %record.id, "Record deleted");
        self.record_change(ChangeAction::Delete, record);

        for relation in record.collection.referenced_by() {
            let referrers = if relation.is_multiple() {
                self.find_containing(relation.field, &record.id).await?
            } else {
                self.find_by_field(relation.field, &record.id).await?
            };
            for mut referrer in referrers {
                if referrer.remove_relation_id(relation.field, &record.id) {
                    self.save(&mut referrer).await?;
                }
            }
        }
        Ok(())
    }

    fn record_change(&mut self, action: ChangeAction, record: &Record) {
        self.pending.push(RecordChange {
            action,
            collection: record.collection,
            id: record.id.clone(),
        });
    }

    /// Commit the transaction and publish its changes.
    pub async fn commit(self) -> Result<(), PersistenceError> {
        self.tx.commit().await?;
        for change in self.pending {
            // No subscribers is fine
            let _ = self.changes.send(change);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{AfterUpdateHook, Database};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(collection: Collection, data: Value) -> Record {
        let Value::Object(map) = data else {
            panic!("expected object");
        };
        Record::with_data(collection, map)
    }

    async fn db() -> Database {
        Database::new_in_memory(ModelHooks::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let mut player = record(Collection::Players, json!({ "firstName": "Ada" }));
        tx.save(&mut player).await.unwrap();
        assert!(!player.is_new());
        assert!(player.created > 0);

        let loaded = tx.get(Collection::Players, &player.id).await.unwrap();
        assert_eq!(loaded.data()["firstName"], "Ada");
        assert!(tx.find_by_id(Collection::Teams, &player.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let err = tx.get(Collection::Players, "missing").await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_record_fails() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let mut player = record(Collection::Players, json!({}));
        player.mark_persisted();
        let err = tx.save(&mut player).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_field_queries() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let mut a = record(Collection::Teams, json!({ "players": ["p1", "p2"] }));
        let mut b = record(Collection::Teams, json!({ "players": ["p3"] }));
        tx.save(&mut a).await.unwrap();
        tx.save(&mut b).await.unwrap();
        let mut court = record(Collection::Courts, json!({ "gymnasium": "g1" }));
        tx.save(&mut court).await.unwrap();

        let containing = tx.find_containing(Field::TeamPlayers, "p2").await.unwrap();
        assert_eq!(containing.len(), 1);
        assert_eq!(containing[0].id, a.id);

        let courts = tx.find_by_field(Field::Gymnasium, "g1").await.unwrap();
        assert_eq!(courts.len(), 1);
        assert!(tx.find_by_field(Field::Gymnasium, "g2").await.unwrap().is_empty());

        let ids = vec![b.id.clone(), "unknown".to_string(), a.id.clone()];
        let found = tx.find_by_ids(Collection::Teams, &ids).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(tx.count(Collection::Teams).await.unwrap(), 2);
        assert_eq!(tx.find_first(Collection::Teams).await.unwrap().unwrap().id, a.id);
    }

    #[tokio::test]
    async fn test_delete_clears_references() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let mut team = record(Collection::Teams, json!({}));
        tx.save(&mut team).await.unwrap();
        let mut level = record(Collection::PlayingLevels, json!({}));
        tx.save(&mut level).await.unwrap();
        let mut competition = record(
            Collection::Competitions,
            json!({ "registrations": [team.id], "draw": [team.id], "playingLevel": level.id }),
        );
        tx.save(&mut competition).await.unwrap();

        tx.delete(&team).await.unwrap();
        tx.delete(&level).await.unwrap();
        // Deleting twice is harmless
        tx.delete(&team).await.unwrap();

        let competition = tx.get(Collection::Competitions, &competition.id).await.unwrap();
        assert!(competition.get_string_list(Field::Registrations).is_empty());
        assert!(competition.get_string_list(Field::Draw).is_empty());
        assert_eq!(competition.get_id(Field::PlayingLevel), None);
    }

    #[tokio::test]
    async fn test_rollback_on_drop() {
        let db = db().await;
        let id = {
            let mut tx = db.begin().await.unwrap();
            let mut player = record(Collection::Players, json!({}));
            tx.save(&mut player).await.unwrap();
            player.id
        };
        let mut tx = db.begin().await.unwrap();
        assert!(tx.find_by_id(Collection::Players, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_changes_published_on_commit() {
        let db = db().await;
        let mut changes = db.subscribe();
        let mut tx = db.begin().await.unwrap();
        let mut player = record(Collection::Players, json!({}));
        tx.save(&mut player).await.unwrap();
        tx.save(&mut player).await.unwrap();
        assert!(changes.try_recv().is_err());
        tx.commit().await.unwrap();

        let first = changes.recv().await.unwrap();
        assert_eq!(first.action, ChangeAction::Create);
        assert_eq!(first.id, player.id);
        assert_eq!(changes.recv().await.unwrap().action, ChangeAction::Update);
    }

    struct CountingHook(Arc<AtomicUsize>);

    impl AfterUpdateHook for CountingHook {
        fn name(&self) -> String {
            "counting".to_string()
        }

        fn run<'a>(
            &'a self,
            _tx: &'a mut StoreTx,
            _record: &'a Record,
        ) -> BoxFuture<'a, Result<(), PersistenceError>> {
            Box::pin(async move {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_hooks_run_on_update_only() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut hooks = ModelHooks::new();
        hooks.on_after_update(Collection::Players, CountingHook(Arc::clone(&count)));
        let db = Database::new_in_memory(hooks).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let mut player = record(Collection::Players, json!({}));
        tx.save(&mut player).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tx.save(&mut player).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let mut team = record(Collection::Teams, json!({}));
        tx.save(&mut team).await.unwrap();
        tx.save(&mut team).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
