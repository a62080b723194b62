//! Record service and its HTTP endpoints
//!
//! This module is split into:
//! - parsers: raw request input → typed requests
//! - endpoints: axum handlers and the router
//! - [`RecordService`]: the operations behind the endpoints, each running in
//!   one store transaction together with its request hooks

pub mod endpoints;
pub mod parsers;

use serde_json::{Map, Value};
use tokio::sync::broadcast;

use tournament::{Collection, Record, SetScore};

use crate::error::HookError;
use crate::hooks::{self, relations, RequestParams};
use crate::persistence::{Database, RecordChange};

/// Context object behind every request. Cheap to clone.
#[derive(Clone)]
pub struct RecordService {
    db: Database,
}

impl RecordService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.db.subscribe()
    }

    pub async fn list(&self, collection: Collection, expand: bool) -> Result<Vec<Record>, HookError> {
        let mut tx = self.db.begin().await?;
        let mut records = tx.find_all(collection).await?;
        if expand {
            relations::expand_all_nested_relations(&mut tx, &mut records).await?;
        }
        Ok(records)
    }

    pub async fn get(&self, collection: Collection, id: &str, expand: bool) -> Result<Record, HookError> {
        let mut tx = self.db.begin().await?;
        let record = tx.get(collection, id).await?;
        if !expand {
            return Ok(record);
        }
        let mut records = [record];
        relations::expand_all_nested_relations(&mut tx, &mut records).await?;
        let [record] = records;
        Ok(record)
    }

    #[tracing::instrument(skip(self, data, params))]
    pub async fn create(
        &self,
        collection: Collection,
        data: Map<String, Value>,
        params: &RequestParams,
    ) -> Result<Record, HookError> {
        let mut record = Record::new(collection);
        record.merge_data(data);

        let mut tx = self.db.begin().await?;
        hooks::before_create(&mut tx, &record).await?;
        tx.save(&mut record).await?;
        hooks::after_create(&mut tx, &record, params).await?;
        tx.commit().await?;

        tracing::debug!(id = %record.id, "Created record");
        Ok(record)
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Record, HookError> {
        let mut tx = self.db.begin().await?;
        let old = tx.get(collection, id).await?;
        let mut updated = old.clone();
        updated.merge_data(patch);

        hooks::before_update(&mut tx, &old, &updated).await?;
        tx.save(&mut updated).await?;
        hooks::after_update(&mut tx, &old, &updated).await?;
        tx.commit().await?;

        Ok(updated)
    }

    #[tracing::instrument(skip(self, params))]
    pub async fn delete(
        &self,
        collection: Collection,
        id: &str,
        params: &RequestParams,
    ) -> Result<(), HookError> {
        let mut tx = self.db.begin().await?;
        let record = tx.get(collection, id).await?;
        hooks::before_delete(&mut tx, &record, params).await?;
        tx.delete(&record).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, sets))]
    pub async fn put_match_result(
        &self,
        match_id: &str,
        end_time: &str,
        sets: &[SetScore],
    ) -> Result<(), HookError> {
        let mut tx = self.db.begin().await?;
        hooks::matches::put_match_result(&mut tx, match_id, end_time, sets).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn start_competition(
        &self,
        competition_id: &str,
        num_matches: usize,
    ) -> Result<Vec<String>, HookError> {
        let mut tx = self.db.begin().await?;
        let ids = hooks::matches::start_competition(&mut tx, competition_id, num_matches).await?;
        tx.commit().await?;
        Ok(ids)
    }

    pub async fn organizer_exists(&self) -> Result<bool, HookError> {
        let mut tx = self.db.begin().await?;
        Ok(hooks::organizer::organizer_exists(&mut tx).await?)
    }
}
