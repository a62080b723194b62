//! Generic record endpoints. Writes through these run the request hooks.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;

use tournament::Record;

use crate::error::HookError;
use crate::service::parsers::{
    parse_collection, parse_expand_flag, parse_record_body, parse_request_params,
};
use crate::service::RecordService;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordList {
    pub items: Vec<Record>,
    pub total_items: usize,
}

pub async fn list_records(
    State(service): State<RecordService>,
    Path(collection): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<RecordList>, HookError> {
    let collection = parse_collection(&collection)?;
    let items = service.list(collection, parse_expand_flag(&query)).await?;
    Ok(Json(RecordList {
        total_items: items.len(),
        items,
    }))
}

pub async fn get_record(
    State(service): State<RecordService>,
    Path((collection, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Record>, HookError> {
    let collection = parse_collection(&collection)?;
    let record = service
        .get(collection, &id, parse_expand_flag(&query))
        .await?;
    Ok(Json(record))
}

pub async fn create_record(
    State(service): State<RecordService>,
    Path(collection): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<Record>, HookError> {
    let collection = parse_collection(&collection)?;
    let data = parse_record_body(&body)?;
    let params = parse_request_params(&query);
    tracing::info!(%collection, competition = ?params.competition, "Create record");
    let record = service.create(collection, data, &params).await?;
    Ok(Json(record))
}

pub async fn update_record(
    State(service): State<RecordService>,
    Path((collection, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Record>, HookError> {
    let collection = parse_collection(&collection)?;
    let patch = parse_record_body(&body)?;
    tracing::info!(%collection, %id, "Update record");
    let record = service.update(collection, &id, patch).await?;
    Ok(Json(record))
}

pub async fn delete_record(
    State(service): State<RecordService>,
    Path((collection, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<StatusCode, HookError> {
    let collection = parse_collection(&collection)?;
    let params = parse_request_params(&query);
    tracing::info!(%collection, %id, replacement = ?params.replacement, "Delete record");
    service.delete(collection, &id, &params).await?;
    Ok(StatusCode::NO_CONTENT)
}
