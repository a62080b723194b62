//! Custom endpoints under `/api/ezbadminton`.
//!
//! These answer with a bare status: 400 for malformed input, 500 for any
//! failure while applying it.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::HookError;
use crate::service::parsers::{parse_match_result, parse_start_competition};
use crate::service::RecordService;

#[derive(Debug, Serialize)]
pub struct OrganizerExists {
    #[serde(rename = "OrganizerUserExists")]
    pub organizer_user_exists: bool,
}

fn reject(endpoint: &str, err: HookError) -> StatusCode {
    let status = err.custom_status_code();
    if status.is_server_error() {
        tracing::error!(endpoint, error = %err, "Request failed");
    } else {
        tracing::warn!(endpoint, error = %err, "Request rejected");
    }
    status
}

/// `PUT /api/ezbadminton/match_sets?match=..&endTime=..`
pub async fn put_match_sets(
    State(service): State<RecordService>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> StatusCode {
    let request = match parse_match_result(&query, &body) {
        Ok(request) => request,
        Err(e) => return reject("match_sets", e),
    };
    match service
        .put_match_result(&request.match_id, &request.end_time, &request.sets)
        .await
    {
        Ok(()) => StatusCode::OK,
        Err(e) => reject("match_sets", e),
    }
}

/// `POST /api/ezbadminton/competitions`
pub async fn post_competition_matches(
    State(service): State<RecordService>,
    body: Bytes,
) -> StatusCode {
    let request = match parse_start_competition(&body) {
        Ok(request) => request,
        Err(e) => return reject("competitions", e),
    };
    match service
        .start_competition(&request.competition_id, request.num_matches)
        .await
    {
        Ok(_) => StatusCode::OK,
        Err(e) => reject("competitions", e),
    }
}

/// `GET /api/ezbadminton/tournament_organizer/exists`
pub async fn organizer_exists(
    State(service): State<RecordService>,
) -> Result<Json<OrganizerExists>, StatusCode> {
    match service.organizer_exists().await {
        Ok(exists) => Ok(Json(OrganizerExists {
            organizer_user_exists: exists,
        })),
        Err(e) => Err(reject("tournament_organizer/exists", e)),
    }
}
