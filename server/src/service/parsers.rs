//! Parsing functions from raw request input to typed requests

use serde_json::{Map, Value};
use std::collections::HashMap;

use tournament::{pair_scores, Collection, SetScore};

use crate::error::HookError;
use crate::hooks::RequestParams;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResultRequest {
    pub match_id: String,
    pub end_time: String,
    pub sets: Vec<SetScore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCompetitionRequest {
    pub competition_id: String,
    pub num_matches: usize,
}

pub fn parse_collection(name: &str) -> Result<Collection, HookError> {
    Ok(name.parse::<Collection>()?)
}

pub fn parse_json_body(body: &[u8]) -> Result<Value, HookError> {
    serde_json::from_slice(body).map_err(|e| HookError::validation(format!("Invalid JSON body: {e}")))
}

/// A record body must be a JSON object. An empty body is an empty object.
pub fn parse_record_body(body: &[u8]) -> Result<Map<String, Value>, HookError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match parse_json_body(body)? {
        Value::Object(map) => Ok(map),
        other => Err(HookError::validation(format!(
            "Record body must be an object, got {other}"
        ))),
    }
}

fn non_empty_param(query: &HashMap<String, String>, key: &str) -> Option<String> {
    query.get(key).filter(|v| !v.is_empty()).cloned()
}

pub fn parse_request_params(query: &HashMap<String, String>) -> RequestParams {
    RequestParams {
        competition: non_empty_param(query, "competition"),
        replacement: non_empty_param(query, "replacement"),
    }
}

pub fn parse_expand_flag(query: &HashMap<String, String>) -> bool {
    matches!(
        query.get("expand").map(String::as_str),
        Some("1" | "true" | "yes")
    )
}

fn required_param(query: &HashMap<String, String>, key: &str) -> Result<String, HookError> {
    non_empty_param(query, key)
        .ok_or_else(|| HookError::validation(format!("Missing query parameter: {key}")))
}

/// `PUT match_sets?match=..&endTime=..` with `{"results": [numbers]}`.
pub fn parse_match_result(
    query: &HashMap<String, String>,
    body: &[u8],
) -> Result<MatchResultRequest, HookError> {
    let match_id = required_param(query, "match")?;
    let end_time = required_param(query, "endTime")?;

    let body = parse_json_body(body)?;
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| HookError::validation("results must be a list of numbers"))?;
    let scores = results
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as i64)
                .ok_or_else(|| HookError::validation(format!("Invalid score: {v}")))
        })
        .collect::<Result<Vec<i64>, HookError>>()?;

    Ok(MatchResultRequest {
        match_id,
        end_time,
        sets: pair_scores(&scores)?,
    })
}

/// `POST competitions` with `{"competition": "<id>", "numMatches": <number>}`.
pub fn parse_start_competition(body: &[u8]) -> Result<StartCompetitionRequest, HookError> {
    let body = parse_json_body(body)?;
    let competition_id = body
        .get("competition")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HookError::validation("competition must be a record id"))?
        .to_string();
    let num_matches = body
        .get("numMatches")
        .and_then(Value::as_f64)
        .ok_or_else(|| HookError::validation("numMatches must be a number"))?;
    if num_matches < 0.0 {
        return Err(HookError::validation(format!(
            "numMatches must not be negative, got {num_matches}"
        )));
    }

    Ok(StartCompetitionRequest {
        competition_id,
        num_matches: num_matches as usize,
    })
}
