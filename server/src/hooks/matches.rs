//! Match lifecycle: starting competitions, recording results and dropping
//! stale match data.

use std::collections::HashSet;

use tournament::{Collection, Field, Record, ScoreError, SetScore};

use super::relations::{delete_records_by_id, expand_field};
use crate::error::HookError;
use crate::persistence::StoreTx;

/// After a competition update: when its match list was emptied, delete the
/// old matches and their sets.
pub async fn handle_after_competition_updated(
    tx: &mut StoreTx,
    old: &Record,
    updated: &Record,
) -> Result<(), HookError> {
    if old.get_string_list(Field::Matches).is_empty()
        || !updated.get_string_list(Field::Matches).is_empty()
    {
        return Ok(());
    }

    let mut expanded = [old.clone()];
    expand_field(tx, &mut expanded, Field::Matches).await?;
    let matches = expanded[0].expanded_all(Field::Matches);

    let mut seen = HashSet::new();
    let set_ids: Vec<String> = matches
        .iter()
        .flat_map(|m| m.get_string_list(Field::Sets))
        .filter(|id| seen.insert(id.clone()))
        .collect();

    for match_data in matches {
        tx.delete(match_data).await?;
    }
    let sets = delete_records_by_id(tx, Collection::MatchSets, &set_ids).await?;

    tracing::info!(
        competition = %updated.id,
        matches = matches.len(),
        sets,
        "Deleted matches of reset competition"
    );
    Ok(())
}

/// Start a competition with `num_matches` blank matches. Returns their ids.
pub async fn start_competition(
    tx: &mut StoreTx,
    competition_id: &str,
    num_matches: usize,
) -> Result<Vec<String>, HookError> {
    let mut competition = tx.get(Collection::Competitions, competition_id).await?;
    if !competition.get_string_list(Field::Matches).is_empty() {
        return Err(HookError::integrity(
            "cannot start an already running competition",
        ));
    }

    let mut ids = Vec::with_capacity(num_matches);
    for _ in 0..num_matches {
        let mut match_data = Record::new(Collection::MatchData);
        tx.save(&mut match_data).await?;
        ids.push(match_data.id);
    }
    competition.set_ids(Field::Matches, ids.iter().cloned());
    tx.save(&mut competition).await?;

    tracing::info!(competition = %competition_id, matches = num_matches, "Competition started");
    Ok(ids)
}

/// Record the result of a match: new sets replace the old ones and the end
/// time is set.
pub async fn put_match_result(
    tx: &mut StoreTx,
    match_id: &str,
    end_time: &str,
    sets: &[SetScore],
) -> Result<(), HookError> {
    if sets.is_empty() {
        return Err(ScoreError::Empty.into());
    }
    let mut match_data = tx.get(Collection::MatchData, match_id).await?;
    let old_sets = match_data.get_string_list(Field::Sets);

    let mut set_ids = Vec::with_capacity(sets.len());
    for score in sets {
        let mut set = Record::new(Collection::MatchSets);
        set.set(Field::Team1Points, score.team1_points);
        set.set(Field::Team2Points, score.team2_points);
        tx.save(&mut set).await?;
        set_ids.push(set.id);
    }

    match_data.set(Field::EndTime, end_time);
    match_data.set_ids(Field::Sets, set_ids);
    tx.save(&mut match_data).await?;

    let replaced = delete_records_by_id(tx, Collection::MatchSets, &old_sets).await?;
    tracing::info!(
        match_id = %match_id,
        sets = sets.len(),
        replaced,
        "Match result recorded"
    );
    Ok(())
}

/// After a match update: when its sets were cleared, delete the old sets.
pub async fn handle_after_updated_match(
    tx: &mut StoreTx,
    old: &Record,
    updated: &Record,
) -> Result<(), HookError> {
    let old_sets = old.get_string_list(Field::Sets);
    if old_sets.is_empty() || !updated.get_string_list(Field::Sets).is_empty() {
        return Ok(());
    }
    let deleted = delete_records_by_id(tx, Collection::MatchSets, &old_sets).await?;
    tracing::debug!(match_id = %updated.id, deleted, "Deleted sets of voided match");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::model_hooks;
    use crate::persistence::Database;
    use serde_json::{json, Value};

    async fn saved(tx: &mut StoreTx, collection: Collection, data: Value) -> Record {
        let Value::Object(map) = data else {
            panic!("expected object");
        };
        let mut r = Record::with_data(collection, map);
        tx.save(&mut r).await.unwrap();
        r
    }

    fn score(team1_points: i64, team2_points: i64) -> SetScore {
        SetScore {
            team1_points,
            team2_points,
        }
    }

    #[tokio::test]
    async fn test_put_match_result_replaces_sets() {
        let db = Database::new_in_memory(model_hooks()).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let old_set = saved(&mut tx, Collection::MatchSets, json!({ "team1Points": 1 })).await;
        let m = saved(&mut tx, Collection::MatchData, json!({ "sets": [old_set.id] })).await;

        put_match_result(&mut tx, &m.id, "2024-05-01 10:00:00", &[score(21, 15), score(21, 18)])
            .await
            .unwrap();

        let m = tx.get(Collection::MatchData, &m.id).await.unwrap();
        assert_eq!(m.get_str(Field::EndTime), "2024-05-01 10:00:00");
        let sets = tx
            .find_by_ids(Collection::MatchSets, &m.get_string_list(Field::Sets))
            .await
            .unwrap();
        let points: Vec<(i64, i64)> = sets
            .iter()
            .map(|s| (s.get_int(Field::Team1Points), s.get_int(Field::Team2Points)))
            .collect();
        assert_eq!(points, vec![(21, 15), (21, 18)]);
        assert!(tx
            .find_by_id(Collection::MatchSets, &old_set.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_put_match_result_unknown_match() {
        let db = Database::new_in_memory(model_hooks()).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let err = put_match_result(&mut tx, "nope", "t", &[score(1, 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_start_competition_twice_fails() {
        let db = Database::new_in_memory(model_hooks()).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let c = saved(&mut tx, Collection::Competitions, json!({})).await;
        let ids = start_competition(&mut tx, &c.id, 2).await.unwrap();
        assert_eq!(ids.len(), 2);
        let err = start_competition(&mut tx, &c.id, 2).await.unwrap_err();
        assert!(matches!(err, HookError::Integrity(_)));
        assert_eq!(tx.count(Collection::MatchData).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reset_competition_deletes_matches_and_sets() {
        let db = Database::new_in_memory(model_hooks()).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let s1 = saved(&mut tx, Collection::MatchSets, json!({})).await;
        let s2 = saved(&mut tx, Collection::MatchSets, json!({})).await;
        let m1 = saved(&mut tx, Collection::MatchData, json!({ "sets": [s1.id] })).await;
        let m2 = saved(&mut tx, Collection::MatchData, json!({ "sets": [s2.id] })).await;
        let old = saved(&mut tx, Collection::Competitions, json!({ "matches": [m1.id, m2.id] })).await;
        let mut updated = old.clone();
        updated.set_ids(Field::Matches, Vec::<String>::new());
        tx.save(&mut updated).await.unwrap();

        handle_after_competition_updated(&mut tx, &old, &updated)
            .await
            .unwrap();
        assert_eq!(tx.count(Collection::MatchData).await.unwrap(), 0);
        assert_eq!(tx.count(Collection::MatchSets).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_voided_match_deletes_sets() {
        let db = Database::new_in_memory(model_hooks()).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let s1 = saved(&mut tx, Collection::MatchSets, json!({})).await;
        let keep = saved(&mut tx, Collection::MatchSets, json!({})).await;
        let old = saved(&mut tx, Collection::MatchData, json!({ "sets": [s1.id] })).await;
        let mut updated = old.clone();
        updated.set_ids(Field::Sets, Vec::<String>::new());

        handle_after_updated_match(&mut tx, &old, &updated).await.unwrap();
        assert!(tx.find_by_id(Collection::MatchSets, &s1.id).await.unwrap().is_none());
        assert!(tx.find_by_id(Collection::MatchSets, &keep.id).await.unwrap().is_some());

        // Unchanged sets leave everything alone
        handle_after_updated_match(&mut tx, &old, &old).await.unwrap();
        assert_eq!(tx.count(Collection::MatchSets).await.unwrap(), 1);
    }
}
