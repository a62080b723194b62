//! Reacting to categorization changes on the tournament.
//!
//! The tournament's `useAgeGroups` / `usePlayingLevels` flags decide which
//! category fields competitions carry. Switching a categorization on puts
//! every competition into some category of it. Switching it off clears the
//! field and merges the competitions that became indistinguishable. Deleting a
//! category either deletes its competitions or merges them into a replacement
//! category.

use tournament::{
    group_competitions, merge_registrations, merge_target, Categorization, Collection, Field,
    Record,
};

use super::registrations::delete_competition_and_teams;
use super::relations::fetch_and_expand_collection;
use crate::error::HookError;
use crate::persistence::{PersistenceError, StoreTx};

/// Apply a tournament settings update. Switched off categorizations are
/// handled before switched on ones.
pub async fn on_tournament_settings_update(
    tx: &mut StoreTx,
    old: &Record,
    updated: &Record,
) -> Result<(), HookError> {
    let mut disabled = Vec::new();
    let mut enabled = Vec::new();
    for categorization in Categorization::ALL {
        let was = old.get_bool(categorization.option());
        let is = updated.get_bool(categorization.option());
        match (was, is) {
            (true, false) => disabled.push(categorization),
            (false, true) => enabled.push(categorization),
            _ => {}
        }
    }

    handle_disabled_categorizations(tx, &disabled).await?;
    handle_enabled_categorizations(tx, &enabled).await
}

/// Put every competition into the first category of each enabled categorization.
pub async fn handle_enabled_categorizations(
    tx: &mut StoreTx,
    enabled: &[Categorization],
) -> Result<(), HookError> {
    if enabled.is_empty() {
        return Ok(());
    }
    let mut competitions = tx.find_all(Collection::Competitions).await?;
    if competitions.is_empty() {
        return Ok(());
    }

    for &categorization in enabled {
        let Some(category) = tx.find_first(categorization.collection()).await? else {
            return Err(HookError::integrity(format!(
                "there is no category to add: {categorization} is empty"
            )));
        };
        for competition in competitions.iter_mut() {
            competition.set(categorization.field(), category.id.clone());
        }
        tracing::info!(
            %categorization,
            category = %category.id,
            competitions = competitions.len(),
            "Categorization enabled"
        );
    }

    for competition in competitions.iter_mut() {
        tx.save(competition).await?;
    }
    Ok(())
}

/// Clear the disabled category fields and merge the competitions that now
/// share a group.
pub async fn handle_disabled_categorizations(
    tx: &mut StoreTx,
    disabled: &[Categorization],
) -> Result<(), HookError> {
    if disabled.is_empty() {
        return Ok(());
    }
    let remaining = Categorization::ALL
        .into_iter()
        .find(|c| !disabled.contains(c));

    let competitions = fetch_and_expand_collection(tx, Collection::Competitions).await?;
    let mut groups = group_competitions(competitions, remaining);

    for competition in groups.iter_mut().flatten() {
        for categorization in disabled {
            competition.clear(categorization.field());
        }
        tx.save(competition).await?;
    }

    for group in groups.iter_mut().filter(|g| g.len() > 1) {
        let target = merge_target(group);
        merge_competition_group(tx, group, target).await?;
    }

    tracing::info!(?disabled, ?remaining, groups = groups.len(), "Categorization disabled");
    Ok(())
}

/// Collapse `group` into `group[target]`.
///
/// The members need expanded registrations. Rejected teams are deleted, new
/// single-player teams are created, and every other member competition is
/// deleted.
pub async fn merge_competition_group(
    tx: &mut StoreTx,
    group: &mut [Record],
    target: usize,
) -> Result<(), PersistenceError> {
    let mut merge = merge_registrations(group, target);

    for team in merge.created.iter_mut() {
        tx.save(team).await?;
    }
    for team in &merge.deleted {
        tx.delete(team).await?;
    }

    // Reload the target: the deletions above rewrote its relation lists
    let registrations = merge.registration_ids();
    let mut survivor = tx.get(Collection::Competitions, &group[target].id).await?;
    for categorization in Categorization::ALL {
        let field = categorization.field();
        survivor.set(field, group[target].get_str(field).to_string());
    }
    survivor.set_ids(Field::Registrations, registrations.iter().cloned());
    for field in [Field::Draw, Field::Seeds] {
        let kept: Vec<String> = survivor
            .get_string_list(field)
            .into_iter()
            .filter(|id| registrations.contains(id))
            .collect();
        survivor.set_ids(field, kept);
    }
    tx.save(&mut survivor).await?;

    for (i, competition) in group.iter().enumerate() {
        if i != target {
            tx.delete(competition).await?;
        }
    }

    tracing::info!(
        target = %survivor.id,
        merged = group.len() - 1,
        adopted = merge.adopted.len(),
        created = merge.created.len(),
        deleted = merge.deleted.len(),
        "Merged competition group"
    );
    group[target] = survivor;
    Ok(())
}

/// Handle the deletion of an age group or playing level.
///
/// With a `replacement_id` the competitions of the deleted category move to
/// the replacement, merging with its competitions of the same discipline.
/// Without one they are deleted along with their teams. Deleting the last
/// category switches its categorization off instead.
pub async fn handle_deleted_category(
    tx: &mut StoreTx,
    deleted: &Record,
    replacement_id: Option<&str>,
) -> Result<(), HookError> {
    let Some(categorization) = Categorization::of_collection(deleted.collection) else {
        return Ok(());
    };

    let mut tournament = tx
        .find_first(Collection::Tournaments)
        .await?
        .ok_or_else(|| PersistenceError::NotFound {
            collection: Collection::Tournaments,
            id: String::new(),
        })?;
    if !tournament.get_bool(categorization.option()) {
        return Ok(());
    }
    let competitions = fetch_and_expand_collection(tx, Collection::Competitions).await?;
    if competitions.is_empty() {
        return Ok(());
    }

    if tx.count(categorization.collection()).await? <= 1 {
        tournament.set(categorization.option(), false);
        tx.save(&mut tournament).await?;
        tracing::info!(%categorization, "Last category deleted, categorization disabled");
        return Ok(());
    }

    let field = categorization.field();
    let (of_deleted, rest): (Vec<Record>, Vec<Record>) = competitions
        .into_iter()
        .partition(|c| c.get_id(field) == Some(deleted.id.as_str()));

    let Some(replacement_id) = replacement_id.filter(|id| !id.is_empty()) else {
        for competition in &of_deleted {
            delete_competition_and_teams(tx, competition).await?;
        }
        tracing::info!(
            category = %deleted.id,
            competitions = of_deleted.len(),
            "Deleted competitions of category"
        );
        return Ok(());
    };

    if replacement_id == deleted.id {
        return Err(HookError::integrity(
            "a category cannot be replaced by itself",
        ));
    }
    let Some(replacement) = tx
        .find_by_id(categorization.collection(), replacement_id)
        .await?
    else {
        return Err(HookError::integrity(format!(
            "the replacement category {replacement_id} does not exist"
        )));
    };

    let pool: Vec<Record> = rest
        .into_iter()
        .filter(|c| c.get_id(field) == Some(replacement.id.as_str()))
        .chain(of_deleted)
        .collect();
    let groups = group_competitions(pool, Some(categorization.other()));
    for group in groups {
        merge_into_replacement(tx, group, field, &replacement.id).await?;
    }

    tracing::info!(
        %categorization,
        category = %deleted.id,
        replacement = %replacement.id,
        "Category replaced"
    );
    Ok(())
}

async fn merge_into_replacement(
    tx: &mut StoreTx,
    mut group: Vec<Record>,
    field: Field,
    replacement_id: &str,
) -> Result<(), PersistenceError> {
    match group.len() {
        0 => Ok(()),
        1 => {
            let competition = &mut group[0];
            competition.set(field, replacement_id);
            tx.save(competition).await
        }
        _ => {
            let target = merge_target(&group);
            group[target].set(field, replacement_id);
            merge_competition_group(tx, &mut group, target).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::model_hooks;
    use crate::persistence::Database;
    use serde_json::{json, Value};

    fn record(collection: Collection, data: Value) -> Record {
        let Value::Object(map) = data else {
            panic!("expected object");
        };
        Record::with_data(collection, map)
    }

    async fn saved(tx: &mut StoreTx, collection: Collection, data: Value) -> Record {
        let mut r = record(collection, data);
        tx.save(&mut r).await.unwrap();
        r
    }

    async fn db() -> Database {
        Database::new_in_memory(model_hooks()).await.unwrap()
    }

    async fn tournament(tx: &mut StoreTx) -> Record {
        tx.find_first(Collection::Tournaments).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_enable_without_competitions_is_noop() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        handle_enabled_categorizations(&mut tx, &[Categorization::AgeGroups])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_enable_without_categories_fails() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        saved(&mut tx, Collection::Competitions, json!({ "teamSize": 1 })).await;
        let err = handle_enabled_categorizations(&mut tx, &[Categorization::PlayingLevels])
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_enable_assigns_first_category() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let first = saved(&mut tx, Collection::AgeGroups, json!({ "name": "U13" })).await;
        saved(&mut tx, Collection::AgeGroups, json!({ "name": "U15" })).await;
        let c1 = saved(&mut tx, Collection::Competitions, json!({ "teamSize": 1 })).await;
        let c2 = saved(&mut tx, Collection::Competitions, json!({ "teamSize": 2 })).await;

        let old = tournament(&mut tx).await;
        let mut updated = old.clone();
        updated.set(Field::UseAgeGroups, true);
        on_tournament_settings_update(&mut tx, &old, &updated)
            .await
            .unwrap();

        for id in [&c1.id, &c2.id] {
            let c = tx.get(Collection::Competitions, id).await.unwrap();
            assert_eq!(c.get_id(Field::AgeGroup), Some(first.id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_disable_clears_and_merges() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let u13 = saved(&mut tx, Collection::AgeGroups, json!({})).await;
        let u15 = saved(&mut tx, Collection::AgeGroups, json!({})).await;
        let p1 = saved(&mut tx, Collection::Players, json!({})).await;
        let p2 = saved(&mut tx, Collection::Players, json!({})).await;
        let t1 = saved(&mut tx, Collection::Teams, json!({ "players": [p1.id] })).await;
        let t2 = saved(&mut tx, Collection::Teams, json!({ "players": [p2.id] })).await;
        let a = saved(
            &mut tx,
            Collection::Competitions,
            json!({ "teamSize": 1, "genderCategory": "any", "ageGroup": u13.id, "registrations": [t1.id] }),
        )
        .await;
        let b = saved(
            &mut tx,
            Collection::Competitions,
            json!({ "teamSize": 1, "genderCategory": "any", "ageGroup": u15.id, "registrations": [t2.id] }),
        )
        .await;
        let doubles = saved(
            &mut tx,
            Collection::Competitions,
            json!({ "teamSize": 2, "genderCategory": "any", "ageGroup": u15.id }),
        )
        .await;

        handle_disabled_categorizations(&mut tx, &[Categorization::AgeGroups])
            .await
            .unwrap();

        let remaining = tx.find_all(Collection::Competitions).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|c| c.get_id(Field::AgeGroup).is_none()));
        assert!(remaining.iter().any(|c| c.id == doubles.id));

        let merged = remaining.iter().find(|c| c.id != doubles.id).unwrap();
        assert!(merged.id == a.id || merged.id == b.id);
        let mut registrations = merged.get_string_list(Field::Registrations);
        registrations.sort();
        let mut expected = vec![t1.id.clone(), t2.id.clone()];
        expected.sort();
        assert_eq!(registrations, expected);
    }

    #[tokio::test]
    async fn test_merge_prunes_draw() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let p1 = saved(&mut tx, Collection::Players, json!({})).await;
        let p2 = saved(&mut tx, Collection::Players, json!({})).await;
        let t1 = saved(&mut tx, Collection::Teams, json!({ "players": [p1.id, p2.id] })).await;
        let t2 = saved(&mut tx, Collection::Teams, json!({ "players": [p2.id] })).await;
        let target = saved(
            &mut tx,
            Collection::Competitions,
            json!({ "registrations": [t2.id], "draw": [t2.id] }),
        )
        .await;
        let other = saved(
            &mut tx,
            Collection::Competitions,
            json!({ "registrations": [t1.id], "draw": [t1.id] }),
        )
        .await;

        let mut group = vec![target.clone(), other.clone()];
        crate::hooks::relations::expand_all_relations(&mut tx, &mut group)
            .await
            .unwrap();
        // Target is not the first member
        group.swap(0, 1);
        merge_competition_group(&mut tx, &mut group, 1).await.unwrap();

        assert!(tx
            .find_by_id(Collection::Competitions, &other.id)
            .await
            .unwrap()
            .is_none());
        let survivor = tx.get(Collection::Competitions, &target.id).await.unwrap();
        // t2 (target first) is adopted; t1 shares p2, so p1 gets a new team
        let registrations = survivor.get_string_list(Field::Registrations);
        assert_eq!(registrations.len(), 2);
        assert_eq!(registrations[0], t2.id);
        assert_eq!(survivor.get_string_list(Field::Draw), vec![t2.id.clone()]);
        assert!(tx.find_by_id(Collection::Teams, &t1.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deleted_category_without_replacement_deletes_competitions() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let mut t = tournament(&mut tx).await;
        t.set(Field::UsePlayingLevels, true);
        tx.save(&mut t).await.unwrap();
        let beginner = saved(&mut tx, Collection::PlayingLevels, json!({})).await;
        let pro = saved(&mut tx, Collection::PlayingLevels, json!({})).await;
        let team = saved(&mut tx, Collection::Teams, json!({ "players": ["p"] })).await;
        let doomed = saved(
            &mut tx,
            Collection::Competitions,
            json!({ "playingLevel": beginner.id, "registrations": [team.id] }),
        )
        .await;
        let kept = saved(&mut tx, Collection::Competitions, json!({ "playingLevel": pro.id })).await;

        handle_deleted_category(&mut tx, &beginner, None).await.unwrap();

        assert!(tx
            .find_by_id(Collection::Competitions, &doomed.id)
            .await
            .unwrap()
            .is_none());
        assert!(tx.find_by_id(Collection::Teams, &team.id).await.unwrap().is_none());
        assert!(tx
            .find_by_id(Collection::Competitions, &kept.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_deleted_category_with_replacement() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let mut t = tournament(&mut tx).await;
        t.set(Field::UseAgeGroups, true);
        tx.save(&mut t).await.unwrap();
        let u13 = saved(&mut tx, Collection::AgeGroups, json!({})).await;
        let u15 = saved(&mut tx, Collection::AgeGroups, json!({})).await;
        let p1 = saved(&mut tx, Collection::Players, json!({})).await;
        let p2 = saved(&mut tx, Collection::Players, json!({})).await;
        let t1 = saved(&mut tx, Collection::Teams, json!({ "players": [p1.id] })).await;
        let t2 = saved(&mut tx, Collection::Teams, json!({ "players": [p2.id] })).await;
        let singles13 = saved(
            &mut tx,
            Collection::Competitions,
            json!({ "teamSize": 1, "genderCategory": "male", "ageGroup": u13.id, "registrations": [t1.id] }),
        )
        .await;
        let singles15 = saved(
            &mut tx,
            Collection::Competitions,
            json!({ "teamSize": 1, "genderCategory": "male", "ageGroup": u15.id, "registrations": [t2.id] }),
        )
        .await;
        let doubles13 = saved(
            &mut tx,
            Collection::Competitions,
            json!({ "teamSize": 2, "genderCategory": "male", "ageGroup": u13.id }),
        )
        .await;

        handle_deleted_category(&mut tx, &u13, Some(&u15.id))
            .await
            .unwrap();

        let all = tx.find_all(Collection::Competitions).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all
            .iter()
            .all(|c| c.get_id(Field::AgeGroup) == Some(u15.id.as_str())));
        let doubles = tx.get(Collection::Competitions, &doubles13.id).await.unwrap();
        assert_eq!(doubles.get_id(Field::AgeGroup), Some(u15.id.as_str()));
        let singles = all.iter().find(|c| c.id != doubles13.id).unwrap();
        assert!(singles.id == singles13.id || singles.id == singles15.id);
        assert_eq!(singles.get_string_list(Field::Registrations).len(), 2);
    }

    #[tokio::test]
    async fn test_deleted_category_rejects_bad_replacement() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let mut t = tournament(&mut tx).await;
        t.set(Field::UseAgeGroups, true);
        tx.save(&mut t).await.unwrap();
        let u13 = saved(&mut tx, Collection::AgeGroups, json!({})).await;
        saved(&mut tx, Collection::AgeGroups, json!({})).await;
        saved(&mut tx, Collection::Competitions, json!({ "ageGroup": u13.id })).await;

        let err = handle_deleted_category(&mut tx, &u13, Some("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Integrity(_)));
        let err = handle_deleted_category(&mut tx, &u13, Some(&u13.id))
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_deleted_category_when_unused_is_noop() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let u13 = saved(&mut tx, Collection::AgeGroups, json!({})).await;
        let c = saved(&mut tx, Collection::Competitions, json!({ "ageGroup": u13.id })).await;
        handle_deleted_category(&mut tx, &u13, None).await.unwrap();
        assert!(tx
            .find_by_id(Collection::Competitions, &c.id)
            .await
            .unwrap()
            .is_some());
    }
}
