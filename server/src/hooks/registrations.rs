//! Keeps competition registrations consistent as teams and competitions change.

use futures::future::BoxFuture;

use tournament::{find_double_registrations, Collection, Field, Record};

use super::relations::{cascade_relation_update, expand_field, find_reverse_multi_relations};
use crate::error::HookError;
use crate::persistence::{AfterUpdateHook, PersistenceError, StoreTx};

/// Register a freshly created team for `competition_id`.
///
/// Teams of that competition sharing a player with the new team are deleted
/// first: the latest registration wins.
pub async fn handle_created_team(
    tx: &mut StoreTx,
    team: &Record,
    competition_id: &str,
) -> Result<(), HookError> {
    let mut competition = tx.get(Collection::Competitions, competition_id).await?;
    delete_double_registrations(tx, team, &mut competition).await?;

    let mut registrations = competition.get_string_list(Field::Registrations);
    if !registrations.contains(&team.id) {
        registrations.push(team.id.clone());
    }
    competition.set_ids(Field::Registrations, registrations);
    tx.save(&mut competition).await?;

    tracing::info!(team = %team.id, competition = %competition.id, "Team registered");
    Ok(())
}

/// Checks run before a team update is written.
///
/// Double registrations created by the new player list are deleted, and a
/// team whose size no longer fits its competition is taken out of the draw.
pub async fn handle_updated_team(tx: &mut StoreTx, updated: &Record) -> Result<(), HookError> {
    let players = updated.get_string_list(Field::TeamPlayers);
    // Empty teams are deleted after the update
    if players.is_empty() {
        return Ok(());
    }

    let Some(mut competition) = find_reverse_multi_relations(tx, Field::Registrations, &updated.id)
        .await?
        .into_iter()
        .next()
    else {
        return Ok(());
    };

    delete_double_registrations(tx, updated, &mut competition).await?;

    if players.len() as i64 != competition.get_int(Field::TeamSize) {
        competition.remove_relation_id(Field::Draw, &updated.id);
        tx.save(&mut competition).await?;
        tracing::debug!(team = %updated.id, competition = %competition.id, "Team removed from draw");
    }
    Ok(())
}

/// Delete the teams of `competition` that share a player with `team`.
///
/// `competition` is reloaded afterwards, since the deletions rewrite its
/// registration list in storage.
async fn delete_double_registrations(
    tx: &mut StoreTx,
    team: &Record,
    competition: &mut Record,
) -> Result<(), PersistenceError> {
    let mut expanded = [competition.clone()];
    expand_field(tx, &mut expanded, Field::Registrations).await?;
    let doubles: Vec<Record> =
        find_double_registrations(expanded[0].expanded_all(Field::Registrations), team)
            .into_iter()
            .cloned()
            .collect();
    if doubles.is_empty() {
        return Ok(());
    }

    for double in &doubles {
        tracing::info!(
            team = %double.id,
            competition = %competition.id,
            "Deleting double registration"
        );
        tx.delete(double).await?;
    }
    *competition = tx.get(Collection::Competitions, &competition.id).await?;
    Ok(())
}

/// Delete every team registered for `competition`.
pub async fn handle_deleted_competition(
    tx: &mut StoreTx,
    competition: &Record,
) -> Result<(), HookError> {
    let mut expanded = [competition.clone()];
    expand_field(tx, &mut expanded, Field::Registrations).await?;
    let teams = expanded[0].expanded_all(Field::Registrations);
    for team in teams {
        tx.delete(team).await?;
    }
    tracing::debug!(competition = %competition.id, teams = teams.len(), "Deleted registered teams");
    Ok(())
}

/// Delete the registered teams of `competition`, then the competition itself.
pub async fn delete_competition_and_teams(
    tx: &mut StoreTx,
    competition: &Record,
) -> Result<(), HookError> {
    handle_deleted_competition(tx, competition).await?;
    tx.delete(competition).await?;
    tracing::info!(competition = %competition.id, "Competition deleted");
    Ok(())
}

/// Model hook on team updates: a team without players is deleted, any other
/// update is passed on to the competition it is registered for.
pub struct TeamUpdateHook;

impl AfterUpdateHook for TeamUpdateHook {
    fn name(&self) -> String {
        "team update".to_string()
    }

    fn run<'a>(
        &'a self,
        tx: &'a mut StoreTx,
        team: &'a Record,
    ) -> BoxFuture<'a, Result<(), PersistenceError>> {
        Box::pin(async move {
            if team.get_string_list(Field::TeamPlayers).is_empty() {
                tracing::info!(team = %team.id, "Deleting team without players");
                return tx.delete(team).await;
            }
            let competitions =
                find_reverse_multi_relations(tx, Field::Registrations, &team.id).await?;
            cascade_relation_update(tx, competitions).await
        })
    }
}
