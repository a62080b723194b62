//! Domain rules attached to record writes.
//!
//! Two tiers:
//! - model hooks ([`model_hooks`]) run inside [`StoreTx::save`] for every
//!   update, whoever does it: relation cascades and the team update hook;
//! - request hooks (`before_*` / `after_*` below) run around the writes that
//!   arrive through the record service, on the request's transaction.

pub mod categorization;
pub mod courts;
pub mod matches;
pub mod organizer;
pub mod registrations;
pub mod relations;


use tournament::{cascading_relations, Collection, Record};

use crate::error::HookError;
use crate::persistence::{ModelHooks, StoreTx};
use registrations::TeamUpdateHook;
use relations::RelationCascade;

/// Query parameters some request hooks take.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    /// Competition a created team registers for.
    pub competition: Option<String>,
    /// Category replacing a deleted one.
    pub replacement: Option<String>,
}

/// Build the model hook table: one cascade per relation plus the team hook.
pub fn model_hooks() -> ModelHooks {
    let mut hooks = ModelHooks::new();
    for relation in cascading_relations() {
        hooks.on_after_update(relation.target, RelationCascade::new(relation));
    }
    hooks.on_after_update(Collection::Teams, TeamUpdateHook);
    hooks
}

pub async fn before_create(tx: &mut StoreTx, record: &Record) -> Result<(), HookError> {
    match record.collection {
        Collection::TournamentOrganizer => organizer::handle_before_organizer_create(tx).await,
        _ => Ok(()),
    }
}

pub async fn after_create(
    tx: &mut StoreTx,
    record: &Record,
    params: &RequestParams,
) -> Result<(), HookError> {
    match record.collection {
        Collection::Teams => {
            match params.competition.as_deref().filter(|id| !id.is_empty()) {
                Some(competition_id) => {
                    registrations::handle_created_team(tx, record, competition_id).await
                }
                None => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

pub async fn before_update(
    tx: &mut StoreTx,
    old: &Record,
    updated: &Record,
) -> Result<(), HookError> {
    match updated.collection {
        Collection::Tournaments => {
            categorization::on_tournament_settings_update(tx, old, updated).await
        }
        Collection::Teams => registrations::handle_updated_team(tx, updated).await,
        _ => Ok(()),
    }
}

pub async fn after_update(
    tx: &mut StoreTx,
    old: &Record,
    updated: &Record,
) -> Result<(), HookError> {
    match updated.collection {
        Collection::Competitions => {
            matches::handle_after_competition_updated(tx, old, updated).await
        }
        Collection::MatchData => matches::handle_after_updated_match(tx, old, updated).await,
        _ => Ok(()),
    }
}

pub async fn before_delete(
    tx: &mut StoreTx,
    record: &Record,
    params: &RequestParams,
) -> Result<(), HookError> {
    match record.collection {
        Collection::AgeGroups | Collection::PlayingLevels => {
            categorization::handle_deleted_category(tx, record, params.replacement.as_deref())
                .await
        }
        Collection::Competitions => registrations::handle_deleted_competition(tx, record).await,
        Collection::Gymnasiums => courts::handle_before_gymnasium_delete(tx, record).await,
        _ => Ok(()),
    }
}
