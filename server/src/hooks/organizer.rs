//! The single tournament organizer account.

use tournament::Collection;

use crate::error::HookError;
use crate::persistence::{PersistenceError, StoreTx};

pub async fn organizer_exists(tx: &mut StoreTx) -> Result<bool, PersistenceError> {
    Ok(tx.count(Collection::TournamentOrganizer).await? > 0)
}

/// Refuse to create a second organizer account.
pub async fn handle_before_organizer_create(tx: &mut StoreTx) -> Result<(), HookError> {
    if organizer_exists(tx).await? {
        tracing::warn!("Refused second organizer sign up");
        return Err(HookError::validation(
            "cannot sign up more than one organizer",
        ));
    }
    Ok(())
}
