use tournament::{Field, Record};

use super::relations::find_reverse_relations;
use crate::error::HookError;
use crate::persistence::StoreTx;

/// Delete the courts of a gymnasium that is about to be deleted.
pub async fn handle_before_gymnasium_delete(
    tx: &mut StoreTx,
    gymnasium: &Record,
) -> Result<(), HookError> {
    let courts = find_reverse_relations(tx, Field::Gymnasium, &gymnasium.id).await?;
    for court in &courts {
        tx.delete(court).await?;
    }
    tracing::info!(gymnasium = %gymnasium.id, courts = courts.len(), "Deleted courts of gymnasium");
    Ok(())
}
