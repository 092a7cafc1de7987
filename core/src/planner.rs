//! Work planner — which entities still need computing.

use crate::{ingest::EventTable, types::EntityId};
use std::collections::HashSet;

/// `all_ids − checkpoint_keys`, keeping the order of `all_ids`.
pub fn plan(all_ids: &[EntityId], checkpoint_keys: &HashSet<EntityId>) -> Vec<EntityId> {
    all_ids
        .iter()
        .filter(|id| !checkpoint_keys.contains(*id))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    /// Entities in the event table.
    pub total:              usize,
    /// Of those, single-event entities.
    pub degenerate:         usize,
    /// Entities already in the checkpoint store.
    pub already_processed:  usize,
    pub pending:            usize,
    /// Pending entities that will take the single-event path.
    pub pending_degenerate: usize,
}

pub fn summarize(table: &EventTable, checkpoint_keys: &HashSet<EntityId>, pending: &[EntityId]) -> PlanSummary {
    PlanSummary {
        total:              table.len(),
        degenerate:         table.population().degenerate,
        already_processed:  table
            .entity_ids()
            .iter()
            .filter(|id| checkpoint_keys.contains(*id))
            .count(),
        pending:            pending.len(),
        pending_degenerate: pending.iter().filter(|id| table.is_degenerate(id)).count(),
    }
}
