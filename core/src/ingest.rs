//! Ingestion boundary — transaction log in, read-only event table out.
//!
//! RULE: The event table is built once and never mutated afterwards.
//! Workers receive it behind an `Arc` and only read from it.

use crate::{
    config::{AggConfig, EntityKey},
    error::{AggError, AggResult},
    event::Event,
    types::{EntityId, Step},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// The columns of a PaySim-style transaction log that feed the event
/// table. Other columns (`type`, `amount`, fraud labels) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    pub step: Step,
    #[serde(rename = "nameOrig")]
    pub name_orig: String,
    #[serde(rename = "oldbalanceOrg")]
    pub old_balance_orig: Option<f64>,
    #[serde(rename = "newbalanceOrig")]
    pub new_balance_orig: Option<f64>,
    #[serde(rename = "nameDest")]
    pub name_dest: String,
    #[serde(rename = "oldbalanceDest")]
    pub old_balance_dest: Option<f64>,
    #[serde(rename = "newbalanceDest")]
    pub new_balance_dest: Option<f64>,
}

impl RawTransaction {
    pub fn entity(&self, key: EntityKey) -> &str {
        match key {
            EntityKey::Dest => &self.name_dest,
            EntityKey::Orig => &self.name_orig,
        }
    }

    pub fn to_event(&self) -> Event {
        Event::from_balances(
            self.step,
            self.old_balance_orig,
            self.new_balance_orig,
            self.old_balance_dest,
            self.new_balance_dest,
        )
    }
}

/// Read every row of a CSV transaction log. Blank numeric cells become `None`.
pub fn load_transactions<P: AsRef<Path>>(path: P) -> AggResult<Vec<RawTransaction>> {
    let file = std::fs::File::open(path.as_ref())?;
    read_transactions(file)
}

pub fn read_transactions<R: std::io::Read>(reader: R) -> AggResult<Vec<RawTransaction>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for record in csv_reader.deserialize() {
        let row: RawTransaction = record?;
        rows.push(row);
    }
    log::info!("Loaded {} transactions", rows.len());
    Ok(rows)
}

/// Grouped-vs-degenerate population of an event table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Population {
    pub grouped:    usize,
    pub degenerate: usize,
}

impl Population {
    pub fn total(&self) -> usize {
        self.grouped + self.degenerate
    }
}

/// All events, grouped per entity and ordered by step.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    groups: HashMap<EntityId, Vec<Event>>,
    order:  Vec<EntityId>,
}

impl EventTable {
    /// Group transactions by entity. Each group is stable-sorted by step,
    /// so same-step events keep their log order. Entity ids are listed in
    /// order of first appearance.
    pub fn from_transactions(txns: &[RawTransaction], config: &AggConfig) -> Self {
        let mut table = EventTable::default();
        for txn in txns {
            table.push(txn.entity(config.entity_key), txn.to_event());
        }
        table.finish(config.include_degenerate);
        table
    }

    /// Build directly from per-entity events. Used when events do not come
    /// from a transaction log.
    pub fn from_events<I, S>(events: I, config: &AggConfig) -> Self
    where
        I: IntoIterator<Item = (S, Event)>,
        S: AsRef<str>,
    {
        let mut table = EventTable::default();
        for (entity, event) in events {
            table.push(entity.as_ref(), event);
        }
        table.finish(config.include_degenerate);
        table
    }

    fn push(&mut self, entity: &str, event: Event) {
        match self.groups.get_mut(entity) {
            Some(group) => group.push(event),
            None => {
                self.order.push(entity.to_string());
                self.groups.insert(entity.to_string(), vec![event]);
            }
        }
    }

    fn finish(&mut self, include_degenerate: bool) {
        for group in self.groups.values_mut() {
            group.sort_by_key(|e| e.step);
        }
        if !include_degenerate {
            self.groups.retain(|_, g| g.len() > 1);
            let groups = &self.groups;
            self.order.retain(|id| groups.contains_key(id));
        }
    }

    /// Entity ids in first-appearance order.
    pub fn entity_ids(&self) -> &[EntityId] {
        &self.order
    }

    pub fn events(&self, entity: &str) -> Option<&[Event]> {
        self.groups.get(entity).map(|g| g.as_slice())
    }

    pub fn is_degenerate(&self, entity: &str) -> bool {
        self.groups
            .get(entity)
            .map(|g| g.len() == 1)
            .unwrap_or(false)
    }

    pub fn population(&self) -> Population {
        let degenerate = self
            .groups
            .values()
            .filter(|g| g.len() == 1)
            .count();
        Population {
            grouped: self.groups.len() - degenerate,
            degenerate,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn require(&self, entity: &str) -> AggResult<&[Event]> {
        self.events(entity).ok_or_else(|| AggError::UnknownEntity {
            entity: entity.to_string(),
        })
    }
}
