//! The aggregation engine — one resumable pipeline run.
//!
//! EXECUTION ORDER (fixed):
//!   1. Read checkpoint keys from the store
//!   2. Plan: table entities minus checkpointed entities
//!   3. Let the store prepare for the pending set
//!   4. Execute: aggregate in parallel, persist each success as it lands
//!
//! RULES:
//!   - The event table is loaded once and shared read-only.
//!   - The store is the only mutable shared resource.
//!   - A run can be stopped at any point; the next run resumes from
//!     whatever the store committed.

use crate::{
    aggregator::EntityAggregate,
    config::AggConfig,
    error::AggResult,
    executor::{Executor, RunReport},
    ingest::EventTable,
    planner::{self, PlanSummary},
    store::CheckpointStore,
    types::EntityId,
};
use std::collections::HashSet;
use std::sync::Arc;

pub struct AggregationEngine {
    pub config: AggConfig,
    table:      Arc<EventTable>,
    executor:   Executor,
}

impl AggregationEngine {
    /// Validate the config and build the worker pool. Pool creation is the
    /// only fatal failure and happens before any work is planned.
    pub fn new(config: AggConfig, table: EventTable) -> AggResult<Self> {
        config.validate()?;
        let executor = Executor::new(config.parallelism, &config.window_sizes)?;
        Ok(Self {
            config,
            table: Arc::new(table),
            executor,
        })
    }

    pub fn table(&self) -> &EventTable {
        &self.table
    }

    /// Plan against the store's current contents without running anything.
    pub fn plan(&self, store: &dyn CheckpointStore) -> AggResult<(Vec<EntityId>, PlanSummary)> {
        let keys = store.keys()?;
        let pending = planner::plan(self.table.entity_ids(), &keys);
        let summary = planner::summarize(&self.table, &keys, &pending);
        Ok((pending, summary))
    }

    /// Run the whole pipeline once.
    pub fn run(&self, store: &mut dyn CheckpointStore) -> AggResult<RunReport> {
        let run_id = format!("agg-{}", uuid::Uuid::new_v4());
        let (pending, summary) = self.plan(store)?;

        log::info!(
            "[{run_id}] Total entities: {}, degenerate: {}, to process: {}, already processed: {}",
            summary.total,
            summary.degenerate,
            summary.pending,
            summary.already_processed,
        );

        store.prepare(&pending)?;
        let report = self
            .executor
            .execute(run_id, Arc::clone(&self.table), &pending, store);

        log::info!(
            "[{}] Run finished on {} store with {} workers: {} persisted, {} compute failures, {} persistence failures in {} ms",
            report.run_id,
            store.name(),
            self.executor.parallelism(),
            report.persisted,
            report.compute_failures.len(),
            report.persist_failures.len(),
            (report.finished_at - report.started_at).num_milliseconds(),
        );
        Ok(report)
    }

    /// Stored result for one entity, if it has been computed.
    pub fn get(&self, store: &dyn CheckpointStore, entity: &str) -> AggResult<Option<EntityAggregate>> {
        store.get(entity)
    }

    pub fn keys(&self, store: &dyn CheckpointStore) -> AggResult<HashSet<EntityId>> {
        store.keys()
    }
}
