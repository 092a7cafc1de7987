//! Parallel executor — one task per pending entity on a fixed pool.
//!
//! RULES:
//!   - Tasks only read the shared event table and return a value.
//!   - The calling thread is the single collector: it drains outcomes in
//!     completion order and owns every checkpoint write.
//!   - A failed entity never aborts its siblings and is never retried in
//!     the same run. It stays un-checkpointed and the next run plans it.
//!   - Only failing to build the pool is fatal, and that happens before
//!     any task is submitted.

use crate::{
    aggregator::{self, EntityAggregate},
    error::{AggError, AggResult},
    ingest::EventTable,
    store::CheckpointStore,
    types::{EntityId, RunId, Step},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};

/// Per-entity lifecycle within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityState {
    Pending,
    /// Set when a worker picks the task up, not at submission.
    Running,
    Persisted,
    /// Terminal for this run only.
    Failed { reason: String },
}

/// What a task sends to the collector.
enum TaskMessage {
    /// The task has been picked up by a worker.
    Started(EntityId),
    Finished {
        entity: EntityId,
        result: AggResult<EntityAggregate>,
    },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id:           RunId,
    pub started_at:       DateTime<Utc>,
    pub finished_at:      DateTime<Utc>,
    pub submitted:        usize,
    pub persisted:        usize,
    /// Aggregation failed; nothing was written.
    pub compute_failures: Vec<(EntityId, String)>,
    /// Aggregation succeeded but the checkpoint write did not commit.
    pub persist_failures: Vec<(EntityId, String)>,
    states:               HashMap<EntityId, EntityState>,
}

impl RunReport {
    fn new(run_id: RunId, pending: &[EntityId]) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            started_at: now,
            finished_at: now,
            submitted: 0,
            persisted: 0,
            compute_failures: Vec::new(),
            persist_failures: Vec::new(),
            states: pending
                .iter()
                .map(|id| (id.clone(), EntityState::Pending))
                .collect(),
        }
    }

    fn transition(&mut self, entity: &str, state: EntityState) {
        if let Some(slot) = self.states.get_mut(entity) {
            *slot = state;
        }
    }

    pub fn failed(&self) -> usize {
        self.compute_failures.len() + self.persist_failures.len()
    }

    /// Final state of an entity planned in this run; `None` if it was not
    /// part of the plan.
    pub fn state_of(&self, entity: &str) -> Option<&EntityState> {
        self.states.get(entity)
    }
}

pub struct Executor {
    pool:         rayon::ThreadPool,
    window_sizes: Vec<Step>,
}

impl Executor {
    /// Build the worker pool. Fails with `WorkerPool` if the threads
    /// cannot be created.
    pub fn new(parallelism: usize, window_sizes: &[Step]) -> AggResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .thread_name(|i| format!("agg-worker-{i}"))
            .build()
            .map_err(|e| AggError::WorkerPool(e.to_string()))?;
        Ok(Self {
            pool,
            window_sizes: window_sizes.to_vec(),
        })
    }

    pub fn parallelism(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Aggregate every entity in `pending` and persist each success as it
    /// arrives. Returns per-entity success and failure counts.
    pub fn execute(
        &self,
        run_id: RunId,
        table: Arc<EventTable>,
        pending: &[EntityId],
        store: &mut dyn CheckpointStore,
    ) -> RunReport {
        let windows = self.window_sizes.clone();
        self.execute_with(run_id, pending, store, move |entity| {
            let events = table.require(entity)?;
            aggregator::aggregate(entity, events, &windows)
        })
    }

    /// Run `task` once per pending entity on the pool. A panic inside
    /// `task` fails that entity only.
    pub fn execute_with<F>(
        &self,
        run_id: RunId,
        pending: &[EntityId],
        store: &mut dyn CheckpointStore,
        task: F,
    ) -> RunReport
    where
        F: Fn(&str) -> AggResult<EntityAggregate> + Send + Sync + 'static,
    {
        let mut report = RunReport::new(run_id, pending);
        let (tx, rx) = mpsc::channel::<TaskMessage>();
        let task = Arc::new(task);

        for entity in pending {
            let tx = tx.clone();
            let task = Arc::clone(&task);
            let task_entity = entity.clone();
            self.pool.spawn(move || {
                // The collector only hangs up once every sender is gone.
                let _ = tx.send(TaskMessage::Started(task_entity.clone()));
                let result = run_task(task.as_ref(), &task_entity);
                let _ = tx.send(TaskMessage::Finished { entity: task_entity, result });
            });
            report.submitted += 1;
        }
        drop(tx);

        for message in rx {
            match message {
                TaskMessage::Started(entity) => report.transition(&entity, EntityState::Running),
                TaskMessage::Finished { entity, result } => collect(&mut report, store, entity, result),
            }
        }

        report.finished_at = Utc::now();
        report
    }
}

fn run_task<F>(task: &F, entity: &str) -> AggResult<EntityAggregate>
where
    F: Fn(&str) -> AggResult<EntityAggregate>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| task(entity))) {
        Ok(result) => result,
        Err(payload) => Err(AggError::TaskPanicked {
            entity:  entity.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn collect(
    report: &mut RunReport,
    store: &mut dyn CheckpointStore,
    entity: EntityId,
    result: AggResult<EntityAggregate>,
) {
    let aggregate = match result {
        Ok(a) => a,
        Err(e) => {
            log::warn!("Aggregation failed for {entity}: {e}");
            report.transition(&entity, EntityState::Failed { reason: e.to_string() });
            report.compute_failures.push((entity, e.to_string()));
            return;
        }
    };
    match store.upsert(&aggregate) {
        Ok(()) => {
            log::debug!("Completed processing for {entity} ({} rows)", aggregate.rows.len());
            report.persisted += 1;
            report.transition(&entity, EntityState::Persisted);
        }
        Err(e) => {
            log::error!("Checkpoint write failed for {entity}: {e}");
            report.transition(&entity, EntityState::Failed { reason: e.to_string() });
            report.persist_failures.push((entity, e.to_string()));
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
