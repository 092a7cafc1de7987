//! Per-entity rolling-window feature aggregation with resumable,
//! checkpointed parallel execution.

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod executor;
pub mod ingest;
pub mod planner;
pub mod stats;
pub mod store;
pub mod types;
