//! Shared primitive types used across the aggregation engine.

/// Integer time index of an event. One step = one hour in the source log.
pub type Step = i64;

/// The grouping key whose history is aggregated (an account name).
pub type EntityId = String;

/// Identifier attached to one pipeline invocation, used in logs and reports.
pub type RunId = String;
