//! Checkpoint persistence.
//!
//! RULES:
//!   - Only the store modules talk to the database.
//!   - The unit of idempotence is one entity: an entity is either fully
//!     stored or absent. No write spans more than one entity.
//!   - Stored entries are never edited in place; re-processing an entity
//!     replaces (blob) or ignores (wide) its rows.

mod blob;
mod wide;

pub use blob::BlobStore;
pub use wide::WideStore;

use crate::{aggregator::EntityAggregate, error::AggResult, types::EntityId};
use rusqlite::{Connection, OpenFlags};
use std::collections::HashSet;

/// Durable entity → result mapping used for resumable runs.
pub trait CheckpointStore {
    /// Short stable name, used in logs.
    fn name(&self) -> &'static str;

    /// Called once per run with the entities about to be processed.
    fn prepare(&mut self, _pending: &[EntityId]) -> AggResult<()> {
        Ok(())
    }

    fn contains(&self, entity: &str) -> AggResult<bool>;

    /// Atomically store one entity's result.
    fn upsert(&mut self, aggregate: &EntityAggregate) -> AggResult<()>;

    fn get(&self, entity: &str) -> AggResult<Option<EntityAggregate>>;

    /// Every entity with a committed result.
    fn keys(&self) -> AggResult<HashSet<EntityId>>;

    fn len(&self) -> AggResult<usize> {
        Ok(self.keys()?.len())
    }

    fn is_empty(&self) -> AggResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Which checkpoint table layout to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreShape {
    /// One encoded blob per entity.
    Blob,
    /// One wide relational row per event plus a pending-work table.
    Wide,
}

impl std::str::FromStr for StoreShape {
    type Err = crate::error::AggError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" => Ok(Self::Blob),
            "wide" => Ok(Self::Wide),
            other => Err(crate::error::AggError::InvalidConfig(format!(
                "unknown store shape '{other}' (expected blob|wide)"
            ))),
        }
    }
}

pub(crate) fn open_connection(path: &str) -> AggResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI,
    )?;
    // WAL mode only for real files (shared-memory and :memory: ignore it).
    let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}
