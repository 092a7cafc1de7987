//! Key/value checkpoint table: `results(entity_id TEXT PRIMARY KEY, data BLOB)`.
//!
//! Blobs are bincode-encoded `EntityAggregate`s, so NaN, ±Inf and `None`
//! read back exactly as written.

use super::{open_connection, CheckpointStore};
use crate::{aggregator::EntityAggregate, error::AggResult, types::EntityId};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;

pub struct BlobStore {
    conn: Connection,
}

impl BlobStore {
    pub fn open(path: &str) -> AggResult<Self> {
        Ok(Self { conn: open_connection(path)? })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AggResult<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn migrate(&self) -> AggResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS results (
                entity_id TEXT PRIMARY KEY,
                data      BLOB NOT NULL
            );",
        )?;
        Ok(())
    }

    /// The stored bytes for `entity`, exactly as committed.
    pub fn raw(&self, entity: &str) -> AggResult<Option<Vec<u8>>> {
        let data = self
            .conn
            .query_row(
                "SELECT data FROM results WHERE entity_id = ?1",
                params![entity],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }
}

fn encode(aggregate: &EntityAggregate) -> AggResult<Vec<u8>> {
    Ok(bincode::encode_to_vec(aggregate, bincode::config::standard())?)
}

fn decode(bytes: &[u8]) -> AggResult<EntityAggregate> {
    let (aggregate, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(aggregate)
}

impl CheckpointStore for BlobStore {
    fn name(&self) -> &'static str {
        "blob"
    }

    fn contains(&self, entity: &str) -> AggResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM results WHERE entity_id = ?1",
                params![entity],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn upsert(&mut self, aggregate: &EntityAggregate) -> AggResult<()> {
        let data = encode(aggregate)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO results (entity_id, data) VALUES (?1, ?2)",
            params![aggregate.entity_id, data],
        )?;
        Ok(())
    }

    fn get(&self, entity: &str) -> AggResult<Option<EntityAggregate>> {
        match self.raw(entity)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn keys(&self) -> AggResult<HashSet<EntityId>> {
        let mut stmt = self.conn.prepare("SELECT entity_id FROM results")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(keys)
    }

    fn len(&self) -> AggResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}
