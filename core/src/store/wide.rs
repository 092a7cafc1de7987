//! Relational sink: one wide row per event plus a pending-work table.
//!
//! Columns are `entity_id, row_index, step`, the nine base columns, then
//! every generated `{column}_{window}_{stat}` feature. An entity's rows are
//! inserted (insert-or-ignore) and its pending row deleted in one
//! transaction, so the two tables never disagree after a crash.
//!
//! SQLite stores NaN as NULL. A NULL `std` or `ma_diff_std` reads back as
//! `None` for a single-event entity and as `Some(NaN)` otherwise; other
//! NULL fields read back as NaN. Infinities survive as written.

use super::{open_connection, CheckpointStore};
use crate::{
    aggregator::{feature_names, AggregateRow, EntityAggregate, WindowStats, STAT_NAMES},
    error::{AggError, AggResult},
    event::BaseColumn,
    types::{EntityId, Step},
};
use rusqlite::{params, params_from_iter, types::Value, Connection};
use std::collections::HashSet;

const KEY_COLUMNS: usize = 3;

pub struct WideStore {
    conn:         Connection,
    window_sizes: Vec<Step>,
    insert_sql:   String,
}

impl WideStore {
    pub fn open(path: &str, window_sizes: &[Step]) -> AggResult<Self> {
        Ok(Self::with_connection(open_connection(path)?, window_sizes))
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory(window_sizes: &[Step]) -> AggResult<Self> {
        Ok(Self::with_connection(Connection::open_in_memory()?, window_sizes))
    }

    fn with_connection(conn: Connection, window_sizes: &[Step]) -> Self {
        let columns = value_columns(window_sizes);
        let placeholders: Vec<String> = (1..=KEY_COLUMNS + columns.len())
            .map(|i| format!("?{i}"))
            .collect();
        let insert_sql = format!(
            "INSERT OR IGNORE INTO aggregates (entity_id, row_index, step, {}) VALUES ({})",
            quoted(&columns).join(", "),
            placeholders.join(", "),
        );
        Self {
            conn,
            window_sizes: window_sizes.to_vec(),
            insert_sql,
        }
    }

    pub fn migrate(&self) -> AggResult<()> {
        let columns: Vec<String> = quoted(&value_columns(&self.window_sizes))
            .into_iter()
            .map(|c| format!("{c} REAL"))
            .collect();
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS aggregates (
                entity_id TEXT    NOT NULL,
                row_index INTEGER NOT NULL,
                step      INTEGER NOT NULL,
                {},
                PRIMARY KEY (entity_id, row_index)
            );
            CREATE TABLE IF NOT EXISTS pending_entities (
                entity_id TEXT PRIMARY KEY
            );",
            columns.join(",\n                ")
        ))?;
        Ok(())
    }

    /// Entities enqueued but not yet committed, in enqueue order.
    pub fn pending(&self) -> AggResult<Vec<EntityId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT entity_id FROM pending_entities ORDER BY rowid ASC")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn row_count(&self) -> AggResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM aggregates", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn row_values(entity: &str, index: usize, row: &AggregateRow) -> Vec<Value> {
        let mut values = Vec::with_capacity(KEY_COLUMNS + row.base.len() + row.stats.len() * STAT_NAMES.len());
        values.push(Value::Text(entity.to_string()));
        values.push(Value::Integer(index as i64));
        values.push(Value::Integer(row.step));
        values.extend(row.base.iter().map(|v| Value::Real(*v)));
        for stats in &row.stats {
            values.extend(stats.as_values().iter().map(|v| match v {
                Some(x) => Value::Real(*x),
                None => Value::Null,
            }));
        }
        values
    }
}

fn value_columns(window_sizes: &[Step]) -> Vec<String> {
    BaseColumn::ALL
        .iter()
        .map(|c| c.name().to_string())
        .chain(feature_names(window_sizes))
        .collect()
}

fn quoted(columns: &[String]) -> Vec<String> {
    columns.iter().map(|c| format!("\"{c}\"")).collect()
}

fn read_row(row: &rusqlite::Row<'_>, windows: usize) -> rusqlite::Result<AggregateRow> {
    let step: i64 = row.get(2)?;
    let mut idx = KEY_COLUMNS;
    let mut next = || -> rusqlite::Result<Option<f64>> {
        let v = row.get::<_, Option<f64>>(idx)?;
        idx += 1;
        Ok(v)
    };

    let mut base = Vec::with_capacity(BaseColumn::COUNT);
    for _ in 0..BaseColumn::COUNT {
        base.push(next()?.unwrap_or(f64::NAN));
    }
    let mut stats = Vec::with_capacity(BaseColumn::COUNT * windows);
    for _ in 0..BaseColumn::COUNT * windows {
        stats.push(WindowStats {
            sum:           next()?.unwrap_or(f64::NAN),
            avg:           next()?.unwrap_or(f64::NAN),
            std:           next()?,
            count:         next()?.unwrap_or(0.0) as u32,
            ma_diff_std:   next()?,
            xtreme_cnt_90: next()?.unwrap_or(0.0) as u32,
            xtreme_cnt_10: next()?.unwrap_or(0.0) as u32,
        });
    }
    Ok(AggregateRow { step, base, stats })
}

/// Only the single-event row carries `None`; in any other entity a NULL
/// `std` or `ma_diff_std` was written as NaN.
fn restore_nan(rows: &mut [AggregateRow]) {
    for stats in rows.iter_mut().flat_map(|r| r.stats.iter_mut()) {
        if stats.std.is_none() {
            stats.std = Some(f64::NAN);
        }
        if stats.ma_diff_std.is_none() {
            stats.ma_diff_std = Some(f64::NAN);
        }
    }
}

impl CheckpointStore for WideStore {
    fn name(&self) -> &'static str {
        "wide"
    }

    fn prepare(&mut self, pending: &[EntityId]) -> AggResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO pending_entities (entity_id) VALUES (?1)")?;
            for id in pending {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn contains(&self, entity: &str) -> AggResult<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM aggregates WHERE entity_id = ?1",
            params![entity],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    fn upsert(&mut self, aggregate: &EntityAggregate) -> AggResult<()> {
        if aggregate.window_sizes != self.window_sizes {
            return Err(AggError::InvalidConfig(format!(
                "entity '{}' computed with windows {:?}, table has {:?}",
                aggregate.entity_id, aggregate.window_sizes, self.window_sizes
            )));
        }
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(&self.insert_sql)?;
            for (index, row) in aggregate.rows.iter().enumerate() {
                let values = Self::row_values(&aggregate.entity_id, index, row);
                insert.execute(params_from_iter(values.iter()))?;
            }
            tx.execute(
                "DELETE FROM pending_entities WHERE entity_id = ?1",
                params![aggregate.entity_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get(&self, entity: &str) -> AggResult<Option<EntityAggregate>> {
        let windows = self.window_sizes.len();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT entity_id, row_index, step, {} FROM aggregates
             WHERE entity_id = ?1 ORDER BY row_index ASC",
            quoted(&value_columns(&self.window_sizes)).join(", ")
        ))?;
        let mut rows = stmt
            .query_map(params![entity], |row| read_row(row, windows))?
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(None);
        }
        if rows.len() > 1 {
            restore_nan(&mut rows);
        }
        Ok(Some(EntityAggregate {
            entity_id:    entity.to_string(),
            window_sizes: self.window_sizes.clone(),
            rows,
        }))
    }

    fn keys(&self) -> AggResult<HashSet<EntityId>> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT entity_id FROM aggregates")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(keys)
    }
}
