//! Window aggregator — one entity's ordered events in, feature rows out.
//!
//! RULES:
//!   - Pure: no I/O, no shared state, same input gives the same output.
//!   - A window for the event at step t holds every event with step in
//!     (t - size, t]. Events sharing a step share a window.
//!   - Multi-event entities always carry `Some(std)`; a one-event window
//!     gives `Some(NaN)`. Only the single-event path stores `None`.
//!   - NaN and Inf are values, never errors. `count` skips NaN; the
//!     moments do not.

use crate::{
    error::{AggError, AggResult},
    event::{BaseColumn, Event},
    stats,
    types::{EntityId, Step},
};
use serde::{Deserialize, Serialize};

/// Names of the per-window statistics, in storage order.
pub const STAT_NAMES: [&str; 7] = [
    "sum",
    "avg",
    "std",
    "count",
    "ma_diff_std",
    "xtreme_cnt_90",
    "xtreme_cnt_10",
];

const UPPER_QUANTILE: f64 = 0.9;
const LOWER_QUANTILE: f64 = 0.1;

/// The seven statistics for one (column, window) pair at one event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct WindowStats {
    pub sum:           f64,
    pub avg:           f64,
    pub std:           Option<f64>,
    pub count:         u32,
    pub ma_diff_std:   Option<f64>,
    pub xtreme_cnt_90: u32,
    pub xtreme_cnt_10: u32,
}

impl WindowStats {
    /// The synthetic statistics of a single-event entity.
    pub fn degenerate(value: f64) -> Self {
        Self {
            sum:           value,
            avg:           value,
            std:           None,
            count:         1,
            ma_diff_std:   None,
            xtreme_cnt_90: 0,
            xtreme_cnt_10: 0,
        }
    }

    /// Values in `STAT_NAMES` order, counts widened to `f64`.
    pub fn as_values(&self) -> [Option<f64>; 7] {
        [
            Some(self.sum),
            Some(self.avg),
            self.std,
            Some(self.count as f64),
            self.ma_diff_std,
            Some(self.xtreme_cnt_90 as f64),
            Some(self.xtreme_cnt_10 as f64),
        ]
    }

    /// Pure computation from one window's values. `current` is the value of
    /// the event the window trails from.
    fn compute(window: &[f64], current: f64) -> Self {
        let sum = stats::sum(window);
        let avg = stats::mean(window);
        let std = stats::sample_std(window);
        let (xtreme_cnt_90, xtreme_cnt_10) = if window.is_empty() {
            (0, 0)
        } else {
            (
                stats::count_above(window, stats::quantile(window, UPPER_QUANTILE)),
                stats::count_below(window, stats::quantile(window, LOWER_QUANTILE)),
            )
        };
        Self {
            sum,
            avg,
            std:         Some(std),
            count:       window.iter().filter(|v| !v.is_nan()).count() as u32,
            ma_diff_std: Some((current - avg) / std),
            xtreme_cnt_90,
            xtreme_cnt_10,
        }
    }
}

/// Features at one event: the event's step, its base values, and the
/// statistics grid laid out column-major (`column * windows + window`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct AggregateRow {
    pub step:  Step,
    pub base:  Vec<f64>,
    pub stats: Vec<WindowStats>,
}

/// Every feature row of one entity. This is the unit stored per checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct EntityAggregate {
    pub entity_id:    EntityId,
    pub window_sizes: Vec<Step>,
    pub rows:         Vec<AggregateRow>,
}

impl EntityAggregate {
    /// Statistics of `column` over the window of `window_size` at `row`.
    pub fn stats(&self, row: usize, column: BaseColumn, window_size: Step) -> Option<&WindowStats> {
        let w = self.window_sizes.iter().position(|s| *s == window_size)?;
        self.rows
            .get(row)?
            .stats
            .get(column.index() * self.window_sizes.len() + w)
    }

    pub fn is_degenerate(&self) -> bool {
        self.rows.len() == 1 && self.rows[0].stats.iter().all(|s| s.std.is_none())
    }
}

/// Generated feature names, `{column}_{window}_{stat}`, in row layout order.
pub fn feature_names(window_sizes: &[Step]) -> Vec<String> {
    let mut names = Vec::with_capacity(BaseColumn::COUNT * window_sizes.len() * STAT_NAMES.len());
    for column in BaseColumn::ALL {
        for size in window_sizes {
            for stat in STAT_NAMES {
                names.push(format!("{}_{}_{}", column.name(), size, stat));
            }
        }
    }
    names
}

/// Compute every feature row for one entity.
///
/// `events` must be ordered by step (the event table guarantees this).
/// A single event takes the synthetic path; any missing base value fails
/// the whole entity.
pub fn aggregate(entity: &str, events: &[Event], window_sizes: &[Step]) -> AggResult<EntityAggregate> {
    if events.is_empty() {
        return Err(AggError::EmptyGroup { entity: entity.to_string() });
    }

    let series = column_series(entity, events)?;
    let rows = if events.len() == 1 {
        vec![degenerate_row(events[0].step, &series, window_sizes.len())]
    } else {
        windowed_rows(events, &series, window_sizes)
    };

    Ok(EntityAggregate {
        entity_id:    entity.to_string(),
        window_sizes: window_sizes.to_vec(),
        rows,
    })
}

/// One dense value vector per base column, or the first missing cell.
fn column_series(entity: &str, events: &[Event]) -> AggResult<Vec<Vec<f64>>> {
    BaseColumn::ALL
        .iter()
        .map(|column| {
            events
                .iter()
                .map(|e| {
                    e.value(*column).ok_or_else(|| AggError::MissingValue {
                        entity: entity.to_string(),
                        column: column.name(),
                        step:   e.step,
                    })
                })
                .collect::<AggResult<Vec<f64>>>()
        })
        .collect()
}

fn degenerate_row(step: Step, series: &[Vec<f64>], windows: usize) -> AggregateRow {
    let base: Vec<f64> = series.iter().map(|s| s[0]).collect();
    let stats = base
        .iter()
        .flat_map(|v| std::iter::repeat(WindowStats::degenerate(*v)).take(windows))
        .collect();
    AggregateRow { step, base, stats }
}

fn windowed_rows(events: &[Event], series: &[Vec<f64>], window_sizes: &[Step]) -> Vec<AggregateRow> {
    let steps: Vec<Step> = events.iter().map(|e| e.step).collect();

    // Bounds depend only on steps, so they are shared by every column.
    let bounds: Vec<Vec<(usize, usize)>> = window_sizes
        .iter()
        .map(|size| steps.iter().map(|t| window_bounds(&steps, *t, *size)).collect())
        .collect();

    (0..events.len())
        .map(|i| {
            let mut stats = Vec::with_capacity(series.len() * window_sizes.len());
            for values in series {
                for per_window in &bounds {
                    let (lo, hi) = per_window[i];
                    stats.push(WindowStats::compute(&values[lo..hi], values[i]));
                }
            }
            AggregateRow {
                step: steps[i],
                base: series.iter().map(|s| s[i]).collect(),
                stats,
            }
        })
        .collect()
}

/// Index range of events with step in (t - size, t] over sorted `steps`.
/// A lower bound below `Step::MIN` excludes nothing.
fn window_bounds(steps: &[Step], t: Step, size: Step) -> (usize, usize) {
    let lo = match t.checked_sub(size) {
        Some(floor) => steps.partition_point(|s| *s <= floor),
        None => 0,
    };
    let hi = steps.partition_point(|s| *s <= t);
    (lo, hi)
}
