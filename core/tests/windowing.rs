//! Windowed statistics over multi-event entities.

use dest_aggregates_core::{
    aggregator::{aggregate, EntityAggregate},
    config::{AggConfig, DEFAULT_WINDOW_SIZES},
    event::{BaseColumn, Event},
    ingest::EventTable,
    types::Step,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

const COL: BaseColumn = BaseColumn::OldBalanceOrig;

/// One event whose `oldbalanceOrg` is `value`; the other balances are fixed.
fn event(step: Step, value: f64) -> Event {
    Event::from_balances(step, Some(value), Some(1.0), Some(2.0), Some(5.0))
}

fn run(steps: &[Step], values: &[f64]) -> EntityAggregate {
    let events: Vec<Event> = steps.iter().zip(values).map(|(s, v)| event(*s, *v)).collect();
    aggregate("C-test", &events, &DEFAULT_WINDOW_SIZES).expect("aggregate")
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn trailing_window_excludes_lower_bound() {
    let agg = run(&[1, 5, 10], &[10.0, 20.0, 30.0]);

    // (3, 10] holds steps 5 and 10, not step 1.
    let s = agg.stats(2, COL, 7).unwrap();
    assert_eq!(s.sum, 50.0, "window-7 sum at step 10");
    assert_eq!(s.count, 2);
    assert_eq!(s.avg, 25.0);

    // (-2, 5] holds steps 1 and 5.
    let s = agg.stats(1, COL, 7).unwrap();
    assert_eq!(s.sum, 30.0);
    assert_eq!(s.count, 2);

    // Window 14 at step 10 reaches back to step 1.
    assert_eq!(agg.stats(2, COL, 14).unwrap().sum, 60.0);
}

#[test]
fn ma_diff_std_uses_window_mean_and_sample_std() {
    let agg = run(&[1, 5, 10], &[10.0, 20.0, 30.0]);
    let s = agg.stats(2, COL, 7).unwrap();

    let std = s.std.expect("multi-event std is always present");
    assert!(close(std, 50.0f64.sqrt()), "sample std of [20, 30], got {std}");
    let ma = s.ma_diff_std.unwrap();
    assert!(close(ma, 5.0 / 50.0f64.sqrt()), "got {ma}");
}

#[test]
fn singleton_window_in_multi_event_entity_is_nan_not_none() {
    let agg = run(&[1, 50], &[10.0, 20.0]);
    // Step 50 window 7 only holds itself.
    let s = agg.stats(1, COL, 7).unwrap();
    assert_eq!(s.count, 1);
    assert!(s.std.unwrap().is_nan());
    assert!(s.ma_diff_std.unwrap().is_nan());
    assert_eq!(s.sum, 20.0);
    assert_eq!(s.avg, 20.0);
    assert_eq!(s.xtreme_cnt_90, 0);
    assert_eq!(s.xtreme_cnt_10, 0);
}

#[test]
fn full_history_window_matches_cumulative_sum() {
    let steps = [3, 20, 41, 77, 120, 150, 170];
    let values = [5.0, -2.5, 11.0, 0.0, 7.25, 3.0, 100.0];
    let agg = run(&steps, &values);

    let last = steps.len() - 1;
    let s = agg.stats(last, COL, 180).unwrap();
    assert_eq!(s.sum, values.iter().sum::<f64>());
    assert_eq!(s.count as usize, steps.len());
}

#[test]
fn extreme_counts_use_in_window_percentiles() {
    let agg = run(&[1, 2, 3, 4, 5], &[1.0, 2.0, 3.0, 4.0, 100.0]);
    let s = agg.stats(4, COL, 7).unwrap();
    // p90 = 61.6, p10 = 1.4
    assert_eq!(s.xtreme_cnt_90, 1);
    assert_eq!(s.xtreme_cnt_10, 1);

    // Equal values: nothing is strictly beyond its own percentile.
    let agg = run(&[1, 2, 3], &[4.0, 4.0, 4.0]);
    let s = agg.stats(2, COL, 7).unwrap();
    assert_eq!((s.xtreme_cnt_90, s.xtreme_cnt_10), (0, 0));
}

#[test]
fn same_step_events_share_a_window_and_keep_input_order() {
    let config = AggConfig::default_test();
    let table = EventTable::from_events(
        vec![("D1", event(8, 4.0)), ("D1", event(3, 1.0)), ("D1", event(3, 2.0))],
        &config,
    );
    let events = table.events("D1").unwrap();
    let agg = aggregate("D1", events, &config.window_sizes).unwrap();

    let steps: Vec<Step> = agg.rows.iter().map(|r| r.step).collect();
    assert_eq!(steps, vec![3, 3, 8], "rows follow ascending step");
    let firsts: Vec<f64> = agg.rows.iter().map(|r| r.base[COL.index()]).collect();
    assert_eq!(firsts, vec![1.0, 2.0, 4.0], "ties keep input order");

    // Both step-3 rows see both step-3 events.
    assert_eq!(agg.stats(0, COL, 7).unwrap().count, 2);
    assert_eq!(agg.stats(0, COL, 7).unwrap().sum, 3.0);
    assert_eq!(agg.stats(1, COL, 7).unwrap().sum, 3.0);
}

#[test]
fn one_row_per_event_with_full_stat_grid() {
    let agg = run(&[1, 2, 3, 4], &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(agg.rows.len(), 4);
    for row in &agg.rows {
        assert_eq!(row.base.len(), BaseColumn::COUNT);
        assert_eq!(row.stats.len(), BaseColumn::COUNT * DEFAULT_WINDOW_SIZES.len());
    }
}

#[test]
fn count_is_monotonic_in_window_size_and_singletons_have_no_extremes() {
    let mut rng = Pcg64Mcg::seed_from_u64(0x5EED);

    for entity in 0..25 {
        let n = rng.gen_range(2..40);
        let mut steps: Vec<Step> = (0..n).map(|_| rng.gen_range(1..400)).collect();
        steps.sort();
        let values: Vec<f64> = (0..n).map(|_| rng.gen_range(-1_000.0..1_000.0)).collect();
        let agg = run(&steps, &values);

        for i in 0..agg.rows.len() {
            for column in BaseColumn::ALL {
                let counts: Vec<u32> = DEFAULT_WINDOW_SIZES
                    .iter()
                    .map(|w| agg.stats(i, column, *w).unwrap().count)
                    .collect();
                assert!(
                    counts.windows(2).all(|p| p[0] <= p[1]),
                    "entity {entity} row {i} {}: counts {counts:?} not monotonic",
                    column.name()
                );

                for w in DEFAULT_WINDOW_SIZES {
                    let s = agg.stats(i, column, w).unwrap();
                    if s.count == 1 {
                        assert_eq!(
                            (s.xtreme_cnt_90, s.xtreme_cnt_10),
                            (0, 0),
                            "entity {entity} row {i}: single-point window has extremes"
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn aggregation_is_deterministic() {
    let steps = [2, 9, 9, 30, 31];
    let values = [1.5, f64::NAN, 3.0, -4.0, 8.0];
    let a = run(&steps, &values);
    let b = run(&steps, &values);
    // NaN != NaN, so compare encoded forms.
    assert_eq!(format!("{a:?}"), format!("{b:?}"));
}
