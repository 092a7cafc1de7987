//! agg-runner: headless aggregation runner.
//!
//! Usage:
//!   agg-runner --input log.csv --db aggregates.sqlite --parallel 10
//!   agg-runner --input log.csv --db sink.sqlite --shape wide --entity-key orig
//!   agg-runner --db aggregates.sqlite --get C1234567890

use anyhow::Result;
use dest_aggregates_core::{
    aggregator::{feature_names, EntityAggregate},
    config::{AggConfig, EntityKey},
    engine::AggregationEngine,
    event::BaseColumn,
    executor::RunReport,
    ingest::{self, EventTable},
    store::{BlobStore, CheckpointStore, StoreShape, WideStore},
};
use std::env;

#[derive(serde::Serialize)]
struct RowView {
    step:     i64,
    features: serde_json::Map<String, serde_json::Value>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = string_arg(&args, "--db").unwrap_or("aggregates.sqlite");
    let shape: StoreShape = string_arg(&args, "--shape").unwrap_or("blob").parse()?;

    let mut config = match string_arg(&args, "--config") {
        Some(path) => AggConfig::load(path)?,
        None => AggConfig::default(),
    };
    config.parallelism = parse_arg(&args, "--parallel", config.parallelism);
    if let Some(key) = string_arg(&args, "--entity-key") {
        config.entity_key = key.parse::<EntityKey>()?;
    }
    if args.iter().any(|a| a == "--skip-degenerate") {
        config.include_degenerate = false;
    }
    config.validate()?;

    let mut store = open_store(db, shape, &config)?;

    if let Some(entity) = string_arg(&args, "--get") {
        return print_entity(&*store, entity);
    }

    let Some(input) = string_arg(&args, "--input") else {
        anyhow::bail!("--input <transactions.csv> is required unless --get is given");
    };

    println!("Aggregation runner");
    println!("  input:     {input}");
    println!("  db:        {db} ({shape:?})");
    println!("  windows:   {:?}", config.window_sizes);
    println!("  parallel:  {}", config.parallelism);
    println!();

    let txns = ingest::load_transactions(input)?;
    let table = EventTable::from_transactions(&txns, &config);
    let engine = AggregationEngine::new(config, table)?;
    let report = engine.run(&mut *store)?;

    print_summary(&report, &*store)?;
    Ok(())
}

fn open_store(db: &str, shape: StoreShape, config: &AggConfig) -> Result<Box<dyn CheckpointStore>> {
    let store: Box<dyn CheckpointStore> = match shape {
        StoreShape::Blob => {
            let store = BlobStore::open(db)?;
            store.migrate()?;
            Box::new(store)
        }
        StoreShape::Wide => {
            let store = WideStore::open(db, &config.window_sizes)?;
            store.migrate()?;
            Box::new(store)
        }
    };
    Ok(store)
}

fn print_entity(store: &dyn CheckpointStore, entity: &str) -> Result<()> {
    match store.get(entity)? {
        Some(aggregate) => {
            let rows = row_views(&aggregate);
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        None => {
            log::warn!("No stored result for {entity}");
            println!("null");
        }
    }
    Ok(())
}

// Non-finite values have no JSON form and are printed as null.
fn row_views(aggregate: &EntityAggregate) -> Vec<RowView> {
    let names = feature_names(&aggregate.window_sizes);
    aggregate
        .rows
        .iter()
        .map(|row| {
            let mut features = serde_json::Map::new();
            for (column, value) in BaseColumn::ALL.iter().zip(&row.base) {
                features.insert(column.name().to_string(), serde_json::json!(value));
            }
            let values = row.stats.iter().flat_map(|s| s.as_values());
            for (name, value) in names.iter().zip(values) {
                features.insert(name.clone(), serde_json::json!(value));
            }
            RowView { step: row.step, features }
        })
        .collect()
}

fn print_summary(report: &RunReport, store: &dyn CheckpointStore) -> Result<()> {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", report.run_id);
    println!("  submitted:      {}", report.submitted);
    println!("  persisted:      {}", report.persisted);
    println!("  failed:         {}", report.failed());
    println!("  stored total:   {}", store.len()?);
    println!(
        "  elapsed:        {} ms",
        (report.finished_at - report.started_at).num_milliseconds()
    );
    for (entity, reason) in report.compute_failures.iter().chain(&report.persist_failures) {
        println!("  FAILED {entity}: {reason}");
    }
    Ok(())
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
