//! Loading a transaction log into the event table.

use dest_aggregates_core::{
    config::{AggConfig, EntityKey},
    engine::AggregationEngine,
    event::BaseColumn,
    ingest::{load_transactions, read_transactions, EventTable},
    store::{BlobStore, CheckpointStore},
};
use std::io::Write;

const LOG: &str = "\
step,type,amount,nameOrig,oldbalanceOrg,newbalanceOrig,nameDest,oldbalanceDest,newbalanceDest,isFraud,isFlaggedFraud
5,TRANSFER,100.0,C1,500.0,400.0,M9,0.0,100.0,0,0
1,PAYMENT,20.0,C2,20.0,0.0,M9,50.0,70.0,0,0
3,CASH_OUT,10.0,C1,400.0,390.0,M7,0.0,10.0,1,0
5,TRANSFER,7.0,C3,7.0,0.0,M9,100.0,107.0,0,0
8,DEBIT,1.0,C3,,0.0,M8,0.0,1.0,0,0
";

#[test]
fn groups_by_destination_in_step_order() {
    let txns = read_transactions(LOG.as_bytes()).unwrap();
    assert_eq!(txns.len(), 5);
    assert_eq!(txns[2].name_orig, "C1", "extra columns are skipped");
    assert_eq!(txns[4].old_balance_orig, None, "blank cell reads as missing");

    let table = EventTable::from_transactions(&txns, &AggConfig::default_test());
    assert_eq!(table.entity_ids(), &["M9", "M7", "M8"].map(String::from));

    let m9 = table.events("M9").unwrap();
    let steps: Vec<i64> = m9.iter().map(|e| e.step).collect();
    assert_eq!(steps, vec![1, 5, 5]);
    // Same step keeps log order: C1's transfer before C3's.
    assert_eq!(m9[1].value(BaseColumn::OldBalanceOrig), Some(500.0));
    assert_eq!(m9[2].value(BaseColumn::OldBalanceOrig), Some(7.0));
    assert_eq!(m9[1].value(BaseColumn::BalanceChngOrig), Some(-100.0));
    assert_eq!(m9[1].value(BaseColumn::BalanceDelta), Some(0.0));

    let pop = table.population();
    assert_eq!((pop.grouped, pop.degenerate), (1, 2));
}

#[test]
fn groups_by_origin_when_configured() {
    let txns = read_transactions(LOG.as_bytes()).unwrap();
    let config = AggConfig {
        entity_key: EntityKey::Orig,
        include_degenerate: false,
        ..AggConfig::default_test()
    };
    let table = EventTable::from_transactions(&txns, &config);
    assert_eq!(table.entity_ids(), &["C1", "C3"].map(String::from));
    assert_eq!(table.events("C1").unwrap()[0].step, 3);
}

#[test]
fn csv_file_runs_end_to_end() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(LOG.as_bytes()).unwrap();
    file.flush().unwrap();

    let txns = load_transactions(file.path()).unwrap();
    let table = EventTable::from_transactions(&txns, &AggConfig::default_test());
    let engine = AggregationEngine::new(AggConfig::default_test(), table).unwrap();

    let mut store = BlobStore::in_memory().unwrap();
    store.migrate().unwrap();
    let report = engine.run(&mut store).unwrap();

    // M8's only event has a blank balance.
    assert_eq!(report.persisted, 2);
    assert_eq!(report.compute_failures.len(), 1);
    assert_eq!(report.compute_failures[0].0, "M8");
    assert!(store.get("M7").unwrap().unwrap().is_degenerate());
    assert_eq!(store.get("M9").unwrap().unwrap().rows.len(), 3);
}

#[test]
fn malformed_row_is_a_load_error() {
    let bad = "step,nameOrig,oldbalanceOrg,newbalanceOrig,nameDest,oldbalanceDest,newbalanceDest\nnot-a-step,C1,1,1,M1,1,1\n";
    assert!(read_transactions(bad.as_bytes()).is_err());
}
