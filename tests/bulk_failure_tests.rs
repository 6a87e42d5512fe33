//! Partial-failure tests: rejected items are reported and skipped while the
//! rest of the batch is still applied.

use std::collections::HashSet;
use std::sync::Arc;

use doctable::{
    AttributeSchema, AttributeType, Expression, MemoryConnector, MemoryStore, MutationKind,
    ParameterMap, Record, RecordTable, StoreConfig, TableConnector, TableDefinition, UpdateSet,
    Value,
};
use proptest::prelude::*;

// Test Helpers
fn keyed_table(ordered: bool) -> (TableConnector, MemoryStore, Arc<MemoryConnector>) {
    let schema = AttributeSchema::new(vec![
        ("symbol", AttributeType::String),
        ("price", AttributeType::Float),
        ("volume", AttributeType::Long),
    ])
    .unwrap();
    let definition = TableDefinition::new("StockTable", schema).with_primary_key(["symbol"]);
    let store = MemoryStore::new();
    let connector = Arc::new(MemoryConnector::new(store.clone()));
    let mut config = StoreConfig::new("memory://test");
    config.ordered_writes = ordered;
    let table = TableConnector::new(definition, &config, connector.clone()).unwrap();
    table.init().unwrap();
    (table, store, connector)
}

fn stock(symbol: &str, volume: i64) -> Record {
    Record::new(vec![
        Value::string(symbol),
        Value::Float(1.0),
        Value::Long(volume),
    ])
}

fn stored_symbols(store: &MemoryStore) -> Vec<String> {
    store
        .documents("StockTable")
        .iter()
        .map(|d| d.get_str("symbol").unwrap().to_string())
        .collect()
}

// Ordered Batches
#[test]
fn test_failures_in_the_middle_are_skipped() {
    let (table, store, _) = keyed_table(true);
    let before = store.stats().bulk_writes;

    let outcome = table
        .add(&[
            stock("A", 0),
            stock("A", 1),
            stock("B", 2),
            stock("B", 3),
            stock("C", 4),
        ])
        .unwrap();

    assert_eq!(outcome.failed_positions(), vec![1, 3]);
    assert_eq!(outcome.round_trips, 3);
    assert_eq!(store.stats().bulk_writes - before, 3);
    assert_eq!(outcome.result.inserted, 3);
    assert_eq!(outcome.succeeded(), 3);
    // The last element is applied after the second failure
    assert_eq!(stored_symbols(&store), vec!["A", "B", "C"]);
}

#[test]
fn test_last_element_applied_after_single_failure() {
    let (table, store, _) = keyed_table(true);
    let outcome = table
        .add(&[stock("A", 0), stock("A", 1), stock("B", 2)])
        .unwrap();

    assert_eq!(outcome.failed_positions(), vec![1]);
    assert_eq!(stored_symbols(&store), vec!["A", "B"]);
}

#[test]
fn test_failure_at_first_position() {
    let (table, store, _) = keyed_table(true);
    table.add(&[stock("A", 0)]).unwrap();

    let outcome = table
        .add(&[stock("A", 1), stock("B", 2), stock("C", 3)])
        .unwrap();

    assert_eq!(outcome.failed_positions(), vec![0]);
    assert_eq!(outcome.round_trips, 2);
    assert_eq!(stored_symbols(&store), vec!["A", "B", "C"]);
}

#[test]
fn test_every_item_failing() {
    let (table, store, _) = keyed_table(true);
    table.add(&[stock("A", 0)]).unwrap();

    let outcome = table
        .add(&[stock("A", 1), stock("A", 2), stock("A", 3)])
        .unwrap();

    assert_eq!(outcome.failed_positions(), vec![0, 1, 2]);
    assert_eq!(outcome.round_trips, 3);
    assert_eq!(outcome.succeeded(), 0);
    assert_eq!(store.documents("StockTable").len(), 1);
}

#[test]
fn test_insert_failure_diagnostics() {
    let (table, _store, _) = keyed_table(true);
    let outcome = table.add(&[stock("A", 0), stock("A", 1)]).unwrap();

    let failure = &outcome.failures[0];
    assert_eq!(failure.position, 1);
    assert_eq!(failure.kind, MutationKind::Insert);
    assert_eq!(failure.code, 11000);
    assert!(failure.message.contains("E11000 duplicate key error"));
    assert_eq!(failure.target.get_str("symbol").unwrap(), "A");
    assert_eq!(failure.target.get_i64("volume").unwrap(), 1);
    assert!(failure.update.is_none());
    assert!(failure
        .to_string()
        .starts_with("the document '"));
}

#[test]
fn test_update_failure_diagnostics() {
    let (table, store, _) = keyed_table(true);
    table.add(&[stock("A", 0), stock("B", 0), stock("C", 0)]).unwrap();

    let cond = table
        .compile_condition(&Expression::equals(
            Expression::attribute("symbol"),
            Expression::parameter("sym"),
        ))
        .unwrap();
    let params = |s: &str| ParameterMap::from([("sym".to_string(), Value::string(s))]);
    let rename = |s: &str| UpdateSet::from([("symbol".to_string(), Value::string(s))]);
    let volume = |v: i64| UpdateSet::from([("volume".to_string(), Value::Long(v))]);

    // Renaming B to A violates the primary key; C is still updated
    let outcome = table
        .update(
            &[params("B"), params("C")],
            &cond,
            &[rename("A"), volume(9)],
        )
        .unwrap();

    assert_eq!(outcome.failed_positions(), vec![0]);
    let failure = &outcome.failures[0];
    assert_eq!(failure.kind, MutationKind::Update);
    assert!(failure.update.is_some());
    assert!(failure.to_string().contains("failed to update with"));

    let c = store
        .documents("StockTable")
        .into_iter()
        .find(|d| d.get_str("symbol").unwrap() == "C")
        .unwrap();
    assert_eq!(c.get_i64("volume").unwrap(), 9);
}

// Unordered Batches
#[test]
fn test_unordered_batch_reports_all_failures_in_one_round_trip() {
    let (table, store, _) = keyed_table(false);
    let before = store.stats().bulk_writes;

    let outcome = table
        .add(&[
            stock("A", 0),
            stock("A", 1),
            stock("B", 2),
            stock("B", 3),
            stock("C", 4),
        ])
        .unwrap();

    assert_eq!(outcome.failed_positions(), vec![1, 3]);
    assert_eq!(outcome.round_trips, 1);
    assert_eq!(store.stats().bulk_writes - before, 1);
    assert_eq!(stored_symbols(&store), vec!["A", "B", "C"]);
}

// Whole-batch Failures
#[test]
fn test_connection_failure_is_fatal_and_invalidates_handle() {
    let (table, store, connector) = keyed_table(true);
    assert!(table.is_connected());

    store.set_offline(true);
    let err = table.add(&[stock("A", 0)]).unwrap_err();
    assert!(err.is_connection());
    assert!(!table.is_connected());

    store.set_offline(false);
    let outcome = table.add(&[stock("A", 0)]).unwrap();
    assert!(outcome.is_complete());
    assert_eq!(connector.connection_count(), 2);
}

#[test]
fn test_schema_errors_abort_before_any_write() {
    let (table, store, _) = keyed_table(true);
    let before = store.stats().bulk_writes;

    let short = Record::new(vec![Value::string("A")]);
    assert!(table.add(&[stock("B", 0), short]).is_err());
    assert_eq!(store.stats().bulk_writes, before);
    assert!(store.documents("StockTable").is_empty());
}

// Property Tests
proptest! {
    /// Each rejected position is reported exactly once and every other
    /// item, including the last, is applied.
    #[test]
    fn prop_partial_failure_isolation(keys in prop::collection::vec(0u8..6, 1..16), ordered in any::<bool>()) {
        let (table, store, _) = keyed_table(ordered);
        let records: Vec<Record> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| stock(&format!("K{k}"), i as i64))
            .collect();

        let mut seen = HashSet::new();
        let expected_failures: Vec<usize> = keys
            .iter()
            .enumerate()
            .filter(|(_, k)| !seen.insert(**k))
            .map(|(i, _)| i)
            .collect();

        let outcome = table.add(&records).unwrap();

        prop_assert_eq!(outcome.failed_positions(), expected_failures.clone());
        prop_assert_eq!(outcome.succeeded(), keys.len() - expected_failures.len());
        prop_assert_eq!(store.documents("StockTable").len(), seen.len());
        if ordered {
            prop_assert_eq!(outcome.round_trips, 1 + expected_failures.iter().filter(|&&p| p + 1 < keys.len()).count());
        } else {
            prop_assert_eq!(outcome.round_trips, 1);
        }

        // First occurrence of each key wins
        for doc in store.documents("StockTable") {
            let symbol = doc.get_str("symbol").unwrap();
            let volume = doc.get_i64("volume").unwrap() as usize;
            let first = keys.iter().position(|k| format!("K{k}") == symbol).unwrap();
            prop_assert_eq!(volume, first);
        }
    }
}
