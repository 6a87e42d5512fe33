//! Find, contains, projection, and iterator lookahead tests.

use std::sync::Arc;

use bson::doc;
use doctable::{
    AttributeSchema, AttributeType, CompiledCondition, DocumentStore, Expression, MemoryConnector,
    MemoryStore, ParameterMap, Record, RecordTable, StoreConfig, TableConnector, TableDefinition,
    TableError, Value, WriteModel,
};

// Test Helpers
fn stock_table() -> (TableConnector, MemoryStore) {
    let schema = AttributeSchema::new(vec![
        ("symbol", AttributeType::String),
        ("price", AttributeType::Float),
        ("volume", AttributeType::Long),
    ])
    .unwrap();
    let store = MemoryStore::new();
    let connector = Arc::new(MemoryConnector::new(store.clone()));
    let table = TableConnector::new(
        TableDefinition::new("StockTable", schema),
        &StoreConfig::new("memory://test"),
        connector,
    )
    .unwrap();
    table.init().unwrap();
    (table, store)
}

fn stock(symbol: &str, price: f32, volume: i64) -> Record {
    Record::new(vec![
        Value::string(symbol),
        Value::Float(price),
        Value::Long(volume),
    ])
}

fn by_symbol(table: &TableConnector) -> CompiledCondition {
    table
        .compile_condition(&Expression::equals(
            Expression::attribute("symbol"),
            Expression::parameter("sym"),
        ))
        .unwrap()
}

fn sym(symbol: &str) -> ParameterMap {
    ParameterMap::from([("sym".to_string(), Value::string(symbol))])
}

fn seeded() -> (TableConnector, MemoryStore) {
    let (table, store) = stock_table();
    table
        .add(&[
            stock("WSO2", 55.6, 100),
            stock("IBM", 75.6, 100),
            stock("WSO2", 57.6, 200),
        ])
        .unwrap();
    (table, store)
}

// Find Tests
#[test]
fn test_find_returns_matching_records_in_schema_order() {
    let (table, _store) = seeded();
    let cond = by_symbol(&table);

    let records: Vec<Record> = table
        .find(&sym("WSO2"), &cond)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(
        records,
        vec![stock("WSO2", 55.6, 100), stock("WSO2", 57.6, 200)]
    );
}

#[test]
fn test_find_same_condition_reused_with_different_bindings() {
    let (table, _store) = seeded();
    let cond = by_symbol(&table);

    let wso2 = table.find(&sym("WSO2"), &cond).unwrap().count();
    let ibm = table.find(&sym("IBM"), &cond).unwrap().count();
    let none = table.find(&sym("ORCL"), &cond).unwrap().count();

    assert_eq!((wso2, ibm, none), (2, 1, 0));
}

#[test]
fn test_find_with_parameter_compared_on_left() {
    let (table, _store) = seeded();
    // :min < volume
    let cond = table
        .compile_condition(&Expression::less_than(
            Expression::parameter("min"),
            Expression::attribute("volume"),
        ))
        .unwrap();
    let params = ParameterMap::from([("min".to_string(), Value::Long(150))]);

    let records: Vec<Record> = table
        .find(&params, &cond)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records, vec![stock("WSO2", 57.6, 200)]);
}

#[test]
fn test_find_projects_partial_documents_with_nulls() {
    let (table, store) = stock_table();
    store
        .bulk_write(
            "StockTable",
            &[
                WriteModel::InsertOne {
                    document: doc! { "symbol": "IBM", "unrelated": true },
                },
                WriteModel::InsertOne {
                    document: doc! { "volume": 5_i64 },
                },
            ],
            true,
        )
        .unwrap();

    let everything = table.compile_condition(&Expression::literal(true)).unwrap();
    let records: Vec<Record> = table
        .find(&ParameterMap::new(), &everything)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(
        records,
        vec![
            Record::new(vec![Value::string("IBM"), Value::Null, Value::Null]),
            Record::new(vec![Value::Null, Value::Null, Value::Long(5)]),
        ]
    );
    assert!(records.iter().all(|r| r.len() == 3));
}

#[test]
fn test_find_missing_parameter() {
    let (table, store) = seeded();
    let cond = by_symbol(&table);
    let finds = store.stats().finds;

    let err = table.find(&ParameterMap::new(), &cond).unwrap_err();
    assert_eq!(err, TableError::MissingParameter("sym".to_string()));
    assert_eq!(store.stats().finds, finds);
}

// Iterator Lookahead Tests
#[test]
fn test_has_next_twice_fetches_one_document() {
    let (table, store) = seeded();
    let cond = by_symbol(&table);

    let mut it = table.find(&sym("WSO2"), &cond).unwrap();
    let fetched = store.stats().documents_fetched;

    assert!(it.has_next().unwrap());
    assert!(it.has_next().unwrap());
    assert_eq!(store.stats().documents_fetched, fetched + 1);

    assert_eq!(it.next_record().unwrap(), stock("WSO2", 55.6, 100));
    assert_eq!(it.next_record().unwrap(), stock("WSO2", 57.6, 200));
    assert!(!it.has_next().unwrap());
    assert!(it.next_record().unwrap().is_empty());
}

#[test]
fn test_close_releases_cursor() {
    let (table, store) = seeded();
    let cond = by_symbol(&table);

    let mut it = table.find(&sym("WSO2"), &cond).unwrap();
    assert_eq!(store.stats().open_cursors, 1);

    it.close();
    it.close();
    assert_eq!(store.stats().open_cursors, 0);
    assert!(!it.has_next().unwrap());
}

#[test]
fn test_exhaustion_and_drop_release_cursor() {
    let (table, store) = seeded();
    let cond = by_symbol(&table);

    let mut it = table.find(&sym("IBM"), &cond).unwrap();
    assert!(it.next_record().is_ok());
    assert!(it.next_record().unwrap().is_empty());
    assert!(it.is_closed());
    assert_eq!(store.stats().open_cursors, 0);

    let it = table.find(&sym("WSO2"), &cond).unwrap();
    assert_eq!(store.stats().open_cursors, 1);
    drop(it);
    assert_eq!(store.stats().open_cursors, 0);
}

#[test]
fn test_cursor_failure_surfaces_as_connection_error() {
    let (table, store) = seeded();
    let cond = by_symbol(&table);

    let mut it = table.find(&sym("WSO2"), &cond).unwrap();
    store.set_offline(true);
    assert!(it.has_next().unwrap_err().is_connection());
    assert!(it.is_closed());
    assert!(!table.is_connected());
    assert_eq!(store.stats().closes, 1);

    store.set_offline(false);
    assert!(table.contains(&sym("WSO2"), &cond).unwrap());
}

// Contains Tests
#[test]
fn test_contains() {
    let (table, store) = seeded();
    let cond = by_symbol(&table);

    assert!(table.contains(&sym("IBM"), &cond).unwrap());
    assert!(!table.contains(&sym("ORCL"), &cond).unwrap());
    assert_eq!(store.stats().counts, 2);
}

#[test]
fn test_contains_with_compound_condition() {
    let (table, _store) = seeded();
    let cond = table
        .compile_condition(&Expression::or(
            Expression::equals(Expression::attribute("symbol"), Expression::parameter("sym")),
            Expression::greater_or_equal(Expression::attribute("price"), Expression::parameter("floor")),
        ))
        .unwrap();

    let mut params = sym("ORCL");
    params.insert("floor".to_string(), Value::Double(70.0));
    assert!(table.contains(&params, &cond).unwrap());

    params.insert("floor".to_string(), Value::Double(80.0));
    assert!(!table.contains(&params, &cond).unwrap());
}
