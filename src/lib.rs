//! # doctable
//!
//! Record table adapter over a document store: lets a stream-processing
//! engine persist, query and mutate typed records while its condition
//! language stays store-agnostic.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Expression (engine condition)
//!     ↓
//! [Condition Compiler]      → CompiledCondition (template + placeholders, cached by caller)
//!     ↓
//! [Filter Resolver]         → filter Document (per invocation, per parameter set)
//!     ↓
//!     ├── reads:  [Record Iterator]   → Records projected onto the schema
//!     └── writes: [Bulk Executor]     → BulkOutcome (per-item failures, skip and continue)
//!     ↓
//! DocumentStore (bulk_write / find / count_documents)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use doctable::{
//!     AttributeSchema, AttributeType, Expression, MemoryConnector, MemoryStore,
//!     ParameterMap, Record, RecordTable, StoreConfig, TableConnector, TableDefinition, Value,
//! };
//!
//! let schema = AttributeSchema::new(vec![
//!     ("symbol", AttributeType::String),
//!     ("price", AttributeType::Float),
//!     ("volume", AttributeType::Long),
//! ])?;
//! let definition = TableDefinition::new("StockTable", schema);
//! let connector = Arc::new(MemoryConnector::new(MemoryStore::new()));
//! let table = TableConnector::new(definition, &StoreConfig::new("memory://local"), connector)?;
//! table.init()?;
//!
//! table.add(&[
//!     Record::new(vec![Value::string("WSO2"), Value::Float(55.6), Value::Long(100)]),
//!     Record::new(vec![Value::string("IBM"), Value::Float(75.6), Value::Long(100)]),
//! ])?;
//!
//! let by_symbol = table.compile_condition(&Expression::equals(
//!     Expression::attribute("symbol"),
//!     Expression::parameter("sym"),
//! ))?;
//! let params = ParameterMap::from([("sym".to_string(), Value::string("IBM"))]);
//! assert!(table.contains(&params, &by_symbol)?);
//!
//! table.delete(&[params.clone()], &by_symbol)?;
//! assert!(!table.contains(&params, &by_symbol)?);
//! # Ok::<(), doctable::TableError>(())
//! ```

pub mod bulk;
pub mod condition;
pub mod config;
pub mod error;
pub mod iterator;
pub mod logging;
pub mod mutation;
pub mod schema;
pub mod store;
pub mod table;
pub mod value;

pub use bulk::{BulkExecutor, BulkOutcome, WriteFailure};
pub use condition::{compile, resolve, CompareOp, CompiledCondition, Expression, ParameterMap};
pub use config::{Config, LoggingConfig, StoreConfig};
pub use error::{TableError, TableResult};
pub use iterator::RecordIterator;
pub use mutation::{MutationKind, MutationRequest, UpdateSet};
pub use schema::{Attribute, AttributeSchema, IndexDeclaration, IndexOrder, TableDefinition};
pub use store::{
    BulkWriteError, BulkWriteResult, DocumentCursor, DocumentStore, IndexModel, MemoryConnector,
    MemoryStore, StoreConnector, StoreError, StoreStats, WriteError, WriteModel,
};
pub use table::{BootstrapReport, RecordTable, TableConnector};
pub use value::{AttributeType, Record, Value};
