//! # Table Connector
//!
//! Engine-facing record table backed by one store collection.
//!
//! ```text
//! compile_condition ──► CompiledCondition (cached by the caller)
//!                              │
//! find / contains ─────────────┼──► resolve ──► store.find / count
//! delete / update / ... ───────┴──► resolve per parameter set
//!                                     └──► WriteModel batch ──► BulkExecutor
//! ```
//!
//! The store handle is created on first use and shared by all calls and
//! open iterators. A connection failure, including one raised mid-cursor,
//! closes and drops it so the next call reconnects.

pub mod bootstrap;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bulk::{BulkExecutor, BulkOutcome};
use crate::condition::{compile, resolve, CompiledCondition, Expression, ParameterMap};
use crate::config::StoreConfig;
use crate::error::{TableError, TableResult};
use crate::iterator::RecordIterator;
use crate::mutation::{MutationRequest, UpdateSet};
use crate::schema::{AttributeSchema, TableDefinition};
use crate::store::{DocumentStore, StoreConnector, WriteModel};
use crate::value::Record;

pub use bootstrap::BootstrapReport;

type HandleSlot = Mutex<Option<Arc<dyn DocumentStore>>>;

/// Operations the host engine drives a table through
pub trait RecordTable {
    /// Compile a condition once for reuse across calls
    fn compile_condition(&self, condition: &Expression) -> TableResult<CompiledCondition>;

    /// Insert records as one batch
    fn add(&self, records: &[Record]) -> TableResult<BulkOutcome>;

    /// Stream the records matching a condition
    fn find(
        &self,
        parameters: &ParameterMap,
        condition: &CompiledCondition,
    ) -> TableResult<RecordIterator>;

    /// Whether any record matches
    fn contains(&self, parameters: &ParameterMap, condition: &CompiledCondition)
        -> TableResult<bool>;

    /// Delete the records matching each parameter set
    fn delete(
        &self,
        parameter_sets: &[ParameterMap],
        condition: &CompiledCondition,
    ) -> TableResult<BulkOutcome>;

    /// Update matching records; `values[i]` applies to `parameter_sets[i]`
    fn update(
        &self,
        parameter_sets: &[ParameterMap],
        condition: &CompiledCondition,
        values: &[UpdateSet],
    ) -> TableResult<BulkOutcome>;

    /// Like [`RecordTable::update`], inserting when nothing matches.
    ///
    /// `records_to_add` is empty or position-aligned with `parameter_sets`;
    /// a record's attributes missing from the new values fill the inserted
    /// document.
    fn update_or_add(
        &self,
        parameter_sets: &[ParameterMap],
        condition: &CompiledCondition,
        values: &[UpdateSet],
        records_to_add: &[Record],
    ) -> TableResult<BulkOutcome>;
}

/// Record table stored in one collection
pub struct TableConnector {
    definition: TableDefinition,
    schema: Arc<AttributeSchema>,
    collection: String,
    uri: String,
    ordered_writes: bool,
    connector: Arc<dyn StoreConnector>,
    handle: Arc<HandleSlot>,
}

impl TableConnector {
    /// Create a connector; no connection is made until first use
    pub fn new(
        definition: TableDefinition,
        config: &StoreConfig,
        connector: Arc<dyn StoreConnector>,
    ) -> TableResult<Self> {
        if config.uri.trim().is_empty() {
            return Err(TableError::Config(format!(
                "no store uri configured for table '{}'",
                definition.id
            )));
        }

        let collection = match config.collection_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => definition.id.clone(),
        };

        Ok(TableConnector {
            schema: definition.shared_schema(),
            definition,
            collection,
            uri: config.uri.clone(),
            ordered_writes: config.ordered_writes,
            connector,
            handle: Arc::new(Mutex::new(None)),
        })
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn is_connected(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Create the collection and indexes, or check an existing collection
    pub fn init(&self) -> TableResult<BootstrapReport> {
        self.with_store(|store| bootstrap::ensure_collection(store, &self.collection, &self.definition))
    }

    /// Close and drop the store handle. Later calls reconnect.
    pub fn shutdown(&self) {
        let taken = self.handle.lock().take();
        if let Some(store) = taken {
            store.close();
            info!(collection = %self.collection, "store_connection_closed");
        }
    }

    /// Translate requests and run them as one batch
    pub fn apply(
        &self,
        requests: &[MutationRequest],
        condition: Option<&CompiledCondition>,
    ) -> TableResult<BulkOutcome> {
        let models = requests
            .iter()
            .map(|request| request.to_write_model(&self.schema, condition))
            .collect::<TableResult<Vec<WriteModel>>>()?;

        if models.is_empty() {
            return Ok(BulkOutcome::default());
        }

        self.with_store(|store| {
            BulkExecutor::new(store, &self.collection)
                .ordered(self.ordered_writes)
                .execute(&models)
        })
    }

    /// Shared handle, connecting on first use
    fn store(&self) -> TableResult<Arc<dyn DocumentStore>> {
        let mut handle = self.handle.lock();
        if let Some(store) = handle.as_ref() {
            return Ok(Arc::clone(store));
        }

        let store = self.connector.connect(&self.uri)?;
        info!(collection = %self.collection, "store_connection_established");
        *handle = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Run `op` against the store; connection failures drop the handle
    fn with_store<T>(
        &self,
        op: impl FnOnce(&dyn DocumentStore) -> TableResult<T>,
    ) -> TableResult<T> {
        let store = self.store()?;
        self.checked(&store, op(store.as_ref()))
    }

    fn checked<T>(
        &self,
        store: &Arc<dyn DocumentStore>,
        result: TableResult<T>,
    ) -> TableResult<T> {
        if let Err(e) = &result {
            if e.is_connection() {
                invalidate(&self.handle, store, &self.collection, e);
            }
        }
        result
    }

    fn check_aligned(what: &str, expected: usize, found: usize) -> TableResult<()> {
        if expected != found {
            return Err(TableError::InvalidArgument(format!(
                "{found} {what} given for {expected} parameter sets"
            )));
        }
        Ok(())
    }
}

/// Close and drop `failed` if the slot still holds it. A handle another
/// caller has already re-established is left alone.
fn invalidate(
    slot: &HandleSlot,
    failed: &Arc<dyn DocumentStore>,
    collection: &str,
    error: &TableError,
) {
    let taken = {
        let mut handle = slot.lock();
        if handle.as_ref().is_some_and(|current| Arc::ptr_eq(current, failed)) {
            handle.take()
        } else {
            None
        }
    };
    if let Some(store) = taken {
        store.close();
        warn!(collection = %collection, error = %error, "store_connection_invalidated");
    }
}

impl RecordTable for TableConnector {
    fn compile_condition(&self, condition: &Expression) -> TableResult<CompiledCondition> {
        let compiled = compile(&self.schema, condition)?;
        debug!(
            collection = %self.collection,
            condition = %compiled,
            placeholders = compiled.placeholder_count(),
            "condition_compiled"
        );
        Ok(compiled)
    }

    fn add(&self, records: &[Record]) -> TableResult<BulkOutcome> {
        let requests: Vec<MutationRequest> = records
            .iter()
            .cloned()
            .map(MutationRequest::Insert)
            .collect();
        self.apply(&requests, None)
    }

    fn find(
        &self,
        parameters: &ParameterMap,
        condition: &CompiledCondition,
    ) -> TableResult<RecordIterator> {
        let filter = resolve(condition, parameters)?;
        debug!(collection = %self.collection, filter = %filter, "find_filter_resolved");
        let store = self.store()?;
        let cursor = self.checked(&store, store.find(&self.collection, &filter).map_err(Into::into))?;

        let slot: Weak<HandleSlot> = Arc::downgrade(&self.handle);
        let collection = self.collection.clone();
        Ok(
            RecordIterator::new(cursor, Arc::clone(&self.schema)).on_connection_error(move |e| {
                if let Some(slot) = slot.upgrade() {
                    invalidate(&slot, &store, &collection, e);
                }
            }),
        )
    }

    fn contains(
        &self,
        parameters: &ParameterMap,
        condition: &CompiledCondition,
    ) -> TableResult<bool> {
        let filter = resolve(condition, parameters)?;
        let count = self.with_store(|store| Ok(store.count_documents(&self.collection, &filter)?))?;
        Ok(count > 0)
    }

    fn delete(
        &self,
        parameter_sets: &[ParameterMap],
        condition: &CompiledCondition,
    ) -> TableResult<BulkOutcome> {
        let requests: Vec<MutationRequest> = parameter_sets
            .iter()
            .cloned()
            .map(MutationRequest::Delete)
            .collect();
        self.apply(&requests, Some(condition))
    }

    fn update(
        &self,
        parameter_sets: &[ParameterMap],
        condition: &CompiledCondition,
        values: &[UpdateSet],
    ) -> TableResult<BulkOutcome> {
        Self::check_aligned("update sets", parameter_sets.len(), values.len())?;
        let requests: Vec<MutationRequest> = parameter_sets
            .iter()
            .zip(values)
            .map(|(parameters, values)| MutationRequest::Update {
                parameters: parameters.clone(),
                values: values.clone(),
            })
            .collect();
        self.apply(&requests, Some(condition))
    }

    fn update_or_add(
        &self,
        parameter_sets: &[ParameterMap],
        condition: &CompiledCondition,
        values: &[UpdateSet],
        records_to_add: &[Record],
    ) -> TableResult<BulkOutcome> {
        Self::check_aligned("update sets", parameter_sets.len(), values.len())?;
        if !records_to_add.is_empty() {
            Self::check_aligned("records to add", parameter_sets.len(), records_to_add.len())?;
        }

        let requests: Vec<MutationRequest> = parameter_sets
            .iter()
            .zip(values)
            .enumerate()
            .map(|(i, (parameters, values))| MutationRequest::Upsert {
                parameters: parameters.clone(),
                values: values.clone(),
                seed: records_to_add.get(i).cloned(),
            })
            .collect();
        self.apply(&requests, Some(condition))
    }
}

impl std::fmt::Debug for TableConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableConnector")
            .field("table", &self.definition.id)
            .field("collection", &self.collection)
            .field("ordered_writes", &self.ordered_writes)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
