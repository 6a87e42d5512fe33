//! Collection and index bootstrap.
//!
//! A missing collection is created together with a unique primary-key index
//! and the declared secondary indexes. An existing collection is left alone;
//! if its indexes differ from the declared ones a warning is logged.

use bson::{Bson, Document};
use tracing::{info, warn};

use crate::error::{TableError, TableResult};
use crate::schema::TableDefinition;
use crate::store::{DocumentStore, IndexModel, StoreError};

/// Name of the index every collection has on `_id`
const ID_INDEX: &str = "_id_";

/// What bootstrap found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapReport {
    /// Collection was created with this many indexes
    Created { indexes: usize },
    /// Collection already existed
    Existing { divergent: bool },
}

/// Indexes a table declares: the primary key first, then secondary indexes
pub fn declared_indexes(definition: &TableDefinition) -> TableResult<Vec<IndexModel>> {
    let schema = definition.schema();
    let mut indexes = Vec::with_capacity(definition.indexes.len() + 1);

    if !definition.primary_key.is_empty() {
        let mut keys = Document::new();
        for field in &definition.primary_key {
            schema.require(field)?;
            keys.insert(field.clone(), 1);
        }
        indexes.push(IndexModel::new(keys).unique());
    }

    for declared in &definition.indexes {
        let mut keys = Document::new();
        for (field, order) in &declared.fields {
            schema.require(field)?;
            keys.insert(field.clone(), order.direction());
        }
        let mut index = IndexModel::new(keys);
        index.unique = declared.unique;
        indexes.push(index);
    }
    Ok(indexes)
}

/// Create the collection and its indexes, or check an existing one
pub fn ensure_collection(
    store: &dyn DocumentStore,
    collection: &str,
    definition: &TableDefinition,
) -> TableResult<BootstrapReport> {
    let declared = declared_indexes(definition)?;
    let failed = |e: StoreError| bootstrap_error(collection, e);

    let exists = store
        .list_collection_names()
        .map_err(failed)?
        .iter()
        .any(|name| name == collection);

    if !exists {
        store.create_collection(collection).map_err(failed)?;
        if !declared.is_empty() {
            store.create_indexes(collection, &declared).map_err(failed)?;
        }
        info!(collection, indexes = declared.len(), "collection_created");
        return Ok(BootstrapReport::Created {
            indexes: declared.len(),
        });
    }

    let existing: Vec<IndexModel> = store
        .list_indexes(collection)
        .map_err(failed)?
        .into_iter()
        .filter(|index| index.name.as_deref() != Some(ID_INDEX))
        .collect();

    let divergent = existing.len() != declared.len()
        || declared
            .iter()
            .any(|d| !existing.iter().any(|e| e.keys == d.keys));

    if divergent {
        warn!(
            collection,
            declared = %describe(&declared),
            existing = %describe(&existing),
            "index_divergence"
        );
    }
    Ok(BootstrapReport::Existing { divergent })
}

fn bootstrap_error(collection: &str, err: StoreError) -> TableError {
    if err.is_connection() {
        return err.into();
    }
    TableError::Bootstrap {
        collection: collection.to_string(),
        message: err.to_string(),
    }
}

fn describe(indexes: &[IndexModel]) -> String {
    let keys: Vec<String> = indexes
        .iter()
        .map(|i| Bson::Document(i.keys.clone()).to_string())
        .collect();
    format!("[{}]", keys.join(", "))
}
