//! # Document Store Seam
//!
//! The interface the table layer drives: a pooled, thread-safe handle that
//! accepts document filters and bulk write models and hands back cursors.
//!
//! [`memory::MemoryStore`] is the in-process implementation.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use bson::Document;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mutation::MutationKind;

pub use memory::{MemoryConnector, MemoryStore, StoreStats};

/// Errors raised by a document store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// Malformed or unsupported filter
    #[error("query failed: {0}")]
    Query(String),

    /// Collection or index command rejected
    #[error("command failed: {0}")]
    Command(String),
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Unauthorized(_))
    }
}

/// Result type for store calls
pub type StoreResult<T> = Result<T, StoreError>;

/// One operation of a bulk write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne {
        document: Document,
    },
    UpdateMany {
        filter: Document,
        /// `$set` and optionally `$setOnInsert`
        update: Document,
        upsert: bool,
    },
    DeleteMany {
        filter: Document,
    },
}

impl WriteModel {
    pub fn kind(&self) -> MutationKind {
        match self {
            WriteModel::InsertOne { .. } => MutationKind::Insert,
            WriteModel::UpdateMany { upsert: true, .. } => MutationKind::Upsert,
            WriteModel::UpdateMany { .. } => MutationKind::Update,
            WriteModel::DeleteMany { .. } => MutationKind::Delete,
        }
    }
}

/// Counts reported by a bulk write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkWriteResult {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub deleted: u64,
    pub upserted: u64,
}

impl BulkWriteResult {
    /// Add the counts of another round trip
    pub fn merge(&mut self, other: &BulkWriteResult) {
        self.inserted += other.inserted;
        self.matched += other.matched;
        self.modified += other.modified;
        self.deleted += other.deleted;
        self.upserted += other.upserted;
    }
}

/// A rejected write model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError {
    /// Index within the submitted slice
    pub index: usize,
    pub code: i32,
    pub message: String,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write {} failed (code {}): {}", self.index, self.code, self.message)
    }
}

/// Failure of a bulk write round trip
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BulkWriteError {
    /// Some models were rejected; `result` counts what was applied
    #[error("bulk write rejected {} operation(s)", .errors.len())]
    Partial {
        result: BulkWriteResult,
        errors: Vec<WriteError>,
    },

    /// Nothing is known about the batch
    #[error(transparent)]
    Fatal(#[from] StoreError),
}

/// Index specification
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    /// Field name to direction (`1` / `-1`)
    pub keys: Document,
    pub unique: bool,
    pub name: Option<String>,
}

impl IndexModel {
    pub fn new(keys: Document) -> Self {
        IndexModel {
            keys,
            unique: false,
            name: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Conventional `field_1_other_-1` name
    pub fn default_name(&self) -> String {
        self.keys
            .iter()
            .map(|(k, v)| format!("{k}_{v}"))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn effective_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.default_name())
    }
}

/// Server-side cursor; dropping it releases the cursor
pub type DocumentCursor = Box<dyn Iterator<Item = StoreResult<Document>> + Send>;

/// A connected, thread-safe store handle
pub trait DocumentStore: Send + Sync {
    fn list_collection_names(&self) -> StoreResult<Vec<String>>;

    fn create_collection(&self, name: &str) -> StoreResult<()>;

    /// All indexes of a collection, `_id_` included
    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>>;

    fn create_indexes(&self, collection: &str, indexes: &[IndexModel]) -> StoreResult<()>;

    /// Apply `models` in one round trip.
    ///
    /// Ordered writes stop at the first rejected model; unordered writes
    /// attempt every model. Error indexes are relative to `models`.
    fn bulk_write(
        &self,
        collection: &str,
        models: &[WriteModel],
        ordered: bool,
    ) -> Result<BulkWriteResult, BulkWriteError>;

    fn find(&self, collection: &str, filter: &Document) -> StoreResult<DocumentCursor>;

    fn count_documents(&self, collection: &str, filter: &Document) -> StoreResult<u64>;

    /// Release the handle's resources
    fn close(&self) {}
}

/// Establishes store handles from a connection URI
pub trait StoreConnector: Send + Sync {
    fn connect(&self, uri: &str) -> StoreResult<Arc<dyn DocumentStore>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_index_default_name() {
        let index = IndexModel::new(doc! { "symbol": 1, "price": -1 });
        assert_eq!(index.default_name(), "symbol_1_price_-1");
        assert_eq!(index.effective_name(), "symbol_1_price_-1");
    }

    #[test]
    fn test_write_model_kind() {
        let upsert = WriteModel::UpdateMany {
            filter: doc! {},
            update: doc! { "$set": { "a": 1 } },
            upsert: true,
        };
        assert_eq!(upsert.kind(), MutationKind::Upsert);
        assert_eq!(
            WriteModel::DeleteMany { filter: doc! {} }.kind(),
            MutationKind::Delete
        );
    }

    #[test]
    fn test_bulk_result_merge() {
        let mut total = BulkWriteResult {
            inserted: 2,
            ..Default::default()
        };
        total.merge(&BulkWriteResult {
            inserted: 1,
            deleted: 3,
            ..Default::default()
        });
        assert_eq!(total.inserted, 3);
        assert_eq!(total.deleted, 3);
    }
}
