//! # In-Memory Document Store
//!
//! A process-local [`DocumentStore`] honoring the same filter, bulk-write and
//! cursor contract as a networked store. Clones share state, so one store
//! can back several connectors.
//!
//! ## Test hooks
//!
//! - [`MemoryStore::stats`] counts round trips and cursor activity
//! - [`MemoryStore::set_offline`] makes every call fail with a connection error
//! - [`MemoryStore::documents`] snapshots a collection

mod collection;
mod matcher;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bson::{doc, Document};
use parking_lot::RwLock;
use tracing::debug;

use super::{
    BulkWriteError, BulkWriteResult, DocumentCursor, DocumentStore, IndexModel, StoreConnector,
    StoreError, StoreResult, WriteError, WriteModel,
};
use collection::Collection;

/// Counters exposed for tests and benchmarks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Bulk-write round trips, including rejected ones
    pub bulk_writes: u64,
    pub finds: u64,
    pub counts: u64,
    /// Documents handed out through cursors
    pub documents_fetched: u64,
    /// Cursors created and not yet dropped
    pub open_cursors: u64,
    pub closes: u64,
}

#[derive(Default)]
struct Counters {
    bulk_writes: AtomicU64,
    finds: AtomicU64,
    counts: AtomicU64,
    documents_fetched: AtomicU64,
    open_cursors: AtomicU64,
    closes: AtomicU64,
}

#[derive(Default)]
struct Shared {
    collections: RwLock<HashMap<String, Collection>>,
    counters: Counters,
    offline: AtomicBool,
}

impl Shared {
    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("store is unreachable".to_string()));
        }
        Ok(())
    }
}

/// Shared in-memory document store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StoreStats {
        let c = &self.inner.counters;
        StoreStats {
            bulk_writes: c.bulk_writes.load(Ordering::SeqCst),
            finds: c.finds.load(Ordering::SeqCst),
            counts: c.counts.load(Ordering::SeqCst),
            documents_fetched: c.documents_fetched.load(Ordering::SeqCst),
            open_cursors: c.open_cursors.load(Ordering::SeqCst),
            closes: c.closes.load(Ordering::SeqCst),
        }
    }

    /// Simulate losing (or regaining) the connection
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::SeqCst)
    }

    /// Snapshot of a collection's documents, in insertion order
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .collections
            .read()
            .get(collection)
            .map(|c| c.documents().to_vec())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("collections", &self.inner.collections.read().len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl DocumentStore for MemoryStore {
    fn list_collection_names(&self) -> StoreResult<Vec<String>> {
        self.inner.ensure_online()?;
        let mut names: Vec<String> = self.inner.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn create_collection(&self, name: &str) -> StoreResult<()> {
        self.inner.ensure_online()?;
        let mut collections = self.inner.collections.write();
        if collections.contains_key(name) {
            return Err(StoreError::Command(format!(
                "Collection {name} already exists"
            )));
        }
        collections.insert(name.to_string(), Collection::new(name));
        Ok(())
    }

    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>> {
        self.inner.ensure_online()?;
        let collections = self.inner.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::Command(format!("ns does not exist: {collection}")))?;

        let mut indexes = vec![IndexModel {
            keys: doc! { "_id": 1 },
            unique: true,
            name: Some("_id_".to_string()),
        }];
        indexes.extend(coll.indexes().iter().cloned());
        Ok(indexes)
    }

    fn create_indexes(&self, collection: &str, indexes: &[IndexModel]) -> StoreResult<()> {
        self.inner.ensure_online()?;
        let mut collections = self.inner.collections.write();
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection::new(collection));
        for index in indexes {
            coll.create_index(index)?;
        }
        Ok(())
    }

    fn bulk_write(
        &self,
        collection: &str,
        models: &[WriteModel],
        ordered: bool,
    ) -> Result<BulkWriteResult, BulkWriteError> {
        self.inner.ensure_online()?;
        self.inner.counters.bulk_writes.fetch_add(1, Ordering::SeqCst);

        let mut collections = self.inner.collections.write();
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection::new(collection));

        let mut result = BulkWriteResult::default();
        let mut errors = Vec::new();
        for (index, model) in models.iter().enumerate() {
            let applied = match model {
                WriteModel::InsertOne { document } => coll.insert(document),
                WriteModel::UpdateMany {
                    filter,
                    update,
                    upsert,
                } => coll.update_many(filter, update, *upsert),
                WriteModel::DeleteMany { filter } => coll.delete_many(filter),
            };
            match applied {
                Ok(counts) => result.merge(&counts),
                Err((code, message)) => {
                    errors.push(WriteError {
                        index,
                        code,
                        message,
                    });
                    if ordered {
                        break;
                    }
                }
            }
        }

        debug!(
            collection,
            submitted = models.len(),
            rejected = errors.len(),
            "memory_bulk_write"
        );

        if errors.is_empty() {
            Ok(result)
        } else {
            Err(BulkWriteError::Partial { result, errors })
        }
    }

    fn find(&self, collection: &str, filter: &Document) -> StoreResult<DocumentCursor> {
        self.inner.ensure_online()?;
        self.inner.counters.finds.fetch_add(1, Ordering::SeqCst);

        let found = match self.inner.collections.read().get(collection) {
            Some(coll) => coll.find(filter)?,
            None => Vec::new(),
        };
        Ok(Box::new(MemoryCursor::new(Arc::clone(&self.inner), found)))
    }

    fn count_documents(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        self.inner.ensure_online()?;
        self.inner.counters.counts.fetch_add(1, Ordering::SeqCst);

        match self.inner.collections.read().get(collection) {
            Some(coll) => coll.count(filter),
            None => Ok(0),
        }
    }

    fn close(&self) {
        self.inner.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Cursor over a snapshot of matching documents
struct MemoryCursor {
    shared: Arc<Shared>,
    pending: VecDeque<Document>,
}

impl MemoryCursor {
    fn new(shared: Arc<Shared>, documents: Vec<Document>) -> Self {
        shared.counters.open_cursors.fetch_add(1, Ordering::SeqCst);
        MemoryCursor {
            shared,
            pending: documents.into(),
        }
    }
}

impl Iterator for MemoryCursor {
    type Item = StoreResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.shared.ensure_online() {
            return Some(Err(e));
        }
        let doc = self.pending.pop_front()?;
        self.shared
            .counters
            .documents_fetched
            .fetch_add(1, Ordering::SeqCst);
        Some(Ok(doc))
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.shared
            .counters
            .open_cursors
            .fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hands out handles to one shared [`MemoryStore`]
#[derive(Debug, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
    connects: AtomicUsize,
    delay: Option<Duration>,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        MemoryConnector {
            store,
            connects: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Make every connect take at least `delay`
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Successful connects so far
    pub fn connection_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl StoreConnector for MemoryConnector {
    fn connect(&self, uri: &str) -> StoreResult<Arc<dyn DocumentStore>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.store.inner.ensure_online()?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!(uri, "memory_store_connected");
        Ok(Arc::new(self.store.clone()))
    }
}
