//! # Bulk Mutation Executor
//!
//! Applies a batch of write models in as few round trips as possible while
//! tolerating per-item rejections.
//!
//! ## Skip and continue
//!
//! With ordered writes the store stops at the first rejected item and reports
//! its index relative to the submitted slice. The executor records a
//! [`WriteFailure`] for it and resubmits everything after it:
//!
//! ```text
//! models:  [0] [1] [2] [3] [4]
//! trip 1:  [0] [1]x                 failure at slice index 1 -> position 1
//! trip 2:          [2] [3]x         failure at slice index 1 -> position 3
//! trip 3:                  [4]      done
//! ```
//!
//! Each trip submits a strictly shorter suffix, so the loop runs at most
//! `models.len()` times. Unordered writes attempt every item in one trip and
//! are never resubmitted.
//!
//! Rejections never escape as errors; only whole-batch failures do.

use std::fmt;

use bson::Document;
use tracing::{debug, error};

use crate::error::{TableError, TableResult};
use crate::mutation::MutationKind;
use crate::store::{BulkWriteError, BulkWriteResult, DocumentStore, WriteError, WriteModel};

/// A rejected item of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFailure {
    /// Position in the caller's batch
    pub position: usize,
    pub kind: MutationKind,
    /// Filter for updates and deletes, document for inserts
    pub target: Document,
    /// Update document, for updates and upserts
    pub update: Option<Document>,
    pub code: i32,
    pub message: String,
}

impl WriteFailure {
    fn new(position: usize, model: &WriteModel, err: &WriteError) -> Self {
        let (target, update) = match model {
            WriteModel::InsertOne { document } => (document.clone(), None),
            WriteModel::UpdateMany { filter, update, .. } => (filter.clone(), Some(update.clone())),
            WriteModel::DeleteMany { filter } => (filter.clone(), None),
        };
        WriteFailure {
            position,
            kind: model.kind(),
            target,
            update,
            code: err.code,
            message: err.message.clone(),
        }
    }
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.update) {
            (MutationKind::Update | MutationKind::Upsert, Some(update)) => write!(
                f,
                "the update filter '{}' failed to update with '{}' due to {}",
                self.target, update, self.message
            ),
            (MutationKind::Insert, _) => write!(
                f,
                "the document '{}' failed to insert due to {}",
                self.target, self.message
            ),
            _ => write!(
                f,
                "the delete filter '{}' failed to delete documents due to {}",
                self.target, self.message
            ),
        }
    }
}

/// What happened to a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    /// Models in the caller's batch
    pub submitted: usize,
    pub round_trips: usize,
    /// Counts summed over all round trips
    pub result: BulkWriteResult,
    /// Rejected items, by ascending position
    pub failures: Vec<WriteFailure>,
}

impl BulkOutcome {
    /// Items not rejected
    pub fn succeeded(&self) -> usize {
        self.submitted - self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_positions(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.position).collect()
    }
}

/// Executes batches against one collection
pub struct BulkExecutor<'a> {
    store: &'a dyn DocumentStore,
    collection: &'a str,
    ordered: bool,
}

impl<'a> BulkExecutor<'a> {
    pub fn new(store: &'a dyn DocumentStore, collection: &'a str) -> Self {
        BulkExecutor {
            store,
            collection,
            ordered: true,
        }
    }

    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    /// Apply `models`, skipping rejected items
    pub fn execute(&self, models: &[WriteModel]) -> TableResult<BulkOutcome> {
        let mut outcome = BulkOutcome {
            submitted: models.len(),
            ..Default::default()
        };

        let mut offset = 0;
        while offset < models.len() {
            let slice = &models[offset..];
            outcome.round_trips += 1;

            let (result, mut errors) = match self.store.bulk_write(self.collection, slice, self.ordered) {
                Ok(result) => (result, Vec::new()),
                Err(BulkWriteError::Partial { result, errors }) => (result, errors),
                Err(BulkWriteError::Fatal(e)) => {
                    error!(
                        collection = %self.collection,
                        offset,
                        remaining = slice.len(),
                        error = %e,
                        "bulk_write_failed"
                    );
                    return Err(e.into());
                }
            };
            outcome.result.merge(&result);

            errors.sort_by_key(|e| e.index);
            errors.dedup_by_key(|e| e.index);
            for err in &errors {
                let model = slice.get(err.index).ok_or_else(|| {
                    TableError::Store(format!(
                        "store reported a failure at index {} of a {}-item batch",
                        err.index,
                        slice.len()
                    ))
                })?;
                let failure = WriteFailure::new(offset + err.index, model, err);
                error!(
                    collection = %self.collection,
                    position = failure.position,
                    kind = %failure.kind,
                    code = failure.code,
                    error = %failure,
                    "bulk_write_item_failed"
                );
                outcome.failures.push(failure);
            }

            // Indexes are relative to `slice`; resume after the last rejection
            match errors.last() {
                Some(last) if self.ordered => offset += last.index + 1,
                _ => break,
            }
        }

        debug!(
            collection = %self.collection,
            submitted = outcome.submitted,
            failed = outcome.failures.len(),
            round_trips = outcome.round_trips,
            "bulk_write_completed"
        );
        Ok(outcome)
    }
}
