//! # Streaming Record Iterator
//!
//! Pull-style view over a store cursor with one record of lookahead.
//!
//! ```text
//!            has_next()                 next_record()
//! Fresh ─────────────────► Primed(r) ───────────────► Fresh
//!   │
//!   └── cursor drained ──► Exhausted (empty records from here on)
//! ```
//!
//! `has_next` fetches at most one document until the cached record is
//! consumed. Cursor errors close the iterator and are returned once; a
//! connection error also fires the hook set by `on_connection_error`.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{TableError, TableResult};
use crate::schema::AttributeSchema;
use crate::store::DocumentCursor;
use crate::value::Record;

#[derive(Debug, Clone, PartialEq)]
enum Lookahead {
    Fresh,
    Primed(Record),
    Exhausted,
}

type ConnectionHook = Box<dyn FnOnce(&TableError) + Send>;

/// Records matching a `find`, projected onto the table schema
pub struct RecordIterator {
    cursor: Option<DocumentCursor>,
    schema: Arc<AttributeSchema>,
    state: Lookahead,
    on_connection_error: Option<ConnectionHook>,
}

impl RecordIterator {
    pub fn new(cursor: DocumentCursor, schema: Arc<AttributeSchema>) -> Self {
        RecordIterator {
            cursor: Some(cursor),
            schema,
            state: Lookahead::Fresh,
            on_connection_error: None,
        }
    }

    /// Run `hook` the first time the cursor fails with a connection error
    #[must_use]
    pub fn on_connection_error(mut self, hook: impl FnOnce(&TableError) + Send + 'static) -> Self {
        self.on_connection_error = Some(Box::new(hook));
        self
    }

    /// Whether another record is available; idempotent until the next
    /// `next_record`
    pub fn has_next(&mut self) -> TableResult<bool> {
        if self.state == Lookahead::Fresh {
            self.fetch()?;
        }
        Ok(matches!(self.state, Lookahead::Primed(_)))
    }

    /// The next record, or an empty record once the results are exhausted
    pub fn next_record(&mut self) -> TableResult<Record> {
        if self.state == Lookahead::Fresh {
            self.fetch()?;
        }
        match std::mem::replace(&mut self.state, Lookahead::Fresh) {
            Lookahead::Primed(record) => Ok(record),
            Lookahead::Exhausted | Lookahead::Fresh => {
                self.state = Lookahead::Exhausted;
                Ok(Record::empty())
            }
        }
    }

    /// Release the cursor. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.cursor.take().is_some() {
            debug!("record_cursor_closed");
        }
        self.state = Lookahead::Exhausted;
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    fn fetch(&mut self) -> TableResult<()> {
        let Some(cursor) = self.cursor.as_mut() else {
            self.state = Lookahead::Exhausted;
            return Ok(());
        };

        match cursor.next() {
            Some(Ok(doc)) => {
                self.state = Lookahead::Primed(self.schema.project(&doc));
                Ok(())
            }
            Some(Err(e)) => {
                warn!(error = %e, "record_cursor_failed");
                self.state = Lookahead::Exhausted;
                self.cursor = None;
                let err = TableError::from(e);
                if err.is_connection() {
                    if let Some(hook) = self.on_connection_error.take() {
                        hook(&err);
                    }
                }
                Err(err)
            }
            None => {
                self.state = Lookahead::Exhausted;
                self.close();
                Ok(())
            }
        }
    }
}

impl Iterator for RecordIterator {
    type Item = TableResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_record()),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl Drop for RecordIterator {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RecordIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordIterator")
            .field("state", &self.state)
            .field("closed", &self.is_closed())
            .finish()
    }
}
