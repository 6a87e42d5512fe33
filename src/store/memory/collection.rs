//! A single in-memory collection: documents plus unique-index enforcement.

use bson::oid::ObjectId;
use bson::{Bson, Document};

use super::matcher::{equality_fields, lookup, matches};
use crate::store::{BulkWriteResult, IndexModel, StoreError, StoreResult};

/// Duplicate key violation
pub(crate) const DUPLICATE_KEY: i32 = 11000;
/// Malformed filter or update
pub(crate) const BAD_VALUE: i32 = 2;
/// Update document with an unsupported modifier
pub(crate) const FAILED_TO_PARSE: i32 = 9;

/// Rejection of a single write, before it is tagged with its batch index
pub(crate) type ItemError = (i32, String);

#[derive(Debug, Clone, Default)]
pub(crate) struct Collection {
    name: String,
    documents: Vec<Document>,
    indexes: Vec<IndexModel>,
}

impl Collection {
    pub(crate) fn new(name: &str) -> Self {
        Collection {
            name: name.to_string(),
            documents: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub(crate) fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub(crate) fn indexes(&self) -> &[IndexModel] {
        &self.indexes
    }

    pub(crate) fn find(&self, filter: &Document) -> StoreResult<Vec<Document>> {
        let mut found = Vec::new();
        for doc in &self.documents {
            if matches(doc, filter)? {
                found.push(doc.clone());
            }
        }
        Ok(found)
    }

    pub(crate) fn count(&self, filter: &Document) -> StoreResult<u64> {
        let mut count = 0;
        for doc in &self.documents {
            if matches(doc, filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    pub(crate) fn create_index(&mut self, index: &IndexModel) -> StoreResult<()> {
        let name = index.effective_name();
        if let Some(existing) = self.indexes.iter().find(|i| i.effective_name() == name) {
            if existing.keys == index.keys && existing.unique == index.unique {
                return Ok(());
            }
            return Err(StoreError::Command(format!(
                "An existing index has the same name as the requested index: {name}"
            )));
        }

        if index.unique {
            for (i, doc) in self.documents.iter().enumerate() {
                let key = index_key(index, doc);
                if self.documents[i + 1..]
                    .iter()
                    .any(|other| index_key(index, other) == key)
                {
                    return Err(StoreError::Command(format!(
                        "E11000 duplicate key error collection: {} index: {name}",
                        self.name
                    )));
                }
            }
        }

        let mut stored = index.clone();
        stored.name = Some(name);
        self.indexes.push(stored);
        Ok(())
    }

    pub(crate) fn insert(&mut self, document: &Document) -> Result<BulkWriteResult, ItemError> {
        let document = with_id(document);
        self.check_unique(&document, None)?;
        self.documents.push(document);
        Ok(BulkWriteResult {
            inserted: 1,
            ..Default::default()
        })
    }

    pub(crate) fn update_many(
        &mut self,
        filter: &Document,
        update: &Document,
        upsert: bool,
    ) -> Result<BulkWriteResult, ItemError> {
        let (set, set_on_insert) = parse_update(update)?;

        let mut targets = Vec::new();
        for (i, doc) in self.documents.iter().enumerate() {
            if matches(doc, filter).map_err(bad_value)? {
                targets.push(i);
            }
        }

        let mut result = BulkWriteResult::default();
        if targets.is_empty() {
            if upsert {
                let mut seeded = equality_fields(filter);
                apply_set(&mut seeded, set);
                if let Some(on_insert) = set_on_insert {
                    apply_set(&mut seeded, on_insert);
                }
                let seeded = with_id(&seeded);
                self.check_unique(&seeded, None)?;
                self.documents.push(seeded);
                result.upserted = 1;
            }
            return Ok(result);
        }

        // Applied one by one; a violation leaves earlier matches updated
        for i in targets {
            result.matched += 1;
            let mut updated = self.documents[i].clone();
            apply_set(&mut updated, set);
            if updated == self.documents[i] {
                continue;
            }
            self.check_unique(&updated, Some(i))?;
            self.documents[i] = updated;
            result.modified += 1;
        }
        Ok(result)
    }

    pub(crate) fn delete_many(&mut self, filter: &Document) -> Result<BulkWriteResult, ItemError> {
        // Filter errors surface before any document is removed
        let mut doomed = Vec::with_capacity(self.documents.len());
        for doc in &self.documents {
            doomed.push(matches(doc, filter).map_err(bad_value)?);
        }

        let before = self.documents.len();
        let mut flags = doomed.into_iter();
        self.documents.retain(|_| !flags.next().unwrap_or(false));
        Ok(BulkWriteResult {
            deleted: (before - self.documents.len()) as u64,
            ..Default::default()
        })
    }

    /// Check `doc` against `_id` and every unique index, ignoring the
    /// document at `skip`
    fn check_unique(&self, doc: &Document, skip: Option<usize>) -> Result<(), ItemError> {
        let others = || {
            self.documents
                .iter()
                .enumerate()
                .filter(move |(i, _)| Some(*i) != skip)
                .map(|(_, d)| d)
        };

        if let Some(id) = doc.get("_id") {
            if others().any(|other| other.get("_id") == Some(id)) {
                return Err(duplicate(&self.name, "_id_", &format!("{{ _id: {id} }}")));
            }
        }

        for index in self.indexes.iter().filter(|i| i.unique) {
            let key = index_key(index, doc);
            if others().any(|other| index_key(index, other) == key) {
                let shown = index
                    .keys
                    .keys()
                    .zip(&key)
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(duplicate(
                    &self.name,
                    &index.effective_name(),
                    &format!("{{ {shown} }}"),
                ));
            }
        }
        Ok(())
    }
}

fn duplicate(collection: &str, index: &str, key: &str) -> ItemError {
    (
        DUPLICATE_KEY,
        format!("E11000 duplicate key error collection: {collection} index: {index} dup key: {key}"),
    )
}

fn bad_value(err: StoreError) -> ItemError {
    (BAD_VALUE, err.to_string())
}

/// Values of an index's key fields, missing fields as null
fn index_key(index: &IndexModel, doc: &Document) -> Vec<Bson> {
    index
        .keys
        .keys()
        .map(|field| lookup(doc, field).cloned().unwrap_or(Bson::Null))
        .collect()
}

/// Copy of `doc` with an `_id` in front, generating one when absent
fn with_id(doc: &Document) -> Document {
    let mut stored = Document::new();
    let id = doc
        .get("_id")
        .cloned()
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
    stored.insert("_id", id);
    for (key, value) in doc {
        if key != "_id" {
            stored.insert(key.clone(), value.clone());
        }
    }
    stored
}

fn parse_update(update: &Document) -> Result<(&Document, Option<&Document>), ItemError> {
    let mut set = None;
    let mut set_on_insert = None;
    for (key, value) in update {
        let Bson::Document(fields) = value else {
            return Err((
                FAILED_TO_PARSE,
                format!("Modifiers operate on fields but we found type {:?} instead", value.element_type()),
            ));
        };
        match key.as_str() {
            "$set" => set = Some(fields),
            "$setOnInsert" => set_on_insert = Some(fields),
            other => {
                return Err((FAILED_TO_PARSE, format!("Unknown modifier: {other}")));
            }
        }
    }
    let set = set.ok_or_else(|| {
        (
            FAILED_TO_PARSE,
            "Update document requires a $set modifier".to_string(),
        )
    })?;
    Ok((set, set_on_insert))
}

fn apply_set(doc: &mut Document, fields: &Document) {
    for (key, value) in fields {
        doc.insert(key.clone(), value.clone());
    }
}
