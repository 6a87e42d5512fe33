//! Mutation requests and their translation into store write models.

use std::collections::HashMap;
use std::fmt;

use bson::Document;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::condition::{resolve, CompiledCondition, ParameterMap};
use crate::error::{TableError, TableResult};
use crate::schema::AttributeSchema;
use crate::store::WriteModel;
use crate::value::Record;

/// New attribute values of an update, keyed by attribute name
pub type UpdateSet = HashMap<String, crate::value::Value>;

/// Kind of a mutation, as reported in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    Insert,
    Delete,
    Update,
    Upsert,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Insert => write!(f, "insert"),
            MutationKind::Delete => write!(f, "delete"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Upsert => write!(f, "upsert"),
        }
    }
}

/// One item of a mutation batch
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRequest {
    Insert(Record),
    Delete(ParameterMap),
    Update {
        parameters: ParameterMap,
        values: UpdateSet,
    },
    Upsert {
        parameters: ParameterMap,
        values: UpdateSet,
        /// Complete record whose remaining attributes fill a new document
        seed: Option<Record>,
    },
}

impl MutationRequest {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationRequest::Insert(_) => MutationKind::Insert,
            MutationRequest::Delete(_) => MutationKind::Delete,
            MutationRequest::Update { .. } => MutationKind::Update,
            MutationRequest::Upsert { .. } => MutationKind::Upsert,
        }
    }

    /// Build the write model, resolving the condition for filtered kinds
    pub fn to_write_model(
        &self,
        schema: &AttributeSchema,
        condition: Option<&CompiledCondition>,
    ) -> TableResult<WriteModel> {
        match self {
            MutationRequest::Insert(record) => {
                let document = schema.record_to_document(record)?;
                debug!(document = %document, "insert_document_built");
                Ok(WriteModel::InsertOne { document })
            }
            MutationRequest::Delete(parameters) => Ok(WriteModel::DeleteMany {
                filter: filter_for(self.kind(), condition, parameters)?,
            }),
            MutationRequest::Update { parameters, values } => Ok(WriteModel::UpdateMany {
                filter: filter_for(self.kind(), condition, parameters)?,
                update: update_document(schema, values, None)?,
                upsert: false,
            }),
            MutationRequest::Upsert {
                parameters,
                values,
                seed,
            } => Ok(WriteModel::UpdateMany {
                filter: filter_for(self.kind(), condition, parameters)?,
                update: update_document(schema, values, seed.as_ref())?,
                upsert: true,
            }),
        }
    }
}

fn filter_for(
    kind: MutationKind,
    condition: Option<&CompiledCondition>,
    parameters: &ParameterMap,
) -> TableResult<Document> {
    let condition = condition.ok_or_else(|| {
        TableError::InvalidArgument(format!("{kind} requires a compiled condition"))
    })?;
    let filter = resolve(condition, parameters)?;
    debug!(kind = %kind, filter = %filter, "filter_resolved");
    Ok(filter)
}

/// `{"$set": values}`, plus `{"$setOnInsert": seed - values}` for upserts
fn update_document(
    schema: &AttributeSchema,
    values: &UpdateSet,
    seed: Option<&Record>,
) -> TableResult<Document> {
    if values.is_empty() {
        return Err(TableError::InvalidArgument(
            "update requires at least one attribute to set".to_string(),
        ));
    }

    let mut update = Document::new();
    update.insert("$set", schema.update_document(values)?);

    if let Some(seed) = seed {
        let full = schema.record_to_document(seed)?;
        let mut on_insert = Document::new();
        for (name, value) in full {
            if !values.contains_key(&name) {
                on_insert.insert(name, value);
            }
        }
        if !on_insert.is_empty() {
            update.insert("$setOnInsert", on_insert);
        }
    }
    Ok(update)
}
