//! # Table Schema
//!
//! Ordered, typed attribute lists and the table definition the connector is
//! built from.
//!
//! The schema owns the mapping between positional [`Record`]s and the
//! name-keyed documents the store holds:
//!
//! - [`AttributeSchema::record_to_document`] validates arity and types before
//!   anything reaches the store
//! - [`AttributeSchema::project`] reads a stored document back in schema
//!   order, absent attributes becoming null
//!
//! ## Example
//!
//! ```rust
//! use doctable::schema::{AttributeSchema, IndexDeclaration, TableDefinition};
//! use doctable::value::AttributeType;
//!
//! let schema = AttributeSchema::new(vec![
//!     ("symbol", AttributeType::String),
//!     ("price", AttributeType::Float),
//!     ("volume", AttributeType::Long),
//! ])
//! .unwrap();
//!
//! let table = TableDefinition::new("StockTable", schema)
//!     .with_primary_key(["symbol"])
//!     .with_index(IndexDeclaration::ascending(["price"]));
//! assert_eq!(table.schema().position("volume"), Some(2));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bson::Document;
use serde::{Deserialize, Serialize};

use crate::error::{TableError, TableResult};
use crate::mutation::UpdateSet;
use crate::value::{AttributeType, Record, Value};

/// A named, typed attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub attr_type: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Attribute {
            name: name.into(),
            attr_type,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.attr_type)
    }
}

/// Ordered attribute list of a table
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSchema {
    attributes: Vec<Attribute>,
    positions: HashMap<String, usize>,
}

impl AttributeSchema {
    /// Build a schema; at least one attribute, names unique
    pub fn new<N: Into<String>>(
        attributes: impl IntoIterator<Item = (N, AttributeType)>,
    ) -> TableResult<Self> {
        let attributes: Vec<Attribute> = attributes
            .into_iter()
            .map(|(name, ty)| Attribute::new(name, ty))
            .collect();
        // An empty projection is indistinguishable from the end-of-results record
        if attributes.is_empty() {
            return Err(TableError::InvalidArgument(
                "a table needs at least one attribute".to_string(),
            ));
        }

        let mut positions = HashMap::with_capacity(attributes.len());
        for (i, attr) in attributes.iter().enumerate() {
            if positions.insert(attr.name.clone(), i).is_some() {
                return Err(TableError::InvalidArgument(format!(
                    "duplicate attribute '{}'",
                    attr.name
                )));
            }
        }

        Ok(AttributeSchema {
            attributes,
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Position of an attribute by name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.position(name).map(|i| &self.attributes[i])
    }

    /// Look up an attribute, failing with `UnknownAttribute`
    pub fn require(&self, name: &str) -> TableResult<&Attribute> {
        self.attribute(name)
            .ok_or_else(|| TableError::UnknownAttribute(name.to_string()))
    }

    /// Check a value against an attribute and return its stored form
    pub fn check_value(attr: &Attribute, value: &Value) -> TableResult<Value> {
        value
            .coerce_to(attr.attr_type)
            .ok_or_else(|| TableError::SchemaMismatch {
                attribute: attr.name.clone(),
                expected: attr.attr_type,
                found: value.type_name().to_string(),
            })
    }

    /// Map a positional record to a document keyed by attribute name
    pub fn record_to_document(&self, record: &Record) -> TableResult<Document> {
        if record.len() != self.len() {
            return Err(TableError::RecordArity {
                expected: self.len(),
                found: record.len(),
            });
        }

        let mut doc = Document::new();
        for (attr, value) in self.attributes.iter().zip(record.values()) {
            let stored = Self::check_value(attr, value)?;
            doc.insert(attr.name.clone(), stored.to_bson());
        }
        Ok(doc)
    }

    /// Project a stored document onto the schema, in schema order
    pub fn project(&self, doc: &Document) -> Record {
        let values = self
            .attributes
            .iter()
            .map(|attr| match doc.get(&attr.name) {
                Some(bson) => Value::from_bson_typed(bson, attr.attr_type),
                None => Value::Null,
            })
            .collect();
        Record::new(values)
    }

    /// Build the field assignments of an update, in schema order
    pub fn update_document(&self, values: &UpdateSet) -> TableResult<Document> {
        for name in values.keys() {
            self.require(name)?;
        }

        let mut doc = Document::new();
        for attr in &self.attributes {
            if let Some(value) = values.get(&attr.name) {
                let stored = Self::check_value(attr, value)?;
                doc.insert(attr.name.clone(), stored.to_bson());
            }
        }
        Ok(doc)
    }
}

impl fmt::Display for AttributeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{attr}")?;
        }
        write!(f, ")")
    }
}

/// Sort direction of an index key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOrder {
    #[default]
    Ascending,
    Descending,
}

impl IndexOrder {
    /// Key direction as written in an index specification
    pub fn direction(self) -> i32 {
        match self {
            IndexOrder::Ascending => 1,
            IndexOrder::Descending => -1,
        }
    }
}

/// Secondary index declared on a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDeclaration {
    pub fields: Vec<(String, IndexOrder)>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDeclaration {
    pub fn new(fields: Vec<(String, IndexOrder)>) -> Self {
        IndexDeclaration {
            fields,
            unique: false,
        }
    }

    /// Ascending index over the given attributes
    pub fn ascending<N: Into<String>>(fields: impl IntoIterator<Item = N>) -> Self {
        Self::new(
            fields
                .into_iter()
                .map(|f| (f.into(), IndexOrder::Ascending))
                .collect(),
        )
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Everything the connector needs to know about one table
#[derive(Debug, Clone)]
pub struct TableDefinition {
    /// Table identifier, also the default collection name
    pub id: String,
    schema: Arc<AttributeSchema>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexDeclaration>,
}

impl TableDefinition {
    pub fn new(id: impl Into<String>, schema: AttributeSchema) -> Self {
        TableDefinition {
            id: id.into(),
            schema: Arc::new(schema),
            primary_key: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn with_primary_key<N: Into<String>>(mut self, keys: impl IntoIterator<Item = N>) -> Self {
        self.primary_key = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_index(mut self, index: IndexDeclaration) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    pub fn shared_schema(&self) -> Arc<AttributeSchema> {
        Arc::clone(&self.schema)
    }
}
