//! Table Error Types

use thiserror::Error;

use crate::store::StoreError;
use crate::value::AttributeType;

/// Errors surfaced by table operations
///
/// Compile-time (`SchemaMismatch`, `UnknownAttribute`, `InvalidCondition`) and
/// resolve-time (`MissingParameter`) errors abort only the call that raised
/// them. Per-item bulk write failures are never reported through this type;
/// they are collected in [`crate::bulk::BulkOutcome`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    /// A literal or value is incompatible with the attribute's declared type
    #[error("Attribute '{attribute}' is declared as {expected} but was given {found}")]
    SchemaMismatch {
        attribute: String,
        expected: AttributeType,
        found: String,
    },

    /// Attribute name not present in the table schema
    #[error("Unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// Condition parameter without a bound value
    #[error("No value bound for condition parameter '{0}'")]
    MissingParameter(String),

    /// Expression shape the compiler cannot translate
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// Record length differs from the schema length
    #[error("Record has {found} values but the table defines {expected} attributes")]
    RecordArity { expected: usize, found: usize },

    /// Caller-supplied arguments are inconsistent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Store handle could not be established, or a whole batch failed for
    /// connectivity/authorization reasons
    #[error("Connection error: {0}")]
    Connection(String),

    /// Any other store-side failure
    #[error("Store error: {0}")]
    Store(String),

    /// Collection or index creation failed
    #[error("Bootstrap failed for collection '{collection}': {message}")]
    Bootstrap { collection: String, message: String },

    /// Configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TableError {
    /// Whether the cached store handle should be dropped after this error
    pub fn is_connection(&self) -> bool {
        matches!(self, TableError::Connection(_))
    }
}

impl From<StoreError> for TableError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(_) | StoreError::Unauthorized(_) => {
                TableError::Connection(err.to_string())
            }
            StoreError::Query(_) | StoreError::Command(_) => TableError::Store(err.to_string()),
        }
    }
}

impl From<figment::Error> for TableError {
    fn from(err: figment::Error) -> Self {
        TableError::Config(err.to_string())
    }
}

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;
