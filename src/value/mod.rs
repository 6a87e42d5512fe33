//! # Value Type System
//!
//! Typed attribute values and positional records exchanged with the host
//! engine, plus their mapping onto BSON for the document store.
//!
//! ## Design Decisions
//!
//! - **Positional records**: a [`Record`] holds one [`Value`] per schema
//!   attribute, in schema order
//! - **Declared widths**: `Int`/`Long` and `Float`/`Double` stay distinct so a
//!   projected record carries the type the table declares, not the width the
//!   store happened to keep
//! - **Explicit absence**: attributes missing from a stored document project
//!   to [`Value::Null`]
//!
//! ## Usage
//!
//! ```rust
//! use doctable::value::{AttributeType, Record, Value};
//!
//! let record = Record::new(vec![
//!     Value::string("WSO2"),
//!     Value::Float(55.6),
//!     Value::Long(100),
//! ]);
//! assert_eq!(record.len(), 3);
//!
//! // Literals are widened to the declared attribute type
//! assert_eq!(Value::Int(100).coerce_to(AttributeType::Long), Some(Value::Long(100)));
//! ```

use std::fmt;
use std::ops::Index;

use bson::Bson;
use serde::{Deserialize, Serialize};

/// Attribute types a table can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Int,
    Long,
    Float,
    Double,
    Bool,
    /// Opaque value stored as-is
    Object,
}

impl AttributeType {
    /// Check if this is one of the numeric types
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            AttributeType::Int | AttributeType::Long | AttributeType::Float | AttributeType::Double
        )
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "string" | "str" => Some(AttributeType::String),
            "int" | "integer" => Some(AttributeType::Int),
            "long" => Some(AttributeType::Long),
            "float" => Some(AttributeType::Float),
            "double" => Some(AttributeType::Double),
            "bool" | "boolean" => Some(AttributeType::Bool),
            "object" => Some(AttributeType::Object),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::String => write!(f, "string"),
            AttributeType::Int => write!(f, "int"),
            AttributeType::Long => write!(f, "long"),
            AttributeType::Float => write!(f, "float"),
            AttributeType::Double => write!(f, "double"),
            AttributeType::Bool => write!(f, "bool"),
            AttributeType::Object => write!(f, "object"),
        }
    }
}

/// A dynamically-typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// UTF-8 string
    String(String),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// Boolean value
    Bool(bool),
    /// Arbitrary store value for `object` attributes
    Object(Bson),
    /// Null/absent value
    Null,
}

impl Value {
    /// Create a string value from a &str
    pub fn string(s: &str) -> Self {
        Value::String(s.to_string())
    }

    /// Declared type this value naturally belongs to (`None` for null)
    pub fn attribute_type(&self) -> Option<AttributeType> {
        match self {
            Value::String(_) => Some(AttributeType::String),
            Value::Int(_) => Some(AttributeType::Int),
            Value::Long(_) => Some(AttributeType::Long),
            Value::Float(_) => Some(AttributeType::Float),
            Value::Double(_) => Some(AttributeType::Double),
            Value::Bool(_) => Some(AttributeType::Bool),
            Value::Object(_) => Some(AttributeType::Object),
            Value::Null => None,
        }
    }

    /// Short type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::Object(_) => "object",
            Value::Null => "null",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert to the representation an attribute of type `target` stores.
    ///
    /// Integers widen to any numeric type; floating values only convert to
    /// the floating types. `Long` narrows to `Int` when it fits. Null is
    /// accepted by every type and `object` accepts anything.
    pub fn coerce_to(&self, target: AttributeType) -> Option<Value> {
        match (target, self) {
            (_, Value::Null) => Some(Value::Null),
            (AttributeType::Object, v) => Some(v.clone()),
            (AttributeType::String, Value::String(_)) => Some(self.clone()),
            (AttributeType::Bool, Value::Bool(_)) => Some(self.clone()),
            (AttributeType::Int, Value::Int(_)) => Some(self.clone()),
            (AttributeType::Int, Value::Long(v)) => i32::try_from(*v).ok().map(Value::Int),
            (AttributeType::Long, Value::Int(v)) => Some(Value::Long(*v as i64)),
            (AttributeType::Long, Value::Long(_)) => Some(self.clone()),
            (AttributeType::Float, Value::Float(_)) => Some(self.clone()),
            (AttributeType::Float, v @ (Value::Int(_) | Value::Long(_) | Value::Double(_))) => {
                v.as_f64().map(|f| Value::Float(f as f32))
            }
            (AttributeType::Double, Value::Double(_)) => Some(self.clone()),
            (AttributeType::Double, v @ (Value::Int(_) | Value::Long(_) | Value::Float(_))) => {
                v.as_f64().map(Value::Double)
            }
            _ => None,
        }
    }

    /// Convert to the BSON value written to the store
    pub fn to_bson(&self) -> Bson {
        match self {
            Value::String(s) => Bson::String(s.clone()),
            Value::Int(v) => Bson::Int32(*v),
            Value::Long(v) => Bson::Int64(*v),
            Value::Float(v) => Bson::Double(*v as f64),
            Value::Double(v) => Bson::Double(*v),
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Object(b) => b.clone(),
            Value::Null => Bson::Null,
        }
    }

    /// Read a stored BSON value back as the declared attribute type.
    ///
    /// Values the store holds in an unexpected shape fall back to
    /// [`Value::from_bson`] instead of failing.
    pub fn from_bson_typed(bson: &Bson, declared: AttributeType) -> Value {
        match (declared, bson) {
            (_, Bson::Null | Bson::Undefined) => Value::Null,
            (AttributeType::Object, other) => Value::Object(other.clone()),
            (AttributeType::String, Bson::String(s)) => Value::String(s.clone()),
            (AttributeType::Bool, Bson::Boolean(b)) => Value::Bool(*b),
            (AttributeType::Int, Bson::Int32(v)) => Value::Int(*v),
            (AttributeType::Int, Bson::Int64(v)) if i32::try_from(*v).is_ok() => {
                Value::Int(*v as i32)
            }
            (AttributeType::Long, Bson::Int32(v)) => Value::Long(*v as i64),
            (AttributeType::Long, Bson::Int64(v)) => Value::Long(*v),
            (AttributeType::Float, Bson::Double(v)) => Value::Float(*v as f32),
            (AttributeType::Float, Bson::Int32(v)) => Value::Float(*v as f32),
            (AttributeType::Float, Bson::Int64(v)) => Value::Float(*v as f32),
            (AttributeType::Double, Bson::Double(v)) => Value::Double(*v),
            (AttributeType::Double, Bson::Int32(v)) => Value::Double(*v as f64),
            (AttributeType::Double, Bson::Int64(v)) => Value::Double(*v as f64),
            (_, other) => Value::from_bson(other),
        }
    }

    /// Read a stored BSON value without a declared type
    pub fn from_bson(bson: &Bson) -> Value {
        match bson {
            Bson::String(s) => Value::String(s.clone()),
            Bson::Int32(v) => Value::Int(*v),
            Bson::Int64(v) => Value::Long(*v),
            Bson::Double(v) => Value::Double(*v),
            Bson::Boolean(b) => Value::Bool(*b),
            Bson::Null | Bson::Undefined => Value::Null,
            other => Value::Object(other.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}L"),
            Value::Float(v) => write!(f, "{v}F"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Object(b) => write!(f, "{b}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

// Convenience conversions
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A positional record: one value per schema attribute, in schema order.
///
/// An empty record is the iterator's "no more records" signal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Record { values }
    }

    /// The "no more records" marker
    pub fn empty() -> Self {
        Record { values: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Record::new(values)
    }
}

impl Index<usize> for Record {
    type Output = Value;

    fn index(&self, position: usize) -> &Value {
        &self.values[position]
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_type_parse() {
        assert_eq!(AttributeType::parse("STRING"), Some(AttributeType::String));
        assert_eq!(AttributeType::parse("long"), Some(AttributeType::Long));
        assert_eq!(AttributeType::parse("boolean"), Some(AttributeType::Bool));
        assert_eq!(AttributeType::parse("decimal"), None);
    }

    #[test]
    fn test_coerce_integer_widening() {
        assert_eq!(Value::Int(7).coerce_to(AttributeType::Long), Some(Value::Long(7)));
        assert_eq!(Value::Int(7).coerce_to(AttributeType::Double), Some(Value::Double(7.0)));
        assert_eq!(Value::Long(7).coerce_to(AttributeType::Int), Some(Value::Int(7)));
        assert_eq!(Value::Long(i64::MAX).coerce_to(AttributeType::Int), None);
    }

    #[test]
    fn test_coerce_float_never_becomes_integer() {
        assert_eq!(Value::Double(1.0).coerce_to(AttributeType::Int), None);
        assert_eq!(Value::Float(1.5).coerce_to(AttributeType::Long), None);
        assert_eq!(
            Value::Double(55.6).coerce_to(AttributeType::Float),
            Some(Value::Float(55.6))
        );
    }

    #[test]
    fn test_coerce_rejects_cross_family() {
        assert_eq!(Value::string("x").coerce_to(AttributeType::Int), None);
        assert_eq!(Value::Int(1).coerce_to(AttributeType::String), None);
        assert_eq!(Value::Bool(true).coerce_to(AttributeType::Double), None);
        assert_eq!(Value::Null.coerce_to(AttributeType::Bool), Some(Value::Null));
        assert_eq!(
            Value::string("x").coerce_to(AttributeType::Object),
            Some(Value::string("x"))
        );
    }

    #[test]
    fn test_float_survives_store_representation() {
        // f32 -> Double -> f32 must give back the same float
        let stored = Value::Float(55.6).to_bson();
        assert!(matches!(stored, Bson::Double(_)));
        assert_eq!(
            Value::from_bson_typed(&stored, AttributeType::Float),
            Value::Float(55.6)
        );
    }

    #[test]
    fn test_from_bson_typed_widths() {
        assert_eq!(
            Value::from_bson_typed(&Bson::Int32(100), AttributeType::Long),
            Value::Long(100)
        );
        assert_eq!(
            Value::from_bson_typed(&Bson::Int64(5), AttributeType::Int),
            Value::Int(5)
        );
        assert_eq!(
            Value::from_bson_typed(&Bson::Null, AttributeType::String),
            Value::Null
        );
        // Unexpected shape falls back to the untyped reading
        assert_eq!(
            Value::from_bson_typed(&Bson::String("oops".into()), AttributeType::Int),
            Value::string("oops")
        );
    }

    #[test]
    fn test_record_display() {
        let record = Record::new(vec![Value::string("IBM"), Value::Float(75.5), Value::Long(100)]);
        assert_eq!(record.to_string(), "(\"IBM\", 75.5F, 100L)");
        assert!(Record::empty().is_empty());
        assert_eq!(record[0], Value::string("IBM"));
    }
}
