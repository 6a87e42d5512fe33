//! Condition Compiler
//!
//! Translates an [`Expression`] into a reusable filter template. Parameters
//! become numbered slots, filled in later by [`super::resolve`]; literals are
//! checked against the schema and inlined.
//!
//! ## Translation
//!
//! | Expression                     | Filter shape                          |
//! |--------------------------------|---------------------------------------|
//! | `a AND b`                      | `{"$and": [a, b]}` (nested ANDs flatten) |
//! | `a OR b`                       | `{"$or": [a, b]}` (nested ORs flatten) |
//! | `NOT a`                        | `{"$nor": [a]}`                       |
//! | `attr op value`                | `{"attr": {"$op": value}}`            |
//! | `value op attr`                | `{"attr": {"$flipped": value}}`       |
//! | `attr1 op attr2`               | `{"$expr": {"$op": ["$attr1", "$attr2"]}}` |
//! | `value op value`               | `{"$expr": {"$op": [{"$literal": ..}, ..]}}` |
//! | bare boolean attribute         | `{"attr": {"$eq": true}}`             |
//! | `true`                         | `{}`                                  |
//! | `false` / bare parameter       | `{"$expr": {"$literal": value}}`      |

use std::fmt;

use bson::{Bson, Document};

use super::resolver::render;
use super::{CompareOp, Expression};
use crate::error::{TableError, TableResult};
use crate::schema::{Attribute, AttributeSchema};
use crate::value::{AttributeType, Value};

/// Marker key used when a template is shown with its slots unfilled
pub const PLACEHOLDER_KEY: &str = "$placeholder";

/// A value position in the template
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Constant(Bson),
    /// Index into the placeholder list
    Slot(usize),
}

/// One side of a `$expr` comparison
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExprOperand {
    Field(String),
    Value(Operand),
}

/// Compiled filter tree with unfilled slots
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FilterNode {
    MatchAll,
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Nor(Vec<FilterNode>),
    Field {
        path: String,
        op: CompareOp,
        operand: Operand,
    },
    Expr {
        op: CompareOp,
        left: ExprOperand,
        right: ExprOperand,
    },
    /// Matches everything or nothing depending on the operand's truthiness
    Truth(Operand),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Placeholder {
    pub(crate) name: String,
    /// Declared type of the attribute the parameter is compared against
    pub(crate) coerce_to: Option<AttributeType>,
}

/// Compiled filter template plus its ordered placeholder bindings.
///
/// Immutable once built; share it freely and resolve it concurrently with
/// different parameter maps.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition {
    pub(crate) template: FilterNode,
    pub(crate) placeholders: Vec<Placeholder>,
}

impl CompiledCondition {
    /// Parameter name of every slot, in slot order. A parameter referenced
    /// twice appears twice.
    pub fn placeholders(&self) -> Vec<&str> {
        self.placeholders.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    /// Whether the condition needs no parameters at all
    pub fn is_constant(&self) -> bool {
        self.placeholders.is_empty()
    }

    /// The template with each slot shown as `{"$placeholder": name}`
    pub fn template_document(&self) -> Document {
        let markers: Vec<Bson> = self
            .placeholders
            .iter()
            .map(|p| {
                let mut marker = Document::new();
                marker.insert(PLACEHOLDER_KEY, p.name.clone());
                Bson::Document(marker)
            })
            .collect();
        render(&self.template, &markers)
    }
}

impl fmt::Display for CompiledCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.template_document())
    }
}

/// Compile an expression against a schema
pub fn compile(schema: &AttributeSchema, expr: &Expression) -> TableResult<CompiledCondition> {
    let mut compiler = Compiler {
        schema,
        placeholders: Vec::new(),
    };
    let template = compiler.condition(expr)?;
    Ok(CompiledCondition {
        template,
        placeholders: compiler.placeholders,
    })
}

/// Operand of a comparison, classified
enum Side<'a> {
    Field(&'a Attribute),
    Parameter(&'a str),
    Literal(&'a Value),
}

struct Compiler<'s> {
    schema: &'s AttributeSchema,
    placeholders: Vec<Placeholder>,
}

impl<'s> Compiler<'s> {
    fn condition(&mut self, expr: &Expression) -> TableResult<FilterNode> {
        match expr {
            Expression::And(l, r) => {
                let mut children = Vec::new();
                for side in [l, r] {
                    match self.condition(side)? {
                        FilterNode::And(nested) => children.extend(nested),
                        node => children.push(node),
                    }
                }
                Ok(FilterNode::And(children))
            }
            Expression::Or(l, r) => {
                let mut children = Vec::new();
                for side in [l, r] {
                    match self.condition(side)? {
                        FilterNode::Or(nested) => children.extend(nested),
                        node => children.push(node),
                    }
                }
                Ok(FilterNode::Or(children))
            }
            Expression::Not(inner) => Ok(FilterNode::Nor(vec![self.condition(inner)?])),
            Expression::Compare { op, left, right } => self.comparison(*op, left, right),
            Expression::Attribute(name) => {
                let attr = self.schema.require(name)?;
                if attr.attr_type != AttributeType::Bool {
                    return Err(TableError::InvalidCondition(format!(
                        "attribute '{name}' of type {} used as a condition",
                        attr.attr_type
                    )));
                }
                Ok(FilterNode::Field {
                    path: attr.name.clone(),
                    op: CompareOp::Eq,
                    operand: Operand::Constant(Bson::Boolean(true)),
                })
            }
            Expression::Parameter(name) => {
                let slot = self.allocate(name, Some(AttributeType::Bool));
                Ok(FilterNode::Truth(Operand::Slot(slot)))
            }
            Expression::Literal(Value::Bool(true)) => Ok(FilterNode::MatchAll),
            Expression::Literal(Value::Bool(false)) => {
                Ok(FilterNode::Truth(Operand::Constant(Bson::Boolean(false))))
            }
            Expression::Literal(other) => Err(TableError::InvalidCondition(format!(
                "literal {other} is not a boolean condition"
            ))),
        }
    }

    fn comparison(
        &mut self,
        op: CompareOp,
        left: &Expression,
        right: &Expression,
    ) -> TableResult<FilterNode> {
        let left = self.side(left)?;
        let right = self.side(right)?;

        match (left, right) {
            (Side::Field(a), Side::Field(b)) => Ok(FilterNode::Expr {
                op,
                left: ExprOperand::Field(a.name.clone()),
                right: ExprOperand::Field(b.name.clone()),
            }),
            (Side::Field(attr), other) => Ok(FilterNode::Field {
                path: attr.name.clone(),
                op,
                operand: self.operand(other, Some(attr))?,
            }),
            (other, Side::Field(attr)) => Ok(FilterNode::Field {
                path: attr.name.clone(),
                op: op.flipped(),
                operand: self.operand(other, Some(attr))?,
            }),
            (l, r) => {
                let left = ExprOperand::Value(self.operand(l, None)?);
                let right = ExprOperand::Value(self.operand(r, None)?);
                Ok(FilterNode::Expr { op, left, right })
            }
        }
    }

    fn side<'e>(&self, expr: &'e Expression) -> TableResult<Side<'e>>
    where
        's: 'e,
    {
        match expr {
            Expression::Attribute(name) => Ok(Side::Field(self.schema.require(name)?)),
            Expression::Parameter(name) => Ok(Side::Parameter(name)),
            Expression::Literal(value) => Ok(Side::Literal(value)),
            nested => Err(TableError::InvalidCondition(format!(
                "cannot compare the boolean expression {nested}"
            ))),
        }
    }

    fn operand(&mut self, side: Side<'_>, attr: Option<&Attribute>) -> TableResult<Operand> {
        match side {
            Side::Parameter(name) => {
                let slot = self.allocate(name, attr.map(|a| a.attr_type));
                Ok(Operand::Slot(slot))
            }
            Side::Literal(value) => match attr {
                Some(attr) => {
                    let typed = AttributeSchema::check_value(attr, value)?;
                    Ok(Operand::Constant(typed.to_bson()))
                }
                None => Ok(Operand::Constant(value.to_bson())),
            },
            Side::Field(attr) => Err(TableError::InvalidCondition(format!(
                "attribute '{}' in value position",
                attr.name
            ))),
        }
    }

    fn allocate(&mut self, name: &str, coerce_to: Option<AttributeType>) -> usize {
        self.placeholders.push(Placeholder {
            name: name.to_string(),
            coerce_to,
        });
        self.placeholders.len() - 1
    }
}
