//! # Condition Expressions
//!
//! Store-agnostic boolean expressions over table attributes, runtime
//! parameters and literals.
//!
//! ```text
//! Expression ──compile──► CompiledCondition ──resolve(params)──► filter Document
//!                (once per shape)               (once per invocation)
//! ```
//!
//! The node set is closed, so the compiler is a single exhaustive match
//! instead of a visitor.
//!
//! ## Example
//!
//! ```rust
//! use doctable::condition::Expression;
//!
//! // symbol == :sym AND price > 50.0
//! let cond = Expression::and(
//!     Expression::equals(Expression::attribute("symbol"), Expression::parameter("sym")),
//!     Expression::greater_than(Expression::attribute("price"), Expression::literal(50.0_f32)),
//! );
//! assert_eq!(cond.parameters(), vec!["sym"]);
//! ```

pub mod compiler;
pub mod resolver;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

pub use compiler::{compile, CompiledCondition};
pub use resolver::resolve;

/// Runtime parameter bindings, keyed by parameter name
pub type ParameterMap = HashMap<String, Value>;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Filter operator token for this comparison
    pub fn operator(self) -> &'static str {
        match self {
            CompareOp::Eq => "$eq",
            CompareOp::Ne => "$ne",
            CompareOp::Lt => "$lt",
            CompareOp::Le => "$lte",
            CompareOp::Gt => "$gt",
            CompareOp::Ge => "$gte",
        }
    }

    /// Operator with its operands swapped: `a < b` is `b > a`
    pub fn flipped(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        write!(f, "{symbol}")
    }
}

/// Condition expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Reference to a table attribute
    Attribute(String),
    /// Named value bound per invocation
    Parameter(String),
    Literal(Value),
}

impl Expression {
    pub fn attribute(name: impl Into<String>) -> Self {
        Expression::Attribute(name.into())
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Expression::Parameter(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equals(left: Expression, right: Expression) -> Self {
        Self::compare(CompareOp::Eq, left, right)
    }

    pub fn not_equals(left: Expression, right: Expression) -> Self {
        Self::compare(CompareOp::Ne, left, right)
    }

    pub fn less_than(left: Expression, right: Expression) -> Self {
        Self::compare(CompareOp::Lt, left, right)
    }

    pub fn less_or_equal(left: Expression, right: Expression) -> Self {
        Self::compare(CompareOp::Le, left, right)
    }

    pub fn greater_than(left: Expression, right: Expression) -> Self {
        Self::compare(CompareOp::Gt, left, right)
    }

    pub fn greater_or_equal(left: Expression, right: Expression) -> Self {
        Self::compare(CompareOp::Ge, left, right)
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Or(Box::new(left), Box::new(right))
    }

    pub fn negate(inner: Expression) -> Self {
        Expression::Not(Box::new(inner))
    }

    /// Distinct parameter names, in first-occurrence order
    pub fn parameters(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_parameters(&mut names);
        names
    }

    fn collect_parameters<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expression::And(l, r) | Expression::Or(l, r) => {
                l.collect_parameters(names);
                r.collect_parameters(names);
            }
            Expression::Compare { left, right, .. } => {
                left.collect_parameters(names);
                right.collect_parameters(names);
            }
            Expression::Not(inner) => inner.collect_parameters(names),
            Expression::Parameter(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expression::Attribute(_) | Expression::Literal(_) => {}
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::And(l, r) => write!(f, "({l} AND {r})"),
            Expression::Or(l, r) => write!(f, "({l} OR {r})"),
            Expression::Not(inner) => write!(f, "NOT {inner}"),
            Expression::Compare { op, left, right } => write!(f, "{left} {op} {right}"),
            Expression::Attribute(name) => write!(f, "{name}"),
            Expression::Parameter(name) => write!(f, ":{name}"),
            Expression::Literal(v) => write!(f, "{v}"),
        }
    }
}
