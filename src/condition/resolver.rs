//! Filter Resolver
//!
//! Fills the slots of a [`CompiledCondition`] from a parameter map. Pure and
//! allocation-only; one template can be resolved from many threads at once.

use bson::{Bson, Document};

use super::compiler::{CompiledCondition, ExprOperand, FilterNode, Operand};
use super::ParameterMap;
use crate::error::{TableError, TableResult};

/// Bind every placeholder and render the concrete filter
pub fn resolve(condition: &CompiledCondition, parameters: &ParameterMap) -> TableResult<Document> {
    let mut bound = Vec::with_capacity(condition.placeholders.len());
    for placeholder in &condition.placeholders {
        let value = parameters
            .get(&placeholder.name)
            .ok_or_else(|| TableError::MissingParameter(placeholder.name.clone()))?;

        // A value that does not fit the attribute is compared as given
        let typed = placeholder
            .coerce_to
            .and_then(|ty| value.coerce_to(ty))
            .unwrap_or_else(|| value.clone());
        bound.push(typed.to_bson());
    }
    Ok(render(&condition.template, &bound))
}

/// Render a filter tree, taking slot values from `slots`
pub(crate) fn render(node: &FilterNode, slots: &[Bson]) -> Document {
    let mut doc = Document::new();
    match node {
        FilterNode::MatchAll => {}
        FilterNode::And(children) => {
            doc.insert("$and", render_all(children, slots));
        }
        FilterNode::Or(children) => {
            doc.insert("$or", render_all(children, slots));
        }
        FilterNode::Nor(children) => {
            doc.insert("$nor", render_all(children, slots));
        }
        FilterNode::Field { path, op, operand } => {
            let mut clause = Document::new();
            clause.insert(op.operator(), operand_value(operand, slots));
            doc.insert(path.clone(), clause);
        }
        FilterNode::Expr { op, left, right } => {
            let mut clause = Document::new();
            clause.insert(
                op.operator(),
                Bson::Array(vec![
                    expr_operand(left, slots),
                    expr_operand(right, slots),
                ]),
            );
            doc.insert("$expr", clause);
        }
        FilterNode::Truth(operand) => {
            doc.insert("$expr", literal(operand_value(operand, slots)));
        }
    }
    doc
}

fn render_all(children: &[FilterNode], slots: &[Bson]) -> Bson {
    Bson::Array(
        children
            .iter()
            .map(|child| Bson::Document(render(child, slots)))
            .collect(),
    )
}

fn operand_value(operand: &Operand, slots: &[Bson]) -> Bson {
    match operand {
        Operand::Constant(value) => value.clone(),
        Operand::Slot(i) => slots.get(*i).cloned().unwrap_or(Bson::Null),
    }
}

fn expr_operand(operand: &ExprOperand, slots: &[Bson]) -> Bson {
    match operand {
        ExprOperand::Field(path) => Bson::String(format!("${path}")),
        ExprOperand::Value(value) => literal(operand_value(value, slots)),
    }
}

fn literal(value: Bson) -> Bson {
    let mut doc = Document::new();
    doc.insert("$literal", value);
    Bson::Document(doc)
}
