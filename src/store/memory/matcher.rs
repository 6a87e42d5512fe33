//! Filter evaluation for the in-memory store.
//!
//! Supports the subset of the document filter language the table layer
//! emits: `$and`/`$or`/`$nor`, field operators `$eq $ne $lt $lte $gt $gte`,
//! implicit equality and `$expr` with field paths and `$literal`.

use std::cmp::Ordering;

use bson::{Bson, Document};

use crate::store::{StoreError, StoreResult};

/// Maximum nesting depth of a filter
const MAX_FILTER_DEPTH: usize = 64;

/// Evaluate `filter` against `doc`
pub(crate) fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    matches_inner(doc, filter, 0)
}

fn matches_inner(doc: &Document, filter: &Document, depth: usize) -> StoreResult<bool> {
    if depth > MAX_FILTER_DEPTH {
        return Err(StoreError::Query(format!(
            "filter nesting exceeds maximum depth of {MAX_FILTER_DEPTH}"
        )));
    }

    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches_inner(doc, clause, depth + 1)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches_inner(doc, clause, depth + 1)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches_inner(doc, clause, depth + 1)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            "$expr" => is_truthy(&evaluate(doc, condition, depth + 1)?),
            op if op.starts_with('$') => {
                return Err(StoreError::Query(format!("unknown top level operator: {op}")));
            }
            path => matches_field(lookup(doc, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Sub-filters of a logical operator; must be a non-empty array of documents
fn clauses<'a>(op: &str, value: &'a Bson) -> StoreResult<Vec<&'a Document>> {
    let Bson::Array(items) = value else {
        return Err(StoreError::Query(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(StoreError::Query(format!("{op} must be a nonempty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d),
            _ => Err(StoreError::Query(format!("{op} entries must be documents"))),
        })
        .collect()
}

fn matches_field(value: Option<&Bson>, condition: &Bson) -> StoreResult<bool> {
    let actual = value.unwrap_or(&Bson::Null);

    let operators = match condition {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => d,
        expected => return Ok(compare(actual, expected) == Some(Ordering::Equal)),
    };

    for (op, operand) in operators {
        if !apply_operator(op, actual, operand)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn apply_operator(op: &str, left: &Bson, right: &Bson) -> StoreResult<bool> {
    let ordering = compare(left, right);
    let result = match op {
        "$eq" => ordering == Some(Ordering::Equal),
        "$ne" => ordering != Some(Ordering::Equal),
        "$lt" => ordering == Some(Ordering::Less),
        "$lte" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        "$gt" => ordering == Some(Ordering::Greater),
        "$gte" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        unknown => return Err(StoreError::Query(format!("unknown operator: {unknown}"))),
    };
    Ok(result)
}

/// Evaluate an aggregation expression
fn evaluate(doc: &Document, expr: &Bson, depth: usize) -> StoreResult<Bson> {
    if depth > MAX_FILTER_DEPTH {
        return Err(StoreError::Query(format!(
            "expression nesting exceeds maximum depth of {MAX_FILTER_DEPTH}"
        )));
    }

    match expr {
        Bson::String(s) if s.starts_with('$') => {
            Ok(lookup(doc, &s[1..]).cloned().unwrap_or(Bson::Null))
        }
        Bson::Document(d) => {
            let mut entries = d.iter();
            let (Some((op, args)), None) = (entries.next(), entries.next()) else {
                return Err(StoreError::Query(
                    "an expression object must have exactly one field".to_string(),
                ));
            };
            if op == "$literal" {
                return Ok(args.clone());
            }
            let Bson::Array(operands) = args else {
                return Err(StoreError::Query(format!("{op} takes an array of arguments")));
            };
            if operands.len() != 2 {
                return Err(StoreError::Query(format!(
                    "{op} takes exactly 2 arguments, {} were passed in",
                    operands.len()
                )));
            }
            let left = evaluate(doc, &operands[0], depth + 1)?;
            let right = evaluate(doc, &operands[1], depth + 1)?;
            Ok(Bson::Boolean(apply_operator(op, &left, &right)?))
        }
        other => Ok(other.clone()),
    }
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(b) => *b,
        Bson::Int32(v) => *v != 0,
        Bson::Int64(v) => *v != 0,
        Bson::Double(v) => *v != 0.0,
        _ => true,
    }
}

/// Resolve a dot-separated field path
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        match current {
            Bson::Document(inner) => current = inner.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Order two values if they are comparable.
///
/// - Numbers compare numerically across widths
/// - Strings, booleans, object ids and datetimes compare within their type
/// - Null equals null
/// - Anything else is only ever equal to an identical value
pub(crate) fn compare(left: &Bson, right: &Bson) -> Option<Ordering> {
    match (left, right) {
        (Bson::Int32(a), Bson::Int32(b)) => Some(a.cmp(b)),
        (Bson::Int32(a), Bson::Int64(b)) => Some((*a as i64).cmp(b)),
        (Bson::Int64(a), Bson::Int32(b)) => Some(a.cmp(&(*b as i64))),
        (Bson::Int64(a), Bson::Int64(b)) => Some(a.cmp(b)),
        (a, b) if is_number(a) && is_number(b) => {
            let (a, b) = (as_f64(a)?, as_f64(b)?);
            a.partial_cmp(&b)
        }
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => Some(a.cmp(b)),
        (Bson::DateTime(a), Bson::DateTime(b)) => Some(a.cmp(b)),
        (Bson::Null | Bson::Undefined, Bson::Null | Bson::Undefined) => Some(Ordering::Equal),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Field values an upsert seeds its new document with: top-level equality
/// clauses, including those nested in `$and`
pub(crate) fn equality_fields(filter: &Document) -> Document {
    let mut seed = Document::new();
    collect_equalities(filter, &mut seed);
    seed
}

fn collect_equalities(filter: &Document, seed: &mut Document) {
    for (key, condition) in filter {
        if key == "$and" {
            if let Bson::Array(items) = condition {
                for item in items {
                    if let Bson::Document(clause) = item {
                        collect_equalities(clause, seed);
                    }
                }
            }
            continue;
        }
        if key.starts_with('$') {
            continue;
        }
        match condition {
            Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
                if let Some(value) = ops.get("$eq") {
                    seed.insert(key.clone(), value.clone());
                }
            }
            value => {
                seed.insert(key.clone(), value.clone());
            }
        }
    }
}
