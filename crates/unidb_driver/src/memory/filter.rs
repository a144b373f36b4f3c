//! Query filter evaluation.
//!
//! Supports the operator subset the document compiler emits: `$eq`, `$ne`,
//! `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`, `$regex` (with
//! `$options`), `$not`, and the logical `$and`, `$or` and `$nor`.
//!
//! A missing field equals `null`. An array field matches an equality or
//! range test when any of its elements does.

use crate::error::{DriverError, DriverResult};
use regex::Regex;
use std::cmp::Ordering;
use unidb_codec::{Document, WireValue};

const BACKEND: &str = "memory";

fn bad_query(message: impl Into<String>) -> DriverError {
    DriverError::backend(BACKEND, "BadValue", message)
}

/// Returns true if `doc` satisfies `filter`.
///
/// # Errors
///
/// Returns a backend error for malformed filters (unknown operators,
/// non-array `$in` arguments, invalid regular expressions).
pub fn matches(doc: &Document, filter: &Document) -> DriverResult<bool> {
    for (key, cond) in filter.iter() {
        let ok = match key {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, cond)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(doc, key, cond)?,
            "$nor" => !any_clause(doc, key, cond)?,
            other if other.starts_with('$') => {
                return Err(bad_query(format!("unknown top level operator: {other}")));
            }
            field => field_matches(doc.get_path(field), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_clause(doc: &Document, op: &str, cond: &WireValue) -> DriverResult<bool> {
    for clause in clauses(op, cond)? {
        if matches(doc, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn clauses<'a>(op: &str, cond: &'a WireValue) -> DriverResult<Vec<&'a Document>> {
    let items = cond
        .as_array()
        .ok_or_else(|| bad_query(format!("{op} argument must be an array")))?;
    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| bad_query(format!("{op} entries must be documents")))
        })
        .collect()
}

fn is_operator_doc(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

fn field_matches(value: Option<&WireValue>, cond: &WireValue) -> DriverResult<bool> {
    match cond {
        WireValue::Document(ops) if is_operator_doc(ops) => {
            let options = ops.get("$options").and_then(WireValue::as_text);
            for (op, arg) in ops.iter() {
                if !apply(op, value, arg, options)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals(value, cond)),
    }
}

fn apply(op: &str, value: Option<&WireValue>, arg: &WireValue, options: Option<&str>) -> DriverResult<bool> {
    Ok(match op {
        "$eq" => equals(value, arg),
        "$ne" => !equals(value, arg),
        "$gt" => ordered(value, arg, |o| o == Ordering::Greater),
        "$gte" => ordered(value, arg, |o| o != Ordering::Less),
        "$lt" => ordered(value, arg, |o| o == Ordering::Less),
        "$lte" => ordered(value, arg, |o| o != Ordering::Greater),
        "$in" => in_list(value, op, arg)?,
        "$nin" => !in_list(value, op, arg)?,
        "$exists" => value.is_some() == arg.as_bool().unwrap_or(true),
        "$regex" => regex_matches(value, arg, options)?,
        "$options" => true,
        "$not" => match arg {
            WireValue::Document(ops) if is_operator_doc(ops) => !field_matches(value, arg)?,
            WireValue::Text(_) => !regex_matches(value, arg, None)?,
            _ => return Err(bad_query("$not needs an operator document or a pattern")),
        },
        other => return Err(bad_query(format!("unknown operator: {other}"))),
    })
}

fn same(a: &WireValue, b: &WireValue) -> bool {
    a == b || a.compare(b) == Some(Ordering::Equal)
}

fn equals(value: Option<&WireValue>, arg: &WireValue) -> bool {
    match value {
        None => arg.is_null(),
        Some(v) => {
            if same(v, arg) {
                return true;
            }
            match (v, arg) {
                (WireValue::Array(items), other) if !matches!(other, WireValue::Array(_)) => {
                    items.iter().any(|item| same(item, other))
                }
                _ => false,
            }
        }
    }
}

fn ordered(value: Option<&WireValue>, arg: &WireValue, pred: impl Fn(Ordering) -> bool) -> bool {
    let Some(v) = value else {
        return false;
    };
    if v.is_null() || arg.is_null() {
        return false;
    }
    match v {
        WireValue::Array(items) if !matches!(arg, WireValue::Array(_)) => items
            .iter()
            .any(|item| item.compare(arg).is_some_and(&pred)),
        _ => v.compare(arg).is_some_and(pred),
    }
}

fn in_list(value: Option<&WireValue>, op: &str, arg: &WireValue) -> DriverResult<bool> {
    let items = arg
        .as_array()
        .ok_or_else(|| bad_query(format!("{op} needs an array")))?;
    Ok(items.iter().any(|item| equals(value, item)))
}

fn regex_matches(value: Option<&WireValue>, pattern: &WireValue, options: Option<&str>) -> DriverResult<bool> {
    let pattern = pattern
        .as_text()
        .ok_or_else(|| bad_query("$regex needs a string pattern"))?;
    let flags: String = options
        .unwrap_or_default()
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
        .collect();
    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{flags}){pattern}")
    };
    let re = Regex::new(&source).map_err(|e| bad_query(format!("invalid regex: {e}")))?;
    Ok(match value {
        Some(WireValue::Text(s)) => re.is_match(s),
        Some(WireValue::Array(items)) => items
            .iter()
            .any(|item| item.as_text().is_some_and(|s| re.is_match(s))),
        _ => false,
    })
}
