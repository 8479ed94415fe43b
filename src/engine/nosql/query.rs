//! Filter-document evaluation for in-memory documents

use regex::RegexBuilder;
use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::object_id::oid_from_json;
use crate::engine::error::{QueryError, Result};

/// Does `doc` satisfy `filter`?
pub fn matches(doc: &Map<String, Value>, filter: &Map<String, Value>) -> Result<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            other if other.starts_with('$') => {
                return Err(QueryError::InvalidFilterOperator(other.to_string()))
            }
            path => field_matches(lookup(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(key: &str, value: &'a Value) -> Result<Vec<&'a Map<String, Value>>> {
    value
        .as_array()
        .ok_or_else(|| QueryError::invalid_operand(key, key, "expected a list of documents"))?
        .iter()
        .map(|clause| {
            clause
                .as_object()
                .ok_or_else(|| QueryError::invalid_operand(key, key, "expected a list of documents"))
        })
        .collect()
}

/// Resolve a dotted path
pub fn lookup<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// An object whose keys are all `$`-operators, other than an `$oid` literal
fn is_operator_document(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            !map.is_empty()
                && map.keys().all(|k| k.starts_with('$'))
                && oid_from_json(value).is_none()
        }
        _ => false,
    }
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> Result<bool> {
    if !is_operator_document(condition) {
        return Ok(equals(actual, condition));
    }
    let Value::Object(ops) = condition else {
        return Ok(false);
    };

    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(actual, operand),
            "$ne" => !equals(actual, operand),
            "$gt" => ordered(actual, operand, |o| o == Ordering::Greater),
            "$gte" => ordered(actual, operand, |o| o != Ordering::Less),
            "$lt" => ordered(actual, operand, |o| o == Ordering::Less),
            "$lte" => ordered(actual, operand, |o| o != Ordering::Greater),
            "$in" => list(op, operand)?.iter().any(|v| equals(actual, v)),
            "$nin" => !list(op, operand)?.iter().any(|v| equals(actual, v)),
            "$exists" => actual.is_some() == operand.as_bool().unwrap_or(true),
            "$regex" => {
                let pattern = operand.as_str().ok_or_else(|| {
                    QueryError::invalid_operand("$regex", op, "expected a string pattern")
                })?;
                let options = ops.get("$options").and_then(Value::as_str).unwrap_or("");
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(options.contains('i'))
                    .multi_line(options.contains('m'))
                    .dot_matches_new_line(options.contains('s'))
                    .build()
                    .map_err(|e| QueryError::invalid_operand("$regex", op, e.to_string()))?;
                matches!(actual, Some(Value::String(s)) if regex.is_match(s))
            }
            // Read together with `$regex`
            "$options" => true,
            other => return Err(QueryError::InvalidFilterOperator(other.to_string())),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn list<'a>(op: &str, operand: &'a Value) -> Result<&'a Vec<Value>> {
    operand
        .as_array()
        .ok_or_else(|| QueryError::invalid_operand(op, op, "expected a list"))
}

/// Equality with array membership: a list field equals a scalar it contains
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) if value == expected => true,
        Some(Value::Array(items)) => items.contains(expected),
        Some(_) => false,
    }
}

fn ordered(actual: Option<&Value>, expected: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    actual
        .and_then(|a| compare_values(a, expected))
        .is_some_and(accept)
}

/// Compare two JSON values of the same kind
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64()?;
            let b = b.as_f64()?;
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Object(_), Value::Object(_)) => {
            let a = oid_from_json(a)?;
            let b = oid_from_json(b)?;
            Some(a.cmp(&b))
        }
        _ => None,
    }
}

/// Total order used for sorting: missing and null sort first
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_equality_and_ranges() {
        let d = doc(json!({"name": "Alice", "age": 30, "tags": ["a", "b"]}));
        assert!(matches(&d, &doc(json!({"name": "Alice"}))).unwrap());
        assert!(!matches(&d, &doc(json!({"name": "Bob"}))).unwrap());
        assert!(matches(&d, &doc(json!({"age": {"$gte": 30, "$lt": 31}}))).unwrap());
        assert!(matches(&d, &doc(json!({"tags": "a"}))).unwrap());
        assert!(matches(&d, &doc(json!({"missing": null}))).unwrap());
    }

    #[test]
    fn test_logical_operators() {
        let d = doc(json!({"code": 8}));
        let filter = doc(json!({"$or": [{"code": {"$eq": 3}}, {"code": {"$eq": 8}}]}));
        assert!(matches(&d, &filter).unwrap());
        let filter = doc(json!({"$and": [{"code": {"$gt": 1}}, {"code": {"$lt": 5}}]}));
        assert!(!matches(&d, &filter).unwrap());
    }

    #[test]
    fn test_regex_and_object_ids() {
        let d = doc(json!({"_id": {"$oid": "5e53bb135b64856045ccb8dc"}, "msg": "Hello"}));
        assert!(matches(&d, &doc(json!({"msg": {"$regex": "^hel", "$options": "i"}}))).unwrap());
        assert!(!matches(&d, &doc(json!({"msg": {"$regex": "^hel"}}))).unwrap());
        assert!(matches(&d, &doc(json!({"_id": {"$oid": "5e53bb135b64856045ccb8dc"}}))).unwrap());
        assert!(matches(
            &d,
            &doc(json!({"_id": {"$in": [{"$oid": "5e53bb135b64856045ccb8dc"}]}}))
        )
        .unwrap());
    }

    #[test]
    fn test_unknown_operator() {
        let d = doc(json!({"a": 1}));
        assert_eq!(
            matches(&d, &doc(json!({"a": {"$near": 1}}))),
            Err(QueryError::InvalidFilterOperator("$near".to_string()))
        );
    }

    #[test]
    fn test_dotted_lookup() {
        let d = doc(json!({"a": {"b": [10, 20]}}));
        assert_eq!(lookup(&d, "a.b.1"), Some(&json!(20)));
        assert_eq!(lookup(&d, "a.c"), None);
    }
}
