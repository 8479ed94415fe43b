//! In-memory document collection
//!
//! Documents are kept in insertion order in their stored form (`_id` plus
//! storage keys). Filters and update documents use the same operator
//! dialect the document compiler emits.

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

use super::compiler::ID_KEY;
use super::object_id::{oid_from_json, oid_to_json};
use bson::oid::ObjectId;
use super::query::{compare_values, lookup, matches, sort_order};
use crate::engine::error::{QueryError, Result};
use crate::engine::executor::ExecOutcome;

pub type Document = Map<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub name: String,
    documents: Vec<Document>,
}

impl Collection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            documents: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Insert a document, generating `_id` when absent. Returns the `_id`.
    pub fn insert(&mut self, mut doc: Document) -> Result<Value> {
        let id = match doc.get(ID_KEY) {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                let id = oid_to_json(ObjectId::new());
                doc.insert(ID_KEY.to_string(), id.clone());
                id
            }
        };

        if self.documents.iter().any(|d| d.get(ID_KEY) == Some(&id)) {
            tracing::warn!(collection = %self.name, id = %id, "duplicate _id");
            return Err(QueryError::DuplicateKey(format!("{}._id {}", self.name, id)));
        }

        // Keep `_id` first, as stores do
        let mut stored = Map::new();
        stored.insert(ID_KEY.to_string(), id.clone());
        for (k, v) in doc {
            if k != ID_KEY {
                stored.insert(k, v);
            }
        }
        self.documents.push(stored);
        Ok(id)
    }

    pub fn find(
        &self,
        filter: &Map<String, Value>,
        projection: Option<&Map<String, Value>>,
        sort: Option<&Map<String, Value>>,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<Document>> {
        let mut found = self.matching(filter)?;
        if let Some(sort) = sort {
            sort_documents(&mut found, sort);
        }

        let skip = usize::try_from(skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match projection {
                Some(fields) => project(doc, fields),
                None => doc.clone(),
            })
            .collect())
    }

    pub fn count(&self, filter: &Map<String, Value>) -> Result<u64> {
        Ok(self.matching(filter)?.len() as u64)
    }

    pub fn update(
        &mut self,
        filter: &Map<String, Value>,
        update: &Map<String, Value>,
        many: bool,
        upsert: bool,
    ) -> Result<ExecOutcome> {
        let mut outcome = ExecOutcome::default();

        for doc in self.documents.iter_mut() {
            if !matches(doc, filter)? {
                continue;
            }
            let before = doc.clone();
            apply_update(doc, update, false)?;
            outcome.matched_count += 1;
            if *doc != before {
                outcome.modified_count += 1;
            }
            if !many {
                break;
            }
        }

        if outcome.matched_count == 0 && upsert {
            let mut seed = upsert_seed(filter);
            apply_update(&mut seed, update, true)?;
            let id = self.insert(seed)?;
            outcome.upserted_id = Some(match oid_from_json(&id) {
                Some(oid) => oid.to_hex(),
                None => id.to_string(),
            });
        }
        outcome.affected_rows = outcome.modified_count + u64::from(outcome.upserted_id.is_some());
        Ok(outcome)
    }

    pub fn delete(&mut self, filter: &Map<String, Value>, many: bool) -> Result<u64> {
        let mut kept = Vec::with_capacity(self.documents.len());
        let mut deleted = 0u64;
        for doc in std::mem::take(&mut self.documents) {
            if (many || deleted == 0) && matches(&doc, filter)? {
                deleted += 1;
            } else {
                kept.push(doc);
            }
        }
        self.documents = kept;
        Ok(deleted)
    }

    /// Run an aggregation pipeline of `$match`, `$sort`, `$skip`, `$limit`,
    /// `$project` and `$count` stages
    pub fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self.documents.clone();

        for stage in pipeline {
            let stage = stage
                .as_object()
                .filter(|s| s.len() == 1)
                .ok_or_else(|| QueryError::invalid_operand("pipeline", "stage", "expected one operator per stage"))?;
            let (op, arg) = stage
                .iter()
                .next()
                .ok_or_else(|| QueryError::invalid_operand("pipeline", "stage", "empty stage"))?;

            docs = match op.as_str() {
                "$match" => {
                    let filter = as_document(op, arg)?;
                    let mut kept = Vec::new();
                    for doc in docs {
                        if matches(&doc, filter)? {
                            kept.push(doc);
                        }
                    }
                    kept
                }
                "$sort" => {
                    let spec = as_document(op, arg)?;
                    let mut refs: Vec<&Document> = docs.iter().collect();
                    sort_documents(&mut refs, spec);
                    refs.into_iter().cloned().collect()
                }
                "$skip" => {
                    let n = as_count(op, arg)?;
                    docs.into_iter().skip(n).collect()
                }
                "$limit" => {
                    let n = as_count(op, arg)?;
                    docs.into_iter().take(n).collect()
                }
                "$project" => {
                    let fields = as_document(op, arg)?;
                    docs.iter().map(|doc| project(doc, fields)).collect()
                }
                "$count" => {
                    let name = arg.as_str().ok_or_else(|| {
                        QueryError::invalid_operand("$count", op, "expected a field name")
                    })?;
                    let mut out = Map::new();
                    out.insert(name.to_string(), Value::from(docs.len() as u64));
                    vec![out]
                }
                _ => return Err(QueryError::UnsupportedClause("aggregation stage")),
            };
        }
        Ok(docs)
    }

    fn matching(&self, filter: &Map<String, Value>) -> Result<Vec<&Document>> {
        let mut found = Vec::new();
        for doc in &self.documents {
            if matches(doc, filter)? {
                found.push(doc);
            }
        }
        Ok(found)
    }
}

fn as_document<'a>(op: &str, arg: &'a Value) -> Result<&'a Map<String, Value>> {
    arg.as_object()
        .ok_or_else(|| QueryError::invalid_operand(op, op, "expected a document"))
}

fn as_count(op: &str, arg: &Value) -> Result<usize> {
    arg.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| QueryError::invalid_operand(op, op, "expected a non-negative integer"))
}

fn sort_documents(docs: &mut [&Document], spec: &Map<String, Value>) {
    docs.sort_by(|a, b| {
        for (path, direction) in spec {
            let ordering = sort_order(lookup(a, path), lookup(b, path));
            let ordering = if direction.as_i64() == Some(-1) {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Inclusion projection; `_id` is kept unless excluded explicitly
fn project(doc: &Document, fields: &Map<String, Value>) -> Document {
    let keep_id = fields
        .get(ID_KEY)
        .map(|v| v.as_i64() != Some(0) && v.as_bool() != Some(false))
        .unwrap_or(true);
    doc.iter()
        .filter(|(k, _)| {
            if *k == ID_KEY {
                keep_id
            } else {
                fields
                    .get(k.as_str())
                    .is_some_and(|v| v.as_i64() != Some(0) && v.as_bool() != Some(false))
            }
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Equality terms of a filter become the starting document of an upsert
fn upsert_seed(filter: &Map<String, Value>) -> Document {
    filter
        .iter()
        .filter(|(k, v)| {
            !k.starts_with('$')
                && !matches!(v, Value::Object(m) if m.keys().any(|op| op.starts_with('$')) && oid_from_json(v).is_none())
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn apply_update(doc: &mut Document, update: &Map<String, Value>, inserting: bool) -> Result<()> {
    for (op, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| QueryError::invalid_operand(op, op, "expected a document of fields"))?;

        for (path, value) in fields {
            match op.as_str() {
                "$set" => set_path(doc, path, value.clone()),
                "$setOnInsert" => {
                    if inserting {
                        set_path(doc, path, value.clone());
                    }
                }
                "$unset" => {
                    remove_path(doc, path);
                }
                "$inc" => {
                    let current = lookup(doc, path).cloned().unwrap_or(Value::from(0));
                    set_path(doc, path, arithmetic(path, op, &current, value, |a, b| a + b, i64::checked_add)?);
                }
                "$mul" => {
                    let current = lookup(doc, path).cloned().unwrap_or(Value::from(0));
                    set_path(doc, path, arithmetic(path, op, &current, value, |a, b| a * b, i64::checked_mul)?);
                }
                "$min" | "$max" => {
                    let wanted = if op == "$min" { Ordering::Less } else { Ordering::Greater };
                    let replace = match lookup(doc, path) {
                        None => true,
                        Some(current) => compare_values(value, current) == Some(wanted),
                    };
                    if replace {
                        set_path(doc, path, value.clone());
                    }
                }
                "$rename" => {
                    let target = value.as_str().ok_or_else(|| {
                        QueryError::invalid_operand(path, op, "expected the new field name")
                    })?;
                    if let Some(moved) = remove_path(doc, path) {
                        set_path(doc, target, moved);
                    }
                }
                "$currentDate" => {
                    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string();
                    set_path(doc, path, Value::String(now));
                }
                "$push" | "$addToSet" => {
                    let items = match value.as_object().and_then(|m| m.get("$each")) {
                        Some(Value::Array(each)) => each.clone(),
                        _ => vec![value.clone()],
                    };
                    let mut array = array_at(doc, path, op)?;
                    for item in items {
                        if op == "$push" || !array.contains(&item) {
                            array.push(item);
                        }
                    }
                    set_path(doc, path, Value::Array(array));
                }
                "$pull" | "$pullAll" => {
                    let removed = match (op.as_str(), value) {
                        ("$pullAll", Value::Array(items)) => items.clone(),
                        ("$pullAll", _) => {
                            return Err(QueryError::invalid_operand(path, op, "expected a list"))
                        }
                        _ => vec![value.clone()],
                    };
                    if lookup(doc, path).is_some() {
                        let mut array = array_at(doc, path, op)?;
                        array.retain(|item| !removed.contains(item));
                        set_path(doc, path, Value::Array(array));
                    }
                }
                "$pop" => {
                    if lookup(doc, path).is_some() {
                        let mut array = array_at(doc, path, op)?;
                        if value.as_i64() == Some(-1) {
                            if !array.is_empty() {
                                array.remove(0);
                            }
                        } else {
                            array.pop();
                        }
                        set_path(doc, path, Value::Array(array));
                    }
                }
                other => return Err(QueryError::InvalidFilterOperator(other.to_string())),
            }
        }
    }
    Ok(())
}

fn arithmetic(
    path: &str,
    op: &str,
    current: &Value,
    operand: &Value,
    float: impl Fn(f64, f64) -> f64,
    int: impl Fn(i64, i64) -> Option<i64>,
) -> Result<Value> {
    let (Value::Number(a), Value::Number(b)) = (current, operand) else {
        return Err(QueryError::invalid_operand(path, op, "expected numbers"));
    };
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        if let Some(result) = int(a, b) {
            return Ok(Value::from(result));
        }
    }
    let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
        return Err(QueryError::invalid_operand(path, op, "expected numbers"));
    };
    Number::from_f64(float(a, b))
        .map(Value::Number)
        .ok_or_else(|| QueryError::invalid_operand(path, op, "result is not a finite number"))
}

fn array_at(doc: &Document, path: &str, op: &str) -> Result<Vec<Value>> {
    match lookup(doc, path) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(QueryError::invalid_operand(path, op, "field is not a list")),
    }
}

fn set_path(doc: &mut Document, path: &str, value: Value) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let Some(last) = parts.pop() else {
        return;
    };
    let mut current = doc;
    for part in parts {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts.pop()?;
    let mut current = doc;
    for part in parts {
        match current.get_mut(part) {
            Some(Value::Object(next)) => current = next,
            _ => return None,
        }
    }
    current.remove(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_generates_id_and_rejects_duplicates() {
        let mut col = Collection::new("users");
        let id = col.insert(doc(json!({"name": "Alice"}))).unwrap();
        assert!(oid_from_json(&id).is_some());

        let fixed = json!({"$oid": "5e53bb135b64856045ccb8dc"});
        col.insert(doc(json!({"_id": fixed.clone(), "name": "Bob"}))).unwrap();
        let err = col.insert(doc(json!({"_id": fixed, "name": "Eve"}))).unwrap_err();
        assert!(matches!(err, QueryError::DuplicateKey(_)));
        assert_eq!(col.len(), 2);
    }

    #[test]
    fn test_find_sort_skip_limit() {
        let mut col = Collection::new("users");
        for (name, age) in [("a", 30), ("b", 25), ("c", 35)] {
            col.insert(doc(json!({"name": name, "age": age}))).unwrap();
        }
        let sort = doc(json!({"age": -1}));
        let found = col
            .find(&Map::new(), None, Some(&sort), Some(1), Some(1))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], json!("a"));

        let projection = doc(json!({"name": 1}));
        let found = col
            .find(&doc(json!({"age": {"$gte": 30}})), Some(&projection), None, None, None)
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].contains_key("_id"));
        assert!(!found[0].contains_key("age"));
    }

    #[test]
    fn test_update_operators() {
        let mut col = Collection::new("users");
        col.insert(doc(json!({"name": "a", "n": 1, "tags": ["x"]}))).unwrap();

        let outcome = col
            .update(
                &doc(json!({"name": "a"})),
                &doc(json!({
                    "$inc": {"n": 2},
                    "$set": {"profile.city": "Oslo"},
                    "$addToSet": {"tags": {"$each": ["x", "y"]}},
                    "$unset": {"name": ""}
                })),
                false,
                false,
            )
            .unwrap();
        assert_eq!(outcome.matched_count, 1);
        assert_eq!(outcome.modified_count, 1);

        let found = col.find(&Map::new(), None, None, None, None).unwrap();
        assert_eq!(found[0]["n"], json!(3));
        assert_eq!(found[0]["profile"], json!({"city": "Oslo"}));
        assert_eq!(found[0]["tags"], json!(["x", "y"]));
        assert!(!found[0].contains_key("name"));
    }

    #[test]
    fn test_upsert() {
        let mut col = Collection::new("users");
        let outcome = col
            .update(
                &doc(json!({"email": "a@b.c", "age": {"$gt": 1}})),
                &doc(json!({"$set": {"name": "A"}, "$setOnInsert": {"visits": 0}})),
                false,
                true,
            )
            .unwrap();
        assert!(outcome.upserted_id.is_some());
        let found = col.find(&Map::new(), None, None, None, None).unwrap();
        assert_eq!(found[0]["email"], json!("a@b.c"));
        assert_eq!(found[0]["visits"], json!(0));
        assert!(!found[0].contains_key("age"));
    }

    #[test]
    fn test_delete_one_and_many() {
        let mut col = Collection::new("users");
        for n in 0..4 {
            col.insert(doc(json!({"n": n % 2}))).unwrap();
        }
        assert_eq!(col.delete(&doc(json!({"n": 0})), false).unwrap(), 1);
        assert_eq!(col.delete(&doc(json!({"n": 1})), true).unwrap(), 2);
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn test_aggregate() {
        let mut col = Collection::new("users");
        for n in 0..25 {
            col.insert(doc(json!({"n": n}))).unwrap();
        }
        let pipeline = vec![
            json!({"$match": {"n": {"$gte": 5}}}),
            json!({"$sort": {"n": 1}}),
            json!({"$skip": 10}),
            json!({"$limit": 5}),
        ];
        let docs = col.aggregate(&pipeline).unwrap();
        assert_eq!(docs.len(), 5);
        assert_eq!(docs[0]["n"], json!(15));

        let counted = col.aggregate(&[json!({"$count": "total"})]).unwrap();
        assert_eq!(counted[0]["total"], json!(25));
    }
}
