//! Document compiler
//!
//! Lowers a `CompiledQuery` to filter and update documents in the MongoDB
//! operator dialect. The identifier field is always stored under `_id` and
//! goes through an `IdentifierCodec`; other fields map to their storage key,
//! and names the schema does not know pass through unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::object_id::{IdentifierCodec, ObjectIdCodec};
use crate::engine::error::{QueryError, Result};
use crate::engine::filter::{
    Distinct, FieldFilter, FieldRef, MutationSpec, OperatorTag, SortDirection,
};
use crate::engine::query::{CompiledQuery, StatementKind};
use crate::engine::schema::SchemaDescriptor;

pub const ID_KEY: &str = "_id";

/// Update operators accepted at the top level of an update document
pub const UPDATE_OPERATORS: &[&str] = &[
    "$set",
    "$unset",
    "$inc",
    "$mul",
    "$rename",
    "$min",
    "$max",
    "$currentDate",
    "$push",
    "$pull",
    "$pullAll",
    "$addToSet",
    "$pop",
    "$setOnInsert",
];

/// Operators whose operand documents hold values to store, not paths
const VALUE_OPERATORS: &[&str] = &["$set", "$setOnInsert"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdate {
    pub filter: Map<String, Value>,
    pub update: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DocumentOperation {
    Find {
        collection: String,
        filter: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        projection: Option<Map<String, Value>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sort: Option<Map<String, Value>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        skip: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
    },
    Count {
        collection: String,
        filter: Map<String, Value>,
    },
    Insert {
        collection: String,
        documents: Vec<Map<String, Value>>,
    },
    Update {
        collection: String,
        filter: Map<String, Value>,
        update: Map<String, Value>,
        many: bool,
        upsert: bool,
    },
    BulkUpdate {
        collection: String,
        updates: Vec<BulkUpdate>,
        upsert: bool,
    },
    Delete {
        collection: String,
        filter: Map<String, Value>,
        many: bool,
    },
}

impl DocumentOperation {
    pub fn collection(&self) -> &str {
        match self {
            DocumentOperation::Find { collection, .. }
            | DocumentOperation::Count { collection, .. }
            | DocumentOperation::Insert { collection, .. }
            | DocumentOperation::Update { collection, .. }
            | DocumentOperation::BulkUpdate { collection, .. }
            | DocumentOperation::Delete { collection, .. } => collection,
        }
    }
}

pub struct DocumentCompiler<C: IdentifierCodec = ObjectIdCodec> {
    codec: C,
}

impl DocumentCompiler<ObjectIdCodec> {
    pub fn new() -> Self {
        Self {
            codec: ObjectIdCodec,
        }
    }
}

impl Default for DocumentCompiler<ObjectIdCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: IdentifierCodec> DocumentCompiler<C> {
    pub fn with_codec(codec: C) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn compile(&self, query: &CompiledQuery) -> Result<DocumentOperation> {
        let schema = query.schema();
        let collection = schema.storage_name().to_string();

        let operation = match query.kind() {
            StatementKind::Select => {
                self.reject_relational_clauses(query)?;
                let projection = (!query.projection().is_empty()).then(|| {
                    query
                        .projection()
                        .iter()
                        .map(|target| (self.target_key(schema, target), json!(1)))
                        .collect()
                });
                let sort = (!query.order().is_empty()).then(|| {
                    query
                        .order()
                        .iter()
                        .map(|term| {
                            let direction = match term.direction {
                                SortDirection::Asc => 1,
                                SortDirection::Desc => -1,
                            };
                            (self.target_key(schema, &term.target), json!(direction))
                        })
                        .collect()
                });
                let limit = match (query.limit(), query.is_single()) {
                    (Some(limit), true) => Some(limit.min(1)),
                    (None, true) => Some(1),
                    (limit, false) => limit,
                };
                DocumentOperation::Find {
                    collection,
                    filter: self.filter_document(query)?,
                    projection,
                    sort,
                    skip: query.offset(),
                    limit,
                }
            }
            StatementKind::Insert => {
                let documents = query
                    .values()
                    .map(MutationSpec::rows)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|row| self.to_store(schema, row))
                    .collect::<Result<_>>()?;
                DocumentOperation::Insert {
                    collection,
                    documents,
                }
            }
            StatementKind::Update => self.update_operation(query, collection)?,
            StatementKind::Delete => DocumentOperation::Delete {
                collection,
                filter: self.filter_document(query)?,
                many: !query.is_single(),
            },
        };
        tracing::debug!(entity = %schema.name, kind = ?query.kind(), "compiled document operation");
        Ok(operation)
    }

    pub fn compile_count(&self, query: &CompiledQuery) -> Result<DocumentOperation> {
        self.reject_relational_clauses(query)?;
        Ok(DocumentOperation::Count {
            collection: query.schema().storage_name().to_string(),
            filter: self.filter_document(query)?,
        })
    }

    /// Filter document for the FilterSpec and OR-groups of `query`
    pub fn filter_document(&self, query: &CompiledQuery) -> Result<Map<String, Value>> {
        let schema = query.schema();
        let mut doc = Map::new();
        let mut and_clauses: Vec<Value> = Vec::new();

        for (field, filter) in query.filter().iter() {
            let key = self.field_key(schema, field);
            let is_id = key == ID_KEY;

            match filter {
                FieldFilter::Equals(value) => {
                    let value = if is_id { self.codec.encode(value)? } else { value.clone() };
                    place(&mut doc, &mut and_clauses, key, value);
                }
                FieldFilter::OperatorSet(conditions) => {
                    // One operator map per clause; a repeated operator opens the next clause
                    let mut clauses: Vec<Map<String, Value>> = Vec::new();
                    for condition in conditions {
                        let fragment =
                            self.lower_operator(field, is_id, condition.tag()?, &condition.value)?;
                        match clauses
                            .iter_mut()
                            .find(|c| fragment.iter().all(|(k, _)| !c.contains_key(k)))
                        {
                            Some(clause) => clause.extend(fragment),
                            None => clauses.push(fragment.into_iter().collect()),
                        }
                    }
                    for clause in clauses {
                        place(&mut doc, &mut and_clauses, key.clone(), Value::Object(clause));
                    }
                }
            }
        }

        let mut or_groups = Vec::new();
        for (field, conditions) in query.or_filter().iter() {
            let key = self.field_key(schema, field);
            let is_id = key == ID_KEY;
            let mut disjuncts = Vec::new();
            for condition in conditions {
                for (tag, value) in condition.disjuncts()? {
                    let fragment = self.lower_operator(field, is_id, tag, &value)?;
                    let mut clause = Map::new();
                    clause.insert(key.clone(), Value::Object(fragment.into_iter().collect()));
                    disjuncts.push(Value::Object(clause));
                }
            }
            if !disjuncts.is_empty() {
                or_groups.push(disjuncts);
            }
        }
        match or_groups.len() {
            0 => {}
            1 if !doc.contains_key("$or") => {
                doc.insert("$or".to_string(), Value::Array(or_groups.remove(0)));
            }
            _ => {
                and_clauses.extend(or_groups.into_iter().map(|group| json!({ "$or": group })));
            }
        }

        if !and_clauses.is_empty() {
            match doc.get_mut("$and") {
                Some(Value::Array(existing)) => existing.extend(and_clauses),
                _ => {
                    doc.insert("$and".to_string(), Value::Array(and_clauses));
                }
            }
        }
        Ok(doc)
    }

    /// Update-operator document for one row of resolved values. Plain keys
    /// are gathered under `$set` without replacing explicit `$set` entries.
    pub fn update_document(
        &self,
        schema: &SchemaDescriptor,
        values: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        let mut plain = Map::new();

        for (key, value) in values {
            if key.starts_with('$') {
                if !UPDATE_OPERATORS.contains(&key.as_str()) {
                    return Err(QueryError::InvalidFilterOperator(key.clone()));
                }
                let operand = value.as_object().ok_or_else(|| {
                    QueryError::invalid_operand(key, key, "expected a document of fields")
                })?;
                let encode_ids = VALUE_OPERATORS.contains(&key.as_str());
                let mut mapped = Map::new();
                for (field, v) in operand {
                    let storage = self.field_key(schema, field);
                    let v = if encode_ids && storage == ID_KEY {
                        self.codec.encode(v)?
                    } else {
                        v.clone()
                    };
                    mapped.insert(storage, v);
                }
                out.insert(key.clone(), Value::Object(mapped));
            } else {
                let storage = self.field_key(schema, key);
                let v = if storage == ID_KEY {
                    self.codec.encode(value)?
                } else {
                    value.clone()
                };
                plain.insert(storage, v);
            }
        }

        if !plain.is_empty() {
            let set = out
                .entry("$set".to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            let Value::Object(set) = set else {
                return Err(QueryError::invalid_operand(
                    "$set",
                    "$set",
                    "expected a document of fields",
                ));
            };
            for (key, value) in plain {
                set.entry(key).or_insert(value);
            }
        }
        Ok(out)
    }

    /// Storage form of an inserted row
    pub fn to_store(
        &self,
        schema: &SchemaDescriptor,
        row: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        row.iter()
            .map(|(field, value)| {
                let key = self.field_key(schema, field);
                let value = if key == ID_KEY {
                    self.codec.encode(value)?
                } else {
                    value.clone()
                };
                Ok((key, value))
            })
            .collect()
    }

    /// Caller form of a stored document: field names and external identifiers
    pub fn from_store(&self, schema: &SchemaDescriptor, doc: &Map<String, Value>) -> Map<String, Value> {
        doc.iter()
            .map(|(key, value)| {
                if key == ID_KEY {
                    let name = schema
                        .primary_key()
                        .map(|f| f.name.clone())
                        .unwrap_or_else(|| ID_KEY.to_string());
                    (name, self.codec.decode(value))
                } else {
                    let name = schema
                        .field_for_storage(key)
                        .map(|f| f.name.clone())
                        .unwrap_or_else(|| key.clone());
                    (name, value.clone())
                }
            })
            .collect()
    }

    fn update_operation(&self, query: &CompiledQuery, collection: String) -> Result<DocumentOperation> {
        let schema = query.schema();
        let upsert = query.is_upsert();

        match query.values() {
            Some(MutationSpec::Batch(rows)) => {
                let pk = schema.primary_key().ok_or_else(|| {
                    QueryError::invalid_operand(
                        &schema.name,
                        "update",
                        "batch update needs an identifier field",
                    )
                })?;
                let base = self.filter_document(query)?;
                let mut updates = Vec::with_capacity(rows.len());
                for row in rows {
                    let key = row.get(&pk.name).ok_or_else(|| {
                        QueryError::invalid_operand(
                            &pk.name,
                            "update",
                            "every batch row needs its identifier",
                        )
                    })?;
                    let mut id_filter = Map::new();
                    id_filter.insert(ID_KEY.to_string(), self.codec.encode(key)?);
                    let filter = if base.is_empty() {
                        id_filter
                    } else {
                        let mut combined = Map::new();
                        combined.insert(
                            "$and".to_string(),
                            json!([Value::Object(base.clone()), Value::Object(id_filter)]),
                        );
                        combined
                    };
                    let mut assignments = row.clone();
                    assignments.remove(&pk.name);
                    updates.push(BulkUpdate {
                        filter,
                        update: self.update_document(schema, &assignments)?,
                    });
                }
                Ok(DocumentOperation::BulkUpdate {
                    collection,
                    updates,
                    upsert,
                })
            }
            Some(MutationSpec::Single(row)) => Ok(DocumentOperation::Update {
                collection,
                filter: self.filter_document(query)?,
                update: self.update_document(schema, row)?,
                many: !query.is_single(),
                upsert,
            }),
            None => Err(QueryError::invalid_operand(
                &schema.name,
                "update",
                "no values to assign",
            )),
        }
    }

    fn reject_relational_clauses(&self, query: &CompiledQuery) -> Result<()> {
        if !query.group().is_empty() {
            return Err(QueryError::UnsupportedClause("group_by"));
        }
        if !query.having().is_empty() {
            return Err(QueryError::UnsupportedClause("having"));
        }
        if *query.distinct() != Distinct::None {
            return Err(QueryError::UnsupportedClause("distinct"));
        }
        Ok(())
    }

    fn field_key(&self, schema: &SchemaDescriptor, field: &str) -> String {
        if field == ID_KEY {
            return ID_KEY.to_string();
        }
        match schema.field(field) {
            Some(f) if f.primary => ID_KEY.to_string(),
            Some(f) => f.storage_name().to_string(),
            None => field.to_string(),
        }
    }

    fn target_key(&self, schema: &SchemaDescriptor, target: &FieldRef) -> String {
        match target {
            FieldRef::Field(name) => self.field_key(schema, name),
            FieldRef::Raw(expr) => expr.clone(),
        }
    }

    /// `$`-operators for one condition, in output order
    fn lower_operator(
        &self,
        field: &str,
        is_id: bool,
        tag: OperatorTag,
        value: &Value,
    ) -> Result<Vec<(String, Value)>> {
        let encode = |v: &Value| -> Result<Value> {
            if is_id {
                self.codec.encode(v)
            } else {
                Ok(v.clone())
            }
        };

        let fragment = match tag {
            OperatorTag::In | OperatorTag::Nin => {
                let items = value.as_array().ok_or_else(|| {
                    QueryError::invalid_operand(field, tag.as_str(), "expected a list")
                })?;
                let items = items.iter().map(encode).collect::<Result<Vec<_>>>()?;
                vec![(format!("${}", tag), Value::Array(items))]
            }
            OperatorTag::Like | OperatorTag::Ilike => {
                let pattern = value.as_str().ok_or_else(|| {
                    QueryError::invalid_operand(field, tag.as_str(), "expected a string pattern")
                })?;
                let mut fragment = vec![("$regex".to_string(), Value::String(like_to_regex(pattern)))];
                if tag == OperatorTag::Ilike {
                    fragment.push(("$options".to_string(), json!("i")));
                }
                fragment
            }
            OperatorTag::Between => match value.as_array().map(Vec::as_slice) {
                Some([low, high]) => vec![
                    ("$gte".to_string(), encode(low)?),
                    ("$lte".to_string(), encode(high)?),
                ],
                _ => {
                    return Err(QueryError::invalid_operand(
                        field,
                        tag.as_str(),
                        "expected [low, high]",
                    ))
                }
            },
            _ => vec![(format!("${}", tag), encode(value)?)],
        };
        Ok(fragment)
    }
}

/// Put `key: value` into the filter document, spilling into `$and` when
/// the key is already taken
fn place(doc: &mut Map<String, Value>, and_clauses: &mut Vec<Value>, key: String, value: Value) {
    if doc.contains_key(&key) {
        let mut clause = Map::new();
        clause.insert(key, value);
        and_clauses.push(Value::Object(clause));
    } else {
        doc.insert(key, value);
    }
}

/// Anchored regex equivalent of a SQL LIKE pattern
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Append `$skip`/`$limit` stages for one page. Only applied when both the
/// page and a non-zero page size are given.
pub fn paginate_pipeline(mut pipeline: Vec<Value>, page: Option<u64>, page_size: Option<u64>) -> Vec<Value> {
    if let (Some(page), Some(size)) = (page, page_size) {
        if size > 0 {
            let skip = page.max(1).saturating_sub(1).saturating_mul(size);
            pipeline.push(json!({ "$skip": skip }));
            pipeline.push(json!({ "$limit": size }));
        }
    }
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::query::QueryBuilder;
    use crate::engine::schema::fixtures::message_display;
    use crate::engine::schema::FieldDescriptor;
    use std::sync::Arc;

    const ID: &str = "5e53bb135b64856045ccb8dc";

    fn builder() -> QueryBuilder {
        QueryBuilder::new().model(Arc::new(message_display()))
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_identifier_equality() {
        let doc = builder()
            .filter_eq("id", ID)
            .select_query()
            .unwrap()
            .to_filter_document()
            .unwrap();
        assert_eq!(Value::Object(doc), json!({"_id": {"$oid": ID}}));
    }

    #[test]
    fn test_identifier_in_list() {
        let doc = builder()
            .filter_op("id", "in", json!([ID, "5e53bb135b64856045ccb8dd"]))
            .select_query()
            .unwrap()
            .to_filter_document()
            .unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({"_id": {"$in": [{"$oid": ID}, {"$oid": "5e53bb135b64856045ccb8dd"}]}})
        );
    }

    #[test]
    fn test_invalid_identifier() {
        let err = builder()
            .filter_eq("id", "not-an-id")
            .select_query()
            .unwrap()
            .to_filter_document()
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidIdentifier(_)));
    }

    #[test]
    fn test_operator_prefixing_is_idempotent() {
        let plain = builder()
            .filter("msg_code", json!({"gte": 1, "lt": 5}))
            .select_query()
            .unwrap()
            .to_filter_document()
            .unwrap();
        let prefixed = builder()
            .filter("msg_code", json!({"$gte": 1, "$lt": 5}))
            .select_query()
            .unwrap()
            .to_filter_document()
            .unwrap();
        assert_eq!(plain, prefixed);
        assert_eq!(Value::Object(plain), json!({"msg_code": {"$gte": 1, "$lt": 5}}));
    }

    #[test]
    fn test_like_between_and_collisions() {
        let doc = builder()
            .filter_op("msg_en", "ilike", "he_lo%")
            .filter("msg_code", json!({"between": [1, 9], "gte": 3}))
            .select_query()
            .unwrap()
            .to_filter_document()
            .unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({
                "msg_en": {"$regex": "^he.lo.*$", "$options": "i"},
                "msg_code": {"$gte": 1, "$lte": 9},
                "$and": [{"msg_code": {"$gte": 3}}]
            })
        );
    }

    #[test]
    fn test_or_groups() {
        let single = builder()
            .or_filter("msg_code", "eq", json!([3, 8]))
            .select_query()
            .unwrap()
            .to_filter_document()
            .unwrap();
        assert_eq!(
            Value::Object(single),
            json!({"$or": [{"msg_code": {"$eq": 3}}, {"msg_code": {"$eq": 8}}]})
        );

        let double = builder()
            .or_filter("msg_code", "eq", json!([3, 8]))
            .or_filter("msg_zh", "eq", json!(["a", "b"]))
            .select_query()
            .unwrap()
            .to_filter_document()
            .unwrap();
        assert_eq!(double["$and"].as_array().unwrap().len(), 2);
        assert!(double.get("$or").is_none());
    }

    #[test]
    fn test_update_document_wrapping() {
        let schema = SchemaDescriptor::new("t").with_field(FieldDescriptor::new("a"));
        let compiler = DocumentCompiler::new();

        let wrapped = compiler
            .update_document(&schema, &obj(json!({"a": 1, "b": 2})))
            .unwrap();
        assert_eq!(Value::Object(wrapped), json!({"$set": {"a": 1, "b": 2}}));

        let passthrough = compiler
            .update_document(&schema, &obj(json!({"$inc": {"a": 1}})))
            .unwrap();
        assert_eq!(Value::Object(passthrough), json!({"$inc": {"a": 1}}));

        let merged = compiler
            .update_document(&schema, &obj(json!({"$set": {"a": 1}, "a": 5, "b": 2})))
            .unwrap();
        assert_eq!(Value::Object(merged), json!({"$set": {"a": 1, "b": 2}}));

        let err = compiler
            .update_document(&schema, &obj(json!({"$bogus": {"a": 1}})))
            .unwrap_err();
        assert_eq!(err, QueryError::InvalidFilterOperator("$bogus".to_string()));
    }

    #[test]
    fn test_update_operation_adds_on_update_field() {
        let op = builder()
            .filter_eq("id", ID)
            .values(obj(json!({"$inc": {"msg_code": 1}})))
            .single()
            .update_query()
            .unwrap()
            .to_document_operation()
            .unwrap();
        match op {
            DocumentOperation::Update { filter, update, many, .. } => {
                assert_eq!(Value::Object(filter), json!({"_id": {"$oid": ID}}));
                assert_eq!(update["$inc"], json!({"msg_code": 1}));
                assert!(update["$set"]["updated_time"].is_string());
                assert!(!many);
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_insert_and_read_back() {
        let compiler = DocumentCompiler::new();
        let schema = message_display();
        let stored = compiler
            .to_store(&schema, &obj(json!({"id": ID, "msg_code": 1})))
            .unwrap();
        assert_eq!(stored["_id"], json!({"$oid": ID}));

        let back = compiler.from_store(&schema, &stored);
        assert_eq!(back["id"], json!(ID));
        assert_eq!(back["msg_code"], json!(1));
    }

    #[test]
    fn test_find_options_and_rejections() {
        let op = builder()
            .project(&["id", "msg_code"])
            .order_by("msg_code", SortDirection::Desc)
            .offset(5)
            .limit(10)
            .select_query()
            .unwrap()
            .to_document_operation()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({
                "op": "find",
                "collection": "message_display",
                "filter": {},
                "projection": {"_id": 1, "msg_code": 1},
                "sort": {"msg_code": -1},
                "skip": 5,
                "limit": 10
            })
        );

        let err = builder()
            .group_by("msg_code")
            .select_query()
            .unwrap()
            .to_document_operation()
            .unwrap_err();
        assert_eq!(err, QueryError::UnsupportedClause("group_by"));
    }

    #[test]
    fn test_pipeline_pagination() {
        let stages = paginate_pipeline(vec![json!({"$match": {}})], Some(3), Some(10));
        assert_eq!(
            stages,
            vec![json!({"$match": {}}), json!({"$skip": 20}), json!({"$limit": 10})]
        );
        assert_eq!(paginate_pipeline(vec![], Some(3), None).len(), 0);
    }
}
