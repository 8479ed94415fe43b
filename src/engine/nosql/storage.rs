//! In-memory document store
//!
//! Executes document operations from the `DocumentCompiler` against
//! named collections held in memory. Collections spring into existence
//! on first insert.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::collection::{Collection, Document};
use super::compiler::{paginate_pipeline, DocumentCompiler, DocumentOperation};
use super::object_id::IdentifierCodec;
use crate::engine::error::{QueryError, Result};
use crate::engine::executor::{ExecOutcome, Executor, Row};
use crate::engine::query::{CompiledQuery, StatementKind};
use crate::engine::schema::SchemaDescriptor;

pub struct MemoryCollection {
    collections: RwLock<HashMap<String, Collection>>,
    compiler: DocumentCompiler,
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            compiler: DocumentCompiler::new(),
        }
    }

    pub fn compiler(&self) -> &DocumentCompiler {
        &self.compiler
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Collection>> {
        self.collections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Collection>> {
        self.collections.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sorted names of the collections holding documents
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn collection_exists(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn drop_collection(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    /// Run a compiled document operation and return its stored-form result
    pub fn run(&self, operation: &DocumentOperation) -> Result<(Vec<Document>, ExecOutcome)> {
        match operation {
            DocumentOperation::Find {
                collection,
                filter,
                projection,
                sort,
                skip,
                limit,
            } => {
                let docs = match self.read().get(collection) {
                    Some(col) => col.find(filter, projection.as_ref(), sort.as_ref(), *skip, *limit)?,
                    None => Vec::new(),
                };
                Ok((docs, ExecOutcome::default()))
            }
            DocumentOperation::Count { collection, filter } => {
                let total = match self.read().get(collection) {
                    Some(col) => col.count(filter)?,
                    None => 0,
                };
                Ok((
                    Vec::new(),
                    ExecOutcome {
                        affected_rows: total,
                        ..Default::default()
                    },
                ))
            }
            DocumentOperation::Insert {
                collection,
                documents,
            } => {
                let mut guard = self.write();
                let col = guard
                    .entry(collection.clone())
                    .or_insert_with(|| Collection::new(collection));
                let mut outcome = ExecOutcome::default();
                for doc in documents {
                    let id = col.insert(doc.clone())?;
                    outcome.inserted_ids.push(self.compiler.codec().decode(&id));
                    outcome.affected_rows += 1;
                }
                Ok((Vec::new(), outcome))
            }
            DocumentOperation::Update {
                collection,
                filter,
                update,
                many,
                upsert,
            } => {
                let mut guard = self.write();
                let outcome = if *upsert {
                    guard
                        .entry(collection.clone())
                        .or_insert_with(|| Collection::new(collection))
                        .update(filter, update, *many, true)?
                } else {
                    match guard.get_mut(collection) {
                        Some(col) => col.update(filter, update, *many, false)?,
                        None => ExecOutcome::default(),
                    }
                };
                Ok((Vec::new(), outcome))
            }
            DocumentOperation::BulkUpdate {
                collection,
                updates,
                upsert,
            } => {
                let mut guard = self.write();
                let col = guard
                    .entry(collection.clone())
                    .or_insert_with(|| Collection::new(collection));
                let mut outcome = ExecOutcome::default();
                for bulk in updates {
                    let one = col.update(&bulk.filter, &bulk.update, false, *upsert)?;
                    outcome.matched_count += one.matched_count;
                    outcome.modified_count += one.modified_count;
                    outcome.affected_rows += one.affected_rows;
                    if let Some(id) = one.upserted_id {
                        outcome.inserted_ids.push(Value::String(id));
                    }
                }
                Ok((Vec::new(), outcome))
            }
            DocumentOperation::Delete {
                collection,
                filter,
                many,
            } => {
                let deleted = match self.write().get_mut(collection) {
                    Some(col) => col.delete(filter, *many)?,
                    None => 0,
                };
                Ok((
                    Vec::new(),
                    ExecOutcome {
                        affected_rows: deleted,
                        ..Default::default()
                    },
                ))
            }
        }
    }

    /// Run an aggregation pipeline over the entity's collection, optionally
    /// paged with `$skip`/`$limit` stages. Results come back in caller form.
    pub fn aggregate(
        &self,
        schema: &SchemaDescriptor,
        pipeline: Vec<Value>,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> Result<Vec<Row>> {
        let pipeline = paginate_pipeline(pipeline, page, page_size);
        let docs = match self.read().get(schema.storage_name()) {
            Some(col) => col.aggregate(&pipeline)?,
            None => Vec::new(),
        };
        Ok(docs
            .iter()
            .map(|doc| self.compiler.from_store(schema, doc))
            .collect())
    }
}

impl Executor for MemoryCollection {
    fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Row>> {
        if query.kind() != StatementKind::Select {
            return Err(QueryError::UnsupportedClause("fetch on a mutation"));
        }
        let operation = self.compiler.compile(query)?;
        let (docs, _) = self.run(&operation)?;
        Ok(docs
            .iter()
            .map(|doc| self.compiler.from_store(query.schema(), doc))
            .collect())
    }

    fn count(&self, query: &CompiledQuery) -> Result<u64> {
        let operation = self.compiler.compile_count(query)?;
        let (_, outcome) = self.run(&operation)?;
        Ok(outcome.affected_rows)
    }

    fn execute(&self, query: &CompiledQuery) -> Result<ExecOutcome> {
        if query.kind() == StatementKind::Select {
            return Err(QueryError::UnsupportedClause("execute on a select"));
        }
        let operation = self.compiler.compile(query)?;
        let (_, outcome) = self.run(&operation)?;
        tracing::debug!(
            collection = %operation.collection(),
            affected = outcome.affected_rows,
            "executed document operation"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::query::QueryBuilder;
    use crate::engine::schema::fixtures::message_display;
    use serde_json::json;
    use std::sync::Arc;

    fn builder() -> QueryBuilder {
        QueryBuilder::new().model(Arc::new(message_display()))
    }

    fn insert(store: &MemoryCollection, code: i64) -> String {
        let query = builder()
            .values(json!({"msg_code": code, "msg_en": format!("m{}", code)}).as_object().cloned().unwrap())
            .insert_query()
            .unwrap();
        let outcome = store.execute(&query).unwrap();
        outcome.inserted_ids[0].as_str().unwrap().to_string()
    }

    #[test]
    fn test_insert_fetch_by_id() {
        let store = MemoryCollection::new();
        let id = insert(&store, 1);
        insert(&store, 2);
        assert_eq!(id.len(), 24);
        assert_eq!(store.list_collections(), vec!["message_display".to_string()]);

        let row = store
            .fetch_one(&builder().filter_eq("id", id.as_str()).select_query().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(row["id"], json!(id));
        assert_eq!(row["msg_code"], json!(1));
    }

    #[test]
    fn test_update_and_delete() {
        let store = MemoryCollection::new();
        let id = insert(&store, 1);
        let update = builder()
            .filter_eq("id", id.as_str())
            .values(json!({"$inc": {"msg_code": 10}}).as_object().cloned().unwrap())
            .update_query()
            .unwrap();
        let outcome = store.execute(&update).unwrap();
        assert_eq!(outcome.matched_count, 1);

        let count = store
            .count(&builder().filter_eq("msg_code", 11).select_query().unwrap())
            .unwrap();
        assert_eq!(count, 1);

        let delete = builder().filter_eq("id", id.as_str()).delete_query().unwrap();
        assert_eq!(store.execute(&delete).unwrap().affected_rows, 1);
        assert_eq!(
            store.count(&builder().select_query().unwrap()).unwrap(),
            0
        );
    }

    #[test]
    fn test_aggregate_pages() {
        let store = MemoryCollection::new();
        for code in 0..12 {
            insert(&store, code);
        }
        let rows = store
            .aggregate(
                &message_display(),
                vec![json!({"$sort": {"msg_code": 1}})],
                Some(2),
                Some(5),
            )
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0]["msg_code"], json!(5));
        assert!(rows[0]["id"].is_string());
    }

    #[test]
    fn test_missing_collection_reads_empty() {
        let store = MemoryCollection::new();
        assert!(store.fetch(&builder().select_query().unwrap()).unwrap().is_empty());
        assert!(!store.drop_collection("message_display"));
    }
}
