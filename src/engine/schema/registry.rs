//! Schema registry
//!
//! Owns the descriptors for every registered entity plus the cache of
//! sharded variants derived from them.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::SchemaDescriptor;

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entities: RwLock<HashMap<String, Arc<SchemaDescriptor>>>,
    /// Keyed by (entity, storage name)
    shards: RwLock<HashMap<(String, String), Arc<SchemaDescriptor>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an entity descriptor
    pub fn register(&self, schema: SchemaDescriptor) -> Arc<SchemaDescriptor> {
        let schema = Arc::new(schema);
        self.entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(schema.name.clone(), schema.clone());
        schema
    }

    pub fn get(&self, entity: &str) -> Option<Arc<SchemaDescriptor>> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .cloned()
    }

    /// Descriptor for `entity` stored under `storage_name`, built at most once
    /// per entity and derived name. Concurrent first calls may both build a variant; the
    /// first insert wins and both callers get the cached one.
    pub fn sharded(&self, entity: &str, storage_name: &str) -> Option<Arc<SchemaDescriptor>> {
        let key = (entity.to_string(), storage_name.to_string());
        if let Some(hit) = self
            .shards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Some(hit.clone());
        }

        let base = self.get(entity)?;
        let built = Arc::new(base.with_storage_name(storage_name));
        tracing::debug!(entity, storage_name, "derived sharded schema");

        let mut shards = self.shards.write().unwrap_or_else(PoisonError::into_inner);
        Some(shards.entry(key).or_insert(built).clone())
    }

    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
