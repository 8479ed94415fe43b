//! Mutation value resolver
//!
//! Merges caller values with the schema's default (insert) and on-update
//! (update) providers. Caller values always win. Output keys follow schema
//! field order; keys the schema does not know are appended in caller order
//! so the compiler can reject them.

use serde_json::{Map, Value};

use super::SchemaDescriptor;
use crate::engine::filter::MutationSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    Insert,
    Update,
}

/// Fill defaults for every field the caller left out
pub fn resolve_insert(schema: &SchemaDescriptor, values: &Map<String, Value>) -> Map<String, Value> {
    merge(schema, values, ResolveMode::Insert)
}

/// Evaluate every on-update provider, then let caller values override
pub fn resolve_update(schema: &SchemaDescriptor, values: &Map<String, Value>) -> Map<String, Value> {
    merge(schema, values, ResolveMode::Update)
}

/// Resolve each row of a mutation, evaluating providers per row
pub fn resolve_mutation(schema: &SchemaDescriptor, spec: &MutationSpec, mode: ResolveMode) -> MutationSpec {
    spec.map_rows(|row| merge(schema, row, mode))
}

fn merge(schema: &SchemaDescriptor, values: &Map<String, Value>, mode: ResolveMode) -> Map<String, Value> {
    let mut out = Map::new();

    for field in &schema.fields {
        if let Some(value) = values.get(&field.name) {
            out.insert(field.name.clone(), value.clone());
            continue;
        }
        let provider = match mode {
            ResolveMode::Insert => field.default.as_ref(),
            ResolveMode::Update => field.on_update.as_ref(),
        };
        if let Some(provider) = provider {
            out.insert(field.name.clone(), provider.evaluate());
        }
    }

    for (key, value) in values {
        if schema.field(key).is_none() {
            out.insert(key.clone(), value.clone());
        }
    }

    out
}
