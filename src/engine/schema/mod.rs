//! Entity schema descriptors
//!
//! A `SchemaDescriptor` tells the compilers how an entity's field names map to
//! storage names, which field is the identifier, and which values the store
//! side fills in on insert and update.

pub mod registry;
pub mod resolver;

pub use registry::SchemaRegistry;
pub use resolver::{resolve_insert, resolve_mutation, resolve_update, ResolveMode};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::error::{QueryError, Result};
use bson::oid::ObjectId;

/// Source of a server-computed value. Evaluated each time a mutation is
/// resolved, never when the schema is built.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueProvider {
    Literal(Value),
    /// Current UTC time, `YYYY-MM-DD HH:MM:SS.ffffff`
    Now,
    /// Fresh 24-hex ObjectId string
    ObjectId,
    /// Fresh v4 UUID string
    Uuid,
    #[serde(skip)]
    Custom(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl ValueProvider {
    pub fn literal(value: impl Into<Value>) -> Self {
        ValueProvider::Literal(value.into())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        ValueProvider::Custom(Arc::new(f))
    }

    pub fn evaluate(&self) -> Value {
        match self {
            ValueProvider::Literal(value) => value.clone(),
            ValueProvider::Now => {
                Value::String(Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string())
            }
            ValueProvider::ObjectId => Value::String(ObjectId::new().to_hex()),
            ValueProvider::Uuid => Value::String(Uuid::new_v4().to_string()),
            ValueProvider::Custom(f) => f(),
        }
    }
}

impl fmt::Debug for ValueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueProvider::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            ValueProvider::Now => write!(f, "Now"),
            ValueProvider::ObjectId => write!(f, "ObjectId"),
            ValueProvider::Uuid => write!(f, "Uuid"),
            ValueProvider::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

/// One field of an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,

    /// Storage column/key; the field name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    #[serde(default)]
    pub primary: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ValueProvider>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ValueProvider>,
}

impl FieldDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            column: None,
            primary: false,
            default: None,
            on_update: None,
        }
    }

    pub fn column(mut self, column: &str) -> Self {
        self.column = Some(column.to_string());
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn default(mut self, provider: ValueProvider) -> Self {
        self.default = Some(provider);
        self
    }

    pub fn on_update(mut self, provider: ValueProvider) -> Self {
        self.on_update = Some(provider);
        self
    }

    pub fn storage_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// Per-entity metadata shared by every query against that entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Entity name used for lookups and error messages
    pub name: String,

    /// Table or collection name; the entity name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl SchemaDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            storage_name: None,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn stored_as(mut self, storage_name: &str) -> Self {
        self.storage_name = Some(storage_name.to_string());
        self
    }

    pub fn storage_name(&self) -> &str {
        self.storage_name.as_deref().unwrap_or(&self.name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field, failing with `UnknownField`
    pub fn resolve(&self, name: &str) -> Result<&FieldDescriptor> {
        self.field(name)
            .ok_or_else(|| QueryError::unknown_field(&self.name, name))
    }

    pub fn column(&self, name: &str) -> Result<&str> {
        self.resolve(name).map(FieldDescriptor::storage_name)
    }

    pub fn field_for_storage(&self, storage: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.storage_name() == storage)
    }

    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.primary)
    }

    /// Same entity stored under a different table/collection name
    pub fn with_storage_name(&self, storage_name: &str) -> SchemaDescriptor {
        let mut sharded = self.clone();
        sharded.storage_name = Some(storage_name.to_string());
        sharded
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Mirrors the `message_display` table used throughout the tests
    pub fn message_display() -> SchemaDescriptor {
        SchemaDescriptor::new("message_display")
            .with_field(
                FieldDescriptor::new("id")
                    .primary()
                    .default(ValueProvider::ObjectId),
            )
            .with_field(FieldDescriptor::new("msg_code"))
            .with_field(FieldDescriptor::new("msg_zh"))
            .with_field(FieldDescriptor::new("msg_en"))
            .with_field(FieldDescriptor::new("description"))
            .with_field(FieldDescriptor::new("created_time").default(ValueProvider::Now))
            .with_field(
                FieldDescriptor::new("updated_time")
                    .default(ValueProvider::Now)
                    .on_update(ValueProvider::Now),
            )
    }
}
