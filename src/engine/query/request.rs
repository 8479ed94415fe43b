//! JSON form of a builder chain
//!
//! Lets a schema file plus a request file drive the builder without Rust
//! code, for the CLI and for tests that keep their fixtures as JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::builder::QueryBuilder;
use super::compiled::CompiledQuery;
use super::paginate::PageRequest;
use crate::engine::config::Config;
use crate::engine::error::Result;
use crate::engine::filter::{FieldRef, FilterSpec, MutationSpec, OrFilterSpec, SortDirection};
use crate::engine::schema::SchemaDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    #[default]
    Select,
    Count,
    Insert,
    Update,
    Delete,
    Paginate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub field: String,
    #[serde(default)]
    pub dir: SortDirection,
    /// `field` is a raw backend expression, not a schema field
    #[serde(default)]
    pub raw: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HavingRequest {
    pub expr: String,
    #[serde(default)]
    pub raw: bool,
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub kind: RequestKind,
    pub filter: Map<String, Value>,
    pub or_filter: Map<String, Value>,
    pub project: Vec<String>,
    pub project_raw: Vec<String>,
    pub order_by: Vec<OrderRequest>,
    pub group_by: Vec<String>,
    pub having: Vec<HavingRequest>,
    pub distinct: bool,
    pub distinct_on: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub values: Option<MutationSpec>,
    pub allow_full_table: bool,
    pub single: bool,
    pub upsert: bool,
}

impl QueryRequest {
    /// Replay every clause of this request onto `builder`
    pub fn apply(&self, mut builder: QueryBuilder) -> QueryBuilder {
        builder = builder
            .filter_spec(FilterSpec::from_json(self.filter.clone()))
            .or_filter_spec(OrFilterSpec::from_json(self.or_filter.clone()));

        if !self.project.is_empty() {
            let fields: Vec<&str> = self.project.iter().map(String::as_str).collect();
            builder = builder.project(&fields);
        }
        for expr in &self.project_raw {
            builder = builder.project_raw(expr);
        }
        for order in &self.order_by {
            let target = if order.raw {
                FieldRef::raw(order.field.as_str())
            } else {
                FieldRef::field(order.field.as_str())
            };
            builder = builder.order_by(target, order.dir);
        }
        for group in &self.group_by {
            builder = builder.group_by(group.as_str());
        }
        for having in &self.having {
            let target = if having.raw {
                FieldRef::raw(having.expr.as_str())
            } else {
                FieldRef::field(having.expr.as_str())
            };
            builder = builder.having(target, &having.op, having.value.clone());
        }
        if self.distinct {
            builder = builder.distinct();
        }
        if !self.distinct_on.is_empty() {
            let fields: Vec<&str> = self.distinct_on.iter().map(String::as_str).collect();
            builder = builder.distinct_on(&fields);
        }
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }
        if let Some(values) = &self.values {
            builder = builder.values(values.clone());
        }
        if self.allow_full_table {
            builder = builder.allow_full_table();
        }
        if self.single {
            builder = builder.single();
        }
        if self.upsert {
            builder = builder.upsert();
        }
        builder
    }

    /// Build against `schema` and run the terminal operation named by `kind`.
    /// `Count` yields the select whose count variant the caller renders.
    pub fn compile(&self, schema: Arc<SchemaDescriptor>, config: &Config) -> Result<CompiledQuery> {
        let mut builder = self.apply(QueryBuilder::new().model(schema));
        if config.safety.allow_full_table_mutation {
            builder = builder.allow_full_table();
        }

        match self.kind {
            RequestKind::Select | RequestKind::Count => builder.select_query(),
            RequestKind::Insert => builder.insert_query(),
            RequestKind::Update => builder.update_query(),
            RequestKind::Delete => builder.delete_query(),
            RequestKind::Paginate => {
                let request = PageRequest::new(
                    self.page.unwrap_or(1),
                    self.page_size
                        .unwrap_or(config.pagination.default_page_size as i64),
                    &config.pagination,
                );
                builder.paginate_query(&request, config.pagination.order_by_identifier)
            }
        }
    }
}
