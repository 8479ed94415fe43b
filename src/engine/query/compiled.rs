//! Frozen query produced by the builder

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::engine::adapter::compiler::RelationalCompiler;
use crate::engine::adapter::dialect::SqlDialect;
use crate::engine::adapter::render::{CompiledSql, SqlRenderer};
use crate::engine::error::Result;
use crate::engine::filter::{
    Distinct, FieldRef, FilterSpec, HavingTerm, MutationSpec, OrFilterSpec, OrderTerm,
};
use crate::engine::nosql::compiler::{DocumentCompiler, DocumentOperation};
use crate::engine::schema::SchemaDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Immutable result of a builder terminal operation. A different window or
/// filter means building a new one.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub(crate) kind: StatementKind,
    pub(crate) schema: Arc<SchemaDescriptor>,
    pub(crate) filter: FilterSpec,
    pub(crate) or_filter: OrFilterSpec,
    pub(crate) projection: Vec<FieldRef>,
    pub(crate) order: Vec<OrderTerm>,
    pub(crate) group: Vec<FieldRef>,
    pub(crate) having: Vec<HavingTerm>,
    pub(crate) distinct: Distinct,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) values: Option<MutationSpec>,
    pub(crate) allow_full_table: bool,
    pub(crate) single: bool,
    pub(crate) upsert: bool,
}

impl CompiledQuery {
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    pub fn or_filter(&self) -> &OrFilterSpec {
        &self.or_filter
    }

    pub fn projection(&self) -> &[FieldRef] {
        &self.projection
    }

    pub fn order(&self) -> &[OrderTerm] {
        &self.order
    }

    pub fn group(&self) -> &[FieldRef] {
        &self.group
    }

    pub fn having(&self) -> &[HavingTerm] {
        &self.having
    }

    pub fn distinct(&self) -> &Distinct {
        &self.distinct
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Resolved mutation values (defaults and on-update values applied)
    pub fn values(&self) -> Option<&MutationSpec> {
        self.values.as_ref()
    }

    pub fn allows_full_table(&self) -> bool {
        self.allow_full_table
    }

    pub fn is_single(&self) -> bool {
        self.single
    }

    pub fn is_upsert(&self) -> bool {
        self.upsert
    }

    /// SQL text and parameters for this statement
    pub fn to_sql(&self, dialect: SqlDialect) -> Result<CompiledSql> {
        let statement = RelationalCompiler::new(&self.schema).compile(self)?;
        Ok(SqlRenderer::new(dialect).render(&statement))
    }

    /// SQL text and parameters for the row-count variant of this statement
    pub fn count_sql(&self, dialect: SqlDialect) -> Result<CompiledSql> {
        let statement = RelationalCompiler::new(&self.schema).compile_count(self)?;
        Ok(SqlRenderer::new(dialect).render(&statement))
    }

    /// Document-store filter using the default identifier codec
    pub fn to_filter_document(&self) -> Result<Map<String, Value>> {
        DocumentCompiler::new().filter_document(self)
    }

    pub fn to_document_operation(&self) -> Result<DocumentOperation> {
        DocumentCompiler::new().compile(self)
    }
}
