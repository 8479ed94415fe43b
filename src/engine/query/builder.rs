//! Fluent query builder
//!
//! Every clause method appends to the accumulated state and hands the
//! builder back. Terminal operations borrow the builder, so the same
//! accumulated clauses can be compiled any number of times.

use serde_json::Value;
use std::sync::Arc;

use super::compiled::{CompiledQuery, StatementKind};
use super::paginate::PageRequest;
use crate::engine::error::{QueryError, Result};
use crate::engine::filter::{
    Condition, Distinct, FieldFilter, FieldRef, FilterSpec, HavingTerm, MutationSpec,
    OrFilterSpec, OrderTerm, SortDirection,
};
use crate::engine::schema::{resolve_mutation, ResolveMode, SchemaDescriptor};

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    schema: Option<Arc<SchemaDescriptor>>,
    filter: FilterSpec,
    or_filter: OrFilterSpec,
    projection: Vec<FieldRef>,
    order: Vec<OrderTerm>,
    group: Vec<FieldRef>,
    having: Vec<HavingTerm>,
    distinct: Distinct,
    limit: Option<u64>,
    offset: Option<u64>,
    values: Option<MutationSpec>,
    allow_full_table: bool,
    single: bool,
    upsert: bool,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target entity
    pub fn model(mut self, schema: Arc<SchemaDescriptor>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Alias of [`QueryBuilder::model`] for relational callers
    pub fn table(self, schema: Arc<SchemaDescriptor>) -> Self {
        self.model(schema)
    }

    /// AND a condition on `field`: a bare value or an operator mapping
    pub fn filter(mut self, field: &str, filter: impl Into<FieldFilter>) -> Self {
        self.filter.insert(field, filter.into());
        self
    }

    pub fn filter_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FieldFilter::Equals(value.into()))
    }

    pub fn filter_op(self, field: &str, op: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FieldFilter::op(op, value))
    }

    pub fn filter_spec(mut self, spec: FilterSpec) -> Self {
        for (field, filter) in spec.iter() {
            self.filter.insert(field, filter.clone());
        }
        self
    }

    /// Add a disjunct to the OR-group of `field`
    pub fn or_filter(mut self, field: &str, op: &str, value: impl Into<Value>) -> Self {
        self.or_filter.insert(field, vec![Condition::new(op, value)]);
        self
    }

    pub fn or_filter_spec(mut self, spec: OrFilterSpec) -> Self {
        for (field, conditions) in spec.iter() {
            self.or_filter.insert(field, conditions.clone());
        }
        self
    }

    pub fn order_by(mut self, target: impl Into<FieldRef>, direction: SortDirection) -> Self {
        self.order.push(OrderTerm {
            target: target.into(),
            direction,
        });
        self
    }

    pub fn group_by(mut self, target: impl Into<FieldRef>) -> Self {
        self.group.push(target.into());
        self
    }

    pub fn having(mut self, target: impl Into<FieldRef>, op: &str, value: impl Into<Value>) -> Self {
        self.having.push(HavingTerm {
            target: target.into(),
            condition: Condition::new(op, value),
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        if !self.distinct.is_set() {
            self.distinct = Distinct::All;
        }
        self
    }

    pub fn distinct_on(mut self, fields: &[&str]) -> Self {
        let mut columns = match std::mem::take(&mut self.distinct) {
            Distinct::On(columns) => columns,
            _ => Vec::new(),
        };
        columns.extend(fields.iter().map(|f| FieldRef::field(*f)));
        self.distinct = Distinct::On(columns);
        self
    }

    pub fn project(mut self, fields: &[&str]) -> Self {
        self.projection.extend(fields.iter().map(|f| FieldRef::field(*f)));
        self
    }

    pub fn project_raw(mut self, expr: &str) -> Self {
        self.projection.push(FieldRef::raw(expr));
        self
    }

    pub fn values(mut self, values: impl Into<MutationSpec>) -> Self {
        self.values = Some(values.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Opt in to update/delete statements with no filter
    pub fn allow_full_table(mut self) -> Self {
        self.allow_full_table = true;
        self
    }

    /// Touch a single row/document (find one, update one, delete one)
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// Insert when an update matches nothing (document backend)
    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    pub fn schema(&self) -> Option<&Arc<SchemaDescriptor>> {
        self.schema.as_ref()
    }

    pub fn has_order(&self) -> bool {
        !self.order.is_empty()
    }

    /// Copy of this builder restricted to one page. Appends an ascending
    /// identifier order when none was given, so pages stay stable.
    pub fn windowed(&self, request: &PageRequest, order_by_identifier: bool) -> QueryBuilder {
        let mut builder = self.clone();
        builder.limit = request.limit();
        builder.offset = request.offset();
        if order_by_identifier && !builder.has_order() {
            let pk = builder
                .schema
                .as_ref()
                .and_then(|s| s.primary_key())
                .map(|f| f.name.clone());
            if let Some(name) = pk {
                builder = builder.order_by(name, SortDirection::Asc);
            }
        }
        builder
    }

    pub fn select_query(&self) -> Result<CompiledQuery> {
        self.freeze(StatementKind::Select, None)
    }

    pub fn insert_query(&self) -> Result<CompiledQuery> {
        let schema = self.require_schema()?;
        let values = self
            .values
            .clone()
            .unwrap_or_else(|| MutationSpec::Single(Default::default()));
        let resolved = resolve_mutation(schema, &values, ResolveMode::Insert);
        self.freeze(StatementKind::Insert, Some(resolved))
    }

    pub fn update_query(&self) -> Result<CompiledQuery> {
        let schema = self.require_schema()?;
        let values = self
            .values
            .clone()
            .unwrap_or_else(|| MutationSpec::Single(Default::default()));
        // Batch rows carry their own match keys
        if !values.is_batch() {
            self.guard_full_table("update", schema)?;
        }
        let resolved = resolve_mutation(schema, &values, ResolveMode::Update);
        self.freeze(StatementKind::Update, Some(resolved))
    }

    pub fn delete_query(&self) -> Result<CompiledQuery> {
        let schema = self.require_schema()?;
        self.guard_full_table("delete", schema)?;
        self.freeze(StatementKind::Delete, None)
    }

    /// Select restricted to the requested page
    pub fn paginate_query(&self, request: &PageRequest, order_by_identifier: bool) -> Result<CompiledQuery> {
        self.windowed(request, order_by_identifier).select_query()
    }

    fn require_schema(&self) -> Result<&Arc<SchemaDescriptor>> {
        self.schema.as_ref().ok_or(QueryError::MissingModel)
    }

    fn guard_full_table(&self, action: &'static str, schema: &SchemaDescriptor) -> Result<()> {
        if self.filter.is_empty() && !self.allow_full_table {
            tracing::warn!(entity = %schema.name, action, "rejected unfiltered mutation");
            return Err(QueryError::MissingFilter {
                action,
                entity: schema.name.clone(),
            });
        }
        Ok(())
    }

    fn freeze(&self, kind: StatementKind, values: Option<MutationSpec>) -> Result<CompiledQuery> {
        let schema = self.require_schema()?.clone();
        Ok(CompiledQuery {
            kind,
            schema,
            filter: self.filter.clone(),
            or_filter: self.or_filter.clone(),
            projection: self.projection.clone(),
            order: self.order.clone(),
            group: self.group.clone(),
            having: self.having.clone(),
            distinct: self.distinct.clone(),
            limit: self.limit,
            offset: self.offset,
            values,
            allow_full_table: self.allow_full_table,
            single: self.single,
            upsert: self.upsert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::PaginationConfig;
    use crate::engine::schema::fixtures::message_display;
    use serde_json::json;

    fn builder() -> QueryBuilder {
        QueryBuilder::new().model(Arc::new(message_display()))
    }

    #[test]
    fn test_missing_model() {
        let err = QueryBuilder::new().select_query().unwrap_err();
        assert_eq!(err, QueryError::MissingModel);
    }

    #[test]
    fn test_delete_without_filter_is_rejected() {
        let err = builder().delete_query().unwrap_err();
        assert!(matches!(err, QueryError::MissingFilter { action: "delete", .. }));

        assert!(builder().allow_full_table().delete_query().is_ok());
        assert!(builder().filter_eq("id", "x").delete_query().is_ok());
    }

    #[test]
    fn test_or_filter_alone_does_not_satisfy_guard() {
        let err = builder()
            .or_filter("msg_code", "eq", json!([3, 8]))
            .update_query()
            .unwrap_err();
        assert!(matches!(err, QueryError::MissingFilter { action: "update", .. }));
    }

    #[test]
    fn test_builder_is_reusable() {
        let b = builder().filter_eq("msg_code", 1).order_by("msg_code", SortDirection::Desc);
        let first = b.select_query().unwrap();
        let again = b.clone().limit(5).select_query().unwrap();
        assert_eq!(first.limit(), None);
        assert_eq!(again.limit(), Some(5));
        assert_eq!(first.filter(), again.filter());
    }

    #[test]
    fn test_windowed_adds_identifier_order() {
        let request = PageRequest::new(3, 10, &PaginationConfig::default());
        let q = builder().paginate_query(&request, true).unwrap();
        assert_eq!(q.limit(), Some(10));
        assert_eq!(q.offset(), Some(20));
        assert_eq!(q.order()[0].target, FieldRef::field("id"));

        let q = builder()
            .order_by("msg_code", SortDirection::Asc)
            .paginate_query(&request, true)
            .unwrap();
        assert_eq!(q.order().len(), 1);

        let q = builder().paginate_query(&request, false).unwrap();
        assert!(q.order().is_empty());
    }

    #[test]
    fn test_insert_resolves_defaults_at_terminal_op() {
        let q = builder()
            .values(json!({"msg_code": 1}).as_object().cloned().unwrap())
            .insert_query()
            .unwrap();
        let row = q.values().unwrap().rows()[0].clone();
        assert!(row.contains_key("id"));
        assert!(row.contains_key("created_time"));
    }
}
