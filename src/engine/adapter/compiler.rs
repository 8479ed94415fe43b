//! Relational compiler
//!
//! Lowers a `CompiledQuery` to a dialect-free `Statement`. Field names are
//! resolved to storage columns here; placeholder naming and quoting belong
//! to the renderer.

use serde_json::{Map, Value};

use super::expr::{
    CompareOp, DeleteStatement, Expr, InsertStatement, RowKey, SelectDistinct, SelectItem,
    SelectStatement, Source, Statement, UpdateStatement,
};
use crate::engine::error::{QueryError, Result};
use crate::engine::filter::{Distinct, FieldRef, MutationSpec, OperatorTag};
use crate::engine::query::{CompiledQuery, StatementKind};
use crate::engine::schema::SchemaDescriptor;

/// Alias of the counted subquery when a count wraps a grouped/distinct select
const COUNT_SUBQUERY: &str = "counted";

pub struct RelationalCompiler<'a> {
    schema: &'a SchemaDescriptor,
}

impl<'a> RelationalCompiler<'a> {
    pub fn new(schema: &'a SchemaDescriptor) -> Self {
        Self { schema }
    }

    pub fn compile(&self, query: &CompiledQuery) -> Result<Statement> {
        let statement = match query.kind() {
            StatementKind::Select => Statement::Select(self.select(query)?),
            StatementKind::Insert => Statement::Insert(self.insert(query)?),
            StatementKind::Update => Statement::Update(self.update(query)?),
            StatementKind::Delete => Statement::Delete(DeleteStatement {
                table: self.table().to_string(),
                filter: self.where_clause(query)?,
            }),
        };
        tracing::debug!(entity = %self.schema.name, kind = ?query.kind(), "compiled relational statement");
        Ok(statement)
    }

    /// `count(*)` over the rows the select would page through. Ordering and
    /// windowing are dropped; grouped or distinct selects are counted as a
    /// subquery so each group counts once.
    pub fn compile_count(&self, query: &CompiledQuery) -> Result<Statement> {
        let mut base = self.select(query)?;
        base.order_by.clear();
        base.limit = None;
        base.offset = None;

        let count_item = SelectItem::aliased(Expr::CountAll, "count");
        let needs_subquery = !base.group_by.is_empty() || base.distinct != SelectDistinct::None;

        let statement = if needs_subquery {
            let mut outer =
                SelectStatement::new(Source::Subquery(Box::new(base), COUNT_SUBQUERY.to_string()));
            outer.items.push(count_item);
            outer
        } else {
            base.items = vec![count_item];
            base
        };
        Ok(Statement::Select(statement))
    }

    fn table(&self) -> &str {
        self.schema.storage_name()
    }

    fn column(&self, field: &str) -> Result<Expr> {
        let column = self.schema.column(field)?;
        Ok(Expr::column(self.table(), column))
    }

    fn target(&self, target: &FieldRef) -> Result<Expr> {
        match target {
            FieldRef::Field(name) => self.column(name),
            FieldRef::Raw(sql) => Ok(Expr::Raw(sql.clone())),
        }
    }

    /// Placeholder base name for operands compared against `target`
    fn param_name(&self, target: &FieldRef) -> Result<String> {
        match target {
            FieldRef::Field(name) => Ok(self.schema.column(name)?.to_string()),
            FieldRef::Raw(_) => Ok("having".to_string()),
        }
    }

    fn select(&self, query: &CompiledQuery) -> Result<SelectStatement> {
        let mut statement = SelectStatement::new(Source::Table(self.table().to_string()));

        statement.items = if query.projection().is_empty() {
            self.schema
                .fields
                .iter()
                .map(|f| SelectItem::new(Expr::column(self.table(), f.storage_name())))
                .collect()
        } else {
            query
                .projection()
                .iter()
                .map(|target| self.target(target).map(SelectItem::new))
                .collect::<Result<_>>()?
        };

        statement.filter = self.where_clause(query)?;

        statement.group_by = query
            .group()
            .iter()
            .map(|target| self.target(target))
            .collect::<Result<_>>()?;

        let mut having = Vec::new();
        for term in query.having() {
            let tag = term.condition.tag()?;
            let label = match &term.target {
                FieldRef::Field(name) => name.as_str(),
                FieldRef::Raw(sql) => sql.as_str(),
            };
            having.push(self.predicate(
                label,
                self.target(&term.target)?,
                &self.param_name(&term.target)?,
                tag,
                &term.condition.value,
            )?);
        }
        statement.having = Expr::and_all(having);

        statement.distinct = match query.distinct() {
            Distinct::None => SelectDistinct::None,
            Distinct::All => SelectDistinct::All,
            Distinct::On(targets) => SelectDistinct::On(
                targets
                    .iter()
                    .map(|target| self.target(target))
                    .collect::<Result<_>>()?,
            ),
        };

        statement.order_by = query
            .order()
            .iter()
            .map(|term| Ok((self.target(&term.target)?, term.direction)))
            .collect::<Result<_>>()?;

        statement.limit = match (query.limit(), query.is_single()) {
            (Some(limit), true) => Some(limit.min(1)),
            (None, true) => Some(1),
            (limit, false) => limit,
        };
        statement.offset = query.offset();

        Ok(statement)
    }

    /// AND of every FilterSpec condition and every non-empty OR-group
    fn where_clause(&self, query: &CompiledQuery) -> Result<Option<Expr>> {
        let mut terms = Vec::new();

        for (field, filter) in query.filter().iter() {
            let column = self.schema.column(field)?;
            for condition in filter.conditions() {
                let tag = condition.tag()?;
                terms.push(self.predicate(
                    field,
                    Expr::column(self.table(), column),
                    column,
                    tag,
                    &condition.value,
                )?);
            }
        }

        for (field, conditions) in query.or_filter().iter() {
            let column = self.schema.column(field)?;
            let mut disjuncts = Vec::new();
            for condition in conditions {
                for (tag, value) in condition.disjuncts()? {
                    disjuncts.push(self.predicate(
                        field,
                        Expr::column(self.table(), column),
                        column,
                        tag,
                        &value,
                    )?);
                }
            }
            if let Some(group) = Expr::or_all(disjuncts) {
                terms.push(group);
            }
        }

        Ok(Expr::and_all(terms))
    }

    /// One `target <op> operand` predicate
    fn predicate(
        &self,
        field: &str,
        target: Expr,
        param: &str,
        tag: OperatorTag,
        value: &Value,
    ) -> Result<Expr> {
        let operand = |v: &Value| Expr::param(param, v.clone());
        let compare = |op| Expr::compare(target.clone(), op, operand(value));

        let expr = match tag {
            OperatorTag::Eq if value.is_null() => Expr::IsNull {
                expr: Box::new(target),
                negated: false,
            },
            OperatorTag::Ne if value.is_null() => Expr::IsNull {
                expr: Box::new(target),
                negated: true,
            },
            OperatorTag::Eq => compare(CompareOp::Eq),
            OperatorTag::Ne => compare(CompareOp::NotEq),
            OperatorTag::Gt => compare(CompareOp::Gt),
            OperatorTag::Gte => compare(CompareOp::GtEq),
            OperatorTag::Lt => compare(CompareOp::Lt),
            OperatorTag::Lte => compare(CompareOp::LtEq),
            OperatorTag::In | OperatorTag::Nin => {
                let negated = tag == OperatorTag::Nin;
                let items = value.as_array().ok_or_else(|| {
                    QueryError::invalid_operand(field, tag.as_str(), "expected a list")
                })?;
                if items.is_empty() {
                    // Nothing is in the empty set
                    Expr::Bool(negated)
                } else {
                    Expr::InList {
                        expr: Box::new(target),
                        list: items.iter().map(operand).collect(),
                        negated,
                    }
                }
            }
            OperatorTag::Like | OperatorTag::Ilike => {
                if !value.is_string() {
                    return Err(QueryError::invalid_operand(
                        field,
                        tag.as_str(),
                        "expected a string pattern",
                    ));
                }
                Expr::Like {
                    expr: Box::new(target),
                    pattern: Box::new(operand(value)),
                    case_insensitive: tag == OperatorTag::Ilike,
                }
            }
            OperatorTag::Between => match value.as_array().map(Vec::as_slice) {
                Some([low, high]) => Expr::Between {
                    expr: Box::new(target),
                    low: Box::new(operand(low)),
                    high: Box::new(operand(high)),
                },
                _ => {
                    return Err(QueryError::invalid_operand(
                        field,
                        tag.as_str(),
                        "expected [low, high]",
                    ))
                }
            },
        };
        Ok(expr)
    }

    /// Storage columns of `row`, in row order
    fn columns_of(&self, row: &Map<String, Value>) -> Result<Vec<String>> {
        row.keys()
            .map(|key| self.schema.column(key).map(str::to_string))
            .collect()
    }

    /// Values of `row` in the order of `keys`; every row of a batch must carry
    /// the same keys
    fn values_in_order(
        &self,
        row: &Map<String, Value>,
        keys: &[&String],
        action: &str,
    ) -> Result<Vec<Value>> {
        if row.len() != keys.len() {
            return Err(QueryError::invalid_operand(
                &self.schema.name,
                action,
                "batch rows must share one set of fields",
            ));
        }
        keys.iter()
            .map(|key| {
                row.get(key.as_str()).cloned().ok_or_else(|| {
                    QueryError::invalid_operand(
                        key,
                        action,
                        "batch rows must share one set of fields",
                    )
                })
            })
            .collect()
    }

    fn mutation_values<'q>(&self, query: &'q CompiledQuery) -> Vec<&'q Map<String, Value>> {
        query.values().map(MutationSpec::rows).unwrap_or_default()
    }

    fn insert(&self, query: &CompiledQuery) -> Result<InsertStatement> {
        let rows = self.mutation_values(query);
        let Some(first) = rows.first() else {
            return Err(QueryError::invalid_operand(
                &self.schema.name,
                "insert",
                "no rows to insert",
            ));
        };

        let columns = self.columns_of(first)?;
        let keys: Vec<&String> = first.keys().collect();
        let values = rows
            .iter()
            .map(|row| self.values_in_order(row, &keys, "insert"))
            .collect::<Result<_>>()?;

        Ok(InsertStatement {
            table: self.table().to_string(),
            columns,
            rows: values,
        })
    }

    fn update(&self, query: &CompiledQuery) -> Result<UpdateStatement> {
        let rows = self.mutation_values(query);
        let batch = query.values().is_some_and(MutationSpec::is_batch);
        let filter = self.where_clause(query)?;

        let Some(first) = rows.first() else {
            return Err(QueryError::invalid_operand(
                &self.schema.name,
                "update",
                "no values to assign",
            ));
        };

        if !batch {
            let columns = self.columns_of(first)?;
            if columns.is_empty() {
                return Err(QueryError::invalid_operand(
                    &self.schema.name,
                    "update",
                    "no values to assign",
                ));
            }
            return Ok(UpdateStatement {
                table: self.table().to_string(),
                columns,
                rows: vec![first.values().cloned().collect()],
                filter,
                row_key: None,
            });
        }

        let pk = self.schema.primary_key().ok_or_else(|| {
            QueryError::invalid_operand(
                &self.schema.name,
                "update",
                "batch update needs an identifier field",
            )
        })?;

        let keys: Vec<&String> = first.keys().filter(|k| **k != pk.name).collect();
        if keys.is_empty() {
            return Err(QueryError::invalid_operand(
                &self.schema.name,
                "update",
                "no values to assign",
            ));
        }
        let columns = keys
            .iter()
            .map(|key| self.schema.column(key).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;

        let mut key_values = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let key = row.get(&pk.name).cloned().ok_or_else(|| {
                QueryError::invalid_operand(&pk.name, "update", "every batch row needs its identifier")
            })?;
            let mut assignments = Map::clone(row);
            assignments.remove(&pk.name);
            values.push(self.values_in_order(&assignments, &keys, "update")?);
            key_values.push(key);
        }

        Ok(UpdateStatement {
            table: self.table().to_string(),
            columns,
            rows: values,
            filter,
            row_key: Some(RowKey {
                table: self.table().to_string(),
                column: pk.storage_name().to_string(),
                values: key_values,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adapter::dialect::SqlDialect;
    use crate::engine::adapter::render::Params;
    use crate::engine::query::QueryBuilder;
    use crate::engine::schema::fixtures::message_display;
    use crate::engine::filter::SortDirection;
    use serde_json::json;
    use std::sync::Arc;

    const ID: &str = "5e53bb135b64856045ccb8dc";
    const COLUMNS: &str = "\"message_display\".\"id\", \"message_display\".\"msg_code\", \
\"message_display\".\"msg_zh\", \"message_display\".\"msg_en\", \
\"message_display\".\"description\", \"message_display\".\"created_time\", \
\"message_display\".\"updated_time\"";

    fn builder() -> QueryBuilder {
        QueryBuilder::new().model(Arc::new(message_display()))
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn single(params: &Params) -> &Map<String, Value> {
        match params {
            Params::Single(map) => map,
            Params::Batch(_) => panic!("expected a single payload"),
        }
    }

    #[test]
    fn test_select_by_id() {
        let sql = builder()
            .filter_eq("id", ID)
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap();
        assert_eq!(
            sql.sql,
            format!(
                "SELECT {} FROM \"message_display\" WHERE \"message_display\".\"id\" = :id_1",
                COLUMNS
            )
        );
        assert_eq!(single(&sql.params), &obj(json!({"id_1": ID})));
    }

    #[test]
    fn test_select_count() {
        let sql = builder()
            .filter_eq("id", ID)
            .order_by("msg_code", SortDirection::Asc)
            .limit(10)
            .select_query()
            .unwrap()
            .count_sql(SqlDialect::Mysql)
            .unwrap();
        assert_eq!(
            sql.sql,
            "SELECT count(*) AS `count` FROM `message_display` WHERE `message_display`.`id` = %(id_1)s"
        );
        assert_eq!(single(&sql.params), &obj(json!({"id_1": ID})));
    }

    #[test]
    fn test_grouped_count_uses_subquery() {
        let sql = builder()
            .project(&["msg_code"])
            .group_by("msg_code")
            .select_query()
            .unwrap()
            .count_sql(SqlDialect::Sqlite)
            .unwrap();
        assert_eq!(
            sql.sql,
            "SELECT count(*) AS \"count\" FROM (SELECT \"message_display\".\"msg_code\" \
FROM \"message_display\" GROUP BY \"message_display\".\"msg_code\") AS \"counted\""
        );
    }

    #[test]
    fn test_insert() {
        let sql = builder()
            .values(obj(json!({"msg_code": 3100, "id": ID, "msg_zh": "fdfdf"})))
            .insert_query()
            .unwrap()
            .to_sql(SqlDialect::Mysql)
            .unwrap();
        assert_eq!(
            sql.sql,
            "INSERT INTO `message_display` (`id`, `msg_code`, `msg_zh`, `created_time`, `updated_time`) \
VALUES (%(id)s, %(msg_code)s, %(msg_zh)s, %(created_time)s, %(updated_time)s)"
        );
        let params = single(&sql.params);
        assert_eq!(params["id"], json!(ID));
        assert_eq!(params["msg_code"], json!(3100));
        assert_eq!(params["msg_zh"], json!("fdfdf"));
    }

    #[test]
    fn test_update() {
        let sql = builder()
            .filter_eq("id", ID)
            .values(obj(json!({"msg_code": 3100})))
            .update_query()
            .unwrap()
            .to_sql(SqlDialect::Mysql)
            .unwrap();
        assert_eq!(
            sql.sql,
            "UPDATE `message_display` SET `msg_code` = %(msg_code)s, `updated_time` = %(updated_time)s \
WHERE `message_display`.`id` = %(id_1)s"
        );
        let params = single(&sql.params);
        assert_eq!(params["id_1"], json!(ID));
        assert_eq!(params["msg_code"], json!(3100));
        assert!(params.contains_key("updated_time"));
    }

    #[test]
    fn test_delete() {
        let sql = builder()
            .filter_eq("id", ID)
            .delete_query()
            .unwrap()
            .to_sql(SqlDialect::Mysql)
            .unwrap();
        assert_eq!(
            sql.sql,
            "DELETE FROM `message_display` WHERE `message_display`.`id` = %(id_1)s"
        );
        assert_eq!(single(&sql.params), &obj(json!({"id_1": ID})));
    }

    #[test]
    fn test_paginate_emits_data_and_count() {
        let request = crate::engine::query::PageRequest::new(
            2,
            10,
            &crate::engine::config::PaginationConfig::default(),
        );
        let query = builder().filter_eq("id", ID).paginate_query(&request, true).unwrap();
        let data = query.to_sql(SqlDialect::Sqlite).unwrap();
        let count = query.count_sql(SqlDialect::Sqlite).unwrap();
        assert!(data.sql.ends_with("ORDER BY \"message_display\".\"id\" ASC LIMIT 10 OFFSET 10"));
        assert!(count.sql.starts_with("SELECT count(*) AS \"count\""));
        assert!(!count.sql.contains("LIMIT"));
    }

    #[test]
    fn test_between_and_range_numbering() {
        let range = builder()
            .filter("msg_code", json!({"gte": 3, "lte": 9}))
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap();
        assert!(range.sql.ends_with(
            "WHERE \"message_display\".\"msg_code\" >= :msg_code_1 AND \"message_display\".\"msg_code\" <= :msg_code_2"
        ));
        assert_eq!(single(&range.params), &obj(json!({"msg_code_1": 3, "msg_code_2": 9})));

        let between = builder()
            .filter_op("msg_code", "between", json!([3, 9]))
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap();
        assert!(between
            .sql
            .ends_with("WHERE \"message_display\".\"msg_code\" BETWEEN :msg_code_1 AND :msg_code_2"));
    }

    #[test]
    fn test_or_group_explodes_scalar_operand() {
        let sql = builder()
            .filter_eq("msg_zh", "x")
            .or_filter("msg_code", "eq", json!([3, 8]))
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap();
        assert!(sql.sql.ends_with(
            "WHERE \"message_display\".\"msg_zh\" = :msg_zh_1 AND \
(\"message_display\".\"msg_code\" = :msg_code_1 OR \"message_display\".\"msg_code\" = :msg_code_2)"
        ));
    }

    #[test]
    fn test_in_list_and_empty_sets() {
        let sql = builder()
            .filter_op("msg_code", "in", json!([1, 2]))
            .filter_op("msg_zh", "nin", json!([]))
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Postgres)
            .unwrap();
        assert!(sql.sql.ends_with(
            "WHERE \"message_display\".\"msg_code\" IN ($1, $2) AND 1 = 1"
        ));

        let sql = builder()
            .filter_op("msg_code", "in", json!([]))
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap();
        assert!(sql.sql.ends_with("WHERE 1 = 0"));
    }

    #[test]
    fn test_null_equality() {
        let sql = builder()
            .filter_eq("msg_en", Value::Null)
            .filter_op("description", "ne", Value::Null)
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap();
        assert!(sql.sql.ends_with(
            "WHERE \"message_display\".\"msg_en\" IS NULL AND \"message_display\".\"description\" IS NOT NULL"
        ));
        assert!(single(&sql.params).is_empty());
    }

    #[test]
    fn test_ilike_per_dialect() {
        let query = builder()
            .filter_op("msg_en", "ilike", "%hello%")
            .select_query()
            .unwrap();
        assert!(query
            .to_sql(SqlDialect::Postgres)
            .unwrap()
            .sql
            .ends_with("\"message_display\".\"msg_en\" ILIKE $1"));
        assert!(query
            .to_sql(SqlDialect::Sqlite)
            .unwrap()
            .sql
            .ends_with("lower(\"message_display\".\"msg_en\") LIKE lower(:msg_en_1)"));
    }

    #[test]
    fn test_operand_errors() {
        let err = builder()
            .filter_op("msg_code", "between", json!([1]))
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidOperand { .. }));

        let err = builder()
            .filter_op("msg_code", "in", 3)
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidOperand { .. }));

        let err = builder()
            .filter_op("msg_code", "approx", 3)
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap_err();
        assert_eq!(err, QueryError::InvalidFilterOperator("approx".to_string()));

        let err = builder()
            .filter_eq("nope", 3)
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap_err();
        assert_eq!(err, QueryError::unknown_field("message_display", "nope"));
    }

    #[test]
    fn test_compiling_twice_is_identical() {
        let query = builder()
            .values(obj(json!({"msg_code": 1})))
            .insert_query()
            .unwrap();
        assert_eq!(
            query.to_sql(SqlDialect::Sqlite).unwrap(),
            query.to_sql(SqlDialect::Sqlite).unwrap()
        );
    }

    #[test]
    fn test_batch_update_uses_row_keys() {
        let rows = vec![
            obj(json!({"id": "a", "msg_code": 1, "updated_time": "t"})),
            obj(json!({"id": "b", "msg_code": 2, "updated_time": "t"})),
        ];
        let sql = builder()
            .values(rows)
            .update_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap();
        assert_eq!(
            sql.sql,
            "UPDATE \"message_display\" SET \"msg_code\" = :msg_code, \"updated_time\" = :updated_time \
WHERE \"message_display\".\"id\" = :id_match"
        );
        match sql.params {
            Params::Batch(payloads) => {
                assert_eq!(payloads.len(), 2);
                assert_eq!(payloads[1]["id_match"], json!("b"));
                assert_eq!(payloads[1]["msg_code"], json!(2));
            }
            Params::Single(_) => panic!("expected batch payloads"),
        }
    }

    #[test]
    fn test_batch_update_requires_identifier() {
        let rows = vec![obj(json!({"msg_code": 1}))];
        let err = builder()
            .values(rows)
            .update_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidOperand { .. }));
    }

    #[test]
    fn test_batch_insert_payload_per_row() {
        let rows = vec![
            obj(json!({"id": "a", "msg_code": 1})),
            obj(json!({"id": "b", "msg_code": 2})),
        ];
        let sql = builder()
            .values(rows)
            .insert_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap();
        assert_eq!(sql.params.payloads().len(), 2);
        assert_eq!(sql.params.payloads()[0]["id"], json!("a"));
    }

    #[test]
    fn test_update_rejects_operator_keys() {
        let err = builder()
            .filter_eq("id", ID)
            .values(obj(json!({"$inc": {"msg_code": 1}})))
            .update_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap_err();
        assert_eq!(err, QueryError::unknown_field("message_display", "$inc"));
    }

    #[test]
    fn test_distinct_on_falls_back_outside_postgres() {
        let query = builder().distinct_on(&["msg_code"]).select_query().unwrap();
        assert!(query
            .to_sql(SqlDialect::Postgres)
            .unwrap()
            .sql
            .starts_with("SELECT DISTINCT ON (\"message_display\".\"msg_code\") "));
        assert!(query
            .to_sql(SqlDialect::Sqlite)
            .unwrap()
            .sql
            .starts_with("SELECT DISTINCT \"message_display\""));
    }

    #[test]
    fn test_having_with_raw_target() {
        let sql = builder()
            .project(&["msg_code"])
            .project_raw("count(*)")
            .group_by("msg_code")
            .having(FieldRef::raw("count(*)"), "gt", 1)
            .select_query()
            .unwrap()
            .to_sql(SqlDialect::Sqlite)
            .unwrap();
        assert!(sql.sql.ends_with(
            "GROUP BY \"message_display\".\"msg_code\" HAVING count(*) > :having_1"
        ));
    }
}
