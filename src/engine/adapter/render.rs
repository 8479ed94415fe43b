//! SQL text rendering
//!
//! Every operand becomes a named placeholder. Filter operands are named
//! `{column}_{n}`, assignment values take their column's name and the
//! per-row key of a batch update is `{pk}_match`. Names never repeat within
//! one statement, and characters a driver cannot bind (anything outside
//! `[A-Za-z0-9_]`) become `_`.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use super::dialect::SqlDialect;
use super::expr::{
    DeleteStatement, Expr, InsertStatement, SelectDistinct, SelectStatement, Source, Statement,
    UpdateStatement,
};

/// Parameter payload: one map, or one map per batch row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Params {
    Single(Map<String, Value>),
    Batch(Vec<Map<String, Value>>),
}

impl Params {
    pub fn payloads(&self) -> Vec<&Map<String, Value>> {
        match self {
            Params::Single(map) => vec![map],
            Params::Batch(maps) => maps.iter().collect(),
        }
    }
}

/// Rendered statement, ready for inspection or execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledSql {
    pub sql: String,
    pub params: Params,
}

/// Where a bound parameter takes its value from
#[derive(Debug, Clone)]
enum Slot {
    Fixed(Value),
    /// Column `n` of the current row
    Row(usize),
    /// Batch-update match key of the current row
    Key,
}

/// Hands out placeholder names in bind order
struct Binder {
    dialect: SqlDialect,
    used: HashSet<String>,
    counters: HashMap<String, usize>,
    slots: Vec<(String, Slot)>,
}

impl Binder {
    fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            used: HashSet::new(),
            counters: HashMap::new(),
            slots: Vec::new(),
        }
    }

    /// Bind under `name`, or a numbered variant when `name` is taken
    fn exact(&mut self, name: &str, slot: Slot) -> String {
        let name = bind_safe(name);
        if self.used.contains(&name) {
            return self.numbered(&name, slot);
        }
        self.push(name, slot)
    }

    /// Bind under the next free `{base}_{n}`
    fn numbered(&mut self, base: &str, slot: Slot) -> String {
        let base = bind_safe(base);
        let counter = self.counters.entry(base.clone()).or_insert(0);
        let name = loop {
            *counter += 1;
            let candidate = format!("{}_{}", base, counter);
            if !self.used.contains(&candidate) {
                break candidate;
            }
        };
        self.push(name, slot)
    }

    fn push(&mut self, name: String, slot: Slot) -> String {
        self.used.insert(name.clone());
        self.slots.push((name.clone(), slot));
        self.dialect.placeholder(&name, self.slots.len())
    }

    /// Payload for one row
    fn payload(&self, row: &[Value], key: Option<&Value>) -> Map<String, Value> {
        self.slots
            .iter()
            .map(|(name, slot)| {
                let value = match slot {
                    Slot::Fixed(value) => value.clone(),
                    Slot::Row(i) => row.get(*i).cloned().unwrap_or(Value::Null),
                    Slot::Key => key.cloned().unwrap_or(Value::Null),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

/// `name` with every character outside `[A-Za-z0-9_]` replaced by `_`
fn bind_safe(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if safe.is_empty() {
        "p".to_string()
    } else {
        safe
    }
}

pub struct SqlRenderer {
    dialect: SqlDialect,
}

impl SqlRenderer {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn render(&self, statement: &Statement) -> CompiledSql {
        let mut binder = Binder::new(self.dialect);
        let compiled = match statement {
            Statement::Select(select) => {
                let sql = self.select(select, &mut binder);
                CompiledSql {
                    sql,
                    params: Params::Single(binder.payload(&[], None)),
                }
            }
            Statement::Insert(insert) => self.insert(insert, &mut binder),
            Statement::Update(update) => self.update(update, &mut binder),
            Statement::Delete(delete) => {
                let sql = self.delete(delete, &mut binder);
                CompiledSql {
                    sql,
                    params: Params::Single(binder.payload(&[], None)),
                }
            }
        };
        tracing::debug!(dialect = %self.dialect, sql = %compiled.sql, "rendered statement");
        compiled
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.quote_ident(name)
    }

    fn select(&self, select: &SelectStatement, binder: &mut Binder) -> String {
        let mut sql = String::from("SELECT ");

        match &select.distinct {
            SelectDistinct::None => {}
            SelectDistinct::All => sql.push_str("DISTINCT "),
            SelectDistinct::On(exprs) if self.dialect.supports_distinct_on() => {
                let on: Vec<String> = exprs.iter().map(|e| self.expr(e, binder)).collect();
                sql.push_str(&format!("DISTINCT ON ({}) ", on.join(", ")));
            }
            SelectDistinct::On(_) => sql.push_str("DISTINCT "),
        }

        let items: Vec<String> = select
            .items
            .iter()
            .map(|item| {
                let expr = self.expr(&item.expr, binder);
                match &item.alias {
                    Some(alias) => format!("{} AS {}", expr, self.quote(alias)),
                    None => expr,
                }
            })
            .collect();
        sql.push_str(&items.join(", "));

        sql.push_str(" FROM ");
        match &select.source {
            Source::Table(table) => sql.push_str(&self.quote(table)),
            Source::Subquery(inner, alias) => {
                let inner = self.select(inner, binder);
                sql.push_str(&format!("({}) AS {}", inner, self.quote(alias)));
            }
        }

        if let Some(filter) = &select.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(filter, binder));
        }
        if !select.group_by.is_empty() {
            let group: Vec<String> = select.group_by.iter().map(|e| self.expr(e, binder)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&group.join(", "));
        }
        if let Some(having) = &select.having {
            sql.push_str(" HAVING ");
            sql.push_str(&self.expr(having, binder));
        }
        if !select.order_by.is_empty() {
            let order: Vec<String> = select
                .order_by
                .iter()
                .map(|(e, dir)| format!("{} {}", self.expr(e, binder), dir))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        if let Some(tail) = self.dialect.limit_clause(select.limit, select.offset) {
            sql.push(' ');
            sql.push_str(&tail);
        }
        sql
    }

    fn insert(&self, insert: &InsertStatement, binder: &mut Binder) -> CompiledSql {
        let table = self.quote(&insert.table);
        let sql = if insert.columns.is_empty() {
            match self.dialect {
                SqlDialect::Mysql => format!("INSERT INTO {} () VALUES ()", table),
                _ => format!("INSERT INTO {} DEFAULT VALUES", table),
            }
        } else {
            let columns: Vec<String> = insert.columns.iter().map(|c| self.quote(c)).collect();
            let values: Vec<String> = insert
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| binder.exact(c, Slot::Row(i)))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                values.join(", ")
            )
        };

        let params = match insert.rows.as_slice() {
            [row] => Params::Single(binder.payload(row, None)),
            rows => Params::Batch(rows.iter().map(|row| binder.payload(row, None)).collect()),
        };
        CompiledSql { sql, params }
    }

    fn update(&self, update: &UpdateStatement, binder: &mut Binder) -> CompiledSql {
        let assignments: Vec<String> = update
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote(c), binder.exact(c, Slot::Row(i))))
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.quote(&update.table),
            assignments.join(", ")
        );

        let mut conditions = Vec::new();
        if let Some(key) = &update.row_key {
            let column = format!("{}.{}", self.quote(&key.table), self.quote(&key.column));
            let placeholder = binder.exact(&format!("{}_match", key.column), Slot::Key);
            conditions.push(format!("{} = {}", column, placeholder));
        }
        if let Some(filter) = &update.filter {
            conditions.push(self.nested(filter, binder, update.row_key.is_some()));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let params = match &update.row_key {
            Some(key) => Params::Batch(
                update
                    .rows
                    .iter()
                    .zip(&key.values)
                    .map(|(row, key)| binder.payload(row, Some(key)))
                    .collect(),
            ),
            None => Params::Single(
                binder.payload(update.rows.first().map(Vec::as_slice).unwrap_or(&[]), None),
            ),
        };
        CompiledSql { sql, params }
    }

    fn delete(&self, delete: &DeleteStatement, binder: &mut Binder) -> String {
        let mut sql = format!("DELETE FROM {}", self.quote(&delete.table));
        if let Some(filter) = &delete.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(filter, binder));
        }
        sql
    }

    /// Render `expr` as one operand of an AND, parenthesising an OR
    fn nested(&self, expr: &Expr, binder: &mut Binder, in_and: bool) -> String {
        let rendered = self.expr(expr, binder);
        match expr {
            Expr::Or(_) if in_and => format!("({})", rendered),
            _ => rendered,
        }
    }

    fn expr(&self, expr: &Expr, binder: &mut Binder) -> String {
        match expr {
            Expr::Column { table: Some(table), name } => {
                format!("{}.{}", self.quote(table), self.quote(name))
            }
            Expr::Column { table: None, name } => self.quote(name),
            Expr::Param { name, value } => binder.numbered(name, Slot::Fixed(value.clone())),
            Expr::Raw(sql) => sql.clone(),
            Expr::CountAll => "count(*)".to_string(),
            Expr::Compare { left, op, right } => format!(
                "{} {} {}",
                self.expr(left, binder),
                op.as_sql(),
                self.expr(right, binder)
            ),
            Expr::IsNull { expr, negated } => format!(
                "{} IS {}NULL",
                self.expr(expr, binder),
                if *negated { "NOT " } else { "" }
            ),
            Expr::InList { expr, list, negated } => {
                let target = self.expr(expr, binder);
                let items: Vec<String> = list.iter().map(|e| self.expr(e, binder)).collect();
                format!(
                    "{} {}IN ({})",
                    target,
                    if *negated { "NOT " } else { "" },
                    items.join(", ")
                )
            }
            Expr::Between { expr, low, high } => format!(
                "{} BETWEEN {} AND {}",
                self.expr(expr, binder),
                self.expr(low, binder),
                self.expr(high, binder)
            ),
            Expr::Like {
                expr,
                pattern,
                case_insensitive: false,
            } => format!("{} LIKE {}", self.expr(expr, binder), self.expr(pattern, binder)),
            Expr::Like { expr, pattern, .. } if self.dialect.supports_ilike() => {
                format!("{} ILIKE {}", self.expr(expr, binder), self.expr(pattern, binder))
            }
            Expr::Like { expr, pattern, .. } => format!(
                "lower({}) LIKE lower({})",
                self.expr(expr, binder),
                self.expr(pattern, binder)
            ),
            Expr::And(terms) => terms
                .iter()
                .map(|t| self.nested(t, binder, true))
                .collect::<Vec<_>>()
                .join(" AND "),
            Expr::Or(terms) => terms
                .iter()
                .map(|t| {
                    let rendered = self.expr(t, binder);
                    match t {
                        Expr::And(_) => format!("({})", rendered),
                        _ => rendered,
                    }
                })
                .collect::<Vec<_>>()
                .join(" OR "),
            Expr::Bool(true) => "1 = 1".to_string(),
            Expr::Bool(false) => "1 = 0".to_string(),
        }
    }
}
