//! Relational expression tree
//!
//! Output of the relational compiler. Dialect-free: identifiers are storage
//! names, operands are still JSON values. `SqlRenderer` turns a `Statement`
//! into text plus a parameter payload.

use serde_json::Value;

use crate::engine::filter::SortDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column {
        table: Option<String>,
        name: String,
    },
    /// Bound operand. `name` is the column it is compared against; the
    /// renderer numbers it.
    Param {
        name: String,
        value: Value,
    },
    /// Caller-supplied SQL fragment, rendered verbatim
    Raw(String),
    CountAll,
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        case_insensitive: bool,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// Constant predicate (`1 = 1` / `1 = 0`)
    Bool(bool),
}

impl Expr {
    pub fn column(table: &str, name: &str) -> Self {
        Expr::Column {
            table: Some(table.to_string()),
            name: name.to_string(),
        }
    }

    pub fn param(name: &str, value: Value) -> Self {
        Expr::Param {
            name: name.to_string(),
            value,
        }
    }

    pub fn compare(left: Expr, op: CompareOp, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// AND of `terms`; `None` when empty, the term itself when there is one
    pub fn and_all(mut terms: Vec<Expr>) -> Option<Expr> {
        match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => Some(Expr::And(terms)),
        }
    }

    pub fn or_all(mut terms: Vec<Expr>) -> Option<Expr> {
        match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => Some(Expr::Or(terms)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: &str) -> Self {
        Self {
            expr,
            alias: Some(alias.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table(String),
    Subquery(Box<SelectStatement>, String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SelectDistinct {
    #[default]
    None,
    All,
    On(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub source: Source,
    pub items: Vec<SelectItem>,
    pub distinct: SelectDistinct,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<(Expr, SortDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectStatement {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            items: Vec::new(),
            distinct: SelectDistinct::None,
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

/// One column list, one value row per inserted row
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Per-row match key of a batch update
#[derive(Debug, Clone, PartialEq)]
pub struct RowKey {
    pub table: String,
    pub column: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub filter: Option<Expr>,
    pub row_key: Option<RowKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}
