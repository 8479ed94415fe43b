//! SQL Dialects
//!
//! Identifier quoting, placeholder syntax and the few clause spellings that
//! differ between SQLite, PostgreSQL and MySQL.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::Sqlite => write!(f, "sqlite"),
            SqlDialect::Postgres => write!(f, "postgres"),
            SqlDialect::Mysql => write!(f, "mysql"),
        }
    }
}

impl SqlDialect {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(SqlDialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(SqlDialect::Postgres),
            "mysql" | "mariadb" => Some(SqlDialect::Mysql),
            _ => None,
        }
    }

    /// Quote an identifier (table or column name)
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            SqlDialect::Sqlite | SqlDialect::Postgres => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
            SqlDialect::Mysql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Placeholder for the parameter `name`, the `position`-th (from 1) bound
    /// in the statement
    pub fn placeholder(&self, name: &str, position: usize) -> String {
        match self {
            SqlDialect::Sqlite => format!(":{}", name),
            SqlDialect::Postgres => format!("${}", position),
            SqlDialect::Mysql => format!("%({})s", name),
        }
    }

    pub fn supports_ilike(&self) -> bool {
        matches!(self, SqlDialect::Postgres)
    }

    pub fn supports_distinct_on(&self) -> bool {
        matches!(self, SqlDialect::Postgres)
    }

    /// `LIMIT`/`OFFSET` tail. Offset without a limit needs a dialect-specific
    /// stand-in for "no limit".
    pub fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(limit), None) => Some(format!("LIMIT {}", limit)),
            (Some(limit), Some(offset)) => Some(format!("LIMIT {} OFFSET {}", limit, offset)),
            (None, Some(offset)) => Some(match self {
                SqlDialect::Sqlite => format!("LIMIT -1 OFFSET {}", offset),
                SqlDialect::Postgres => format!("OFFSET {}", offset),
                SqlDialect::Mysql => format!("LIMIT 18446744073709551615 OFFSET {}", offset),
            }),
        }
    }
}
