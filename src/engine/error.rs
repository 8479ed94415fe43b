//! Query Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("Invalid operand for '{field}' {operator}: {reason}")]
    InvalidOperand {
        field: String,
        operator: String,
        reason: String,
    },

    #[error("Invalid filter operator: {0}")]
    InvalidFilterOperator(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Refusing to {action} every row of '{entity}' without a filter")]
    MissingFilter { action: &'static str, entity: String },

    #[error("No model set on query builder")]
    MissingModel,

    #[error("Clause not supported by this backend: {0}")]
    UnsupportedClause(&'static str),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl QueryError {
    pub fn unknown_field(entity: &str, field: &str) -> Self {
        Self::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }

    pub fn invalid_operand(field: &str, operator: &str, reason: impl Into<String>) -> Self {
        Self::InvalidOperand {
            field: field.to_string(),
            operator: operator.to_string(),
            reason: reason.into(),
        }
    }

    /// Caller errors are raised while compiling and are never worth retrying
    pub fn is_caller_error(&self) -> bool {
        !matches!(
            self,
            QueryError::DuplicateKey(_) | QueryError::Store(_) | QueryError::Connection(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
