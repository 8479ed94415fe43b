//! Execution boundary
//!
//! Compilers never touch a store. Anything that can run a `CompiledQuery`
//! against real data implements `Executor`; the paginator only talks to
//! this trait.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::Result;
use super::query::CompiledQuery;

/// A row or document keyed by schema field name
pub type Row = Map<String, Value>;

/// What a mutation did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inserted_ids: Vec<Value>,
}

pub trait Executor: Send + Sync {
    /// Run a select and return its rows
    fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Row>>;

    /// Run the row-count variant of a select
    fn count(&self, query: &CompiledQuery) -> Result<u64>;

    /// Run an insert, update or delete
    fn execute(&self, query: &CompiledQuery) -> Result<ExecOutcome>;

    /// First matching row, if any
    fn fetch_one(&self, query: &CompiledQuery) -> Result<Option<Row>> {
        Ok(self.fetch(query)?.into_iter().next())
    }
}
