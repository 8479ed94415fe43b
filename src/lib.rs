//! airquery - one query builder, two backends
//!
//! Filters, projections, ordering and mutations are described once through
//! `QueryBuilder` and compiled either to parameterized SQL (SQLite,
//! PostgreSQL, MySQL) or to MongoDB-style filter and update documents.

pub mod engine;

pub use engine::adapter::{SqlDialect, SqliteAdapter};
pub use engine::nosql::MemoryCollection;
pub use engine::query::{Page, PageRequest, Paginator, QueryRequest};
pub use engine::schema::{FieldDescriptor, SchemaDescriptor, SchemaRegistry, ValueProvider};
pub use engine::{CompiledQuery, Config, ExecOutcome, Executor, QueryBuilder, QueryError};
