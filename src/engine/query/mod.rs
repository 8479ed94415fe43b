//! Query construction: builder, frozen queries, pagination

pub mod builder;
pub mod compiled;
pub mod paginate;
pub mod request;

pub use builder::QueryBuilder;
pub use compiled::{CompiledQuery, StatementKind};
pub use paginate::{Page, PageRequest, Paginator};
pub use request::{QueryRequest, RequestKind};
