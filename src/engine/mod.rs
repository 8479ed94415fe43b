// airquery engine - Core module structure
pub mod adapter;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod nosql;
pub mod query;
pub mod schema;

pub use config::Config;
pub use error::{QueryError, Result};
pub use executor::{ExecOutcome, Executor, Row};
pub use query::{CompiledQuery, QueryBuilder};
