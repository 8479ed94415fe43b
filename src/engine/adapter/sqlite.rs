//! SQLite Adapter
//!
//! Runs compiled queries against SQLite using rusqlite + r2d2 connection
//! pooling. Statements are rendered in the SQLite dialect and bound by name.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ToSql;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use super::dialect::SqlDialect;
use super::render::CompiledSql;
use super::SqlValue;
use crate::engine::error::{QueryError, Result};
use crate::engine::executor::{ExecOutcome, Executor, Row};
use crate::engine::query::{CompiledQuery, StatementKind};
use crate::engine::schema::SchemaDescriptor;

type DbPool = Pool<SqliteConnectionManager>;
type DbConn = PooledConnection<SqliteConnectionManager>;

pub struct SqliteAdapter {
    pool: DbPool,
    db_path: PathBuf,
}

impl SqliteAdapter {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| QueryError::Connection(e.to_string()))?;

        let adapter = Self {
            pool,
            db_path: db_path.to_path_buf(),
        };
        adapter.init(true)?;
        Ok(adapter)
    }

    /// Every pooled connection to `:memory:` is its own database, so the
    /// pool holds exactly one.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| QueryError::Connection(e.to_string()))?;

        let adapter = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        };
        adapter.init(false)?;
        Ok(adapter)
    }

    fn init(&self, wal: bool) -> Result<()> {
        let conn = self.get_conn()?;
        if wal {
            let _: String = conn
                .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
                .map_err(store_error)?;
        }
        conn.execute_batch("PRAGMA foreign_keys=ON")
            .map_err(store_error)?;
        Ok(())
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool
            .get()
            .map_err(|e| QueryError::Connection(e.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run raw SQL, e.g. DDL for fixtures
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(sql).map_err(store_error)
    }

    fn run_select(&self, schema: &SchemaDescriptor, compiled: &CompiledSql) -> Result<Vec<Row>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&compiled.sql).map_err(store_error)?;

        // Storage columns back to schema field names
        let names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|col| {
                schema
                    .field_for_storage(col)
                    .map(|f| f.name.clone())
                    .unwrap_or_else(|| col.to_string())
            })
            .collect();

        let bound = bind(compiled.params.payloads().first().copied());
        let named = as_named(&bound);

        let rows = stmt
            .query_map(named.as_slice(), |row| {
                let mut out = Map::new();
                for (i, name) in names.iter().enumerate() {
                    out.insert(name.clone(), SqlValue::to_json(row.get_ref(i)?));
                }
                Ok(out)
            })
            .map_err(store_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_error)?;

        Ok(rows)
    }
}

impl Executor for SqliteAdapter {
    fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Row>> {
        if query.kind() != StatementKind::Select {
            return Err(QueryError::UnsupportedClause("fetch on a mutation"));
        }
        let compiled = query.to_sql(SqlDialect::Sqlite)?;
        self.run_select(query.schema(), &compiled)
    }

    fn count(&self, query: &CompiledQuery) -> Result<u64> {
        let compiled = query.count_sql(SqlDialect::Sqlite)?;
        let conn = self.get_conn()?;
        let bound = bind(compiled.params.payloads().first().copied());
        let named = as_named(&bound);
        let count: i64 = conn
            .query_row(&compiled.sql, named.as_slice(), |row| row.get(0))
            .map_err(store_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn execute(&self, query: &CompiledQuery) -> Result<ExecOutcome> {
        if query.kind() == StatementKind::Select {
            return Err(QueryError::UnsupportedClause("execute on a select"));
        }
        let compiled = query.to_sql(SqlDialect::Sqlite)?;
        let payloads = compiled.params.payloads();

        let mut conn = self.get_conn()?;
        let tx = conn.transaction().map_err(store_error)?;
        let mut affected = 0u64;
        let mut rowids = Vec::with_capacity(payloads.len());
        {
            let mut stmt = tx.prepare(&compiled.sql).map_err(store_error)?;
            for payload in &payloads {
                let bound = bind(Some(*payload));
                let named = as_named(&bound);
                affected += stmt.execute(named.as_slice()).map_err(store_error)? as u64;
                rowids.push(tx.last_insert_rowid());
            }
        }
        tx.commit().map_err(store_error)?;

        let mut outcome = ExecOutcome {
            affected_rows: affected,
            ..Default::default()
        };
        match query.kind() {
            StatementKind::Insert => {
                if let (Some(pk), Some(values)) = (query.schema().primary_key(), query.values()) {
                    // Rows without a key value got one from the store
                    outcome.inserted_ids = values
                        .rows()
                        .iter()
                        .zip(&rowids)
                        .map(|(row, rowid)| match row.get(&pk.name) {
                            Some(id) if !id.is_null() => id.clone(),
                            _ => Value::from(*rowid),
                        })
                        .collect();
                }
            }
            StatementKind::Update => {
                outcome.matched_count = affected;
                outcome.modified_count = affected;
            }
            _ => {}
        }
        tracing::debug!(sql = %compiled.sql, affected, "executed statement");
        Ok(outcome)
    }
}

/// `:name` → value pairs for rusqlite named binding
fn bind(payload: Option<&Map<String, Value>>) -> Vec<(String, SqlValue)> {
    payload
        .map(|map| {
            map.iter()
                .map(|(name, value)| (format!(":{}", name), SqlValue::from(value)))
                .collect()
        })
        .unwrap_or_default()
}

fn as_named(bound: &[(String, SqlValue)]) -> Vec<(&str, &dyn ToSql)> {
    bound
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect()
}

fn store_error(e: rusqlite::Error) -> QueryError {
    if let rusqlite::Error::SqliteFailure(err, message) = &e {
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            let detail = message.clone().unwrap_or_else(|| err.to_string());
            tracing::warn!(error = %detail, "unique constraint violated");
            return QueryError::DuplicateKey(detail);
        }
    }
    tracing::warn!(error = %e, "sqlite error");
    QueryError::Store(e.to_string())
}
