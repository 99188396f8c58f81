//! [`QueryExecutor`] backed by a sqlx Postgres pool.
//!
//! Works against PostgreSQL-wire databases such as CockroachDB. Values are
//! decoded by the column's reported type name; anything unrecognized is
//! read as text.

use std::future::Future;

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as _, TypeInfo};
use tidemark_sql::SqlValue;

use super::{QueryExecutor, Row};
use crate::error::{BoxError, Result};

/// Runs catalog queries on a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MigrateError::Database`] when the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl QueryExecutor for PgExecutor {
    fn query(
        &self,
        sql: String,
        params: Vec<SqlValue>,
    ) -> impl Future<Output = std::result::Result<Vec<Row>, BoxError>> + Send {
        let pool = self.pool.clone();
        async move {
            let mut query = sqlx::query(&sql);
            for param in params {
                query = match param {
                    SqlValue::Null => query.bind(None::<String>),
                    SqlValue::Bool(b) => query.bind(b),
                    SqlValue::Int(n) => query.bind(n),
                    SqlValue::Float(f) => query.bind(f),
                    SqlValue::Text(s) => query.bind(s),
                    SqlValue::Blob(b) => query.bind(b),
                    SqlValue::TextArray(items) => query.bind(items),
                };
            }
            let rows = query.fetch_all(&pool).await?;
            let rows = rows
                .iter()
                .map(decode_row)
                .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;
            Ok::<_, BoxError>(rows)
        }
    }
}

fn decode_row(row: &PgRow) -> std::result::Result<Row, sqlx::Error> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "BOOL" => row.try_get::<Option<bool>, _>(i)?.map(SqlValue::Bool),
            "INT2" => row
                .try_get::<Option<i16>, _>(i)?
                .map(|n| SqlValue::Int(i64::from(n))),
            "INT4" => row
                .try_get::<Option<i32>, _>(i)?
                .map(|n| SqlValue::Int(i64::from(n))),
            "INT8" => row.try_get::<Option<i64>, _>(i)?.map(SqlValue::Int),
            "FLOAT8" => row.try_get::<Option<f64>, _>(i)?.map(SqlValue::Float),
            "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(i)?.map(SqlValue::Blob),
            "TEXT[]" | "VARCHAR[]" => row
                .try_get::<Option<Vec<String>>, _>(i)?
                .map(SqlValue::TextArray),
            _ => row.try_get::<Option<String>, _>(i)?.map(SqlValue::Text),
        };
        out.insert(column.name(), value.unwrap_or(SqlValue::Null));
    }
    Ok(out)
}
