//! Error types for schema reconciliation.

use std::path::PathBuf;

use crate::normalize::TypeError;

/// Boxed error returned by query executors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while introspecting, diffing or generating.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A declared or observed column has a type that cannot be normalized.
    #[error("Column '{table}.{column}': {source}")]
    Type {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Normalization failure.
        #[source]
        source: TypeError,
    },

    /// An existing index differs in shape or uniqueness and modifications
    /// were not allowed.
    #[error(
        "Index '{index}' on table '{table}' changed and index modifications are not allowed \
         (unique: db={db_unique}, schema={schema_unique}; \
         expressions: db={db_expressions:?}, schema={schema_expressions:?})"
    )]
    UnsafeIndexModification {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
        /// Observed uniqueness.
        db_unique: bool,
        /// Declared uniqueness.
        schema_unique: bool,
        /// Observed expression signature.
        db_expressions: Vec<String>,
        /// Declared expression signature.
        schema_expressions: Vec<String>,
    },

    /// A required piece of input is absent.
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// An identifier or type spelling was rejected.
    #[error(transparent)]
    Sql(#[from] tidemark_sql::SqlError),

    /// A catalog query failed.
    #[error("Query failed: {sql}: {source}")]
    Query {
        /// Query text.
        sql: String,
        /// Executor error.
        #[source]
        source: BoxError,
    },

    /// A catalog row did not have the expected shape.
    #[error("Unexpected row from {query}: {message}")]
    RowDecode {
        /// Which catalog query produced the row.
        query: &'static str,
        /// What was wrong.
        message: String,
    },

    /// An action cannot be reversed because its previous state is unknown.
    #[error("Action on '{table}' is not reversible: {reason}")]
    NotReversible {
        /// Table name.
        table: String,
        /// Why no inverse could be built.
        reason: String,
    },

    /// Enforced schema drift found by a check run.
    #[error("Schema drift detected:\n{}", bullet_list(.0))]
    PolicyViolation(Vec<String>),

    /// Database error from the connection pool.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading configuration, writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrateError {
    pub(crate) fn type_error(table: &str, column: &str, source: TypeError) -> Self {
        Self::Type {
            table: table.to_string(),
            column: column.to_string(),
            source,
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

fn bullet_list(findings: &[String]) -> String {
    findings
        .iter()
        .map(|f| format!("  - {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}
