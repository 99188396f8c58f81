//! Schema reconciliation for CockroachDB.
//!
//! `tidemark-migrate` compares table schemas declared in code against what a
//! live database actually has, and generates reversible migrations that
//! bring the database in line:
//! - Declared schemas are built with column, index and constraint builders
//!   or loaded from a JSON configuration file
//! - The live schema is read from `information_schema` and
//!   `SHOW CREATE TABLE`
//! - Every generated statement has an inverse, and `down` undoes `up` in
//!   reverse order
//!
//! # Architecture
//!
//! - **Normalize** - Maps raw type names to canonical types and storage
//!   spellings
//! - **Introspect** - Reads the observed schema through a [`QueryExecutor`]
//! - **Diff** - Compares declared and observed schemas under per-table
//!   policies
//! - **Generate** - Compiles the diff into ordered [`TableAction`]s
//! - **Render** - Serializes actions to DDL
//! - **Report** / **Preconditions** / **Writer** - Human-readable output,
//!   drift checks and migration files
//!
//! # Example
//!
//! ```rust,ignore
//! use tidemark_migrate::prelude::*;
//!
//! let users = TableDefinition::new("users")
//!     .column(integer("id").not_null())
//!     .column(varchar("email").not_null())
//!     .primary_key(["id"])
//!     .index(IndexDefinition::new("users_email_key").column("email").unique());
//!
//! let executor = PgExecutor::connect(&database_url, 5).await?;
//! let observed = Introspector::new("public").read(&executor, &[users.clone()]).await?;
//! let diff = diff(&[users.clone()], &observed, &DiffOptions::default())?;
//! let migration = generate(&diff, &[users], &GenerateOptions::default())?;
//! for statement in &migration.up {
//!     println!("{statement}");
//! }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show what differs
//! tidemark diff
//!
//! # Fail when enforced drift exists
//! tidemark check
//!
//! # Write a migration file
//! tidemark generate --name add_email
//! ```
//!
//! [`QueryExecutor`]: introspect::QueryExecutor
//! [`TableAction`]: action::TableAction

pub mod action;
pub mod config;
pub mod diff;
pub mod error;
pub mod generate;
pub mod introspect;
pub mod normalize;
pub mod observed;
pub mod preconditions;
pub mod render;
pub mod report;
pub mod schema;
pub mod writer;

pub use error::{MigrateError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::action::{AlterTableAction, ColumnChange, PrimaryKeyStrategy, TableAction};
    pub use crate::config::Config;
    pub use crate::diff::{diff, DiffOptions, SchemaDiff, TableDiff};
    pub use crate::error::{MigrateError, Result};
    pub use crate::generate::{generate, GenerateOptions, Migration};
    pub use crate::introspect::{Introspector, PgExecutor, QueryExecutor, Row};
    pub use crate::normalize::{normalize, ColumnType, DataType, NormalizeOptions, ScalarType};
    pub use crate::observed::{ObservedSchema, ObservedTable};
    pub use crate::preconditions::{preconditions, Precondition};
    pub use crate::report::{policy_report, PolicyReport};
    pub use crate::schema::{
        array, boolean, float, integer, json, timestamp, varchar, ColumnDefinition, Enforcement,
        ForeignKeyAction, IndexDefinition, IndexSyncMode, IntrospectionPolicy, TableConstraint,
        TableDefinition,
    };
    pub use crate::writer::{generate_migration_name, MigrationFile, MigrationWriter};
    pub use tidemark_sql::{col, Sql, Statement};
}
