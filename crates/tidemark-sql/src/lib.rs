//! # tidemark-sql
//!
//! SQL text and parameter primitives shared by the tidemark crates.
//!
//! This crate provides:
//! - [`SqlValue`], the value model for bound parameters
//! - [`Sql`], a composable fragment whose placeholders are numbered `$1..$n`
//!   only when finalized into a [`Statement`]
//! - An expression builder for predicates and defaults
//! - Identifier validation: identifiers are never escaped, invalid ones are
//!   rejected
//!
//! ```rust
//! use tidemark_sql::{col, Sql};
//!
//! let predicate = col("deleted_at").is_null().and(col("tenant").eq("acme"));
//! let stmt = Sql::raw("SELECT * FROM ")
//!     .append(Sql::qualified("public", "users").unwrap())
//!     .append(Sql::raw(" WHERE "))
//!     .append(predicate.into_sql())
//!     .to_statement();
//!
//! assert_eq!(
//!     stmt.sql,
//!     "SELECT * FROM \"public\".\"users\" WHERE \"deleted_at\" IS NULL AND \"tenant\" = $1"
//! );
//! ```

pub mod error;
pub mod expr;
pub mod fragment;
pub mod ident;
pub mod value;

pub use error::{Result, SqlError};
pub use expr::{col, Column, Expr};
pub use fragment::{Sql, Statement};
pub use ident::{is_valid_identifier, quote_ident, validate_type_name, Ident};
pub use value::{SqlValue, ToSqlValue};
