//! Declared schema types.
//!
//! These types describe what application code expects a table to look
//! like. They are built with the builder methods below or deserialized from
//! the configuration file, and are never mutated once handed to the diff
//! engine.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use tidemark_sql::Sql;

use crate::error::{MigrateError, Result};
use crate::normalize::{resolve, DataType, ScalarType, TypeError};

/// Name of the implicit row-identifier key used when a table declares no
/// primary key.
pub const IMPLICIT_PRIMARY_KEY: &str = "rowid";

/// Schema definition for a declared column.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawColumnDefinition")]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Canonical data type.
    pub data_type: DataType,
    /// Lowercase storage spelling, e.g. `varchar` or `bigint`.
    pub sql_type: String,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default expression.
    pub default: Option<Sql>,
    /// Whether inserts may omit this column.
    pub optional_on_insert: bool,
}

impl ColumnDefinition {
    /// Creates a nullable column with the type's default storage spelling.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            sql_type: data_type.default_spelling(),
            data_type,
            nullable: true,
            default: None,
            optional_on_insert: false,
        }
    }

    /// Creates a column from a raw type spelling such as `bigint` or
    /// `STRING[]`, keeping that spelling for DDL and comparison.
    ///
    /// # Errors
    ///
    /// Returns a [`TypeError`] when the spelling is not supported.
    pub fn with_type_name(
        name: impl Into<String>,
        type_name: &str,
    ) -> std::result::Result<Self, TypeError> {
        let resolved = resolve(type_name, None)?;
        let mut column = Self::new(name, resolved.data_type);
        column.sql_type = resolved.spelling;
        Ok(column)
    }

    /// Marks the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default expression.
    #[must_use]
    pub fn default(mut self, expr: impl Into<Sql>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Marks the column as optional on insert.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional_on_insert = true;
        self
    }
}

/// Creates a `varchar` column.
#[must_use]
pub fn varchar(name: impl Into<String>) -> ColumnDefinition {
    ColumnDefinition::new(name, DataType::Scalar(ScalarType::Varchar))
}

/// Creates an `integer` column.
#[must_use]
pub fn integer(name: impl Into<String>) -> ColumnDefinition {
    ColumnDefinition::new(name, DataType::Scalar(ScalarType::Integer))
}

/// Creates a `double precision` column.
#[must_use]
pub fn float(name: impl Into<String>) -> ColumnDefinition {
    ColumnDefinition::new(name, DataType::Scalar(ScalarType::Float))
}

/// Creates a `boolean` column.
#[must_use]
pub fn boolean(name: impl Into<String>) -> ColumnDefinition {
    ColumnDefinition::new(name, DataType::Scalar(ScalarType::Boolean))
}

/// Creates a `timestamptz` column.
#[must_use]
pub fn timestamp(name: impl Into<String>) -> ColumnDefinition {
    ColumnDefinition::new(name, DataType::Scalar(ScalarType::Timestamp))
}

/// Creates a `jsonb` column.
#[must_use]
pub fn json(name: impl Into<String>) -> ColumnDefinition {
    ColumnDefinition::new(name, DataType::Scalar(ScalarType::Json))
}

/// Creates an array column of `element`.
#[must_use]
pub fn array(name: impl Into<String>, element: ScalarType) -> ColumnDefinition {
    ColumnDefinition::new(name, DataType::Array(element))
}

#[derive(Deserialize)]
struct RawColumnDefinition {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default = "default_true")]
    nullable: bool,
    #[serde(default)]
    default: Option<Sql>,
    #[serde(default)]
    optional: bool,
}

const fn default_true() -> bool {
    true
}

impl TryFrom<RawColumnDefinition> for ColumnDefinition {
    type Error = TypeError;

    fn try_from(raw: RawColumnDefinition) -> std::result::Result<Self, Self::Error> {
        let mut column = Self::with_type_name(raw.name, &raw.type_name)?;
        column.nullable = raw.nullable;
        column.default = raw.default;
        column.optional_on_insert = raw.optional;
        Ok(column)
    }
}

/// One key part of a declared index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexExpr {
    /// A plain column reference.
    Column(String),
    /// An arbitrary SQL expression, e.g. `lower(email)`.
    Expression {
        /// Expression text.
        sql: Sql,
    },
}

impl IndexExpr {
    /// Returns the expression as a SQL fragment, quoting column names.
    ///
    /// # Errors
    ///
    /// Returns an error when a column name is not a valid identifier.
    pub fn to_sql(&self) -> Result<Sql> {
        match self {
            Self::Column(name) => Ok(Sql::ident(name)?),
            Self::Expression { sql } => Ok(sql.clone()),
        }
    }

    /// Returns the unquoted text used for signature comparison.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Column(name) => name.clone(),
            Self::Expression { sql } => sql.to_inline(),
        }
    }
}

/// Schema definition for a declared index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name.
    pub name: String,
    /// Key parts, in order.
    pub expressions: Vec<IndexExpr>,
    /// Whether the index is unique.
    #[serde(default)]
    pub unique: bool,
    /// Extra columns stored in the index.
    #[serde(default)]
    pub storing: Vec<String>,
    /// Partial index predicate.
    #[serde(default)]
    pub predicate: Option<Sql>,
    /// Access method, e.g. `gin` or `hash`.
    #[serde(default)]
    pub using: Option<String>,
}

impl IndexDefinition {
    /// Creates an index with no key parts.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expressions: Vec::new(),
            unique: false,
            storing: Vec::new(),
            predicate: None,
            using: None,
        }
    }

    /// Adds a column key part.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.expressions.push(IndexExpr::Column(name.into()));
        self
    }

    /// Adds an expression key part.
    #[must_use]
    pub fn expression(mut self, sql: impl Into<Sql>) -> Self {
        self.expressions.push(IndexExpr::Expression { sql: sql.into() });
        self
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the stored columns.
    #[must_use]
    pub fn storing<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.storing = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Makes this a partial index.
    #[must_use]
    pub fn predicate(mut self, predicate: impl Into<Sql>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Sets the access method.
    #[must_use]
    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.using = Some(method.into());
        self
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as `NoAction` but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub const fn to_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Kind of a named table constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// CHECK constraint.
    Check,
    /// FOREIGN KEY constraint.
    ForeignKey,
    /// UNIQUE constraint.
    Unique,
}

/// A declared, named table constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableConstraint {
    /// `CONSTRAINT name CHECK (expression)`.
    Check {
        /// Constraint name.
        name: String,
        /// Boolean expression.
        expression: Sql,
    },
    /// `CONSTRAINT name FOREIGN KEY (...) REFERENCES table (...)`.
    ForeignKey {
        /// Constraint name.
        name: String,
        /// Local columns.
        columns: Vec<String>,
        /// Referenced table.
        references_table: String,
        /// Referenced columns.
        references_columns: Vec<String>,
        /// ON DELETE action.
        #[serde(default)]
        on_delete: Option<ForeignKeyAction>,
        /// ON UPDATE action.
        #[serde(default)]
        on_update: Option<ForeignKeyAction>,
    },
}

impl TableConstraint {
    /// Creates a check constraint.
    #[must_use]
    pub fn check(name: impl Into<String>, expression: impl Into<Sql>) -> Self {
        Self::Check {
            name: name.into(),
            expression: expression.into(),
        }
    }

    /// Creates a foreign key constraint.
    #[must_use]
    pub fn foreign_key(
        name: impl Into<String>,
        columns: Vec<String>,
        references_table: impl Into<String>,
        references_columns: Vec<String>,
    ) -> Self {
        Self::ForeignKey {
            name: name.into(),
            columns,
            references_table: references_table.into(),
            references_columns,
            on_delete: None,
            on_update: None,
        }
    }

    /// Sets the ON DELETE action of a foreign key. No-op for checks.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        if let Self::ForeignKey { on_delete, .. } = &mut self {
            *on_delete = Some(action);
        }
        self
    }

    /// Returns the constraint name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Check { name, .. } | Self::ForeignKey { name, .. } => name,
        }
    }

    /// Returns the constraint kind.
    #[must_use]
    pub const fn kind(&self) -> ConstraintKind {
        match self {
            Self::Check { .. } => ConstraintKind::Check,
            Self::ForeignKey { .. } => ConstraintKind::ForeignKey,
        }
    }
}

/// How differences in one category are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    /// Differences produce migration actions.
    #[default]
    Enforce,
    /// Differences are reported but produce no actions.
    Warn,
    /// The category is not introspected or compared.
    Ignore,
}

impl Enforcement {
    /// Returns true unless the category is ignored.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Ignore)
    }
}

/// Whether indexes present only in the database are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSyncMode {
    /// Only add or rebuild declared indexes.
    Additive,
    /// Also drop undeclared indexes.
    #[default]
    Full,
}

/// A compiled name pattern used to exclude columns or indexes.
#[derive(Debug, Clone)]
pub struct NamePattern(Regex);

impl NamePattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error.
    pub fn new(pattern: &str) -> std::result::Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    /// Returns true when `name` matches.
    #[must_use]
    pub fn is_match(&self, name: &str) -> bool {
        self.0.is_match(name)
    }

    /// Returns the pattern source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl<'de> Deserialize<'de> for NamePattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Self::new(&pattern).map_err(serde::de::Error::custom)
    }
}

/// Per-table introspection and enforcement policy.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct IntrospectionPolicy {
    /// Column handling.
    pub columns: Enforcement,
    /// Index handling.
    pub indexes: Enforcement,
    /// Constraint and primary key handling.
    pub constraints: Enforcement,
    /// Column names excluded from comparison.
    pub ignore_columns: Vec<NamePattern>,
    /// Index and constraint names excluded from comparison.
    pub ignore_indexes: Vec<NamePattern>,
    /// Whether undeclared indexes are dropped.
    pub index_sync_mode: IndexSyncMode,
}

impl IntrospectionPolicy {
    /// A policy that enforces every category.
    #[must_use]
    pub fn enforce_all() -> Self {
        Self::default()
    }

    /// Sets all three category levels at once.
    #[must_use]
    pub fn with_level(mut self, level: Enforcement) -> Self {
        self.columns = level;
        self.indexes = level;
        self.constraints = level;
        self
    }

    /// Sets the index sync mode.
    #[must_use]
    pub fn with_index_sync_mode(mut self, mode: IndexSyncMode) -> Self {
        self.index_sync_mode = mode;
        self
    }

    /// Adds a column ignore pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error.
    pub fn ignore_column(mut self, pattern: &str) -> std::result::Result<Self, regex::Error> {
        self.ignore_columns.push(NamePattern::new(pattern)?);
        Ok(self)
    }

    /// Adds an index ignore pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error.
    pub fn ignore_index(mut self, pattern: &str) -> std::result::Result<Self, regex::Error> {
        self.ignore_indexes.push(NamePattern::new(pattern)?);
        Ok(self)
    }

    /// Returns true when every category is ignored.
    #[must_use]
    pub const fn is_fully_ignored(&self) -> bool {
        !self.columns.is_active() && !self.indexes.is_active() && !self.constraints.is_active()
    }

    /// Returns true when `name` matches a column ignore pattern.
    #[must_use]
    pub fn ignores_column(&self, name: &str) -> bool {
        self.ignore_columns.iter().any(|p| p.is_match(name))
    }

    /// Returns true when `name` matches an index ignore pattern.
    #[must_use]
    pub fn ignores_index(&self, name: &str) -> bool {
        self.ignore_indexes.iter().any(|p| p.is_match(name))
    }
}

fn default_schema() -> String {
    String::from("public")
}

/// Schema definition for a declared table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Schema the table lives in.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDefinition>,
    /// Primary key columns; empty means the implicit `rowid` key.
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Secondary indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    /// Named constraints.
    #[serde(default)]
    pub constraints: Vec<TableConstraint>,
    /// Introspection policy.
    #[serde(default)]
    pub policy: IntrospectionPolicy,
}

impl TableDefinition {
    /// Creates an empty table in the `public` schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: default_schema(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
            constraints: Vec::new(),
            policy: IntrospectionPolicy::default(),
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: TableConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Sets the introspection policy.
    #[must_use]
    pub fn policy(mut self, policy: IntrospectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Gets an index by name.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Gets a constraint by name.
    #[must_use]
    pub fn get_constraint(&self, name: &str) -> Option<&TableConstraint> {
        self.constraints.iter().find(|c| c.name() == name)
    }

    /// Primary key columns, with an empty declaration mapped to `rowid`.
    #[must_use]
    pub fn effective_primary_key(&self) -> Vec<String> {
        if self.primary_key.is_empty() {
            vec![IMPLICIT_PRIMARY_KEY.to_string()]
        } else {
            self.primary_key.clone()
        }
    }

    /// Checks that the table has everything needed to render DDL.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MissingInput`] when the table has no columns
    /// or an index has no key parts.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(MigrateError::MissingInput(format!(
                "table '{}' declares no columns",
                self.name
            )));
        }
        for index in &self.indexes {
            if index.expressions.is_empty() {
                return Err(MigrateError::MissingInput(format!(
                    "index '{}' on table '{}' has no key parts",
                    index.name, self.name
                )));
            }
        }
        Ok(())
    }
}
