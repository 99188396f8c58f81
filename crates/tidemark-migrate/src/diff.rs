//! Schema diff engine.
//!
//! Compares declared tables against an observed snapshot under each table's
//! introspection policy and produces a [`SchemaDiff`]. The diff is pure
//! data; turning it into statements is the job of [`crate::generate`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tidemark_sql::Sql;
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::normalize::DataType;
use crate::observed::{
    ObservedColumn, ObservedConstraint, ObservedIndex, ObservedSchema, ObservedTable,
};
use crate::schema::{
    ColumnDefinition, ConstraintKind, IndexDefinition, TableConstraint, TableDefinition,
};

/// Options for the diff engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Record changed indexes instead of failing on them.
    pub allow_index_modifications: bool,
}

impl DiffOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows changed indexes to be rebuilt.
    #[must_use]
    pub const fn with_index_modifications(mut self) -> Self {
        self.allow_index_modifications = true;
        self
    }
}

/// A `{schema, db}` pair for one differing facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch<T> {
    /// Declared value.
    pub schema: T,
    /// Observed value.
    pub db: T,
}

/// A declared column absent from the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingColumn {
    /// Column name.
    pub name: String,
    /// Canonical type.
    pub data_type: DataType,
    /// Storage spelling.
    pub sql_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default expression.
    pub default: Option<Sql>,
    /// Array element spelling, for array columns.
    pub array_base_type: Option<String>,
}

impl From<&ColumnDefinition> for MissingColumn {
    fn from(column: &ColumnDefinition) -> Self {
        Self {
            name: column.name.clone(),
            data_type: column.data_type,
            sql_type: column.sql_type.clone(),
            nullable: column.nullable,
            default: column.default.clone(),
            array_base_type: array_base(&column.sql_type),
        }
    }
}

/// A database column absent from the declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraColumn {
    /// Storage spelling of the observed type.
    pub sql_type: String,
    /// The observed column.
    #[serde(flatten)]
    pub column: ObservedColumn,
}

/// Sparse patch describing how a column differs. Only differing facets are
/// set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedColumn {
    /// Column name.
    pub name: String,
    /// Storage spelling mismatch.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<Mismatch<String>>,
    /// Nullability mismatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<Mismatch<bool>>,
    /// Default text mismatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Mismatch<Option<String>>>,
    /// Array element spelling mismatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_base_type: Option<Mismatch<Option<String>>>,
}

impl ModifiedColumn {
    fn is_empty(&self) -> bool {
        self.data_type.is_none()
            && self.nullable.is_none()
            && self.default.is_none()
            && self.array_base_type.is_none()
    }
}

/// An index whose shape or uniqueness changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedIndex {
    /// Index name.
    pub name: String,
    /// Observed uniqueness.
    pub db_unique: bool,
    /// Declared uniqueness.
    pub schema_unique: bool,
    /// Observed expression signature.
    pub db_expressions: Vec<String>,
    /// Declared expression signature.
    pub schema_expressions: Vec<String>,
    /// The observed index, used to undo the rebuild.
    #[serde(skip)]
    pub previous: ObservedIndex,
}

/// Declared and observed primary key columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryKeyDiff {
    /// Declared columns (`rowid` when none are declared).
    pub declared: Vec<String>,
    /// Observed columns.
    pub observed: Vec<String>,
    /// Observed constraint name.
    pub name: Option<String>,
}

/// Everything that differs for one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDiff {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Declared columns absent from the database.
    pub missing_columns: Vec<MissingColumn>,
    /// Database columns absent from the declaration.
    pub extra_columns: Vec<ExtraColumn>,
    /// Columns present on both sides that differ.
    pub modified_columns: Vec<ModifiedColumn>,
    /// Declared indexes absent from the database.
    pub missing_indexes: Vec<IndexDefinition>,
    /// Database indexes absent from the declaration.
    pub extra_indexes: Vec<ObservedIndex>,
    /// Indexes present on both sides that differ.
    pub modified_indexes: Vec<ModifiedIndex>,
    /// Declared constraints absent from the database.
    pub missing_constraints: Vec<TableConstraint>,
    /// Database constraints absent from the declaration.
    pub extra_constraints: Vec<ObservedConstraint>,
    /// Primary key difference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKeyDiff>,
}

impl TableDiff {
    fn new(schema: &str, table: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
            missing_columns: Vec::new(),
            extra_columns: Vec::new(),
            modified_columns: Vec::new(),
            missing_indexes: Vec::new(),
            extra_indexes: Vec::new(),
            modified_indexes: Vec::new(),
            missing_constraints: Vec::new(),
            extra_constraints: Vec::new(),
            primary_key: None,
        }
    }

    /// Returns true when no category has differences.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_column_changes() && !self.has_index_changes() && !self.has_constraint_changes()
    }

    /// Returns true when any column category is non-empty.
    #[must_use]
    pub fn has_column_changes(&self) -> bool {
        !self.missing_columns.is_empty()
            || !self.extra_columns.is_empty()
            || !self.modified_columns.is_empty()
    }

    /// Returns true when any index category is non-empty.
    #[must_use]
    pub fn has_index_changes(&self) -> bool {
        !self.missing_indexes.is_empty()
            || !self.extra_indexes.is_empty()
            || !self.modified_indexes.is_empty()
    }

    /// Returns true when constraints or the primary key differ.
    #[must_use]
    pub fn has_constraint_changes(&self) -> bool {
        !self.missing_constraints.is_empty()
            || !self.extra_constraints.is_empty()
            || self.primary_key.is_some()
    }
}

/// The full difference between declared and observed schemas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDiff {
    /// Declared tables absent from the database.
    pub missing_tables: Vec<String>,
    /// Database tables absent from the declaration.
    pub extra_tables: Vec<ObservedTable>,
    /// Tables present on both sides that differ.
    pub modified_tables: Vec<TableDiff>,
}

impl SchemaDiff {
    /// Returns true when nothing differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing_tables.is_empty()
            && self.extra_tables.is_empty()
            && self.modified_tables.is_empty()
    }

    /// Gets the diff of a modified table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableDiff> {
        self.modified_tables.iter().find(|t| t.table == name)
    }
}

/// Compares `declared` against `observed`.
///
/// # Errors
///
/// Fails on unknown column types (declared or observed), on declared tables
/// missing required input, and on changed indexes unless
/// [`DiffOptions::allow_index_modifications`] is set.
pub fn diff(
    declared: &[TableDefinition],
    observed: &ObservedSchema,
    options: &DiffOptions,
) -> Result<SchemaDiff> {
    let mut result = SchemaDiff::default();
    let declared: Vec<&TableDefinition> = declared
        .iter()
        .filter(|t| {
            let covered = observed.covers(t);
            if !covered {
                debug!(table = %t.name, schema = %t.schema, "Skipping table of another schema");
            }
            covered
        })
        .collect();
    let declared_names: HashSet<&str> = declared.iter().map(|t| t.name.as_str()).collect();

    for table in declared {
        if table.policy.is_fully_ignored() {
            debug!(table = %table.name, "Skipping ignored table");
            continue;
        }
        table.validate()?;

        let Some(db_table) = observed.get_table(&table.name) else {
            result.missing_tables.push(table.name.clone());
            continue;
        };

        let table_diff = diff_table(table, db_table, options)?;
        if !table_diff.is_empty() {
            result.modified_tables.push(table_diff);
        }
    }

    result.extra_tables = observed
        .tables
        .values()
        .filter(|t| !declared_names.contains(t.name.as_str()))
        .cloned()
        .collect();

    info!(
        missing = result.missing_tables.len(),
        extra = result.extra_tables.len(),
        modified = result.modified_tables.len(),
        "Computed schema diff"
    );
    Ok(result)
}

fn diff_table(
    table: &TableDefinition,
    db_table: &ObservedTable,
    options: &DiffOptions,
) -> Result<TableDiff> {
    let mut out = TableDiff::new(&table.schema, &table.name);
    let policy = &table.policy;

    if policy.columns.is_active() {
        diff_columns(table, db_table, &mut out)?;
    }
    if policy.indexes.is_active() {
        diff_indexes(table, db_table, options, &mut out)?;
    }
    if policy.constraints.is_active() {
        diff_constraints(table, db_table, &mut out);
    }

    Ok(out)
}

// ================================================================
// Columns
// ================================================================

fn diff_columns(
    table: &TableDefinition,
    db_table: &ObservedTable,
    out: &mut TableDiff,
) -> Result<()> {
    let policy = &table.policy;
    let mut db_columns: HashMap<&str, (&ObservedColumn, String)> = HashMap::new();
    for column in &db_table.columns {
        if policy.ignores_column(&column.name) {
            continue;
        }
        let resolved = column.resolve_type(&table.name)?;
        db_columns.insert(column.name.as_str(), (column, resolved.spelling));
    }

    for column in &table.columns {
        if policy.ignores_column(&column.name) {
            continue;
        }
        match db_columns.get(column.name.as_str()) {
            None => out.missing_columns.push(MissingColumn::from(column)),
            Some((db_column, db_spelling)) => {
                let modified = compare_column(column, db_column, db_spelling);
                if !modified.is_empty() {
                    out.modified_columns.push(modified);
                }
            }
        }
    }

    for db_column in &db_table.columns {
        if db_column.hidden || table.get_column(&db_column.name).is_some() {
            continue;
        }
        if let Some((_, spelling)) = db_columns.get(db_column.name.as_str()) {
            out.extra_columns.push(ExtraColumn {
                sql_type: spelling.clone(),
                column: db_column.clone(),
            });
        }
    }

    Ok(())
}

fn compare_column(
    column: &ColumnDefinition,
    db: &ObservedColumn,
    db_spelling: &str,
) -> ModifiedColumn {
    let data_type = (column.sql_type != db_spelling).then(|| Mismatch {
        schema: column.sql_type.clone(),
        db: db_spelling.to_string(),
    });

    let nullable = (column.nullable != db.nullable).then_some(Mismatch {
        schema: column.nullable,
        db: db.nullable,
    });

    let declared_default = column.default.as_ref().map(Sql::to_inline);
    let default = (declared_default != db.default).then(|| Mismatch {
        schema: declared_default.clone(),
        db: db.default.clone(),
    });

    let schema_base = array_base(&column.sql_type);
    let db_base = array_base(db_spelling);
    let array_base_type = (schema_base != db_base).then_some(Mismatch {
        schema: schema_base,
        db: db_base,
    });

    ModifiedColumn {
        name: column.name.clone(),
        data_type,
        nullable,
        default,
        array_base_type,
    }
}

fn array_base(spelling: &str) -> Option<String> {
    spelling.strip_suffix("[]").map(str::to_string)
}

// ================================================================
// Indexes
// ================================================================

static IDENT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""((?:[^"]|"")*)"|[A-Za-z_][A-Za-z0-9_]*"#).expect("identifier token pattern")
});

static CAST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":::?\s*[A-Za-z_][A-Za-z0-9_]*(?:\[\])?").expect("cast pattern")
});

static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("string literal pattern"));

const SIGNATURE_NOISE: &[&str] = &[
    "asc", "desc", "nulls", "first", "last", "and", "or", "not", "is", "null", "true", "false",
];

/// Reduces an index expression to the identifiers it references.
///
/// Plain identifiers are kept verbatim. Other expressions are stripped of
/// casts and string literals, then reduced to their lowercase unquoted
/// identifiers (quoted ones keep their case) minus a few keywords.
#[must_use]
pub fn expression_signature(text: &str) -> String {
    let text = text.trim();
    if tidemark_sql::is_valid_identifier(text) {
        return text.to_string();
    }
    let without_literals = STRING_LITERAL.replace_all(text, "''");
    let without_casts = CAST.replace_all(&without_literals, "");
    IDENT_TOKEN
        .captures_iter(&without_casts)
        .filter_map(|caps| match caps.get(1) {
            Some(quoted) => Some(quoted.as_str().replace("\"\"", "\"")),
            None => {
                let token = caps[0].to_ascii_lowercase();
                (!SIGNATURE_NOISE.contains(&token.as_str())).then_some(token)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn declared_signature(index: &IndexDefinition) -> Vec<String> {
    index
        .expressions
        .iter()
        .map(|e| expression_signature(&e.text()))
        .collect()
}

fn observed_signature(index: &ObservedIndex) -> Vec<String> {
    index
        .key_parts()
        .map(|p| expression_signature(&p.expression))
        .collect()
}

fn diff_indexes(
    table: &TableDefinition,
    db_table: &ObservedTable,
    options: &DiffOptions,
    out: &mut TableDiff,
) -> Result<()> {
    let policy = &table.policy;

    for index in &table.indexes {
        if policy.ignores_index(&index.name) {
            continue;
        }
        let Some(db_index) = db_table.get_index(&index.name) else {
            out.missing_indexes.push(index.clone());
            continue;
        };

        let schema_expressions = declared_signature(index);
        let db_expressions = observed_signature(db_index);
        if schema_expressions == db_expressions && index.unique == db_index.unique {
            continue;
        }

        if !options.allow_index_modifications {
            return Err(MigrateError::UnsafeIndexModification {
                table: table.name.clone(),
                index: index.name.clone(),
                db_unique: db_index.unique,
                schema_unique: index.unique,
                db_expressions,
                schema_expressions,
            });
        }
        out.modified_indexes.push(ModifiedIndex {
            name: index.name.clone(),
            db_unique: db_index.unique,
            schema_unique: index.unique,
            db_expressions,
            schema_expressions,
            previous: db_index.clone(),
        });
    }

    if policy.index_sync_mode == crate::schema::IndexSyncMode::Full {
        for db_index in &db_table.indexes {
            if table.get_index(&db_index.name).is_none() && !policy.ignores_index(&db_index.name) {
                out.extra_indexes.push(db_index.clone());
            }
        }
    }

    Ok(())
}

// ================================================================
// Constraints and primary key
// ================================================================

fn diff_constraints(table: &TableDefinition, db_table: &ObservedTable, out: &mut TableDiff) {
    let policy = &table.policy;

    for constraint in &table.constraints {
        if policy.ignores_index(constraint.name()) {
            continue;
        }
        let present = db_table
            .get_constraint(constraint.name())
            .is_some_and(|c| c.kind == constraint.kind());
        if !present {
            out.missing_constraints.push(constraint.clone());
        }
    }

    for db_constraint in &db_table.constraints {
        if db_constraint.kind == ConstraintKind::Unique
            || policy.ignores_index(&db_constraint.name)
        {
            continue;
        }
        let declared = table
            .get_constraint(&db_constraint.name)
            .is_some_and(|c| c.kind() == db_constraint.kind);
        if !declared {
            out.extra_constraints.push(db_constraint.clone());
        }
    }

    if let Some(observed) = &db_table.primary_key {
        let declared = table.effective_primary_key();
        let declared_set: BTreeSet<&str> = declared.iter().map(String::as_str).collect();
        let observed_set: BTreeSet<&str> = observed.iter().map(String::as_str).collect();
        if declared_set != observed_set {
            out.primary_key = Some(PrimaryKeyDiff {
                declared,
                observed: observed.clone(),
                name: db_table.primary_key_name.clone(),
            });
        }
    }
}
