//! Migration action compiler.
//!
//! Walks a [`SchemaDiff`] and emits one [`TableAction`] per difference, in a
//! fixed order, together with its inverse. Up statements are appended and
//! down statements are prepended, so `down` undoes `up` back to front.

use std::collections::VecDeque;

use tidemark_sql::{Sql, Statement};
use tracing::{debug, info, warn};

use crate::action::{
    AlterTableAction, ColumnChange, ColumnSpec, ConstraintSpec, IndexSpec, PrimaryKeyStrategy,
    TableAction, TableSpec,
};
use crate::diff::{ModifiedColumn, SchemaDiff, TableDiff};
use crate::error::{MigrateError, Result};
use crate::observed::ObservedTable;
use crate::render::render_statement;
use crate::schema::{Enforcement, TableDefinition};

/// Options for [`generate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Change primary keys with `ALTER PRIMARY KEY`, keeping the old key as
    /// a secondary index.
    pub keep_old_primary_key: bool,
    /// Drop observed tables that are not declared.
    pub drop_extra_tables: bool,
    /// Fail instead of emitting a placeholder down statement when an action
    /// cannot be reversed.
    pub strict_reversibility: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            keep_old_primary_key: true,
            drop_extra_tables: false,
            strict_reversibility: false,
        }
    }
}

impl GenerateOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces primary keys by dropping and re-adding the constraint.
    #[must_use]
    pub const fn drop_old_primary_key(mut self) -> Self {
        self.keep_old_primary_key = false;
        self
    }

    /// Drops undeclared tables.
    #[must_use]
    pub const fn with_drop_extra_tables(mut self) -> Self {
        self.drop_extra_tables = true;
        self
    }

    /// Fails on irreversible actions.
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.strict_reversibility = true;
        self
    }

    const fn primary_key_strategy(self) -> PrimaryKeyStrategy {
        if self.keep_old_primary_key {
            PrimaryKeyStrategy::KeepOldAsIndex
        } else {
            PrimaryKeyStrategy::DropAndAdd
        }
    }
}

/// Ordered forward and reverse statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Migration {
    /// Statements that reconcile the database.
    pub up: Vec<Statement>,
    /// Statements that undo `up`, last change first.
    pub down: Vec<Statement>,
}

impl Migration {
    /// Returns true when there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.up.is_empty()
    }

    /// Returns the up statements with values inlined.
    #[must_use]
    pub fn up_sql(&self) -> Vec<String> {
        self.up.iter().map(Statement::to_inline).collect()
    }

    /// Returns the down statements with values inlined.
    #[must_use]
    pub fn down_sql(&self) -> Vec<String> {
        self.down.iter().map(Statement::to_inline).collect()
    }
}

struct MigrationBuilder {
    options: GenerateOptions,
    up: Vec<Statement>,
    down: VecDeque<Statement>,
}

impl MigrationBuilder {
    fn new(options: GenerateOptions) -> Self {
        Self {
            options,
            up: Vec::new(),
            down: VecDeque::new(),
        }
    }

    /// Appends the action and prepends its inverse.
    fn push(&mut self, action: &TableAction) -> Result<()> {
        self.push_up(action)?;
        let down = match action.reverse() {
            Some(reverse) => render_statement(&reverse)?,
            None => self.irreversible(action)?,
        };
        self.down.push_front(down);
        Ok(())
    }

    /// Appends the action without a down statement.
    fn push_up(&mut self, action: &TableAction) -> Result<()> {
        let statement = render_statement(action)?;
        debug!(action = %action.describe(), sql = %statement, "Compiled action");
        self.up.push(statement);
        Ok(())
    }

    fn irreversible(&self, action: &TableAction) -> Result<Statement> {
        let description = action.describe();
        if self.options.strict_reversibility {
            return Err(MigrateError::NotReversible {
                table: action.table.clone(),
                reason: format!("{description}: previous state unknown"),
            });
        }
        warn!(
            action = %description,
            "Action is not reversible, emitting placeholder down statement"
        );
        Ok(Statement::raw(format!("-- irreversible: {description}")))
    }

    fn finish(self) -> Migration {
        Migration {
            up: self.up,
            down: self.down.into(),
        }
    }
}

/// Compiles `diff` into ordered up and down statements.
///
/// Only differences in categories whose policy level is
/// [`Enforcement::Enforce`] become actions.
///
/// # Errors
///
/// Fails on invalid identifiers or type spellings, when a modified table has
/// no declaration in `declared`, and on irreversible actions under
/// [`GenerateOptions::strict_reversibility`].
pub fn generate(
    diff: &SchemaDiff,
    declared: &[TableDefinition],
    options: &GenerateOptions,
) -> Result<Migration> {
    let mut builder = MigrationBuilder::new(*options);
    let find = |name: &str| {
        declared
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| MigrateError::MissingInput(format!("declaration for table '{name}'")))
    };

    for name in &diff.missing_tables {
        create_table(&mut builder, find(name)?)?;
    }

    for table_diff in &diff.modified_tables {
        let table = find(&table_diff.table)?;
        alter_table(&mut builder, table, table_diff, options)?;
        alter_indexes(&mut builder, table, table_diff)?;
    }

    if options.drop_extra_tables {
        for table in &diff.extra_tables {
            drop_table(&mut builder, table)?;
        }
    }

    let migration = builder.finish();
    info!(
        up = migration.up.len(),
        down = migration.down.len(),
        "Generated migration"
    );
    Ok(migration)
}

const fn enforced(level: Enforcement) -> bool {
    matches!(level, Enforcement::Enforce)
}

fn create_table(builder: &mut MigrationBuilder, table: &TableDefinition) -> Result<()> {
    if !enforced(table.policy.columns) {
        debug!(table = %table.name, "Missing table not enforced, skipping");
        return Ok(());
    }
    let mut spec = TableSpec::from_definition(table)?;
    if !enforced(table.policy.constraints) {
        spec.constraints.clear();
    }
    builder.push(&TableAction::new(
        &table.schema,
        &table.name,
        AlterTableAction::CreateTable(spec),
    ))?;

    // Dropping the table drops its indexes, so these have no down statement.
    if enforced(table.policy.indexes) {
        for index in &table.indexes {
            builder.push_up(&TableAction::new(
                &table.schema,
                &table.name,
                AlterTableAction::CreateIndex(IndexSpec::from_definition(index)?),
            ))?;
        }
    }
    Ok(())
}

fn alter_table(
    builder: &mut MigrationBuilder,
    table: &TableDefinition,
    diff: &TableDiff,
    options: &GenerateOptions,
) -> Result<()> {
    let on_table = |action| TableAction::new(&diff.schema, &diff.table, action);

    if enforced(table.policy.columns) {
        for column in &diff.missing_columns {
            builder.push(&on_table(AlterTableAction::AddColumn(ColumnSpec::from(column))))?;
        }
        for column in &diff.modified_columns {
            for change in column_changes(table, column) {
                builder.push(&on_table(AlterTableAction::AlterColumn {
                    name: column.name.clone(),
                    change,
                }))?;
            }
        }
        for column in &diff.extra_columns {
            builder.push(&on_table(AlterTableAction::DropColumn {
                name: column.column.name.clone(),
                previous: Some(ColumnSpec::from(column)),
            }))?;
        }
    }

    if enforced(table.policy.constraints) {
        for constraint in &diff.missing_constraints {
            builder.push(&on_table(AlterTableAction::AddConstraint(
                ConstraintSpec::from_definition(constraint)?,
            )))?;
        }
        for constraint in &diff.extra_constraints {
            builder.push(&on_table(AlterTableAction::DropConstraint {
                name: constraint.name.clone(),
                previous: Some(ConstraintSpec::from_observed(constraint)),
            }))?;
        }
        if let Some(pk) = &diff.primary_key {
            builder.push(&on_table(AlterTableAction::AlterPrimaryKey {
                columns: pk.declared.clone(),
                strategy: options.primary_key_strategy(),
                previous: Some(pk.observed.clone()),
                name: pk.name.clone(),
            }))?;
        }
    }
    Ok(())
}

/// Splits a column patch into single-facet changes: type, nullability,
/// default.
fn column_changes(table: &TableDefinition, column: &ModifiedColumn) -> Vec<ColumnChange> {
    let mut changes = Vec::new();
    if let Some(data_type) = &column.data_type {
        changes.push(ColumnChange::SetDataType {
            sql_type: data_type.schema.clone(),
            previous: Some(data_type.db.clone()),
        });
    }
    if let Some(nullable) = &column.nullable {
        changes.push(if nullable.schema {
            ColumnChange::DropNotNull
        } else {
            ColumnChange::SetNotNull
        });
    }
    if let Some(default) = &column.default {
        let previous = default.db.as_deref().map(Sql::raw);
        let declared = table
            .get_column(&column.name)
            .and_then(|c| c.default.clone())
            .or_else(|| default.schema.as_deref().map(Sql::raw));
        changes.push(match declared {
            Some(default) => ColumnChange::SetDefault { default, previous },
            None => ColumnChange::DropDefault { previous },
        });
    }
    changes
}

fn alter_indexes(
    builder: &mut MigrationBuilder,
    table: &TableDefinition,
    diff: &TableDiff,
) -> Result<()> {
    if !enforced(table.policy.indexes) {
        return Ok(());
    }
    let on_table = |action| TableAction::new(&diff.schema, &diff.table, action);

    for modified in &diff.modified_indexes {
        let declared = table.get_index(&modified.name).ok_or_else(|| {
            MigrateError::MissingInput(format!(
                "declaration for index '{}' on table '{}'",
                modified.name, diff.table
            ))
        })?;
        builder.push(&on_table(AlterTableAction::DropIndex {
            name: modified.name.clone(),
            unique: modified.db_unique,
            previous: Some(IndexSpec::from_observed(&modified.previous)),
        }))?;
        builder.push(&on_table(AlterTableAction::CreateIndex(
            IndexSpec::from_definition(declared)?,
        )))?;
    }
    for index in &diff.missing_indexes {
        builder.push(&on_table(AlterTableAction::CreateIndex(
            IndexSpec::from_definition(index)?,
        )))?;
    }
    for index in &diff.extra_indexes {
        builder.push(&on_table(AlterTableAction::DropIndex {
            name: index.name.clone(),
            unique: index.unique,
            previous: Some(IndexSpec::from_observed(index)),
        }))?;
    }
    Ok(())
}

fn drop_table(builder: &mut MigrationBuilder, table: &ObservedTable) -> Result<()> {
    builder.push(&TableAction::new(
        &table.schema,
        &table.name,
        AlterTableAction::DropTable {
            previous: TableSpec::from_observed(table)?,
        },
    ))
}
