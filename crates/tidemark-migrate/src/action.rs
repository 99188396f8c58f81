//! Alter-table actions.
//!
//! Each action is one DDL statement against one table. Destructive actions
//! carry the state they destroy so that [`TableAction::reverse`] can build
//! the inverse; when that state is unknown the action is irreversible.

use tidemark_sql::Sql;

use crate::diff::{ExtraColumn, MissingColumn};
use crate::error::Result;
use crate::observed::{Direction, ObservedConstraint, ObservedIndex, ObservedTable};
use crate::render::render_table_constraint;
use crate::schema::{
    ColumnDefinition, IndexDefinition, TableConstraint, TableDefinition, IMPLICIT_PRIMARY_KEY,
};

/// Rendering-ready column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Storage spelling, e.g. `varchar` or `bigint[]`.
    pub sql_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default expression.
    pub default: Option<Sql>,
}

impl From<&ColumnDefinition> for ColumnSpec {
    fn from(column: &ColumnDefinition) -> Self {
        Self {
            name: column.name.clone(),
            sql_type: column.sql_type.clone(),
            nullable: column.nullable,
            default: column.default.clone(),
        }
    }
}

impl From<&MissingColumn> for ColumnSpec {
    fn from(column: &MissingColumn) -> Self {
        Self {
            name: column.name.clone(),
            sql_type: column.sql_type.clone(),
            nullable: column.nullable,
            default: column.default.clone(),
        }
    }
}

impl From<&ExtraColumn> for ColumnSpec {
    fn from(extra: &ExtraColumn) -> Self {
        Self {
            name: extra.column.name.clone(),
            sql_type: extra.sql_type.clone(),
            nullable: extra.column.nullable,
            default: extra.column.default.as_deref().map(Sql::raw),
        }
    }
}

/// Rendering-ready index definition.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,
    /// Whether the index is unique.
    pub unique: bool,
    /// Key parts, already rendered.
    pub expressions: Vec<Sql>,
    /// Stored columns.
    pub storing: Vec<String>,
    /// Partial index predicate.
    pub predicate: Option<Sql>,
    /// Access method.
    pub using: Option<String>,
}

impl IndexSpec {
    /// Builds a spec from a declared index.
    ///
    /// # Errors
    ///
    /// Returns an error when a key column is not a valid identifier.
    pub fn from_definition(index: &IndexDefinition) -> Result<Self> {
        Ok(Self {
            name: index.name.clone(),
            unique: index.unique,
            expressions: index
                .expressions
                .iter()
                .map(crate::schema::IndexExpr::to_sql)
                .collect::<Result<_>>()?,
            storing: index.storing.clone(),
            predicate: index.predicate.clone(),
            using: index.using.clone(),
        })
    }

    /// Builds a spec that recreates an observed index.
    #[must_use]
    pub fn from_observed(index: &ObservedIndex) -> Self {
        let expressions = index
            .key_parts()
            .map(|part| {
                let mut sql = if tidemark_sql::is_valid_identifier(&part.expression) {
                    Sql::raw(format!("\"{}\"", part.expression))
                } else {
                    Sql::raw(part.expression.clone())
                };
                if part.direction == Direction::Desc {
                    sql.push_raw(" DESC");
                }
                sql
            })
            .collect();
        Self {
            name: index.name.clone(),
            unique: index.unique,
            expressions,
            storing: index.storing_columns(),
            predicate: index.predicate.as_deref().map(Sql::raw),
            using: index.using.clone(),
        }
    }
}

/// A named constraint with its rendered definition (everything after the
/// name, e.g. `CHECK (total >= 0)`).
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSpec {
    /// Constraint name.
    pub name: String,
    /// Definition body.
    pub definition: Sql,
}

impl ConstraintSpec {
    /// Builds a spec from a declared constraint.
    ///
    /// # Errors
    ///
    /// Returns an error when a referenced identifier is invalid.
    pub fn from_definition(constraint: &TableConstraint) -> Result<Self> {
        Ok(Self {
            name: constraint.name().to_string(),
            definition: render_table_constraint(constraint)?,
        })
    }

    /// Builds a spec that recreates an observed constraint verbatim.
    #[must_use]
    pub fn from_observed(constraint: &ObservedConstraint) -> Self {
        Self {
            name: constraint.name.clone(),
            definition: Sql::raw(constraint.definition.clone()),
        }
    }
}

/// Rendering-ready table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    /// Columns in order.
    pub columns: Vec<ColumnSpec>,
    /// Primary key columns; empty leaves the implicit key in place.
    pub primary_key: Vec<String>,
    /// Named constraints.
    pub constraints: Vec<ConstraintSpec>,
}

impl TableSpec {
    /// Builds a spec from a declared table.
    ///
    /// # Errors
    ///
    /// Returns an error when a constraint cannot be rendered.
    pub fn from_definition(table: &TableDefinition) -> Result<Self> {
        Ok(Self {
            columns: table.columns.iter().map(ColumnSpec::from).collect(),
            primary_key: table.primary_key.clone(),
            constraints: table
                .constraints
                .iter()
                .map(ConstraintSpec::from_definition)
                .collect::<Result<_>>()?,
        })
    }

    /// Builds a spec that recreates an observed table, or `None` when its
    /// columns were never read.
    ///
    /// # Errors
    ///
    /// Returns an error when an observed column type is unknown.
    pub fn from_observed(table: &ObservedTable) -> Result<Option<Self>> {
        let visible: Vec<_> = table.columns.iter().filter(|c| !c.hidden).collect();
        if visible.is_empty() {
            return Ok(None);
        }
        let mut columns = Vec::with_capacity(visible.len());
        for column in visible {
            columns.push(ColumnSpec {
                name: column.name.clone(),
                sql_type: column.resolve_type(&table.name)?.spelling,
                nullable: column.nullable,
                default: column.default.as_deref().map(Sql::raw),
            });
        }
        let primary_key = table
            .primary_key
            .clone()
            .filter(|pk| !(pk.len() == 1 && pk[0] == IMPLICIT_PRIMARY_KEY))
            .unwrap_or_default();
        Ok(Some(Self {
            columns,
            primary_key,
            constraints: table
                .constraints
                .iter()
                .map(ConstraintSpec::from_observed)
                .collect(),
        }))
    }
}

/// One change to a column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnChange {
    /// `SET DATA TYPE`.
    SetDataType {
        /// New storage spelling.
        sql_type: String,
        /// Spelling before the change.
        previous: Option<String>,
    },
    /// `SET NOT NULL`.
    SetNotNull,
    /// `DROP NOT NULL`.
    DropNotNull,
    /// `SET DEFAULT`.
    SetDefault {
        /// New default.
        default: Sql,
        /// Default before the change; `None` means there was none.
        previous: Option<Sql>,
    },
    /// `DROP DEFAULT`.
    DropDefault {
        /// Default being dropped.
        previous: Option<Sql>,
    },
}

/// How a primary key change is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimaryKeyStrategy {
    /// `ALTER PRIMARY KEY USING COLUMNS`, which keeps the old key as a
    /// unique secondary index.
    #[default]
    KeepOldAsIndex,
    /// Drop the key constraint and add a new one.
    DropAndAdd,
}

/// A single alter-table action.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterTableAction {
    /// Create the table.
    CreateTable(TableSpec),
    /// Drop the table.
    DropTable {
        /// Table definition before the drop.
        previous: Option<TableSpec>,
    },
    /// Add a column.
    AddColumn(ColumnSpec),
    /// Drop a column.
    DropColumn {
        /// Column name.
        name: String,
        /// Column definition before the drop.
        previous: Option<ColumnSpec>,
    },
    /// Alter one facet of a column.
    AlterColumn {
        /// Column name.
        name: String,
        /// The change.
        change: ColumnChange,
    },
    /// Add a named constraint.
    AddConstraint(ConstraintSpec),
    /// Drop a named constraint.
    DropConstraint {
        /// Constraint name.
        name: String,
        /// Constraint before the drop.
        previous: Option<ConstraintSpec>,
    },
    /// Create an index.
    CreateIndex(IndexSpec),
    /// Drop an index.
    DropIndex {
        /// Index name.
        name: String,
        /// Whether the index is unique (dropped with CASCADE).
        unique: bool,
        /// Index before the drop.
        previous: Option<IndexSpec>,
    },
    /// Replace the primary key.
    AlterPrimaryKey {
        /// New key columns.
        columns: Vec<String>,
        /// How the change is applied.
        strategy: PrimaryKeyStrategy,
        /// Key columns before the change.
        previous: Option<Vec<String>>,
        /// Key constraint name, `<table>_pkey` when unknown.
        name: Option<String>,
    },
}

/// An action bound to a schema-qualified table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableAction {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// The action.
    pub action: AlterTableAction,
}

impl TableAction {
    /// Creates an action.
    #[must_use]
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        action: AlterTableAction,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            action,
        }
    }

    /// Returns the action that undoes this one, or `None` when the state it
    /// destroys is unknown.
    #[must_use]
    pub fn reverse(&self) -> Option<Self> {
        let action = match &self.action {
            AlterTableAction::CreateTable(spec) => AlterTableAction::DropTable {
                previous: Some(spec.clone()),
            },
            AlterTableAction::DropTable { previous } => {
                AlterTableAction::CreateTable(previous.clone()?)
            }
            AlterTableAction::AddColumn(spec) => AlterTableAction::DropColumn {
                name: spec.name.clone(),
                previous: Some(spec.clone()),
            },
            AlterTableAction::DropColumn { previous, .. } => {
                AlterTableAction::AddColumn(previous.clone()?)
            }
            AlterTableAction::AlterColumn { name, change } => AlterTableAction::AlterColumn {
                name: name.clone(),
                change: reverse_column_change(change)?,
            },
            AlterTableAction::AddConstraint(spec) => AlterTableAction::DropConstraint {
                name: spec.name.clone(),
                previous: Some(spec.clone()),
            },
            AlterTableAction::DropConstraint { previous, .. } => {
                AlterTableAction::AddConstraint(previous.clone()?)
            }
            AlterTableAction::CreateIndex(spec) => AlterTableAction::DropIndex {
                name: spec.name.clone(),
                unique: spec.unique,
                previous: Some(spec.clone()),
            },
            AlterTableAction::DropIndex { previous, .. } => {
                AlterTableAction::CreateIndex(previous.clone()?)
            }
            AlterTableAction::AlterPrimaryKey {
                columns,
                strategy,
                previous,
                name,
            } => AlterTableAction::AlterPrimaryKey {
                columns: previous
                    .clone()
                    .unwrap_or_else(|| vec![IMPLICIT_PRIMARY_KEY.to_string()]),
                strategy: *strategy,
                previous: Some(columns.clone()),
                name: name.clone(),
            },
        };
        Some(Self {
            schema: self.schema.clone(),
            table: self.table.clone(),
            action,
        })
    }

    /// Returns true when [`Self::reverse`] yields an action.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.reverse().is_some()
    }

    /// Short human-readable description, used in logs and placeholders.
    #[must_use]
    pub fn describe(&self) -> String {
        let what = match &self.action {
            AlterTableAction::CreateTable(_) => String::from("create table"),
            AlterTableAction::DropTable { .. } => String::from("drop table"),
            AlterTableAction::AddColumn(spec) => format!("add column {}", spec.name),
            AlterTableAction::DropColumn { name, .. } => format!("drop column {name}"),
            AlterTableAction::AlterColumn { name, .. } => format!("alter column {name}"),
            AlterTableAction::AddConstraint(spec) => format!("add constraint {}", spec.name),
            AlterTableAction::DropConstraint { name, .. } => format!("drop constraint {name}"),
            AlterTableAction::CreateIndex(spec) => format!("create index {}", spec.name),
            AlterTableAction::DropIndex { name, .. } => format!("drop index {name}"),
            AlterTableAction::AlterPrimaryKey { .. } => String::from("alter primary key"),
        };
        format!("{what} on {}.{}", self.schema, self.table)
    }
}

fn reverse_column_change(change: &ColumnChange) -> Option<ColumnChange> {
    Some(match change {
        ColumnChange::SetDataType { sql_type, previous } => ColumnChange::SetDataType {
            sql_type: previous.clone()?,
            previous: Some(sql_type.clone()),
        },
        ColumnChange::SetNotNull => ColumnChange::DropNotNull,
        ColumnChange::DropNotNull => ColumnChange::SetNotNull,
        ColumnChange::SetDefault { default, previous } => match previous {
            Some(previous) => ColumnChange::SetDefault {
                default: previous.clone(),
                previous: Some(default.clone()),
            },
            None => ColumnChange::DropDefault {
                previous: Some(default.clone()),
            },
        },
        ColumnChange::DropDefault { previous } => ColumnChange::SetDefault {
            default: previous.clone()?,
            previous: None,
        },
    })
}
