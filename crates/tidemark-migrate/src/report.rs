//! Human-readable diffs and policy reports.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::diff::{ModifiedColumn, SchemaDiff, TableDiff};
use crate::error::{MigrateError, Result};
use crate::schema::{Enforcement, IndexExpr, IntrospectionPolicy, TableDefinition};

/// What part of a table a finding is about. Selects the policy level that
/// applies to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Whole tables; governed by the column level.
    Table,
    /// Columns.
    Column,
    /// Indexes.
    Index,
    /// Constraints and the primary key.
    Constraint,
}

impl Category {
    const fn level(self, policy: &IntrospectionPolicy) -> Enforcement {
        match self {
            Self::Table | Self::Column => policy.columns,
            Self::Index => policy.indexes,
            Self::Constraint => policy.constraints,
        }
    }
}

/// One difference, described for humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Table name.
    pub table: String,
    /// Category.
    pub category: Category,
    /// One-line description in `+`/`-`/`~` notation.
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.table, self.message)
    }
}

/// Differences split by the policy level of their category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyReport {
    /// Differences that migrations must fix.
    pub enforced: Vec<Finding>,
    /// Differences that are only reported.
    pub warned: Vec<Finding>,
}

impl PolicyReport {
    fn file(
        &mut self,
        policy: &IntrospectionPolicy,
        table: &str,
        category: Category,
        message: String,
    ) {
        let finding = Finding {
            table: table.to_string(),
            category,
            message,
        };
        match category.level(policy) {
            Enforcement::Enforce => self.enforced.push(finding),
            Enforcement::Warn => {
                warn!(table = %finding.table, "{}", finding.message);
                self.warned.push(finding);
            }
            Enforcement::Ignore => {}
        }
    }

    /// Returns true when nothing is enforced.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.enforced.is_empty()
    }

    /// Fails with [`MigrateError::PolicyViolation`] when any finding is
    /// enforced, otherwise returns the report for its warnings.
    ///
    /// # Errors
    ///
    /// Returns the enforced findings as a policy violation.
    pub fn into_result(self) -> Result<Self> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(MigrateError::PolicyViolation(
                self.enforced.iter().map(ToString::to_string).collect(),
            ))
        }
    }
}

/// Splits every difference in `diff` by its table's policy level.
///
/// Warn-level findings are logged. Extra tables have no declaration and
/// are always warned.
#[must_use]
pub fn policy_report(diff: &SchemaDiff, declared: &[TableDefinition]) -> PolicyReport {
    let default_policy = IntrospectionPolicy::default();
    let policy_of = |name: &str| {
        declared
            .iter()
            .find(|t| t.name == name)
            .map_or(&default_policy, |t| &t.policy)
    };

    let mut report = PolicyReport::default();
    for name in &diff.missing_tables {
        report.file(
            policy_of(name),
            name,
            Category::Table,
            format!("+ table {name}"),
        );
    }
    for table_diff in &diff.modified_tables {
        let policy = policy_of(&table_diff.table);
        for (category, message) in table_lines(table_diff) {
            report.file(policy, &table_diff.table, category, message);
        }
    }

    for table in &diff.extra_tables {
        let finding = Finding {
            table: table.name.clone(),
            category: Category::Table,
            message: format!("- table {}", table.name),
        };
        warn!(table = %finding.table, "Undeclared table in database");
        report.warned.push(finding);
    }
    report
}

const fn nullability(nullable: bool) -> &'static str {
    if nullable {
        "nullable"
    } else {
        "not null"
    }
}

fn column_lines(column: &ModifiedColumn, out: &mut Vec<(Category, String)>) {
    let name = &column.name;
    if let Some(t) = &column.data_type {
        out.push((Category::Column, format!("~ {name}: {} -> {}", t.db, t.schema)));
    } else if let Some(base) = &column.array_base_type {
        let db = base.db.as_deref().unwrap_or("(none)");
        let schema = base.schema.as_deref().unwrap_or("(none)");
        out.push((Category::Column, format!("~ {name} element: {db} -> {schema}")));
    }
    if let Some(n) = &column.nullable {
        out.push((
            Category::Column,
            format!("~ {name}: {} -> {}", nullability(n.db), nullability(n.schema)),
        ));
    }
    if let Some(d) = &column.default {
        let db = d.db.as_deref().unwrap_or("(none)");
        let schema = d.schema.as_deref().unwrap_or("(none)");
        out.push((Category::Column, format!("~ {name} default: {db} -> {schema}")));
    }
}

fn table_lines(diff: &TableDiff) -> Vec<(Category, String)> {
    let mut out = Vec::new();

    for column in &diff.missing_columns {
        let mut line = format!("+ {}: {}", column.name, column.sql_type);
        if !column.nullable {
            line.push_str(" not null");
        }
        if let Some(default) = &column.default {
            line.push_str(&format!(" default {default}"));
        }
        out.push((Category::Column, line));
    }
    for column in &diff.modified_columns {
        column_lines(column, &mut out);
    }
    for extra in &diff.extra_columns {
        out.push((
            Category::Column,
            format!("- {}: {}", extra.column.name, extra.sql_type),
        ));
    }

    for index in &diff.missing_indexes {
        let exprs: Vec<String> = index.expressions.iter().map(IndexExpr::text).collect();
        let unique = if index.unique { "unique " } else { "" };
        out.push((
            Category::Index,
            format!("+ {unique}index {} ({})", index.name, exprs.join(", ")),
        ));
    }
    for index in &diff.modified_indexes {
        let mut line = format!("~ index {}:", index.name);
        if index.db_unique != index.schema_unique {
            line.push_str(&format!(" unique {} -> {}", index.db_unique, index.schema_unique));
        }
        if index.db_expressions != index.schema_expressions {
            line.push_str(&format!(
                " ({}) -> ({})",
                index.db_expressions.join(", "),
                index.schema_expressions.join(", ")
            ));
        }
        out.push((Category::Index, line));
    }
    for index in &diff.extra_indexes {
        out.push((Category::Index, format!("- index {}", index.name)));
    }

    for constraint in &diff.missing_constraints {
        out.push((
            Category::Constraint,
            format!("+ constraint {}", constraint.name()),
        ));
    }
    for constraint in &diff.extra_constraints {
        out.push((
            Category::Constraint,
            format!("- constraint {}: {}", constraint.name, constraint.definition),
        ));
    }
    if let Some(pk) = &diff.primary_key {
        out.push((
            Category::Constraint,
            format!(
                "~ primary key: ({}) -> ({})",
                pk.observed.join(", "),
                pk.declared.join(", ")
            ),
        ));
    }
    out
}

impl fmt::Display for TableDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {}.{}:", self.schema, self.table)?;
        for (_, line) in table_lines(self) {
            writeln!(f, "    {line}")?;
        }
        Ok(())
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No changes detected.");
        }
        writeln!(f, "Changes detected:\n")?;
        for name in &self.missing_tables {
            writeln!(f, "  + table {name}")?;
        }
        for table in &self.extra_tables {
            writeln!(f, "  - table {}.{}", table.schema, table.name)?;
        }
        for table_diff in &self.modified_tables {
            write!(f, "{table_diff}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{ExtraColumn, Mismatch, MissingColumn, PrimaryKeyDiff};
    use crate::observed::{ObservedColumn, ObservedTable};
    use crate::schema::{varchar, IndexDefinition};

    fn users_diff() -> TableDiff {
        TableDiff {
            schema: String::from("public"),
            table: String::from("users"),
            missing_columns: vec![MissingColumn::from(&varchar("email").not_null())],
            extra_columns: vec![ExtraColumn {
                sql_type: String::from("text"),
                column: ObservedColumn::new("nickname", "text"),
            }],
            modified_columns: vec![ModifiedColumn {
                name: String::from("count"),
                data_type: Some(Mismatch {
                    schema: String::from("integer"),
                    db: String::from("bigint"),
                }),
                nullable: None,
                default: Some(Mismatch {
                    schema: Some(String::from("0")),
                    db: None,
                }),
                array_base_type: None,
            }],
            missing_indexes: vec![IndexDefinition::new("users_email_key").column("email").unique()],
            extra_indexes: Vec::new(),
            modified_indexes: Vec::new(),
            missing_constraints: Vec::new(),
            extra_constraints: Vec::new(),
            primary_key: Some(PrimaryKeyDiff {
                declared: vec![String::from("id")],
                observed: vec![String::from("rowid")],
                name: Some(String::from("users_pkey")),
            }),
        }
    }

    #[test]
    fn test_display_renders_tree() {
        let diff = SchemaDiff {
            missing_tables: vec![String::from("orders")],
            extra_tables: vec![ObservedTable::new("public", "legacy")],
            modified_tables: vec![users_diff()],
        };
        let text = diff.to_string();
        assert!(text.starts_with("Changes detected:"));
        assert!(text.contains("  + table orders\n"));
        assert!(text.contains("  - table public.legacy\n"));
        assert!(text.contains("  public.users:\n"));
        assert!(text.contains("    + email: varchar not null\n"));
        assert!(text.contains("    - nickname: text\n"));
        assert!(text.contains("    ~ count: bigint -> integer\n"));
        assert!(text.contains("    ~ count default: (none) -> 0\n"));
        assert!(text.contains("    + unique index users_email_key (email)\n"));
        assert!(text.contains("    ~ primary key: (rowid) -> (id)\n"));
    }

    #[test]
    fn test_empty_diff_display() {
        assert_eq!(SchemaDiff::default().to_string(), "No changes detected.\n");
    }

    #[test]
    fn test_policy_report_splits_by_level() {
        let policy = IntrospectionPolicy {
            indexes: Enforcement::Warn,
            constraints: Enforcement::Ignore,
            ..IntrospectionPolicy::default()
        };
        let declared = vec![TableDefinition::new("users")
            .column(varchar("email").not_null())
            .policy(policy)];
        let diff = SchemaDiff {
            modified_tables: vec![users_diff()],
            ..SchemaDiff::default()
        };
        let report = policy_report(&diff, &declared);
        assert!(report.enforced.iter().all(|f| f.category == Category::Column));
        assert_eq!(report.enforced.len(), 4);
        assert_eq!(report.warned.len(), 1);
        assert_eq!(report.warned[0].category, Category::Index);

        match report.into_result() {
            Err(MigrateError::PolicyViolation(findings)) => {
                assert_eq!(findings[0], "users: + email: varchar not null");
            }
            other => panic!("Expected PolicyViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_extra_tables_are_only_warned() {
        let diff = SchemaDiff {
            extra_tables: vec![ObservedTable::new("public", "legacy")],
            ..SchemaDiff::default()
        };
        let report = policy_report(&diff, &[]).into_result().unwrap();
        assert_eq!(report.warned.len(), 1);
        assert!(report.is_clean());
    }
}
