//! Facts a database must satisfy before a generated migration applies.
//!
//! Derived from the same diff the migration was compiled from and stored
//! next to its statements, so a runner can refuse to apply a migration to
//! a database that has drifted since generation.

use serde::Serialize;

use crate::diff::SchemaDiff;

/// One expected fact about the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Precondition {
    /// The table is not there yet.
    TableAbsent {
        /// Table name.
        table: String,
    },
    /// The table is there.
    TableExists {
        /// Table name.
        table: String,
    },
    /// The column is not there yet.
    ColumnAbsent {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// The column is there, with the given shape when known.
    ColumnExists {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Raw type as reported by the catalog.
        #[serde(skip_serializing_if = "Option::is_none")]
        data_type: Option<String>,
        /// Nullability.
        #[serde(skip_serializing_if = "Option::is_none")]
        nullable: Option<bool>,
    },
    /// The index is not there yet.
    IndexAbsent {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },
    /// The index is there.
    IndexExists {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
        /// Uniqueness.
        unique: bool,
    },
}

/// Lists the preconditions of a migration compiled from `diff`.
#[must_use]
pub fn preconditions(diff: &SchemaDiff) -> Vec<Precondition> {
    let mut out = Vec::new();

    for table in &diff.missing_tables {
        out.push(Precondition::TableAbsent {
            table: table.clone(),
        });
    }

    for table_diff in &diff.modified_tables {
        let table = &table_diff.table;
        out.push(Precondition::TableExists {
            table: table.clone(),
        });
        for column in &table_diff.missing_columns {
            out.push(Precondition::ColumnAbsent {
                table: table.clone(),
                column: column.name.clone(),
            });
        }
        for column in &table_diff.modified_columns {
            out.push(Precondition::ColumnExists {
                table: table.clone(),
                column: column.name.clone(),
                data_type: column.data_type.as_ref().map(|t| t.db.clone()),
                nullable: column.nullable.as_ref().map(|n| n.db),
            });
        }
        for extra in &table_diff.extra_columns {
            out.push(Precondition::ColumnExists {
                table: table.clone(),
                column: extra.column.name.clone(),
                data_type: Some(extra.column.data_type.clone()),
                nullable: Some(extra.column.nullable),
            });
        }
        for index in &table_diff.missing_indexes {
            out.push(Precondition::IndexAbsent {
                table: table.clone(),
                index: index.name.clone(),
            });
        }
        for index in &table_diff.modified_indexes {
            out.push(Precondition::IndexExists {
                table: table.clone(),
                index: index.name.clone(),
                unique: index.db_unique,
            });
        }
        for index in &table_diff.extra_indexes {
            out.push(Precondition::IndexExists {
                table: table.clone(),
                index: index.name.clone(),
                unique: index.unique,
            });
        }
    }

    for table in &diff.extra_tables {
        out.push(Precondition::TableExists {
            table: table.name.clone(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{ExtraColumn, MissingColumn, TableDiff};
    use crate::observed::ObservedColumn;
    use crate::schema::varchar;

    #[test]
    fn test_preconditions_for_table_changes() {
        let diff = SchemaDiff {
            missing_tables: vec![String::from("orders")],
            extra_tables: Vec::new(),
            modified_tables: vec![TableDiff {
                schema: String::from("public"),
                table: String::from("users"),
                missing_columns: vec![MissingColumn::from(&varchar("email"))],
                extra_columns: vec![ExtraColumn {
                    sql_type: String::from("bigint"),
                    column: ObservedColumn::new("legacy_id", "INT8").not_null(),
                }],
                modified_columns: Vec::new(),
                missing_indexes: Vec::new(),
                extra_indexes: Vec::new(),
                modified_indexes: Vec::new(),
                missing_constraints: Vec::new(),
                extra_constraints: Vec::new(),
                primary_key: None,
            }],
        };
        let found = preconditions(&diff);
        assert_eq!(
            found,
            vec![
                Precondition::TableAbsent {
                    table: String::from("orders")
                },
                Precondition::TableExists {
                    table: String::from("users")
                },
                Precondition::ColumnAbsent {
                    table: String::from("users"),
                    column: String::from("email"),
                },
                Precondition::ColumnExists {
                    table: String::from("users"),
                    column: String::from("legacy_id"),
                    data_type: Some(String::from("INT8")),
                    nullable: Some(false),
                },
            ]
        );
    }

    #[test]
    fn test_preconditions_serialize_tagged() {
        let json = serde_json::to_value(Precondition::IndexAbsent {
            table: String::from("users"),
            index: String::from("users_email_key"),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "index_absent", "table": "users", "index": "users_email_key"})
        );
    }
}
