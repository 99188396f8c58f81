//! Observed schema types.
//!
//! Snapshots of what the database reported. Produced fresh by every
//! introspection run and never cached.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{MigrateError, Result};
use crate::normalize::{resolve, NormalizeOptions, ResolvedType};
use crate::schema::{ConstraintKind, TableDefinition};

/// A column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedColumn {
    /// Column name.
    pub name: String,
    /// Raw `data_type`, e.g. `bigint` or `ARRAY`.
    pub data_type: String,
    /// Raw `udt_name`; array element types are prefixed with `_`.
    pub udt_name: Option<String>,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Raw default expression text.
    pub default: Option<String>,
    /// 1-based ordinal position.
    pub ordinal: i64,
    /// Whether the column is hidden (e.g. the implicit `rowid`).
    pub hidden: bool,
}

impl ObservedColumn {
    /// Creates a visible, nullable column with no default.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            udt_name: None,
            nullable: true,
            default: None,
            ordinal: 0,
            hidden: false,
        }
    }

    /// Marks the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the raw default text.
    #[must_use]
    pub fn default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Sets the UDT name.
    #[must_use]
    pub fn udt(mut self, udt_name: impl Into<String>) -> Self {
        self.udt_name = Some(udt_name.into());
        self
    }

    /// Marks the column as hidden.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Options to pass to the normalizer for this column.
    #[must_use]
    pub fn normalize_options(&self) -> NormalizeOptions<'_> {
        NormalizeOptions {
            is_nullable: self.nullable,
            base_type_name: self.udt_name.as_deref(),
        }
    }

    /// Resolves the raw type of a column of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Type`] when the type is unknown.
    pub fn resolve_type(&self, table: &str) -> Result<ResolvedType> {
        resolve(&self.data_type, self.udt_name.as_deref())
            .map_err(|e| MigrateError::type_error(table, &self.name, e))
    }
}

/// Sort direction of an index key part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// One part of an observed index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexPart {
    /// Expression text as printed by the database.
    pub expression: String,
    /// Sort direction.
    pub direction: Direction,
    /// 1-based position among key parts and stored columns.
    pub position: usize,
    /// Whether this is a stored (non-key) column.
    pub storing: bool,
}

/// An index recovered from the table's DDL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedIndex {
    /// Index name.
    pub name: String,
    /// Whether the index is unique.
    pub unique: bool,
    /// Key parts followed by stored columns.
    pub parts: Vec<IndexPart>,
    /// Partial index predicate text.
    pub predicate: Option<String>,
    /// Access method, e.g. `gin`.
    pub using: Option<String>,
}

impl ObservedIndex {
    /// Key parts only.
    pub fn key_parts(&self) -> impl Iterator<Item = &IndexPart> {
        self.parts.iter().filter(|p| !p.storing)
    }

    /// Stored column names.
    #[must_use]
    pub fn storing_columns(&self) -> Vec<String> {
        self.parts
            .iter()
            .filter(|p| p.storing)
            .map(|p| p.expression.clone())
            .collect()
    }
}

/// A named constraint recovered from the table's DDL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedConstraint {
    /// Constraint name.
    pub name: String,
    /// Constraint kind.
    pub kind: ConstraintKind,
    /// Definition text following the name, e.g. `CHECK (n > 0)`.
    pub definition: String,
}

/// A table as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedTable {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ObservedColumn>,
    /// Indexes in DDL order.
    pub indexes: Vec<ObservedIndex>,
    /// Primary key columns, when the DDL was read.
    pub primary_key: Option<Vec<String>>,
    /// Name of the primary key constraint, when printed.
    pub primary_key_name: Option<String>,
    /// Named constraints.
    pub constraints: Vec<ObservedConstraint>,
}

impl ObservedTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            primary_key: None,
            primary_key_name: None,
            constraints: Vec::new(),
        }
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ObservedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Gets an index by name.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<&ObservedIndex> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Gets a constraint by name.
    #[must_use]
    pub fn get_constraint(&self, name: &str) -> Option<&ObservedConstraint> {
        self.constraints.iter().find(|c| c.name == name)
    }
}

/// All tables of one schema, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObservedSchema {
    /// Schema the snapshot was read from, when known.
    pub schema: Option<String>,
    /// Tables keyed by name.
    pub tables: BTreeMap<String, ObservedTable>,
}

impl ObservedSchema {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty snapshot of `schema`.
    #[must_use]
    pub fn for_schema(schema: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            tables: BTreeMap::new(),
        }
    }

    /// Returns true when `table` belongs to the introspected schema.
    #[must_use]
    pub fn covers(&self, table: &TableDefinition) -> bool {
        self.schema.as_deref().is_none_or(|s| s == table.schema)
    }

    /// Adds a table.
    pub fn add_table(&mut self, table: ObservedTable) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&ObservedTable> {
        self.tables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize, DataType, ScalarType};

    #[test]
    fn test_array_column_normalizes_with_udt() {
        let column = ObservedColumn::new("tags", "ARRAY").udt("_text").not_null();
        let ty = normalize(&column.data_type, &column.normalize_options()).unwrap();
        assert_eq!(ty.data_type, DataType::Array(ScalarType::Varchar));
        assert!(!ty.nullable);
        assert_eq!(column.resolve_type("posts").unwrap().spelling, "text[]");
    }

    #[test]
    fn test_unknown_type_names_table_and_column() {
        let column = ObservedColumn::new("shape", "geometry");
        let err = column.resolve_type("maps").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Column 'maps.shape': unknown column type \"geometry\""
        );
    }

    #[test]
    fn test_index_parts_split_storing() {
        let index = ObservedIndex {
            name: String::from("i"),
            unique: false,
            parts: vec![
                IndexPart {
                    expression: String::from("a"),
                    direction: Direction::Asc,
                    position: 1,
                    storing: false,
                },
                IndexPart {
                    expression: String::from("b"),
                    direction: Direction::Asc,
                    position: 2,
                    storing: true,
                },
            ],
            predicate: None,
            using: None,
        };
        assert_eq!(index.key_parts().count(), 1);
        assert_eq!(index.storing_columns(), vec!["b"]);
    }
}
