//! Catalog-based introspection.
//!
//! Reads table, column, index, primary key and constraint shape for one
//! schema through a [`QueryExecutor`]. The table list and the column list
//! are fetched concurrently; `SHOW CREATE TABLE` is then issued once per
//! table that needs index or constraint information.

pub mod ddl;
pub mod pg;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use tidemark_sql::{Sql, SqlValue};
use tracing::{debug, info, warn};

use crate::error::{BoxError, MigrateError, Result};
use crate::observed::{ObservedColumn, ObservedSchema, ObservedTable};
use crate::schema::TableDefinition;

pub use pg::PgExecutor;

const TABLES_QUERY: &str = "SELECT table_name::TEXT AS table_name \
     FROM information_schema.tables \
     WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

const COLUMNS_QUERY: &str = "SELECT table_name::TEXT AS table_name, \
     column_name::TEXT AS column_name, \
     data_type::TEXT AS data_type, \
     udt_name::TEXT AS udt_name, \
     is_nullable::TEXT AS is_nullable, \
     column_default::TEXT AS column_default, \
     ordinal_position::INT8 AS ordinal_position, \
     is_hidden::TEXT AS is_hidden \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = ANY($2) \
     ORDER BY table_name, ordinal_position";

/// One result row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(BTreeMap<String, SqlValue>);

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Inserts a value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.0.insert(column.into(), value.into());
    }

    fn value(&self, column: &str) -> std::result::Result<&SqlValue, String> {
        self.0
            .get(column)
            .ok_or_else(|| format!("missing column '{column}'"))
    }

    /// Reads a non-null text value.
    ///
    /// # Errors
    ///
    /// Returns a message when the column is absent or not text.
    pub fn get_str(&self, column: &str) -> std::result::Result<&str, String> {
        match self.value(column)? {
            SqlValue::Text(s) => Ok(s),
            other => Err(format!("column '{column}' is not text: {other:?}")),
        }
    }

    /// Reads a nullable text value.
    ///
    /// # Errors
    ///
    /// Returns a message when the column is absent or neither text nor NULL.
    pub fn get_opt_str(&self, column: &str) -> std::result::Result<Option<&str>, String> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s)),
            other => Err(format!("column '{column}' is not text: {other:?}")),
        }
    }

    /// Reads an integer value.
    ///
    /// # Errors
    ///
    /// Returns a message when the column is absent or not an integer.
    pub fn get_i64(&self, column: &str) -> std::result::Result<i64, String> {
        match self.value(column)? {
            SqlValue::Int(n) => Ok(*n),
            other => Err(format!("column '{column}' is not an integer: {other:?}")),
        }
    }

    /// Reads a boolean, accepting catalog `YES`/`NO` text.
    ///
    /// # Errors
    ///
    /// Returns a message when the column is absent or not boolean-like.
    pub fn get_bool(&self, column: &str) -> std::result::Result<bool, String> {
        match self.value(column)? {
            SqlValue::Bool(b) => Ok(*b),
            SqlValue::Text(s) if s.eq_ignore_ascii_case("yes") || s == "true" => Ok(true),
            SqlValue::Text(s) if s.eq_ignore_ascii_case("no") || s == "false" => Ok(false),
            SqlValue::Null => Ok(false),
            other => Err(format!("column '{column}' is not a boolean: {other:?}")),
        }
    }
}

/// Executes read-only catalog queries.
///
/// Implemented for any `Fn(String, Vec<SqlValue>) -> Future` closure and for
/// [`PgExecutor`].
pub trait QueryExecutor {
    /// Runs `sql` with `params` bound to `$1..$n` and returns every row.
    fn query(
        &self,
        sql: String,
        params: Vec<SqlValue>,
    ) -> impl Future<Output = std::result::Result<Vec<Row>, BoxError>> + Send;
}

impl<F, Fut> QueryExecutor for F
where
    F: Fn(String, Vec<SqlValue>) -> Fut,
    Fut: Future<Output = std::result::Result<Vec<Row>, BoxError>> + Send,
{
    fn query(
        &self,
        sql: String,
        params: Vec<SqlValue>,
    ) -> impl Future<Output = std::result::Result<Vec<Row>, BoxError>> + Send {
        self(sql, params)
    }
}

async fn run<E: QueryExecutor>(
    executor: &E,
    sql: String,
    params: Vec<SqlValue>,
) -> Result<Vec<Row>> {
    debug!(sql = %sql, params = params.len(), "Running catalog query");
    executor
        .query(sql.clone(), params)
        .await
        .map_err(|source| MigrateError::Query { sql, source })
}

fn decode<T>(query: &'static str, value: std::result::Result<T, String>) -> Result<T> {
    value.map_err(|message| MigrateError::RowDecode { query, message })
}

/// Reads the observed schema of one database schema.
#[derive(Debug, Clone)]
pub struct Introspector {
    schema: String,
}

impl Introspector {
    /// Creates a reader for `schema`.
    #[must_use]
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    /// Returns the schema name.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Reads every base table of the schema.
    ///
    /// Columns are read for declared tables whose column policy is not
    /// ignored. Table DDL is read for declared tables whose index or
    /// constraint policy is not ignored; a failure there degrades that
    /// table's index, primary key and constraint information and is logged.
    ///
    /// # Errors
    ///
    /// Returns an error when the table or column query fails or returns a
    /// row of unexpected shape.
    pub async fn read<E: QueryExecutor>(
        &self,
        executor: &E,
        declared: &[TableDefinition],
    ) -> Result<ObservedSchema> {
        let declared: HashMap<&str, &TableDefinition> = declared
            .iter()
            .filter(|t| t.schema == self.schema)
            .map(|t| (t.name.as_str(), t))
            .collect();

        let mut column_tables: Vec<String> = declared
            .values()
            .filter(|t| t.policy.columns.is_active())
            .map(|t| t.name.clone())
            .collect();
        column_tables.sort();

        let tables_fut = run(
            executor,
            TABLES_QUERY.to_string(),
            vec![SqlValue::Text(self.schema.clone())],
        );
        let columns_fut = async {
            if column_tables.is_empty() {
                return Ok(Vec::new());
            }
            run(
                executor,
                COLUMNS_QUERY.to_string(),
                vec![
                    SqlValue::Text(self.schema.clone()),
                    SqlValue::TextArray(column_tables.clone()),
                ],
            )
            .await
        };
        let (table_rows, column_rows) = futures::try_join!(tables_fut, columns_fut)?;

        let mut columns = group_columns(&column_rows)?;
        let mut observed = ObservedSchema::for_schema(&self.schema);

        for row in &table_rows {
            let name = decode("tables", row.get_str("table_name"))?;
            let mut table = ObservedTable::new(&self.schema, name);
            table.columns = columns.remove(name).unwrap_or_default();

            if let Some(definition) = declared.get(name) {
                let policy = &definition.policy;
                if policy.indexes.is_active() || policy.constraints.is_active() {
                    match self.read_ddl(executor, name).await {
                        Ok(text) => {
                            if policy.indexes.is_active() {
                                table.indexes = ddl::parse_indexes(&text);
                            }
                            table.primary_key = ddl::parse_primary_key(&text);
                            table.primary_key_name = ddl::parse_primary_key_name(&text);
                            table.constraints = ddl::parse_constraints(&text);
                        }
                        Err(e) => {
                            warn!(
                                table = %name,
                                error = %e,
                                "Failed to read table DDL, indexes and constraints unavailable"
                            );
                        }
                    }
                }
            }

            observed.add_table(table);
        }

        info!(
            schema = %self.schema,
            tables = observed.tables.len(),
            "Read observed schema"
        );
        Ok(observed)
    }

    async fn read_ddl<E: QueryExecutor>(&self, executor: &E, table: &str) -> Result<String> {
        let sql = Sql::raw("SHOW CREATE TABLE ")
            .append(Sql::qualified(&self.schema, table)?)
            .to_statement();
        let rows = run(executor, sql.sql, sql.params).await?;
        let row = rows.first().ok_or_else(|| MigrateError::RowDecode {
            query: "show create table",
            message: format!("no rows for table '{table}'"),
        })?;
        Ok(decode("show create table", row.get_str("create_statement"))?.to_string())
    }
}

fn group_columns(rows: &[Row]) -> Result<HashMap<String, Vec<ObservedColumn>>> {
    const QUERY: &str = "columns";
    let mut grouped: HashMap<String, Vec<ObservedColumn>> = HashMap::new();
    for row in rows {
        let table = decode(QUERY, row.get_str("table_name"))?;
        let column = ObservedColumn {
            name: decode(QUERY, row.get_str("column_name"))?.to_string(),
            data_type: decode(QUERY, row.get_str("data_type"))?.to_string(),
            udt_name: decode(QUERY, row.get_opt_str("udt_name"))?.map(str::to_string),
            nullable: decode(QUERY, row.get_bool("is_nullable"))?,
            default: decode(QUERY, row.get_opt_str("column_default"))?.map(str::to_string),
            ordinal: decode(QUERY, row.get_i64("ordinal_position"))?,
            hidden: decode(QUERY, row.get_bool("is_hidden"))?,
        };
        grouped.entry(table.to_string()).or_default().push(column);
    }
    for columns in grouped.values_mut() {
        columns.sort_by_key(|c| c.ordinal);
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accessors() {
        let row = Row::new()
            .with("name", SqlValue::from("id"))
            .with("nullable", SqlValue::from("YES"))
            .with("hidden", SqlValue::Bool(false))
            .with("ordinal", SqlValue::Int(3))
            .with("default", SqlValue::Null);
        assert_eq!(row.get_str("name").unwrap(), "id");
        assert!(row.get_bool("nullable").unwrap());
        assert!(!row.get_bool("hidden").unwrap());
        assert_eq!(row.get_i64("ordinal").unwrap(), 3);
        assert_eq!(row.get_opt_str("default").unwrap(), None);
        assert!(row.get_str("missing").is_err());
        assert!(row.get_i64("name").is_err());
    }

    #[test]
    fn test_group_columns_sorts_by_ordinal() {
        let row = |table: &str, name: &str, ordinal: i64| {
            Row::new()
                .with("table_name", SqlValue::from(table))
                .with("column_name", SqlValue::from(name))
                .with("data_type", SqlValue::from("bigint"))
                .with("udt_name", SqlValue::from("int8"))
                .with("is_nullable", SqlValue::from("NO"))
                .with("column_default", SqlValue::Null)
                .with("ordinal_position", SqlValue::Int(ordinal))
                .with("is_hidden", SqlValue::from("NO"))
        };
        let grouped =
            group_columns(&[row("t", "b", 2), row("t", "a", 1), row("u", "x", 1)]).unwrap();
        let names: Vec<_> = grouped["t"].iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(!grouped["t"][0].nullable);
        assert_eq!(grouped["u"].len(), 1);
    }

    #[test]
    fn test_group_columns_rejects_bad_rows() {
        let row = Row::new().with("table_name", SqlValue::Int(1));
        assert!(matches!(
            group_columns(&[row]),
            Err(MigrateError::RowDecode { query: "columns", .. })
        ));
    }
}
