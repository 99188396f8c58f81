#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tidemark_migrate::error::BoxError;
use tidemark_migrate::introspect::Row;
use tidemark_migrate::prelude::*;
use tidemark_sql::SqlValue;

type CatalogResult = std::result::Result<Vec<Row>, BoxError>;

/// An in-memory catalog answering the introspection queries.
#[derive(Default)]
pub struct FakeCatalog {
    tables: Vec<String>,
    columns: Vec<Row>,
    ddl: HashMap<String, String>,
    log: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table with its `SHOW CREATE TABLE` text.
    pub fn table(mut self, name: &str, ddl: &str) -> Self {
        self.tables.push(name.to_string());
        self.ddl.insert(name.to_string(), ddl.to_string());
        self
    }

    /// Adds a table whose DDL cannot be fetched.
    pub fn table_without_ddl(mut self, name: &str) -> Self {
        self.tables.push(name.to_string());
        self
    }

    /// Adds a column row. `nullable` and `default` follow the catalog.
    pub fn column(
        self,
        table: &str,
        name: &str,
        data_type: &str,
        nullable: bool,
        default: Option<&str>,
    ) -> Self {
        let udt = match data_type {
            "bigint" => "int8",
            "integer" => "int4",
            "character varying" => "varchar",
            "ARRAY" => "_text",
            other => other,
        };
        self.typed_column(table, name, data_type, udt, nullable, default)
    }

    /// Adds a column row with an explicit `udt_name`.
    pub fn typed_column(
        mut self,
        table: &str,
        name: &str,
        data_type: &str,
        udt: &str,
        nullable: bool,
        default: Option<&str>,
    ) -> Self {
        let ordinal = self
            .columns
            .iter()
            .filter(|r| r.get_str("table_name").ok() == Some(table))
            .count() as i64
            + 1;
        self.columns.push(
            Row::new()
                .with("table_name", table)
                .with("column_name", name)
                .with("data_type", data_type)
                .with("udt_name", udt)
                .with("is_nullable", if nullable { "YES" } else { "NO" })
                .with(
                    "column_default",
                    default.map_or(SqlValue::Null, SqlValue::from),
                )
                .with("ordinal_position", ordinal)
                .with("is_hidden", "NO"),
        );
        self
    }

    /// Adds the hidden `rowid` column CockroachDB creates for tables
    /// without a declared key.
    pub fn rowid(mut self, table: &str) -> Self {
        self.columns.push(
            Row::new()
                .with("table_name", table)
                .with("column_name", "rowid")
                .with("data_type", "bigint")
                .with("udt_name", "int8")
                .with("is_nullable", "NO")
                .with("column_default", "unique_rowid()")
                .with("ordinal_position", 99_i64)
                .with("is_hidden", "YES"),
        );
        self
    }

    /// Applies the `CREATE TABLE` and `CREATE INDEX` statements of
    /// `migration` and records the tables the way CockroachDB reports them
    /// afterwards, both in `information_schema` and in `SHOW CREATE TABLE`.
    pub fn apply_created(mut self, migration: &Migration) -> Self {
        let mut created: Vec<(String, Vec<String>)> = Vec::new();
        for sql in migration.up_sql() {
            if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
                let open = rest.find(" (").unwrap();
                let table = last_ident(&rest[..open]);
                let body = &rest[open + 2..rest.len() - 1];
                let mut lines = Vec::new();
                for element in split_top_level(body) {
                    if let Some(constraint) = element.strip_prefix("CONSTRAINT ") {
                        let (name, definition) = constraint.split_once(' ').unwrap();
                        let columns = paren_idents(definition);
                        lines.push(format!(
                            "CONSTRAINT {} PRIMARY KEY ({} ASC)",
                            unquote(name),
                            columns.join(" ASC, ")
                        ));
                        continue;
                    }
                    let (name, rest) = element[1..].split_once('"').unwrap();
                    let nullable = !rest.contains("NOT NULL");
                    let rendered = rest.split(" NOT NULL").next().unwrap();
                    let rendered = rendered.split(" DEFAULT").next().unwrap().trim();
                    let (data_type, udt, spelling) = stored_type(rendered);
                    self = self.typed_column(&table, name, &data_type, &udt, nullable, None);
                    lines.push(format!(
                        "{name} {spelling} {}",
                        if nullable { "NULL" } else { "NOT NULL" }
                    ));
                }
                created.push((table, lines));
            } else if sql.starts_with("CREATE ") && sql.contains("INDEX ") {
                let unique = sql.starts_with("CREATE UNIQUE ");
                let after = &sql[sql.find("INDEX ").unwrap() + "INDEX ".len()..];
                let (name, rest) = after.split_once(" ON ").unwrap();
                let open = rest.find(" (").unwrap();
                let table = last_ident(&rest[..open]);
                let columns = paren_idents(&rest[open + 1..]);
                let line = format!(
                    "{}INDEX {} ({} ASC)",
                    if unique { "UNIQUE " } else { "" },
                    unquote(name),
                    columns.join(" ASC, ")
                );
                created
                    .iter_mut()
                    .find(|(t, _)| *t == table)
                    .unwrap()
                    .1
                    .push(line);
            }
        }
        for (table, lines) in created {
            let ddl = format!("CREATE TABLE public.{table} (\n\t{}\n);", lines.join(",\n\t"));
            self = self.table(&table, &ddl);
        }
        self
    }

    /// Returns every query received so far.
    pub fn queries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn respond(&self, sql: &str, params: &[SqlValue]) -> CatalogResult {
        self.log.lock().unwrap().push(sql.to_string());
        if sql.contains("information_schema.tables") {
            return Ok(self
                .tables
                .iter()
                .map(|t| Row::new().with("table_name", t.as_str()))
                .collect());
        }
        if sql.contains("information_schema.columns") {
            let wanted = match params.get(1) {
                Some(SqlValue::TextArray(names)) => names.clone(),
                other => return Err(format!("unexpected table filter {other:?}").into()),
            };
            return Ok(self
                .columns
                .iter()
                .filter(|r| {
                    r.get_str("table_name")
                        .is_ok_and(|t| wanted.iter().any(|w| w == t))
                })
                .cloned()
                .collect());
        }
        if sql.starts_with("SHOW CREATE TABLE") {
            let ddl = self
                .ddl
                .iter()
                .find(|(name, _)| sql.ends_with(&format!("\"{name}\"")))
                .map(|(_, ddl)| ddl.clone());
            return match ddl {
                Some(ddl) => Ok(vec![Row::new().with("create_statement", ddl)]),
                None => Err("relation does not exist".into()),
            };
        }
        Err(format!("unexpected query: {sql}").into())
    }

    /// Returns a closure executor over this catalog.
    pub fn executor(
        &self,
    ) -> impl Fn(String, Vec<SqlValue>) -> std::future::Ready<CatalogResult> + '_ {
        move |sql, params| std::future::ready(self.respond(&sql, &params))
    }

    /// Reads the observed schema for `declared`.
    pub fn read(&self, declared: &[TableDefinition]) -> ObservedSchema {
        let executor = self.executor();
        block_on(Introspector::new("public").read(&executor, declared)).unwrap()
    }
}

/// Catalog `data_type`, `udt_name` and `SHOW CREATE TABLE` spelling of a
/// rendered column type. A bare `INTEGER` is stored as INT8.
fn stored_type(rendered: &str) -> (String, String, String) {
    if let Some(element) = rendered.strip_suffix("[]") {
        let (_, udt, spelling) = stored_type(element);
        return (String::from("ARRAY"), format!("_{udt}"), format!("{spelling}[]"));
    }
    let (data_type, udt, spelling) = match rendered {
        "INT4" => ("integer", "int4", "INT4"),
        "INTEGER" | "INT" | "INT8" | "BIGINT" => ("bigint", "int8", "INT8"),
        "INT2" | "SMALLINT" => ("smallint", "int2", "INT2"),
        "VARCHAR" => ("character varying", "varchar", "VARCHAR"),
        "TEXT" | "STRING" => ("text", "text", "STRING"),
        "DOUBLE PRECISION" | "FLOAT8" => ("double precision", "float8", "FLOAT8"),
        "BOOLEAN" | "BOOL" => ("boolean", "bool", "BOOL"),
        "TIMESTAMPTZ" => ("timestamp with time zone", "timestamptz", "TIMESTAMPTZ"),
        "TIMESTAMP" => ("timestamp without time zone", "timestamp", "TIMESTAMP"),
        "JSON" | "JSONB" => ("jsonb", "jsonb", "JSONB"),
        other => panic!("unexpected column type {other}"),
    };
    (data_type.to_string(), udt.to_string(), spelling.to_string())
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());
    parts
}

fn unquote(name: &str) -> &str {
    name.trim().trim_matches('"')
}

/// `"public"."users"` -> `users`
fn last_ident(qualified: &str) -> String {
    unquote(qualified.rsplit('.').next().unwrap()).to_string()
}

/// Identifiers of the first parenthesized list in `text`.
fn paren_idents(text: &str) -> Vec<String> {
    let open = text.find('(').unwrap();
    let close = open + text[open..].find(')').unwrap();
    text[open + 1..close]
        .split(',')
        .map(|c| unquote(c).to_string())
        .collect()
}

pub fn block_on<F: Future>(future: F) -> F::Output {
    tokio_test::block_on(future)
}

/// A declared column with a raw type spelling.
pub fn column(name: &str, type_name: &str) -> ColumnDefinition {
    ColumnDefinition::with_type_name(name, type_name).unwrap()
}

/// Reads, diffs and generates in one go.
pub fn reconcile(
    catalog: &FakeCatalog,
    declared: &[TableDefinition],
    diff_options: &DiffOptions,
) -> (SchemaDiff, Migration) {
    let observed = catalog.read(declared);
    let schema_diff = diff(declared, &observed, diff_options).unwrap();
    let migration = generate(&schema_diff, declared, &GenerateOptions::default()).unwrap();
    (schema_diff, migration)
}

pub const USERS_DDL: &str = "CREATE TABLE public.users (
\tid INT8 NOT NULL,
\tname VARCHAR NULL,
\tcount INT8 NULL,
\tCONSTRAINT users_pkey PRIMARY KEY (id ASC),
\tINDEX users_name_idx (name ASC)
);";

/// The observed `users` table matching [`USERS_DDL`].
pub fn users_catalog() -> FakeCatalog {
    FakeCatalog::new()
        .table("users", USERS_DDL)
        .column("users", "id", "bigint", false, None)
        .column("users", "name", "character varying", true, None)
        .column("users", "count", "bigint", true, None)
}

/// The declaration matching [`users_catalog`].
pub fn users() -> TableDefinition {
    TableDefinition::new("users")
        .column(column("id", "bigint").not_null())
        .column(varchar("name"))
        .column(column("count", "bigint"))
        .primary_key(["id"])
        .index(IndexDefinition::new("users_name_idx").column("name"))
}
