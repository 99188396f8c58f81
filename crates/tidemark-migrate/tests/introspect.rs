//! Introspection behavior against an in-memory catalog.

mod common;

use common::*;
use tidemark_migrate::prelude::*;

#[test]
fn test_reads_columns_indexes_and_primary_key() {
    let catalog = users_catalog().rowid("users");
    let observed = catalog.read(&[users()]);

    let table = observed.get_table("users").unwrap();
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "name", "count", "rowid"]);
    assert!(table.columns[3].hidden);
    assert!(!table.columns[0].nullable);

    assert_eq!(table.primary_key.as_deref(), Some(&[String::from("id")][..]));
    assert_eq!(table.indexes.len(), 1);
    assert_eq!(table.indexes[0].name, "users_name_idx");
    assert!(!table.indexes[0].unique);
}

#[test]
fn test_failed_ddl_read_degrades_to_columns_only() {
    let catalog = FakeCatalog::new()
        .table_without_ddl("users")
        .column("users", "id", "bigint", false, None)
        .column("users", "name", "character varying", true, None)
        .column("users", "count", "bigint", true, None);
    let observed = catalog.read(&[users()]);

    let table = observed.get_table("users").unwrap();
    assert_eq!(table.columns.len(), 3);
    assert!(table.indexes.is_empty());
    assert!(table.primary_key.is_none());
    assert!(table.constraints.is_empty());
}

#[test]
fn test_unknown_primary_key_is_not_a_change() {
    let catalog = FakeCatalog::new()
        .table_without_ddl("users")
        .column("users", "id", "bigint", false, None)
        .column("users", "name", "character varying", true, None)
        .column("users", "count", "bigint", true, None);
    let declared = [users().policy(
        IntrospectionPolicy::default().with_level(Enforcement::Enforce),
    )];
    let observed = catalog.read(&declared);
    let schema_diff = diff(&declared, &observed, &DiffOptions::default()).unwrap();

    for table in &schema_diff.modified_tables {
        assert!(table.primary_key.is_none(), "unexpected key change: {table:?}");
    }
}

#[test]
fn test_ignored_policy_skips_column_and_ddl_queries() {
    let catalog = users_catalog();
    let declared = [users().policy(
        IntrospectionPolicy::default().with_level(Enforcement::Ignore),
    )];
    let observed = catalog.read(&declared);

    let queries = catalog.queries();
    assert_eq!(queries.len(), 1, "unexpected queries: {queries:?}");
    assert!(queries[0].contains("information_schema.tables"));

    let table = observed.get_table("users").unwrap();
    assert!(table.columns.is_empty());
    assert!(table.primary_key.is_none());
}

#[test]
fn test_ddl_is_only_read_for_declared_tables() {
    let catalog = users_catalog()
        .table("audit_log", "CREATE TABLE public.audit_log (\n\tid INT8 NOT NULL\n);")
        .column("audit_log", "id", "bigint", false, None);
    let observed = catalog.read(&[users()]);

    let show_create: Vec<String> = catalog
        .queries()
        .into_iter()
        .filter(|q| q.starts_with("SHOW CREATE TABLE"))
        .collect();
    assert_eq!(show_create, ["SHOW CREATE TABLE \"public\".\"users\""]);

    // Undeclared tables are listed but their columns are not read.
    let audit = observed.get_table("audit_log").unwrap();
    assert!(audit.columns.is_empty());
}

#[test]
fn test_generated_migration_file_records_preconditions() {
    let catalog = users_catalog();
    let declared = [users().column(varchar("email").not_null())];
    let (schema_diff, migration) = reconcile(&catalog, &declared, &DiffOptions::default());
    assert_eq!(generate_migration_name(&schema_diff), "add_users_email");

    let dir = tempfile::tempdir().unwrap();
    let file = MigrationFile::new(
        &generate_migration_name(&schema_diff),
        &migration,
        preconditions(&schema_diff),
    );
    let path = MigrationWriter::new(dir.path()).write(&file).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["up"].as_array().unwrap().len(), 1);
    assert!(json["up"][0].as_str().unwrap().contains("ADD COLUMN \"email\""));
    assert!(json["down"][0].as_str().unwrap().contains("DROP COLUMN \"email\""));

    let checks = json["preconditions"].as_array().unwrap();
    assert_eq!(checks[0]["kind"], "table_exists");
    assert_eq!(checks[0]["table"], "users");
    assert_eq!(checks[1]["kind"], "column_absent");
    assert_eq!(checks[1]["column"], "email");
}
