//! DDL serializer.
//!
//! Turns actions into [`Sql`] fragments. Identifiers are validated and
//! double-quoted, type spellings are validated, and default and predicate
//! fragments are embedded as-is so their bound values stay parameters.

use tidemark_sql::{Sql, Statement};

use crate::action::{
    AlterTableAction, ColumnChange, ColumnSpec, ConstraintSpec, IndexSpec, PrimaryKeyStrategy,
    TableAction, TableSpec,
};
use crate::error::Result;
use crate::schema::TableConstraint;

fn ident_list(names: &[String]) -> Result<Sql> {
    let idents = names
        .iter()
        .map(|n| Sql::ident(n))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Sql::join(idents, ", ").paren())
}

/// Renders a possibly schema-qualified `schema.table` reference.
fn table_ref(name: &str) -> Result<Sql> {
    match name.split_once('.') {
        Some((schema, table)) => Ok(Sql::qualified(schema, table)?),
        None => Ok(Sql::ident(name)?),
    }
}

/// Renders a column type. CockroachDB stores a bare `INTEGER` as INT8, so the
/// 32-bit width is spelled `INT4` and reads back as `integer`.
fn type_name(sql_type: &str) -> Result<Sql> {
    let upper = sql_type.to_ascii_uppercase();
    let spelled = match upper.as_str() {
        "INTEGER" => "INT4",
        "INTEGER[]" => "INT4[]",
        other => other,
    };
    Ok(Sql::type_name(spelled)?)
}

fn index_method(method: &str) -> Result<Sql> {
    Ok(Sql::type_name(&method.to_ascii_uppercase())?)
}

/// Renders `"name" TYPE [NOT NULL] [DEFAULT expr]`.
///
/// # Errors
///
/// Returns an error for an invalid column name or type spelling.
pub fn render_column_definition(column: &ColumnSpec) -> Result<Sql> {
    let mut sql = Sql::ident(&column.name)?;
    sql.push_raw(" ").push_sql(type_name(&column.sql_type)?);
    if !column.nullable {
        sql.push_raw(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_raw(" DEFAULT ").push_sql(default.clone());
    }
    Ok(sql)
}

/// Renders the body of a declared constraint, without its name.
///
/// # Errors
///
/// Returns an error for invalid column or table identifiers.
pub fn render_table_constraint(constraint: &TableConstraint) -> Result<Sql> {
    match constraint {
        TableConstraint::Check { expression, .. } => {
            Ok(Sql::raw("CHECK ").append(expression.clone().paren()))
        }
        TableConstraint::ForeignKey {
            columns,
            references_table,
            references_columns,
            on_delete,
            on_update,
            ..
        } => {
            let mut sql = Sql::raw("FOREIGN KEY ");
            sql.push_sql(ident_list(columns)?)
                .push_raw(" REFERENCES ")
                .push_sql(table_ref(references_table)?)
                .push_raw(" ")
                .push_sql(ident_list(references_columns)?);
            if let Some(action) = on_delete {
                sql.push_raw(format!(" ON DELETE {}", action.to_sql()));
            }
            if let Some(action) = on_update {
                sql.push_raw(format!(" ON UPDATE {}", action.to_sql()));
            }
            Ok(sql)
        }
    }
}

fn named_constraint(constraint: &ConstraintSpec) -> Result<Sql> {
    let mut sql = Sql::raw("CONSTRAINT ");
    sql.push_sql(Sql::ident(&constraint.name)?)
        .push_raw(" ")
        .push_sql(constraint.definition.clone());
    Ok(sql)
}

fn primary_key_name(table: &str) -> String {
    format!("{table}_pkey")
}

/// Renders `CREATE TABLE`.
///
/// # Errors
///
/// Returns an error for invalid identifiers or type spellings.
pub fn render_create_table(schema: &str, table: &str, spec: &TableSpec) -> Result<Sql> {
    let mut elements = spec
        .columns
        .iter()
        .map(render_column_definition)
        .collect::<Result<Vec<_>>>()?;
    if !spec.primary_key.is_empty() {
        let mut pk = Sql::raw("CONSTRAINT ");
        pk.push_sql(Sql::ident(&primary_key_name(table))?)
            .push_raw(" PRIMARY KEY ")
            .push_sql(ident_list(&spec.primary_key)?);
        elements.push(pk);
    }
    for constraint in &spec.constraints {
        elements.push(named_constraint(constraint)?);
    }

    let mut sql = Sql::raw("CREATE TABLE ");
    sql.push_sql(Sql::qualified(schema, table)?)
        .push_raw(" ")
        .push_sql(Sql::join(elements, ", ").paren());
    Ok(sql)
}

/// Renders `CREATE [UNIQUE] INDEX`.
///
/// # Errors
///
/// Returns an error for invalid identifiers.
pub fn render_create_index(schema: &str, table: &str, index: &IndexSpec) -> Result<Sql> {
    let mut sql = Sql::raw(if index.unique {
        "CREATE UNIQUE INDEX "
    } else {
        "CREATE INDEX "
    });
    sql.push_sql(Sql::ident(&index.name)?)
        .push_raw(" ON ")
        .push_sql(Sql::qualified(schema, table)?);
    if let Some(method) = &index.using {
        sql.push_raw(" USING ").push_sql(index_method(method)?);
    }
    sql.push_raw(" ")
        .push_sql(Sql::join(index.expressions.iter().cloned(), ", ").paren());
    if !index.storing.is_empty() {
        sql.push_raw(" STORING ").push_sql(ident_list(&index.storing)?);
    }
    if let Some(predicate) = &index.predicate {
        sql.push_raw(" WHERE ").push_sql(predicate.clone());
    }
    Ok(sql)
}

/// Renders `DROP INDEX "schema"."table"@"index"`, cascading for unique
/// indexes.
///
/// # Errors
///
/// Returns an error for invalid identifiers.
pub fn render_drop_index(schema: &str, table: &str, name: &str, unique: bool) -> Result<Sql> {
    let mut sql = Sql::raw("DROP INDEX ");
    sql.push_sql(Sql::qualified(schema, table)?)
        .push_raw("@")
        .push_sql(Sql::ident(name)?);
    if unique {
        sql.push_raw(" CASCADE");
    }
    Ok(sql)
}

fn alter_table(schema: &str, table: &str) -> Result<Sql> {
    let mut sql = Sql::raw("ALTER TABLE ");
    sql.push_sql(Sql::qualified(schema, table)?).push_raw(" ");
    Ok(sql)
}

fn render_column_change(column: &str, change: &ColumnChange) -> Result<Sql> {
    let mut sql = Sql::raw("ALTER COLUMN ");
    sql.push_sql(Sql::ident(column)?).push_raw(" ");
    match change {
        ColumnChange::SetDataType { sql_type, .. } => {
            sql.push_raw("SET DATA TYPE ").push_sql(type_name(sql_type)?);
        }
        ColumnChange::SetNotNull => {
            sql.push_raw("SET NOT NULL");
        }
        ColumnChange::DropNotNull => {
            sql.push_raw("DROP NOT NULL");
        }
        ColumnChange::SetDefault { default, .. } => {
            sql.push_raw("SET DEFAULT ").push_sql(default.clone());
        }
        ColumnChange::DropDefault { .. } => {
            sql.push_raw("DROP DEFAULT");
        }
    }
    Ok(sql)
}

/// Renders one action as a single statement.
///
/// # Errors
///
/// Returns an error for invalid identifiers or type spellings.
pub fn render_alter_table_action(action: &TableAction) -> Result<Sql> {
    let (schema, table) = (action.schema.as_str(), action.table.as_str());
    match &action.action {
        AlterTableAction::CreateTable(spec) => render_create_table(schema, table, spec),
        AlterTableAction::DropTable { .. } => Ok(Sql::raw("DROP TABLE ")
            .append(Sql::qualified(schema, table)?)
            .append(Sql::raw(" CASCADE"))),
        AlterTableAction::AddColumn(column) => Ok(alter_table(schema, table)?
            .append(Sql::raw("ADD COLUMN "))
            .append(render_column_definition(column)?)),
        AlterTableAction::DropColumn { name, .. } => Ok(alter_table(schema, table)?
            .append(Sql::raw("DROP COLUMN "))
            .append(Sql::ident(name)?)),
        AlterTableAction::AlterColumn { name, change } => {
            Ok(alter_table(schema, table)?.append(render_column_change(name, change)?))
        }
        AlterTableAction::AddConstraint(constraint) => Ok(alter_table(schema, table)?
            .append(Sql::raw("ADD "))
            .append(named_constraint(constraint)?)),
        AlterTableAction::DropConstraint { name, .. } => Ok(alter_table(schema, table)?
            .append(Sql::raw("DROP CONSTRAINT "))
            .append(Sql::ident(name)?)),
        AlterTableAction::CreateIndex(index) => render_create_index(schema, table, index),
        AlterTableAction::DropIndex { name, unique, .. } => {
            render_drop_index(schema, table, name, *unique)
        }
        AlterTableAction::AlterPrimaryKey {
            columns,
            strategy,
            name,
            ..
        } => {
            let mut sql = alter_table(schema, table)?;
            match strategy {
                PrimaryKeyStrategy::KeepOldAsIndex => {
                    sql.push_raw("ALTER PRIMARY KEY USING COLUMNS ")
                        .push_sql(ident_list(columns)?);
                }
                PrimaryKeyStrategy::DropAndAdd => {
                    let name = name.clone().unwrap_or_else(|| primary_key_name(table));
                    let pk = Sql::ident(&name)?;
                    sql.push_raw("DROP CONSTRAINT ")
                        .push_sql(pk.clone())
                        .push_raw(", ADD CONSTRAINT ")
                        .push_sql(pk)
                        .push_raw(" PRIMARY KEY ")
                        .push_sql(ident_list(columns)?);
                }
            }
            Ok(sql)
        }
    }
}

/// Renders and finalizes one action.
///
/// # Errors
///
/// Same as [`render_alter_table_action`].
pub fn render_statement(action: &TableAction) -> Result<Statement> {
    Ok(render_alter_table_action(action)?.to_statement())
}
