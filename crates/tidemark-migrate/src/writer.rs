//! Migration file writer.
//!
//! A generated migration is persisted as `<timestamp>_<name>.json` holding
//! the inline up and down SQL plus the preconditions it was generated
//! against.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::diff::SchemaDiff;
use crate::error::{MigrateError, Result};
use crate::generate::Migration;
use crate::preconditions::Precondition;

/// Contents of one migration file.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationFile {
    /// Migration name, without the timestamp prefix.
    pub name: String,
    /// Generation time.
    pub created_at: DateTime<Utc>,
    /// Up statements with values inlined.
    pub up: Vec<String>,
    /// Down statements with values inlined.
    pub down: Vec<String>,
    /// Expected database state before `up` runs.
    pub preconditions: Vec<Precondition>,
}

impl MigrationFile {
    /// Builds the file contents for `migration`, stamped with the current
    /// time.
    #[must_use]
    pub fn new(name: &str, migration: &Migration, preconditions: Vec<Precondition>) -> Self {
        Self {
            name: sanitize_name(name),
            created_at: Utc::now(),
            up: migration.up_sql(),
            down: migration.down_sql(),
            preconditions,
        }
    }

    /// Returns `<timestamp>_<name>.json`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.created_at.format("%Y%m%d%H%M%S"), self.name)
    }

    /// Returns the pretty-printed JSON document.
    ///
    /// # Errors
    ///
    /// Returns a serialization error.
    pub fn render(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// Writes migration files into a directory.
#[derive(Debug, Clone)]
pub struct MigrationWriter {
    dir: PathBuf,
}

impl MigrationWriter {
    /// Creates a writer for `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `file` and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationExists`] when a file with the same
    /// name is present, or an IO error.
    pub fn write(&self, file: &MigrationFile) -> Result<PathBuf> {
        let path = self.dir.join(file.file_name());
        if path.exists() {
            return Err(MigrateError::MigrationExists(path));
        }
        let contents = file.render()?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, contents)?;
        info!(path = %path.display(), up = file.up.len(), "Created migration");
        Ok(path)
    }
}

/// Lowercases `name` and replaces anything but ASCII alphanumerics with
/// underscores.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        String::from("auto")
    } else {
        trimmed.to_string()
    }
}

/// Derives a migration name from what the diff touches.
#[must_use]
pub fn generate_migration_name(diff: &SchemaDiff) -> String {
    let mut parts = Vec::new();
    parts.extend(diff.missing_tables.iter().map(|t| format!("create_{t}")));
    for table in &diff.modified_tables {
        match table.missing_columns.as_slice() {
            [column] if !table.has_index_changes() && table.modified_columns.is_empty() => {
                parts.push(format!("add_{}_{}", table.table, column.name));
            }
            _ => parts.push(format!("alter_{}", table.table)),
        }
    }
    parts.extend(diff.extra_tables.iter().map(|t| format!("drop_{}", t.name)));

    match parts.len() {
        0 => String::from("auto"),
        1..=3 => sanitize_name(&parts.join("_")),
        _ => String::from("reconcile_schema"),
    }
}
