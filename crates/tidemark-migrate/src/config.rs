//! Configuration file handling.
//!
//! A `tidemark.json` file holds the declared tables and run options. It is
//! looked up in the current directory or any parent directory unless a path
//! is given explicitly.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::diff::DiffOptions;
use crate::error::{MigrateError, Result};
use crate::generate::GenerateOptions;
use crate::schema::TableDefinition;

/// File name searched for by [`Config::discover`].
pub const CONFIG_FILE: &str = "tidemark.json";

/// Run configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Connection string; the `DATABASE_URL` environment variable and the
    /// CLI flag take precedence.
    pub database_url: Option<String>,
    /// Schema to introspect.
    pub schema: String,
    /// Connection pool size.
    pub max_connections: u32,
    /// Directory migration files are written to, relative to the file.
    pub migrations_dir: PathBuf,
    /// See [`DiffOptions::allow_index_modifications`].
    pub allow_index_modifications: bool,
    /// See [`GenerateOptions::keep_old_primary_key`].
    pub keep_old_primary_key: bool,
    /// See [`GenerateOptions::drop_extra_tables`].
    pub drop_extra_tables: bool,
    /// See [`GenerateOptions::strict_reversibility`].
    pub strict_reversibility: bool,
    /// Declared tables.
    pub tables: Vec<TableDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            schema: String::from("public"),
            max_connections: 5,
            migrations_dir: PathBuf::from("migrations"),
            allow_index_modifications: false,
            keep_old_primary_key: true,
            drop_extra_tables: false,
            strict_reversibility: false,
            tables: Vec::new(),
        }
    }
}

impl Config {
    /// Loads the configuration at `path`. A relative `migrations_dir` is
    /// resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        if config.migrations_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.migrations_dir = parent.join(&config.migrations_dir);
            }
        }
        debug!(path = %path.display(), tables = config.tables.len(), "Loaded configuration");
        Ok(config)
    }

    /// Finds [`CONFIG_FILE`] in `start` or one of its parents and loads it.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MissingInput`] when no file is found, or the
    /// load error.
    pub fn discover(start: &Path) -> Result<(Self, PathBuf)> {
        let mut current = start.to_path_buf();
        loop {
            let candidate = current.join(CONFIG_FILE);
            if candidate.is_file() {
                let config = Self::load(&candidate)?;
                return Ok((config, candidate));
            }
            if !current.pop() {
                return Err(MigrateError::MissingInput(format!(
                    "{CONFIG_FILE} in {} or any parent directory",
                    start.display()
                )));
            }
        }
    }

    /// Options for the diff engine.
    #[must_use]
    pub const fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            allow_index_modifications: self.allow_index_modifications,
        }
    }

    /// Options for the action compiler.
    #[must_use]
    pub const fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            keep_old_primary_key: self.keep_old_primary_key,
            drop_extra_tables: self.drop_extra_tables,
            strict_reversibility: self.strict_reversibility,
        }
    }
}
