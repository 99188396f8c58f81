//! tidemark CLI
//!
//! Command-line tool for checking and reconciling database schemas.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tidemark_migrate::prelude::*;

/// Reconcile CockroachDB schemas with their declarations.
#[derive(Parser)]
#[command(name = "tidemark")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (searched upwards from the current directory if
    /// not given).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database URL; overrides the configuration file.
    #[arg(short, long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Schema to introspect; overrides the configuration file.
    #[arg(short, long)]
    schema: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how the database differs from the declared schema.
    Diff {
        /// Print the diff as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Exit with an error when enforced differences exist.
    Check,

    /// Generate a migration that reconciles the database.
    Generate {
        /// Migration name (derived from the changes if not specified).
        #[arg(short, long)]
        name: Option<String>,

        /// Print the migration without writing a file.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::discover(&std::env::current_dir()?)?.0,
    };
    if let Some(schema) = cli.schema {
        config.schema = schema;
    }
    let database_url = cli
        .database_url
        .or_else(|| config.database_url.clone())
        .context(
            "no database URL: pass --database-url, set DATABASE_URL or add database_url to the \
             configuration",
        )?;

    let executor = PgExecutor::connect(&database_url, config.max_connections).await?;
    let observed = Introspector::new(&config.schema)
        .read(&executor, &config.tables)
        .await?;
    let diff = diff(&config.tables, &observed, &config.diff_options())?;

    match cli.command {
        Commands::Diff { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            } else {
                print!("{diff}");
            }
            let report = policy_report(&diff, &config.tables);
            info!(
                enforced = report.enforced.len(),
                warned = report.warned.len(),
                "Compared declared and observed schemas"
            );
        }

        Commands::Check => {
            let report = policy_report(&diff, &config.tables).into_result()?;
            info!(
                warnings = report.warned.len(),
                "Schema matches its declaration"
            );
        }

        Commands::Generate { name, dry_run } => {
            let migration = generate(&diff, &config.tables, &config.generate_options())?;
            if migration.is_empty() {
                info!("No changes detected.");
                return Ok(());
            }

            let name = name.unwrap_or_else(|| generate_migration_name(&diff));
            let file = MigrationFile::new(&name, &migration, preconditions(&diff));

            if dry_run {
                println!("Would create migration: {}\n", file.file_name());
                println!("-- up");
                for statement in &file.up {
                    println!("{statement};");
                }
                println!("\n-- down");
                for statement in &file.down {
                    println!("{statement};");
                }
            } else {
                MigrationWriter::new(&config.migrations_dir).write(&file)?;
            }
        }
    }

    Ok(())
}
