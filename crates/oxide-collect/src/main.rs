//! oxide-collect CLI
//!
//! Command-line tool collecting module schema changes into migration files.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use oxide_collect::prelude::*;
use oxide_collect::writer::render_migration;

/// Collect module schemas into dependency-ordered migrations.
#[derive(Parser)]
#[command(name = "oxide-collect")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory searched for module schema files (`*.sql`).
    #[arg(long, env = "MODULES_DIR", default_value = "modules")]
    modules_dir: PathBuf,

    /// Migrations directory.
    #[arg(short, long, env = "MIGRATIONS_DIR", default_value = "migrations")]
    migrations_dir: PathBuf,

    /// SQL dialect rendering the statements.
    #[arg(short, long, env = "SQL_DIALECT", default_value = "postgres")]
    dialect: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a migration for schema changes found in the modules.
    Collect {
        /// Migration name/description.
        #[arg(short, long, default_value = "changes")]
        name: String,

        /// Show SQL without writing files (dry run).
        #[arg(long)]
        dry_run: bool,

        /// Print the change set as JSON instead of SQL (implies dry run).
        #[arg(long)]
        json: bool,
    },

    /// List the available dialects.
    Dialects,
}

fn main() -> anyhow::Result<()> {
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

    let registry = DialectRegistry::with_builtin();

    match cli.command {
        Commands::Dialects => {
            for name in registry.names() {
                println!("{name}");
            }
        }

        Commands::Collect {
            name,
            dry_run,
            json,
        } => {
            let config = CollectorConfig {
                modules_dir: cli.modules_dir,
                migrations_dir: cli.migrations_dir,
                dialect: cli.dialect,
                version: name,
            };
            let collector = Collector::new(config, &registry)?;

            let Some(changeset) = collector.collect()? else {
                return Ok(());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&changeset)?);
            } else if dry_run {
                info!("Dry run mode - migration will be printed but not written.");
                println!("{}", render_migration(&changeset));
            } else {
                let path = collector.store(&changeset)?;
                info!(
                    "{} statements written to {}",
                    changeset.up().len(),
                    path.display()
                );
            }
        }
    }

    Ok(())
}
