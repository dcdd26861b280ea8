//! The collect use case: module schema files in, one migration file out.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::changeset::{ChangeSet, ChangeSetEmitter};
use crate::dialect::DialectRegistry;
use crate::error::Result;
use crate::parser::{SchemaParser, SqlScriptParser};
use crate::schema::Schema;
use crate::writer::MigrationWriter;

/// Where schemas come from, where migrations go, and how they are rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Directory searched recursively for `*.sql` module schema files.
    pub modules_dir: PathBuf,
    /// Directory holding migration files.
    pub migrations_dir: PathBuf,
    /// Registry name of the dialect rendering DDL.
    pub dialect: String,
    /// Version label of the next change set.
    pub version: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from("modules"),
            migrations_dir: PathBuf::from("migrations"),
            dialect: "postgres".to_string(),
            version: "changes".to_string(),
        }
    }
}

/// Collects module schemas into change sets.
#[derive(Debug)]
pub struct Collector {
    config: CollectorConfig,
    emitter: ChangeSetEmitter,
    parser: Box<dyn SchemaParser>,
    writer: MigrationWriter,
}

impl Collector {
    /// Creates a collector using the dialect named in `config`.
    pub fn new(config: CollectorConfig, registry: &DialectRegistry) -> Result<Self> {
        let emitter = ChangeSetEmitter::new(registry, &config.dialect)?;
        let writer = MigrationWriter::new(&config.migrations_dir);
        Ok(Self {
            config,
            emitter,
            parser: Box::new(SqlScriptParser::new()?),
            writer,
        })
    }

    /// Replaces the schema parser.
    #[must_use]
    pub fn with_parser(mut self, parser: impl SchemaParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Migration file access.
    #[must_use]
    pub fn writer(&self) -> &MigrationWriter {
        &self.writer
    }

    /// Schema produced by replaying the Up sections of every migration.
    pub fn load_previous(&self) -> Result<Schema> {
        let mut schema = Schema::new();
        for file in self.writer.read_all()? {
            self.parser
                .parse_script(&file.up, &file.name(), &mut schema)?;
        }
        debug!(
            "Previous schema has {} tables",
            schema.tables().len()
        );
        Ok(schema)
    }

    /// Schema declared by the module files, read in path order.
    pub fn load_current(&self) -> Result<Schema> {
        let mut files = Vec::new();
        find_sql_files(&self.config.modules_dir, &mut files)?;
        files.sort();

        let mut schema = Schema::new();
        for path in &files {
            let text = fs::read_to_string(path)?;
            let source = path
                .strip_prefix(&self.config.modules_dir)
                .unwrap_or(path)
                .display()
                .to_string();
            self.parser.parse_script(&text, &source, &mut schema)?;
        }
        debug!(
            "Current schema has {} tables from {} files",
            schema.tables().len(),
            files.len()
        );
        Ok(schema)
    }

    /// Diffs migrations against modules. Returns `None` when there is nothing
    /// new to write.
    pub fn collect(&self) -> Result<Option<ChangeSet>> {
        let previous = self.load_previous()?;
        let current = self.load_current()?;
        let changeset = self
            .emitter
            .emit(&previous, &current, &self.config.version)?;

        if changeset.is_noop() {
            info!("No schema changes detected");
            return Ok(None);
        }
        if let Some(last) = self.writer.last_hash()? {
            if changeset.matches_hash(&last) {
                info!("Changes match the last migration, nothing to write");
                return Ok(None);
            }
        }
        Ok(Some(changeset))
    }

    /// Writes a change set as a new migration file.
    pub fn store(&self, changeset: &ChangeSet) -> Result<PathBuf> {
        self.writer.write(changeset)
    }
}

fn find_sql_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            find_sql_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    Ok(())
}
