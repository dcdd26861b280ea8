//! Migration files on disk.
//!
//! One file per change set, named `<unix-timestamp>-<version>.sql`:
//!
//! ```text
//! -- +migrate Up
//! -- hash: 5f0c...
//! CREATE TABLE "users" (...);
//!
//! -- +migrate Down
//! DROP TABLE IF EXISTS "users";
//! ```

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::changeset::{ChangeSet, DdlOperation};
use crate::error::{CollectError, Result};

/// First line of the Up section.
pub const UP_MARKER: &str = "-- +migrate Up";

/// First line of the Down section.
pub const DOWN_MARKER: &str = "-- +migrate Down";

const HASH_PREFIX: &str = "-- hash:";

/// Generates a migration file name from a timestamp and a version label.
///
/// The label is reduced to lowercase ASCII letters, digits and underscores.
#[must_use]
pub fn generate_migration_name(timestamp: i64, version: &str) -> String {
    let slug: String = version
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let slug = slug.trim_matches('_');
    let slug = if slug.is_empty() { "changes" } else { slug };
    format!("{timestamp}-{slug}.sql")
}

/// Renders a change set as migration file contents.
#[must_use]
pub fn render_migration(changeset: &ChangeSet) -> String {
    let mut out = String::new();
    out.push_str(UP_MARKER);
    out.push('\n');
    out.push_str(&format!("{} {}\n", HASH_PREFIX, changeset.hash()));
    out.push_str(&render_statements(changeset.up()));
    out.push('\n');
    out.push_str(DOWN_MARKER);
    out.push('\n');
    out.push_str(&render_statements(changeset.down()));
    out
}

fn render_statements(operations: &[DdlOperation]) -> String {
    operations
        .iter()
        .map(|op| format!("{};\n", op.sql))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A migration file split into its sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Path of the file.
    pub path: PathBuf,
    /// Recorded content hash, if the file carries one.
    pub hash: Option<String>,
    /// SQL of the Up section. Text before any marker counts as Up.
    pub up: String,
    /// SQL of the Down section.
    pub down: String,
}

impl MigrationFile {
    /// Splits file contents into sections.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Self {
        let mut hash = None;
        let mut up = String::new();
        let mut down = String::new();
        let mut in_down = false;

        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.eq_ignore_ascii_case(UP_MARKER) {
                in_down = false;
            } else if trimmed.eq_ignore_ascii_case(DOWN_MARKER) {
                in_down = true;
            } else if let Some(value) = trimmed.strip_prefix(HASH_PREFIX) {
                if !in_down {
                    hash = Some(value.trim().to_string());
                }
            } else {
                let section = if in_down { &mut down } else { &mut up };
                section.push_str(line);
                section.push('\n');
            }
        }

        Self {
            path: path.into(),
            hash,
            up,
            down,
        }
    }

    /// Reads and splits a migration file.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(Self::parse(path, &contents))
    }

    /// File name without directories.
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Reads and writes migration files in one directory.
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

    /// Migrations directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `changeset` to a new file and returns its path. Never
    /// overwrites an existing file.
    pub fn write(&self, changeset: &ChangeSet) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(generate_migration_name(
            changeset.created_at().timestamp(),
            changeset.version(),
        ));

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(CollectError::InvalidState(format!(
                    "Migration file '{}' already exists",
                    path.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };
        file.write_all(render_migration(changeset).as_bytes())?;

        info!("Created migration: {}", path.display());
        Ok(path)
    }

    /// Migration files (`*.sql`), sorted by name. A missing directory has none.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No migrations directory at {}", self.dir.display());
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Every migration file, oldest first.
    pub fn read_all(&self) -> Result<Vec<MigrationFile>> {
        self.list()?
            .iter()
            .map(|path| MigrationFile::read(path))
            .collect()
    }

    /// Hash recorded in the newest migration file.
    pub fn last_hash(&self) -> Result<Option<String>> {
        match self.list()?.last() {
            Some(path) => Ok(MigrationFile::read(path)?.hash),
            None => Ok(None),
        }
    }
}
