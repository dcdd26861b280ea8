//! Database dialect implementations.
//!
//! Each dialect knows how to render schema objects as DDL for one database
//! engine and how canonical type tokens translate into its native types.
//! Dialects are looked up by name through an explicit [`DialectRegistry`].

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CollectError, Result};
use crate::schema::{Column, Index, Schema, Table};

/// A change to an existing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlterOperation {
    /// Add a column.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: Column,
    },
    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Change a column's type to the one carried by `column`.
    AlterColumnType {
        /// Table name.
        table: String,
        /// Column with its new type.
        column: Column,
    },
    /// Make a column nullable or NOT NULL.
    SetNullability {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Whether the column allows NULL afterwards.
        nullable: bool,
    },
    /// Set or drop a column's default expression.
    SetDefault {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// New default expression, `None` to drop it.
        default: Option<String>,
    },
}

impl AlterOperation {
    /// Table the operation applies to.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::AlterColumnType { table, .. }
            | Self::SetNullability { table, .. }
            | Self::SetDefault { table, .. } => table,
        }
    }
}

/// Every object kind a dialect can be asked to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DdlObject {
    /// A table definition.
    Table(Table),
    /// An index definition.
    Index(Index),
    /// A table alteration.
    Alter(AlterOperation),
}

impl DdlObject {
    /// Short human-readable description (`table users`, `add column users.email`).
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Table(t) => format!("table {}", t.name()),
            Self::Index(i) => format!("index {}", i.name()),
            Self::Alter(AlterOperation::AddColumn { table, column }) => {
                format!("add column {}.{}", table, column.name())
            }
            Self::Alter(AlterOperation::DropColumn { table, column }) => {
                format!("drop column {table}.{column}")
            }
            Self::Alter(AlterOperation::AlterColumnType { table, column }) => {
                format!("alter column type {}.{}", table, column.name())
            }
            Self::Alter(AlterOperation::SetNullability { table, column, .. }) => {
                format!("alter column nullability {table}.{column}")
            }
            Self::Alter(AlterOperation::SetDefault { table, column, .. }) => {
                format!("alter column default {table}.{column}")
            }
        }
    }
}

/// Trait for database-specific DDL generation.
pub trait Dialect: fmt::Debug + Send + Sync {
    /// Returns the dialect name (the registry key).
    fn name(&self) -> &'static str;

    /// Canonical type token to native type name pairs.
    fn type_pairs(&self) -> &'static [(&'static str, &'static str)];

    /// Whether `(n)` / `(p, s)` modifiers are kept after type mapping.
    fn keeps_type_modifiers(&self) -> bool {
        true
    }

    /// Structural checks specific to this dialect.
    fn validate_schema(&self, schema: &Schema) -> Result<()>;

    /// Generates SQL changing a column's type.
    fn alter_column_type(&self, table: &str, column: &Column) -> Result<String>;

    /// Generates SQL changing a column's nullability.
    fn set_nullability(&self, table: &str, column: &str, nullable: bool) -> Result<String>;

    /// Generates SQL setting (`Some`) or dropping (`None`) a column default.
    fn set_default(&self, table: &str, column: &str, default: Option<&str>) -> Result<String>;

    /// Canonical type to native type mapping.
    fn data_type_mapping(&self) -> BTreeMap<&'static str, &'static str> {
        self.type_pairs().iter().copied().collect()
    }

    /// Maps a single canonical type token (case-insensitive).
    fn map_type(&self, canonical: &str) -> Option<&'static str> {
        let canonical = canonical.trim().to_ascii_lowercase();
        self.type_pairs()
            .iter()
            .find(|(from, _)| *from == canonical)
            .map(|(_, to)| *to)
    }

    /// Renders the native type of `column`, failing if the type is unmapped.
    fn render_type(&self, table: &str, column: &Column) -> Result<String> {
        let native = self
            .map_type(&column.base_type())
            .ok_or_else(|| CollectError::UnmappedType {
                dialect: self.name().to_string(),
                table: table.to_string(),
                column: column.name().to_string(),
                data_type: column.data_type().to_string(),
            })?;
        match column.type_modifier() {
            Some(modifier) if self.keeps_type_modifiers() => Ok(format!("{native}{modifier}")),
            _ => Ok(native.to_string()),
        }
    }

    /// Quote an identifier; schema-qualified names are quoted per part.
    fn quote_identifier(&self, name: &str) -> String {
        name.split('.')
            .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Generates column definition SQL. `inline_primary_key` is false when the
    /// table declares a composite key as a table constraint.
    fn column_definition(
        &self,
        table: &str,
        column: &Column,
        inline_primary_key: bool,
    ) -> Result<String> {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(column.name()),
            self.render_type(table, column)?
        );

        if column.primary_key && inline_primary_key {
            sql.push_str(" PRIMARY KEY");
        } else {
            if !column.nullable {
                sql.push_str(" NOT NULL");
            }
            if column.unique {
                sql.push_str(" UNIQUE");
            }
        }

        if let Some(ref default) = column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }

        if let Some(ref fk) = column.references {
            sql.push_str(" REFERENCES ");
            sql.push_str(&self.quote_identifier(&fk.table));
            sql.push_str(" (");
            sql.push_str(&self.quote_identifier(&fk.column));
            sql.push(')');
            if let Some(action) = fk.on_delete {
                sql.push_str(" ON DELETE ");
                sql.push_str(action.to_sql());
            }
            if let Some(action) = fk.on_update {
                sql.push_str(" ON UPDATE ");
                sql.push_str(action.to_sql());
            }
        }

        Ok(sql)
    }

    /// Generates SQL for CREATE TABLE.
    fn create_table(&self, table: &Table) -> Result<String> {
        if table.columns().is_empty() {
            return Err(CollectError::Validation {
                dialect: self.name().to_string(),
                object: table.name().to_string(),
                message: "table has no columns".to_string(),
            });
        }

        let pk_columns: Vec<&Column> = table.columns().iter().filter(|c| c.primary_key).collect();
        let inline_pk = pk_columns.len() <= 1;

        let mut defs = Vec::with_capacity(table.columns().len() + 1);
        for column in table.columns() {
            defs.push(format!(
                "    {}",
                self.column_definition(table.name(), column, inline_pk)?
            ));
        }
        if !inline_pk {
            let quoted: Vec<String> = pk_columns
                .iter()
                .map(|c| self.quote_identifier(c.name()))
                .collect();
            defs.push(format!("    PRIMARY KEY ({})", quoted.join(", ")));
        }

        Ok(format!(
            "CREATE TABLE {} (\n{}\n)",
            self.quote_identifier(table.name()),
            defs.join(",\n")
        ))
    }

    /// Generates SQL for CREATE INDEX.
    fn create_index(&self, index: &Index) -> Result<String> {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(index.name()));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(index.table()));
        let cols: Vec<String> = index
            .columns()
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        sql.push_str(&format!(" ({})", cols.join(", ")));
        Ok(sql)
    }

    /// Generates SQL for ADD COLUMN.
    fn add_column(&self, table: &str, column: &Column) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(table, column, true)?
        ))
    }

    /// Generates SQL for DROP COLUMN.
    fn drop_column(&self, table: &str, column: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        ))
    }

    /// Renders a CREATE statement for a table or an index.
    fn generate_create(&self, object: &DdlObject) -> Result<String> {
        match object {
            DdlObject::Table(table) => self.create_table(table),
            DdlObject::Index(index) => self.create_index(index),
            DdlObject::Alter(_) => Err(self.unsupported("create", object)),
        }
    }

    /// Renders an ALTER statement for a table alteration.
    fn generate_alter(&self, object: &DdlObject) -> Result<String> {
        match object {
            DdlObject::Alter(AlterOperation::AddColumn { table, column }) => {
                self.add_column(table, column)
            }
            DdlObject::Alter(AlterOperation::DropColumn { table, column }) => {
                self.drop_column(table, column)
            }
            DdlObject::Alter(AlterOperation::AlterColumnType { table, column }) => {
                self.alter_column_type(table, column)
            }
            DdlObject::Alter(AlterOperation::SetNullability {
                table,
                column,
                nullable,
            }) => self.set_nullability(table, column, *nullable),
            DdlObject::Alter(AlterOperation::SetDefault {
                table,
                column,
                default,
            }) => self.set_default(table, column, default.as_deref()),
            DdlObject::Table(_) | DdlObject::Index(_) => Err(self.unsupported("alter", object)),
        }
    }

    /// Renders a DROP statement for a table or an index (used by Down sections).
    fn generate_drop(&self, object: &DdlObject) -> Result<String> {
        match object {
            DdlObject::Table(table) => Ok(format!(
                "DROP TABLE IF EXISTS {}",
                self.quote_identifier(table.name())
            )),
            DdlObject::Index(index) => Ok(format!(
                "DROP INDEX IF EXISTS {}",
                self.quote_identifier(index.name())
            )),
            DdlObject::Alter(_) => Err(self.unsupported("drop", object)),
        }
    }

    /// Builds an unsupported-object error for this dialect.
    fn unsupported(&self, operation: &'static str, object: &DdlObject) -> CollectError {
        CollectError::UnsupportedObject {
            dialect: self.name().to_string(),
            operation,
            object: object.describe(),
        }
    }
}

/// Structural checks shared by every dialect: mapped types, existing foreign
/// key targets, existing indexed columns and, when given, an identifier
/// length limit. Returns every violation found.
pub fn common_violations(
    dialect: &dyn Dialect,
    schema: &Schema,
    max_identifier_len: Option<usize>,
) -> Vec<CollectError> {
    let mut errors = Vec::new();
    let violation = |object: String, message: String| CollectError::Validation {
        dialect: dialect.name().to_string(),
        object,
        message,
    };

    let check_len = |object: &str, ident: &str, errors: &mut Vec<CollectError>| {
        if let Some(max) = max_identifier_len {
            for part in ident.split('.') {
                if part.len() > max {
                    errors.push(violation(
                        object.to_string(),
                        format!("identifier '{part}' is longer than {max} bytes"),
                    ));
                }
            }
        }
    };

    for table in schema.tables() {
        check_len(table.name(), table.name(), &mut errors);

        for column in table.columns() {
            let object = format!("{}.{}", table.name(), column.name());
            check_len(&object, column.name(), &mut errors);

            if let Err(err) = dialect.render_type(table.name(), column) {
                errors.push(err);
            }

            if let Some(ref fk) = column.references {
                match schema.get_table(&fk.table) {
                    None => errors.push(violation(
                        object.clone(),
                        format!("references missing table '{}'", fk.table),
                    )),
                    Some(target) if target.get_column(&fk.column).is_none() => {
                        errors.push(violation(
                            object.clone(),
                            format!("references missing column '{}.{}'", fk.table, fk.column),
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
    }

    for index in schema.all_indexes() {
        check_len(index.name(), index.name(), &mut errors);
        match schema.get_table(index.table()) {
            None => errors.push(violation(
                index.name().to_string(),
                format!("indexes missing table '{}'", index.table()),
            )),
            Some(table) => {
                for column in index.columns() {
                    if table.get_column(column).is_none() {
                        errors.push(violation(
                            index.name().to_string(),
                            format!("indexes missing column '{}.{}'", index.table(), column),
                        ));
                    }
                }
            }
        }
    }

    errors
}

/// Name to dialect map, passed explicitly to whoever renders DDL.
#[derive(Debug, Clone, Default)]
pub struct DialectRegistry {
    dialects: HashMap<String, Arc<dyn Dialect>>,
}

impl DialectRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every dialect shipped with this crate.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(PostgresDialect::NAME, PostgresDialect::new());
        registry.register(SqliteDialect::NAME, SqliteDialect::new());
        registry
    }

    /// Registers a dialect under `name`, returning the one it replaced.
    pub fn register<D: Dialect + 'static>(
        &mut self,
        name: impl Into<String>,
        dialect: D,
    ) -> Option<Arc<dyn Dialect>> {
        self.register_shared(name, Arc::new(dialect))
    }

    /// Registers an already shared dialect under `name`.
    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        dialect: Arc<dyn Dialect>,
    ) -> Option<Arc<dyn Dialect>> {
        self.dialects.insert(name.into(), dialect)
    }

    /// Looks a dialect up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Dialect>> {
        self.dialects.get(name).cloned()
    }

    /// Looks a dialect up by name, failing with [`CollectError::UnknownDialect`].
    pub fn require(&self, name: &str) -> Result<Arc<dyn Dialect>> {
        self.get(name)
            .ok_or_else(|| CollectError::UnknownDialect(name.to_string()))
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered dialects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dialects.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dialects.is_empty()
    }

    /// Removes every registration.
    pub fn clear(&mut self) {
        self.dialects.clear();
    }
}

/// Canonical type tokens used anywhere in `schema` that `dialect` cannot map.
#[must_use]
pub fn unmapped_types(dialect: &dyn Dialect, schema: &Schema) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut missing = Vec::new();
    for column in schema.tables().iter().flat_map(|t| t.columns()) {
        let base = column.base_type();
        if dialect.map_type(&base).is_none() && seen.insert(base.clone()) {
            missing.push(base);
        }
    }
    missing
}
