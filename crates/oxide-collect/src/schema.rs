//! Dialect-neutral schema model.
//!
//! These types describe tables, columns, indexes and foreign keys as they are
//! collected from module schema sources. They carry canonical type tokens
//! (`int`, `varchar(255)`, `timestamp`, ...) that a dialect later maps to its
//! native type names.

use serde::{Deserialize, Serialize};

use crate::error::{CollectError, Result};

fn require_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CollectError::MalformedInput(format!("{kind} name is empty")));
    }
    Ok(())
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parses an action keyword sequence such as `set null` (any case).
    #[must_use]
    pub fn from_sql(text: &str) -> Option<Self> {
        let words: Vec<String> = text
            .split_whitespace()
            .map(str::to_ascii_uppercase)
            .collect();
        match words.join(" ").as_str() {
            "NO ACTION" => Some(Self::NoAction),
            "RESTRICT" => Some(Self::Restrict),
            "CASCADE" => Some(Self::Cascade),
            "SET NULL" => Some(Self::SetNull),
            "SET DEFAULT" => Some(Self::SetDefault),
            _ => None,
        }
    }
}

/// A single-column foreign key: the column points at `table.column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    /// Referenced table name.
    pub table: String,
    /// Referenced column name.
    pub column: String,
    /// Action on delete.
    pub on_delete: Option<ForeignKeyAction>,
    /// Action on update.
    pub on_update: Option<ForeignKeyAction>,
}

impl ForeignKeyConstraint {
    /// Creates a reference to `table.column`.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Result<Self> {
        let table = table.into();
        let column = column.into();
        require_name("Referenced table", &table)?;
        require_name("Referenced column", &column)?;
        Ok(Self {
            table,
            column,
            on_delete: None,
            on_update: None,
        })
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = Some(action);
        self
    }
}

/// Schema definition for a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ColumnFields")]
pub struct Column {
    name: String,
    data_type: String,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default expression, rendered verbatim.
    pub default: Option<String>,
    /// Whether this column is the primary key.
    pub primary_key: bool,
    /// Whether this column has a UNIQUE constraint.
    pub unique: bool,
    /// Foreign key, if the column references another table.
    pub references: Option<ForeignKeyConstraint>,
}

impl Column {
    /// Creates a nullable column with a canonical type such as `int` or
    /// `varchar(255)`.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let data_type = data_type.into().trim().to_string();
        require_name("Column", &name)?;
        if data_type.is_empty() {
            return Err(CollectError::MalformedInput(format!(
                "column '{name}' has no type"
            )));
        }
        Ok(Self {
            name,
            data_type,
            nullable: true,
            default: None,
            primary_key: false,
            unique: false,
            references: None,
        })
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical type text, including any modifier (`varchar(255)`).
    #[must_use]
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Lowercased canonical type token without its modifier (`varchar`).
    #[must_use]
    pub fn base_type(&self) -> String {
        let end = self.data_type.find('(').unwrap_or(self.data_type.len());
        self.data_type[..end].trim().to_ascii_lowercase()
    }

    /// The parenthesised type modifier, if any (`(255)`).
    #[must_use]
    pub fn type_modifier(&self) -> Option<&str> {
        self.data_type.find('(').map(|start| self.data_type[start..].trim())
    }

    /// Replaces the canonical type.
    pub fn set_data_type(&mut self, data_type: impl Into<String>) -> Result<()> {
        let data_type = data_type.into().trim().to_string();
        if data_type.is_empty() {
            return Err(CollectError::MalformedInput(format!(
                "column '{}' has no type",
                self.name
            )));
        }
        self.data_type = data_type;
        Ok(())
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the default expression.
    #[must_use]
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Makes the column reference another table.
    #[must_use]
    pub fn references(mut self, fk: ForeignKeyConstraint) -> Self {
        self.references = Some(fk);
        self
    }
}

/// Schema definition for an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IndexFields")]
pub struct Index {
    name: String,
    table: String,
    columns: Vec<String>,
    /// Whether this is a unique index.
    pub unique: bool,
}

impl Index {
    /// Creates an index over `columns` of `table`.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        let table = table.into();
        require_name("Index", &name)?;
        require_name("Indexed table", &table)?;
        if columns.is_empty() || columns.iter().any(|c| c.trim().is_empty()) {
            return Err(CollectError::MalformedInput(format!(
                "index '{name}' has no columns"
            )));
        }
        Ok(Self {
            name,
            table,
            columns,
            unique: false,
        })
    }

    /// Marks the index as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indexed table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Indexed columns, in key order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Schema definition for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TableFields")]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    indexes: Vec<Index>,
}

impl Table {
    /// Creates an empty table. `name` may be schema-qualified (`public.users`).
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        require_name("Table", &name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            indexes: Vec::new(),
        })
    }

    /// Fully-qualified table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Indexes declared with the table.
    #[must_use]
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Adds a column, rejecting duplicates.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if self.get_column(column.name()).is_some() {
            return Err(CollectError::DuplicateColumn {
                table: self.name.clone(),
                column: column.name().to_string(),
            });
        }
        self.columns.push(column);
        Ok(())
    }

    /// Builder form of [`Table::add_column`].
    pub fn column(mut self, column: Column) -> Result<Self> {
        self.add_column(column)?;
        Ok(self)
    }

    /// Adds an index that belongs to this table.
    pub fn add_index(&mut self, index: Index) -> Result<()> {
        if index.table() != self.name {
            return Err(CollectError::MalformedInput(format!(
                "index '{}' targets '{}' but was added to '{}'",
                index.name(),
                index.table(),
                self.name
            )));
        }
        if self.indexes.iter().any(|i| i.name() == index.name()) {
            return Err(CollectError::DuplicateIndex(index.name().to_string()));
        }
        self.indexes.push(index);
        Ok(())
    }

    /// Builder form of [`Table::add_index`].
    pub fn index(mut self, index: Index) -> Result<Self> {
        self.add_index(index)?;
        Ok(self)
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Gets a mutable column by name.
    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name() == name)
    }

    /// Removes a column, returning it if it existed.
    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name() == name)?;
        Some(self.columns.remove(idx))
    }

    /// Removes an index, returning it if it existed.
    pub fn remove_index(&mut self, name: &str) -> Option<Index> {
        let idx = self.indexes.iter().position(|i| i.name() == name)?;
        Some(self.indexes.remove(idx))
    }

    /// Columns carrying a foreign key, paired with the constraint.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&Column, &ForeignKeyConstraint)> {
        self.columns
            .iter()
            .filter_map(|c| c.references.as_ref().map(|fk| (c, fk)))
    }

    /// Whether any column carries a foreign key.
    #[must_use]
    pub fn has_foreign_keys(&self) -> bool {
        self.foreign_keys().next().is_some()
    }
}

/// A named collection of tables plus indexes declared outside any table.
///
/// Tables keep insertion order so output is reproducible, but callers must
/// not rely on it: emission order is computed by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaFields")]
pub struct Schema {
    name: String,
    tables: Vec<Table>,
    indexes: Vec<Index>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    /// Creates an empty `public` schema.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "public".to_string(),
            tables: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Creates an empty schema with the given name.
    pub fn named(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        require_name("Schema", &name)?;
        Ok(Self {
            name,
            ..Self::new()
        })
    }

    /// Schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All tables.
    #[must_use]
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Indexes not attached to a table definition.
    #[must_use]
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Returns `true` if the schema has no tables and no indexes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.indexes.is_empty()
    }

    /// Adds a table, rejecting duplicate names.
    pub fn add_table(&mut self, table: Table) -> Result<()> {
        if self.get_table(table.name()).is_some() {
            return Err(CollectError::DuplicateTable(table.name().to_string()));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Builder form of [`Schema::add_table`].
    pub fn table(mut self, table: Table) -> Result<Self> {
        self.add_table(table)?;
        Ok(self)
    }

    /// Adds a standalone index, rejecting names already used anywhere in
    /// the schema.
    pub fn add_index(&mut self, index: Index) -> Result<()> {
        if self.get_index(index.name()).is_some() {
            return Err(CollectError::DuplicateIndex(index.name().to_string()));
        }
        self.indexes.push(index);
        Ok(())
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Gets a mutable table by name.
    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name() == name)
    }

    /// Removes a table together with standalone indexes on it.
    pub fn remove_table(&mut self, name: &str) -> Option<Table> {
        let idx = self.tables.iter().position(|t| t.name() == name)?;
        self.indexes.retain(|i| i.table() != name);
        Some(self.tables.remove(idx))
    }

    /// Removes an index wherever it is declared.
    pub fn remove_index(&mut self, name: &str) -> Option<Index> {
        if let Some(idx) = self.indexes.iter().position(|i| i.name() == name) {
            return Some(self.indexes.remove(idx));
        }
        self.tables.iter_mut().find_map(|t| t.remove_index(name))
    }

    /// Every index in the schema: table-attached first, then standalone.
    pub fn all_indexes(&self) -> impl Iterator<Item = &Index> {
        self.tables
            .iter()
            .flat_map(|t| t.indexes.iter())
            .chain(self.indexes.iter())
    }

    /// Gets an index by name, wherever it is declared.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.all_indexes().find(|i| i.name() == name)
    }

    /// Returns table names.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(Table::name)
    }
}

// Deserialization goes through the constructors so decoded values keep the
// same invariants as built ones.

#[derive(Deserialize)]
struct ColumnFields {
    name: String,
    data_type: String,
    nullable: bool,
    default: Option<String>,
    primary_key: bool,
    unique: bool,
    references: Option<ForeignKeyConstraint>,
}

impl TryFrom<ColumnFields> for Column {
    type Error = CollectError;

    fn try_from(fields: ColumnFields) -> Result<Self> {
        let mut column = Self::new(fields.name, fields.data_type)?;
        column.nullable = fields.nullable;
        column.default = fields.default;
        column.primary_key = fields.primary_key;
        column.unique = fields.unique;
        column.references = fields.references;
        Ok(column)
    }
}

#[derive(Deserialize)]
struct IndexFields {
    name: String,
    table: String,
    columns: Vec<String>,
    unique: bool,
}

impl TryFrom<IndexFields> for Index {
    type Error = CollectError;

    fn try_from(fields: IndexFields) -> Result<Self> {
        let mut index = Self::new(fields.name, fields.table, fields.columns)?;
        index.unique = fields.unique;
        Ok(index)
    }
}

#[derive(Deserialize)]
struct TableFields {
    name: String,
    columns: Vec<Column>,
    indexes: Vec<Index>,
}

impl TryFrom<TableFields> for Table {
    type Error = CollectError;

    fn try_from(fields: TableFields) -> Result<Self> {
        let mut table = Self::new(fields.name)?;
        for column in fields.columns {
            table.add_column(column)?;
        }
        for index in fields.indexes {
            table.add_index(index)?;
        }
        Ok(table)
    }
}

#[derive(Deserialize)]
struct SchemaFields {
    name: String,
    tables: Vec<Table>,
    indexes: Vec<Index>,
}

impl TryFrom<SchemaFields> for Schema {
    type Error = CollectError;

    fn try_from(fields: SchemaFields) -> Result<Self> {
        let mut schema = Self::named(fields.name)?;
        for table in fields.tables {
            schema.add_table(table)?;
        }
        for index in fields.indexes {
            schema.add_index(index)?;
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_builder() {
        let col = Column::new("id", "int").unwrap().primary_key();
        assert_eq!(col.name(), "id");
        assert!(col.primary_key);
        assert!(!col.nullable);
    }

    #[test]
    fn test_base_type_and_modifier() {
        let col = Column::new("email", "VARCHAR(255)").unwrap();
        assert_eq!(col.base_type(), "varchar");
        assert_eq!(col.type_modifier(), Some("(255)"));

        let col = Column::new("id", "int").unwrap();
        assert_eq!(col.base_type(), "int");
        assert_eq!(col.type_modifier(), None);
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(matches!(
            Table::new("  "),
            Err(CollectError::MalformedInput(_))
        ));
        assert!(matches!(
            Column::new("", "int"),
            Err(CollectError::MalformedInput(_))
        ));
        assert!(matches!(
            Column::new("id", ""),
            Err(CollectError::MalformedInput(_))
        ));
        assert!(matches!(
            Index::new("idx", "users", Vec::new()),
            Err(CollectError::MalformedInput(_))
        ));
        assert!(matches!(
            ForeignKeyConstraint::new("", "id"),
            Err(CollectError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let table = Table::new("users")
            .unwrap()
            .column(Column::new("id", "int").unwrap())
            .unwrap();
        let result = table.column(Column::new("id", "bigint").unwrap());
        assert!(matches!(result, Err(CollectError::DuplicateColumn { .. })));
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut schema = Schema::new();
        schema.add_table(Table::new("users").unwrap()).unwrap();
        let result = schema.add_table(Table::new("users").unwrap());
        assert!(matches!(result, Err(CollectError::DuplicateTable(_))));
    }

    #[test]
    fn test_index_must_target_its_table() {
        let mut table = Table::new("users").unwrap();
        let index = Index::new("idx_posts_title", "posts", vec!["title".into()]).unwrap();
        assert!(matches!(
            table.add_index(index),
            Err(CollectError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_index_names_unique_across_schema() {
        let users = Table::new("users")
            .unwrap()
            .column(Column::new("email", "varchar").unwrap())
            .unwrap()
            .index(Index::new("idx_email", "users", vec!["email".into()]).unwrap())
            .unwrap();
        let mut schema = Schema::new().table(users).unwrap();

        let standalone = Index::new("idx_email", "users", vec!["email".into()]).unwrap();
        assert!(matches!(
            schema.add_index(standalone),
            Err(CollectError::DuplicateIndex(_))
        ));
        assert_eq!(schema.all_indexes().count(), 1);
    }

    #[test]
    fn test_remove_table_drops_standalone_indexes() {
        let mut schema = Schema::new()
            .table(
                Table::new("users")
                    .unwrap()
                    .column(Column::new("email", "varchar").unwrap())
                    .unwrap(),
            )
            .unwrap();
        schema
            .add_index(Index::new("idx_email", "users", vec!["email".into()]).unwrap())
            .unwrap();

        assert!(schema.remove_table("users").is_some());
        assert!(schema.is_empty());
    }

    #[test]
    fn test_foreign_keys_iterator() {
        let table = Table::new("posts")
            .unwrap()
            .column(Column::new("id", "int").unwrap().primary_key())
            .unwrap()
            .column(
                Column::new("author_id", "int")
                    .unwrap()
                    .references(ForeignKeyConstraint::new("users", "id").unwrap()),
            )
            .unwrap();

        let fks: Vec<_> = table.foreign_keys().collect();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].0.name(), "author_id");
        assert_eq!(fks[0].1.table, "users");
        assert!(table.has_foreign_keys());
    }

    #[test]
    fn test_foreign_key_action_from_sql() {
        assert_eq!(
            ForeignKeyAction::from_sql("set  null"),
            Some(ForeignKeyAction::SetNull)
        );
        assert_eq!(
            ForeignKeyAction::from_sql("CASCADE"),
            Some(ForeignKeyAction::Cascade)
        );
        assert_eq!(ForeignKeyAction::from_sql("explode"), None);
    }

    #[test]
    fn test_deserialize_round_trip() {
        let schema = Schema::new()
            .table(
                Table::new("users")
                    .unwrap()
                    .column(Column::new("id", "serial").unwrap().primary_key())
                    .unwrap()
                    .column(Column::new("email", "text").unwrap().not_null().unique())
                    .unwrap()
                    .index(Index::new("idx_users_email", "users", vec!["email".into()]).unwrap())
                    .unwrap(),
            )
            .unwrap();
        let json = serde_json::to_string(&schema).unwrap();
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_deserialize_rejects_what_constructors_reject() {
        let empty_name = r#"{"name": " ", "data_type": "int", "nullable": true,
            "default": null, "primary_key": false, "unique": false, "references": null}"#;
        let err = serde_json::from_str::<Column>(empty_name).unwrap_err();
        assert!(err.to_string().contains("Column name is empty"), "{err}");

        let no_columns = r#"{"name": "idx", "table": "t", "columns": [], "unique": false}"#;
        assert!(serde_json::from_str::<Index>(no_columns).is_err());

        let duplicate = r#"{"name": "t", "indexes": [], "columns": [
            {"name": "a", "data_type": "int", "nullable": true, "default": null,
             "primary_key": false, "unique": false, "references": null},
            {"name": "a", "data_type": "int", "nullable": true, "default": null,
             "primary_key": false, "unique": false, "references": null}]}"#;
        assert!(serde_json::from_str::<Table>(duplicate).is_err());

        let foreign_index = r#"{"name": "t", "columns": [],
            "indexes": [{"name": "idx", "table": "other", "columns": ["a"], "unique": false}]}"#;
        assert!(serde_json::from_str::<Table>(foreign_index).is_err());
    }
}
