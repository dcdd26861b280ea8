//! Error types for schema collection and DDL emission.

/// Errors that can occur while collecting schema changes.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// A dialect was asked to render an object kind it does not handle.
    #[error("Dialect '{dialect}' cannot {operation} {object}")]
    UnsupportedObject {
        /// Dialect name.
        dialect: String,
        /// Operation attempted (create, alter, drop).
        operation: &'static str,
        /// Description of the offending object.
        object: String,
    },

    /// The schema violates a structural rule of the dialect.
    #[error("Dialect '{dialect}' rejected {object}: {message}")]
    Validation {
        /// Dialect name.
        dialect: String,
        /// Offending table, column or index (e.g. `users.email`).
        object: String,
        /// What is wrong.
        message: String,
    },

    /// A canonical column type has no entry in the dialect's type mapping.
    #[error("Dialect '{dialect}' has no mapping for type '{data_type}' of column '{table}.{column}'")]
    UnmappedType {
        /// Dialect name.
        dialect: String,
        /// Table owning the column.
        table: String,
        /// Column name.
        column: String,
        /// The canonical type that could not be mapped.
        data_type: String,
    },

    /// Foreign keys form a cycle, so no creation order exists.
    #[error("Circular foreign-key dependency between tables: {}", .tables.join(", "))]
    CircularDependency {
        /// Tables that could not be ordered.
        tables: Vec<String>,
    },

    /// A foreign key references a table outside the set being ordered.
    #[error("Column '{table}.{column}' references unknown table '{referenced}'")]
    DanglingReference {
        /// Referencing table.
        table: String,
        /// Referencing column.
        column: String,
        /// The missing table.
        referenced: String,
    },

    /// A schema object is missing a required field.
    #[error("Malformed schema object: {0}")]
    MalformedInput(String),

    /// A table with this name already exists in the schema.
    #[error("Table '{0}' is defined more than once")]
    DuplicateTable(String),

    /// A column with this name already exists in the table.
    #[error("Column '{column}' is defined more than once in table '{table}'")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// An index with this name already exists.
    #[error("Index '{0}' is defined more than once")]
    DuplicateIndex(String),

    /// No dialect is registered under the requested name.
    #[error("Unsupported dialect: {0}")]
    UnknownDialect(String),

    /// The schema adapter could not understand a statement.
    #[error("Failed to parse {source_name}: {message}")]
    Parse {
        /// File or statement the error comes from.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Invalid state transition or replay.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error (reading schema sources or writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A statement pattern failed to compile.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Multiple errors occurred.
    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<CollectError>),
}

impl CollectError {
    /// Collapses a list of errors: `Ok` when empty, the error itself when
    /// there is exactly one, `Multiple` otherwise.
    pub fn from_many(mut errors: Vec<CollectError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

/// Result type for collection operations.
pub type Result<T> = std::result::Result<T, CollectError>;
