//! Schema collection and dependency-ordered DDL emission.
//!
//! `oxide-collect` gathers table definitions spread across independently
//! developed modules and turns the difference with what earlier migrations
//! created into a new migration file:
//! - Schemas are held in a dialect-neutral model with canonical type tokens
//! - Tables are ordered so every table follows the tables it references
//! - Schema trees are normalized so equal schemas compare equal
//! - A pluggable dialect renders CREATE/ALTER/DROP statements
//!
//! # Architecture
//!
//! - **Schema** - `Table`, `Column`, `Index`, `ForeignKeyConstraint`
//! - **Normalizer** - whitespace/case folding and deterministic node ordering
//! - **Resolver** - foreign-key dependency ordering with cycle detection
//! - **Dialect** - PostgreSQL and SQLite DDL rendering, looked up by name
//! - **ChangeSet** - ordered, hashed up/down statements for one migration
//! - **Parser** - reads DDL scripts back into the schema model
//! - **Writer** - migration files with Up and Down sections
//!
//! # Example
//!
//! ```rust
//! use oxide_collect::prelude::*;
//!
//! let users = Table::new("users")?
//!     .column(Column::new("id", "serial")?.primary_key())?
//!     .column(Column::new("email", "varchar(255)")?.not_null().unique())?;
//! let posts = Table::new("posts")?
//!     .column(Column::new("id", "serial")?.primary_key())?
//!     .column(
//!         Column::new("author_id", "int")?
//!             .not_null()
//!             .references(ForeignKeyConstraint::new("users", "id")?),
//!     )?;
//! let current = Schema::new().table(posts)?.table(users)?;
//!
//! let registry = DialectRegistry::with_builtin();
//! let emitter = ChangeSetEmitter::new(&registry, "postgres")?;
//! let changeset = emitter.emit(&Schema::new(), &current, "initial")?;
//!
//! assert_eq!(changeset.up()[0].target, "table users");
//! assert_eq!(changeset.up()[1].target, "table posts");
//! # Ok::<(), oxide_collect::error::CollectError>(())
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Write a migration for whatever changed under ./modules
//! oxide-collect collect --name add_users
//!
//! # Print the statements without writing a file
//! oxide-collect --dialect sqlite collect --dry-run
//!
//! # List dialects
//! oxide-collect dialects
//! ```

pub mod changeset;
pub mod collector;
pub mod dialect;
pub mod error;
pub mod normalize;
pub mod parser;
pub mod resolver;
pub mod schema;
pub mod writer;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::changeset::{ChangeSet, ChangeSetEmitter, DdlOperation, OperationKind};
    pub use crate::collector::{Collector, CollectorConfig};
    pub use crate::dialect::{
        AlterOperation, DdlObject, Dialect, DialectRegistry, PostgresDialect, SqliteDialect,
    };
    pub use crate::error::{CollectError, Result};
    pub use crate::normalize::{
        normalize_node, normalize_sql, NodeKind, NormalizeOptions, SchemaNode,
    };
    pub use crate::parser::{SchemaParser, SqlScriptParser};
    pub use crate::resolver::sort_tables;
    pub use crate::schema::{Column, ForeignKeyAction, ForeignKeyConstraint, Index, Schema, Table};
    pub use crate::writer::{MigrationFile, MigrationWriter};
}
