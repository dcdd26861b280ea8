//! SQLite dialect.
//!
//! SQLite has limited ALTER TABLE support: it can add and drop columns but
//! cannot change a column's type, nullability or default without recreating
//! the table. Those alterations are reported as unsupported rather than
//! emitted as comments, so the caller sees them.
//!
//! `ADD COLUMN` is further restricted: the new column cannot be a primary key
//! or UNIQUE, its default must be constant, and a NOT NULL column needs a
//! non-NULL default.

use tracing::debug;

use super::{common_violations, AlterOperation, DdlObject, Dialect};
use crate::error::{CollectError, Result};
use crate::schema::{Column, Schema};

const TYPE_PAIRS: &[(&str, &str)] = &[
    ("int", "INTEGER"),
    ("integer", "INTEGER"),
    ("bigint", "INTEGER"),
    ("smallint", "INTEGER"),
    ("serial", "INTEGER"),
    ("bigserial", "INTEGER"),
    ("varchar", "TEXT"),
    ("char", "TEXT"),
    ("text", "TEXT"),
    ("datetime", "TEXT"),
    ("timestamp", "TEXT"),
    ("timestamptz", "TEXT"),
    ("date", "TEXT"),
    ("time", "TEXT"),
    ("bool", "INTEGER"),
    ("boolean", "INTEGER"),
    ("real", "REAL"),
    ("float", "REAL"),
    ("double", "REAL"),
    ("decimal", "NUMERIC"),
    ("numeric", "NUMERIC"),
    ("json", "TEXT"),
    ("jsonb", "TEXT"),
    ("uuid", "TEXT"),
    ("blob", "BLOB"),
    ("bytea", "BLOB"),
];

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Registry key.
    pub const NAME: &'static str = "sqlite";

    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn type_pairs(&self) -> &'static [(&'static str, &'static str)] {
        TYPE_PAIRS
    }

    fn keeps_type_modifiers(&self) -> bool {
        false
    }

    fn validate_schema(&self, schema: &Schema) -> Result<()> {
        let mut errors = common_violations(self, schema, None);
        for table in schema.tables() {
            if table.name().to_ascii_lowercase().starts_with("sqlite_") {
                errors.push(CollectError::Validation {
                    dialect: self.name().to_string(),
                    object: table.name().to_string(),
                    message: "names starting with 'sqlite_' are reserved".to_string(),
                });
            }
        }
        CollectError::from_many(errors)
    }

    fn add_column(&self, table: &str, column: &Column) -> Result<String> {
        if let Some(reason) = add_column_restriction(column) {
            debug!("sqlite cannot add column {}.{}: {}", table, column.name(), reason);
            return Err(self.unsupported(
                "alter",
                &DdlObject::Alter(AlterOperation::AddColumn {
                    table: table.to_string(),
                    column: column.clone(),
                }),
            ));
        }
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(table, column, true)?
        ))
    }

    fn alter_column_type(&self, table: &str, column: &Column) -> Result<String> {
        Err(self.unsupported(
            "alter",
            &DdlObject::Alter(AlterOperation::AlterColumnType {
                table: table.to_string(),
                column: column.clone(),
            }),
        ))
    }

    fn set_nullability(&self, table: &str, column: &str, nullable: bool) -> Result<String> {
        Err(self.unsupported(
            "alter",
            &DdlObject::Alter(AlterOperation::SetNullability {
                table: table.to_string(),
                column: column.to_string(),
                nullable,
            }),
        ))
    }

    fn set_default(&self, table: &str, column: &str, default: Option<&str>) -> Result<String> {
        Err(self.unsupported(
            "alter",
            &DdlObject::Alter(AlterOperation::SetDefault {
                table: table.to_string(),
                column: column.to_string(),
                default: default.map(str::to_string),
            }),
        ))
    }
}

/// Why SQLite's `ALTER TABLE ... ADD COLUMN` would reject `column`, if it would.
fn add_column_restriction(column: &Column) -> Option<&'static str> {
    if column.primary_key {
        return Some("primary key columns cannot be added");
    }
    if column.unique {
        return Some("UNIQUE columns cannot be added");
    }
    match column.default.as_deref().map(str::trim) {
        Some(expr) if !is_constant_default(expr) => Some("default is not a constant"),
        None | Some("NULL" | "null") if !column.nullable => {
            Some("NOT NULL columns need a non-NULL default")
        }
        _ => None,
    }
}

fn is_constant_default(expr: &str) -> bool {
    let upper = expr.to_ascii_uppercase();
    !expr.contains('(')
        && !matches!(
            upper.as_str(),
            "CURRENT_TIME" | "CURRENT_DATE" | "CURRENT_TIMESTAMP"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Index, Table};

    fn dialect() -> SqliteDialect {
        SqliteDialect::new()
    }

    #[test]
    fn test_create_table_simple() {
        let table = Table::new("users")
            .unwrap()
            .column(Column::new("id", "bigint").unwrap().primary_key())
            .unwrap()
            .column(Column::new("name", "varchar(255)").unwrap().not_null())
            .unwrap();

        let sql = dialect().generate_create(&DdlObject::Table(table)).unwrap();
        assert!(sql.contains("CREATE TABLE"));
        assert!(sql.contains("\"users\""));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY"));
        assert!(sql.contains("\"name\" TEXT NOT NULL"));
    }

    #[test]
    fn test_add_column_with_default() {
        let op = DdlObject::Alter(AlterOperation::AddColumn {
            table: "users".to_string(),
            column: Column::new("is_active", "bool")
                .unwrap()
                .not_null()
                .default_expr("1"),
        });
        let sql = dialect().generate_alter(&op).unwrap();
        assert_eq!(
            sql,
            "ALTER TABLE \"users\" ADD COLUMN \"is_active\" INTEGER NOT NULL DEFAULT 1"
        );
    }

    #[test]
    fn test_add_column_restrictions() {
        let add = |column: Column| {
            dialect().generate_alter(&DdlObject::Alter(AlterOperation::AddColumn {
                table: "t".to_string(),
                column,
            }))
        };
        let rejected = [
            Column::new("email", "text").unwrap().unique(),
            Column::new("id", "int").unwrap().primary_key().default_expr("0"),
            Column::new("at", "timestamp").unwrap().default_expr("CURRENT_TIMESTAMP"),
            Column::new("n", "int").unwrap().default_expr("(1 + 1)"),
            Column::new("name", "text").unwrap().not_null(),
        ];
        for column in rejected {
            let name = column.name().to_string();
            match add(column) {
                Err(CollectError::UnsupportedObject { object, .. }) => {
                    assert_eq!(object, format!("add column t.{name}"));
                }
                other => panic!("expected unsupported object for {name}, got {other:?}"),
            }
        }

        assert_eq!(
            add(Column::new("bio", "text").unwrap().default_expr("'none'")).unwrap(),
            "ALTER TABLE \"t\" ADD COLUMN \"bio\" TEXT DEFAULT 'none'"
        );
    }

    #[test]
    fn test_set_default_unsupported() {
        let op = DdlObject::Alter(AlterOperation::SetDefault {
            table: "users".to_string(),
            column: "active".to_string(),
            default: Some("1".to_string()),
        });
        assert!(matches!(
            dialect().generate_alter(&op),
            Err(CollectError::UnsupportedObject { .. })
        ));
    }

    #[test]
    fn test_drop_column() {
        let op = DdlObject::Alter(AlterOperation::DropColumn {
            table: "users".to_string(),
            column: "email".to_string(),
        });
        assert_eq!(
            dialect().generate_alter(&op).unwrap(),
            "ALTER TABLE \"users\" DROP COLUMN \"email\""
        );
    }

    #[test]
    fn test_alter_column_type_unsupported() {
        let op = DdlObject::Alter(AlterOperation::AlterColumnType {
            table: "users".to_string(),
            column: Column::new("email", "text").unwrap(),
        });
        match dialect().generate_alter(&op) {
            Err(CollectError::UnsupportedObject { dialect, object, .. }) => {
                assert_eq!(dialect, "sqlite");
                assert_eq!(object, "alter column type users.email");
            }
            other => panic!("expected unsupported object, got {other:?}"),
        }
    }

    #[test]
    fn test_create_index() {
        let index = Index::new("idx_users_email", "users", vec!["email".into()]).unwrap();
        assert_eq!(
            dialect().generate_create(&DdlObject::Index(index)).unwrap(),
            "CREATE INDEX \"idx_users_email\" ON \"users\" (\"email\")"
        );
    }

    #[test]
    fn test_reserved_table_prefix() {
        let schema = Schema::new()
            .table(
                Table::new("sqlite_stats")
                    .unwrap()
                    .column(Column::new("id", "int").unwrap())
                    .unwrap(),
            )
            .unwrap();
        assert!(matches!(
            dialect().validate_schema(&schema),
            Err(CollectError::Validation { .. })
        ));
    }

    #[test]
    fn test_type_names() {
        let d = dialect();
        let col = |t: &str| Column::new("c", t).unwrap();
        assert_eq!(d.render_type("t", &col("bigint")).unwrap(), "INTEGER");
        assert_eq!(d.render_type("t", &col("varchar(255)")).unwrap(), "TEXT");
        assert_eq!(d.render_type("t", &col("bool")).unwrap(), "INTEGER");
        assert_eq!(d.render_type("t", &col("datetime")).unwrap(), "TEXT");
        assert_eq!(d.render_type("t", &col("blob")).unwrap(), "BLOB");
    }
}
