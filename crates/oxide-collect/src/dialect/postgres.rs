//! PostgreSQL dialect.

use super::{common_violations, Dialect};
use crate::error::{CollectError, Result};
use crate::schema::{Column, Schema};

/// PostgreSQL truncates identifiers longer than `NAMEDATALEN - 1` bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

const TYPE_PAIRS: &[(&str, &str)] = &[
    ("int", "integer"),
    ("integer", "integer"),
    ("int4", "integer"),
    ("bigint", "bigint"),
    ("int8", "bigint"),
    ("smallint", "smallint"),
    ("int2", "smallint"),
    ("serial", "serial"),
    ("bigserial", "bigserial"),
    ("smallserial", "smallserial"),
    ("varchar", "character varying"),
    ("char", "character"),
    ("character", "character"),
    ("text", "text"),
    ("datetime", "timestamp"),
    ("timestamp", "timestamp with time zone"),
    ("timestamptz", "timestamp with time zone"),
    ("date", "date"),
    ("time", "time"),
    ("timetz", "time with time zone"),
    ("interval", "interval"),
    ("bool", "boolean"),
    ("boolean", "boolean"),
    ("real", "real"),
    ("float", "double precision"),
    ("double", "double precision"),
    ("decimal", "numeric"),
    ("numeric", "numeric"),
    ("money", "money"),
    ("json", "json"),
    ("jsonb", "jsonb"),
    ("uuid", "uuid"),
    ("bytea", "bytea"),
    ("blob", "bytea"),
    ("inet", "inet"),
];

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Registry key.
    pub const NAME: &'static str = "postgres";

    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn type_pairs(&self) -> &'static [(&'static str, &'static str)] {
        TYPE_PAIRS
    }

    fn validate_schema(&self, schema: &Schema) -> Result<()> {
        CollectError::from_many(common_violations(self, schema, Some(MAX_IDENTIFIER_LEN)))
    }

    fn drop_column(&self, table: &str, column: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        ))
    }

    fn alter_column_type(&self, table: &str, column: &Column) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            self.quote_identifier(table),
            self.quote_identifier(column.name()),
            self.render_type(table, column)?
        ))
    }

    fn set_nullability(&self, table: &str, column: &str, nullable: bool) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
            self.quote_identifier(table),
            self.quote_identifier(column),
            if nullable { "DROP" } else { "SET" }
        ))
    }

    fn set_default(&self, table: &str, column: &str, default: Option<&str>) -> Result<String> {
        let action = match default {
            Some(expr) => format!("SET DEFAULT {expr}"),
            None => "DROP DEFAULT".to_string(),
        };
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} {}",
            self.quote_identifier(table),
            self.quote_identifier(column),
            action
        ))
    }
}
