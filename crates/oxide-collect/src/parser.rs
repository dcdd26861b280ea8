//! Adapter turning SQL DDL text into the schema model.
//!
//! This is deliberately not a SQL grammar. It understands the DDL subset that
//! module schema files and generated migrations use (CREATE/ALTER/DROP of
//! tables and indexes) and skips every other statement.

use std::fmt;

use regex::Regex;
use tracing::debug;

use crate::error::{CollectError, Result};
use crate::schema::{Column, ForeignKeyAction, ForeignKeyConstraint, Index, Schema, Table};

/// Source label used when parsing text that did not come from a file.
const INLINE_SOURCE: &str = "<inline>";

/// Words that end a column's type and start its constraints.
const COLUMN_KEYWORDS: &[&str] = &[
    "constraint",
    "not",
    "null",
    "primary",
    "unique",
    "default",
    "references",
    "check",
    "collate",
    "generated",
    "autoincrement",
];

/// Leading words of a table-level constraint inside CREATE TABLE.
const TABLE_CONSTRAINTS: &[&str] = &[
    "constraint",
    "primary",
    "unique",
    "foreign",
    "check",
    "exclude",
];

/// Narrow boundary between SQL text and the schema model.
pub trait SchemaParser: fmt::Debug {
    /// Parses a single CREATE TABLE statement.
    fn parse_create_table(&self, text: &str) -> Result<Table>;

    /// Replays every statement of `text` against `schema`. `source_name`
    /// labels errors and log lines.
    fn parse_script(&self, text: &str, source_name: &str, schema: &mut Schema) -> Result<()>;
}

/// Regex-driven parser for the DDL subset.
#[derive(Debug, Clone)]
pub struct SqlScriptParser {
    create_table: Regex,
    create_index: Regex,
    alter_table: Regex,
    drop_table: Regex,
    drop_index: Regex,
    add_column: Regex,
    drop_column: Regex,
    alter_type: Regex,
    nullability: Regex,
    column_default: Regex,
}

impl SqlScriptParser {
    /// Compiles the statement patterns.
    pub fn new() -> Result<Self> {
        Ok(Self {
            create_table: Regex::new(
                r"(?is)^create\s+(?:temp(?:orary)?\s+)?table\s+(?P<if_not_exists>if\s+not\s+exists\s+)?(?P<name>[^\s(]+)\s*\(",
            )?,
            create_index: Regex::new(
                r"(?is)^create\s+(?P<unique>unique\s+)?index\s+(?:concurrently\s+)?(?P<if_not_exists>if\s+not\s+exists\s+)?(?P<name>[^\s(]+)\s+on\s+(?:only\s+)?(?P<table>[^\s(]+)\s*(?:using\s+\w+\s*)?\(",
            )?,
            alter_table: Regex::new(
                r"(?is)^alter\s+table\s+(?P<if_exists>if\s+exists\s+)?(?:only\s+)?(?P<table>\S+)\s+(?P<actions>.+)$",
            )?,
            drop_table: Regex::new(
                r"(?is)^drop\s+table\s+(?P<if_exists>if\s+exists\s+)?(?P<names>.+?)(?:\s+(?:cascade|restrict))?$",
            )?,
            drop_index: Regex::new(
                r"(?is)^drop\s+index\s+(?:concurrently\s+)?(?P<if_exists>if\s+exists\s+)?(?P<names>.+?)(?:\s+(?:cascade|restrict))?$",
            )?,
            add_column: Regex::new(
                r"(?is)^add\s+(?P<column>column\s+)?(?P<if_not_exists>if\s+not\s+exists\s+)?(?P<definition>.+)$",
            )?,
            drop_column: Regex::new(
                r"(?is)^drop\s+(?P<column>column\s+)?(?P<if_exists>if\s+exists\s+)?(?P<name>\S+)(?:\s+(?:cascade|restrict))?$",
            )?,
            alter_type: Regex::new(
                r"(?is)^alter\s+(?:column\s+)?(?P<name>\S+)\s+(?:set\s+data\s+)?type\s+(?P<type>.+?)(?:\s+using\s+.+)?$",
            )?,
            nullability: Regex::new(
                r"(?is)^alter\s+(?:column\s+)?(?P<name>\S+)\s+(?P<op>set|drop)\s+not\s+null$",
            )?,
            column_default: Regex::new(
                r"(?is)^alter\s+(?:column\s+)?(?P<name>\S+)\s+(?:set\s+default\s+(?P<expr>.+)|drop\s+default)$",
            )?,
        })
    }

    fn create_table_parts<'a>(
        &self,
        source: &str,
        statement: &'a str,
    ) -> Result<Option<(bool, &'a str, &'a str)>> {
        let Some(caps) = self.create_table.captures(statement) else {
            return Ok(None);
        };
        let (Some(header), Some(name)) = (caps.get(0), caps.name("name")) else {
            return Ok(None);
        };
        let body = balanced(statement, header.end() - 1).ok_or_else(|| {
            parse_error(
                source,
                format!("unbalanced parentheses in CREATE TABLE {}", name.as_str()),
            )
        })?;
        Ok(Some((caps.name("if_not_exists").is_some(), name.as_str(), body)))
    }

    fn apply_statement(&self, source: &str, statement: &str, schema: &mut Schema) -> Result<()> {
        if let Some((if_not_exists, name, body)) = self.create_table_parts(source, statement)? {
            let table = build_table(source, name, body)?;
            if if_not_exists && schema.get_table(table.name()).is_some() {
                debug!("{}: table '{}' already exists, skipped", source, table.name());
                return Ok(());
            }
            return schema.add_table(table);
        }

        if let Some(caps) = self.create_index.captures(statement) {
            let header_end = caps.get(0).map_or(statement.len(), |m| m.end());
            let name = ident(&caps["name"]);
            let table_name = ident(&caps["table"]);
            let inner = balanced(statement, header_end - 1).ok_or_else(|| {
                parse_error(source, format!("unbalanced parentheses in CREATE INDEX {name}"))
            })?;

            let mut columns = Vec::new();
            for part in split_top_level(inner) {
                let tokens = tokenize(part);
                match tokens.first() {
                    Some(column) if !column.contains('(') => columns.push(ident(column)),
                    _ => {
                        return Err(parse_error(
                            source,
                            format!("expression index '{name}' is not supported"),
                        ));
                    }
                }
            }

            if schema.get_index(&name).is_some() {
                if caps.name("if_not_exists").is_some() {
                    debug!("{}: index '{}' already exists, skipped", source, name);
                    return Ok(());
                }
                return Err(CollectError::DuplicateIndex(name));
            }

            let mut index = Index::new(name, table_name.as_str(), columns)?;
            index.unique = caps.name("unique").is_some();
            return match schema.get_table_mut(&table_name) {
                Some(table) => table.add_index(index),
                None => schema.add_index(index),
            };
        }

        if let Some(caps) = self.alter_table.captures(statement) {
            let table = ident(&caps["table"]);
            if schema.get_table(&table).is_none() {
                if caps.name("if_exists").is_some() {
                    return Ok(());
                }
                return Err(CollectError::InvalidState(format!(
                    "{source}: ALTER TABLE on unknown table '{table}'"
                )));
            }
            for action in split_top_level(&caps["actions"]) {
                self.apply_alter_action(source, &table, action, schema)?;
            }
            return Ok(());
        }

        if let Some(caps) = self.drop_table.captures(statement) {
            for name in split_top_level(&caps["names"]).into_iter().map(ident) {
                if schema.remove_table(&name).is_none() && caps.name("if_exists").is_none() {
                    return Err(CollectError::InvalidState(format!(
                        "{source}: DROP TABLE of unknown table '{name}'"
                    )));
                }
            }
            return Ok(());
        }

        if let Some(caps) = self.drop_index.captures(statement) {
            for name in split_top_level(&caps["names"]).into_iter().map(ident) {
                if schema.remove_index(&name).is_none() && caps.name("if_exists").is_none() {
                    return Err(CollectError::InvalidState(format!(
                        "{source}: DROP INDEX of unknown index '{name}'"
                    )));
                }
            }
            return Ok(());
        }

        debug!("{}: skipping '{}'", source, head(statement));
        Ok(())
    }

    fn apply_alter_action(
        &self,
        source: &str,
        table: &str,
        action: &str,
        schema: &mut Schema,
    ) -> Result<()> {
        if let Some(caps) = self.nullability.captures(action) {
            let column = ident(&caps["name"]);
            let nullable = caps["op"].eq_ignore_ascii_case("drop");
            existing_column(source, schema, table, &column)?.nullable = nullable;
            return Ok(());
        }

        if let Some(caps) = self.column_default.captures(action) {
            let column = ident(&caps["name"]);
            let default = caps.name("expr").map(|m| m.as_str().trim().to_string());
            existing_column(source, schema, table, &column)?.default = default;
            return Ok(());
        }

        if let Some(caps) = self.alter_type.captures(action) {
            let column = ident(&caps["name"]);
            let data_type = canonical_type(&tokenize(&caps["type"]));
            existing_column(source, schema, table, &column)?.set_data_type(data_type)?;
            return Ok(());
        }

        if let Some(caps) = self.add_column.captures(action) {
            let definition = &caps["definition"];
            if caps.name("column").is_none() && starts_with_any(definition, TABLE_CONSTRAINTS) {
                debug!("{}: skipping constraint on '{}'", source, table);
                return Ok(());
            }
            let column = parse_column(source, definition)?;
            let target = existing_table(source, schema, table)?;
            if caps.name("if_not_exists").is_some() && target.get_column(column.name()).is_some() {
                return Ok(());
            }
            return target.add_column(column);
        }

        if let Some(caps) = self.drop_column.captures(action) {
            let column = ident(&caps["name"]);
            if caps.name("column").is_none() && column == "constraint" {
                return Ok(());
            }
            let removed = existing_table(source, schema, table)?.remove_column(&column);
            if removed.is_none() {
                if caps.name("if_exists").is_some() {
                    return Ok(());
                }
                return Err(CollectError::InvalidState(format!(
                    "{source}: DROP COLUMN of unknown column '{table}.{column}'"
                )));
            }
            let stale: Vec<String> = schema
                .all_indexes()
                .filter(|i| i.table() == table && i.columns().contains(&column))
                .map(|i| i.name().to_string())
                .collect();
            for name in stale {
                schema.remove_index(&name);
            }
            return Ok(());
        }

        debug!("{}: skipping ALTER TABLE {} '{}'", source, table, head(action));
        Ok(())
    }
}

impl SchemaParser for SqlScriptParser {
    fn parse_create_table(&self, text: &str) -> Result<Table> {
        let statements = split_statements(text);
        let statement = statements
            .first()
            .ok_or_else(|| parse_error(INLINE_SOURCE, "no statement found"))?;
        match self.create_table_parts(INLINE_SOURCE, statement)? {
            Some((_, name, body)) => build_table(INLINE_SOURCE, name, body),
            None => Err(parse_error(INLINE_SOURCE, "not a CREATE TABLE statement")),
        }
    }

    fn parse_script(&self, text: &str, source_name: &str, schema: &mut Schema) -> Result<()> {
        let statements = split_statements(text);
        debug!("{}: {} statements", source_name, statements.len());
        for statement in &statements {
            self.apply_statement(source_name, statement, schema)?;
        }
        Ok(())
    }
}

fn parse_error(source: &str, message: impl Into<String>) -> CollectError {
    CollectError::Parse {
        source_name: source.to_string(),
        message: message.into(),
    }
}

fn head(statement: &str) -> String {
    statement.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
}

fn existing_table<'s>(source: &str, schema: &'s mut Schema, table: &str) -> Result<&'s mut Table> {
    schema.get_table_mut(table).ok_or_else(|| {
        CollectError::InvalidState(format!("{source}: unknown table '{table}'"))
    })
}

fn existing_column<'s>(
    source: &str,
    schema: &'s mut Schema,
    table: &str,
    column: &str,
) -> Result<&'s mut Column> {
    existing_table(source, schema, table)?
        .get_column_mut(column)
        .ok_or_else(|| {
            CollectError::InvalidState(format!("{source}: unknown column '{table}.{column}'"))
        })
}

fn build_table(source: &str, name: &str, body: &str) -> Result<Table> {
    let mut table = Table::new(ident(name))?;
    let mut constraints = Vec::new();
    for element in split_top_level(body) {
        if starts_with_any(element, TABLE_CONSTRAINTS) {
            constraints.push(tokenize(element));
        } else {
            table.add_column(parse_column(source, element)?)?;
        }
    }
    for tokens in &constraints {
        apply_table_constraint(source, &mut table, tokens)?;
    }
    Ok(table)
}

fn apply_table_constraint(source: &str, table: &mut Table, tokens: &[String]) -> Result<()> {
    let at = if tokens.first().is_some_and(|t| t.eq_ignore_ascii_case("constraint")) {
        2
    } else {
        0
    };
    let lead = tokens
        .get(at)
        .map(|t| keyword_of(t).to_ascii_lowercase())
        .unwrap_or_default();

    match lead.as_str() {
        "primary" => {
            let (columns, _) = list_at(source, tokens, at + 1)?;
            for name in &columns {
                let column = constrained_column(source, table, name)?;
                column.primary_key = true;
                column.nullable = false;
            }
        }
        "unique" => {
            let (columns, _) = list_at(source, tokens, at)?;
            if let [single] = columns.as_slice() {
                constrained_column(source, table, single)?.unique = true;
            } else {
                let table_name = table.name().to_string();
                let name = format!("{}_{}_key", table_name, columns.join("_"));
                table.add_index(Index::new(name, table_name, columns)?.unique())?;
            }
        }
        "foreign" => {
            let (columns, next) = list_at(source, tokens, at + 1)?;
            let [column] = columns.as_slice() else {
                return Err(parse_error(
                    source,
                    format!("composite foreign key on '{}' is not supported", table.name()),
                ));
            };
            if !tokens
                .get(next)
                .is_some_and(|t| t.eq_ignore_ascii_case("references"))
            {
                return Err(parse_error(
                    source,
                    format!("foreign key on '{}.{}' has no REFERENCES", table.name(), column),
                ));
            }
            let (fk, _) = parse_reference(source, tokens, next + 1)?;
            constrained_column(source, table, column)?.references = Some(fk);
        }
        _ => debug!("{}: skipping table constraint on '{}'", source, table.name()),
    }
    Ok(())
}

fn constrained_column<'t>(
    source: &str,
    table: &'t mut Table,
    name: &str,
) -> Result<&'t mut Column> {
    let table_name = table.name().to_string();
    table.get_column_mut(name).ok_or_else(|| {
        parse_error(
            source,
            format!("constraint names unknown column '{table_name}.{name}'"),
        )
    })
}

fn parse_column(source: &str, definition: &str) -> Result<Column> {
    let tokens = tokenize(definition);
    let Some((name, rest)) = tokens.split_first() else {
        return Err(parse_error(source, "empty column definition"));
    };
    let type_end = rest.iter().position(|t| is_keyword(t)).unwrap_or(rest.len());
    if type_end == 0 {
        return Err(parse_error(
            source,
            format!("column '{}' has no type", ident(name)),
        ));
    }

    let mut column = Column::new(ident(name), canonical_type(&rest[..type_end]))?;
    let mut i = type_end;
    while i < rest.len() {
        let word = keyword_of(&rest[i]).to_ascii_lowercase();
        i += 1;
        match word.as_str() {
            "not" => {
                if rest.get(i).is_some_and(|t| t.eq_ignore_ascii_case("null")) {
                    column.nullable = false;
                    i += 1;
                }
            }
            "null" => column.nullable = true,
            "primary" => {
                if rest.get(i).is_some_and(|t| t.eq_ignore_ascii_case("key")) {
                    i += 1;
                }
                column = column.primary_key();
            }
            "unique" => column.unique = true,
            "default" => {
                let start = i;
                if i < rest.len() {
                    i += 1;
                }
                while i < rest.len() && !is_keyword(&rest[i]) {
                    i += 1;
                }
                if start == i {
                    return Err(parse_error(
                        source,
                        format!("column '{}' has an empty DEFAULT", column.name()),
                    ));
                }
                column.default = Some(rest[start..i].join(" "));
            }
            "references" => {
                let (fk, next) = parse_reference(source, rest, i)?;
                column.references = Some(fk);
                i = next;
            }
            "constraint" | "collate" => i += 1,
            _ => debug!("{}: ignoring '{}' on column '{}'", source, word, column.name()),
        }
    }
    Ok(column)
}

/// Parses `table [(column)] [ON DELETE action] [ON UPDATE action]` starting at
/// `at`, returning the constraint and the index of the first unread token.
fn parse_reference(
    source: &str,
    tokens: &[String],
    at: usize,
) -> Result<(ForeignKeyConstraint, usize)> {
    let target = tokens
        .get(at)
        .ok_or_else(|| parse_error(source, "REFERENCES without a table"))?;
    let (table, mut columns, mut next) = match target.find('(') {
        Some(p) => (ident(&target[..p]), paren_list(&target[p..]), at + 1),
        None => match tokens.get(at + 1) {
            Some(list) if list.starts_with('(') => (ident(target), paren_list(list), at + 2),
            _ => (ident(target), vec!["id".to_string()], at + 1),
        },
    };
    if columns.len() != 1 {
        return Err(parse_error(
            source,
            format!("composite foreign key to '{table}' is not supported"),
        ));
    }
    let mut fk = ForeignKeyConstraint::new(table, columns.remove(0))?;

    while tokens.get(next).is_some_and(|t| t.eq_ignore_ascii_case("on")) {
        let event = tokens
            .get(next + 1)
            .map(|t| t.to_ascii_lowercase())
            .unwrap_or_default();
        let first = tokens.get(next + 2).map(String::as_str).unwrap_or_default();
        let two_words = first.eq_ignore_ascii_case("set") || first.eq_ignore_ascii_case("no");
        let words = if two_words {
            let second = tokens.get(next + 3).map(String::as_str).unwrap_or_default();
            format!("{first} {second}")
        } else {
            first.to_string()
        };
        let action = ForeignKeyAction::from_sql(&words).ok_or_else(|| {
            parse_error(source, format!("unknown foreign key action '{words}'"))
        })?;
        match event.as_str() {
            "delete" => fk = fk.on_delete(action),
            "update" => fk = fk.on_update(action),
            other => {
                return Err(parse_error(
                    source,
                    format!("unknown foreign key event '{other}'"),
                ));
            }
        }
        next += if two_words { 4 } else { 3 };
    }
    Ok((fk, next))
}

/// Reads a parenthesised column list attached to, or following, `tokens[at]`.
fn list_at(source: &str, tokens: &[String], at: usize) -> Result<(Vec<String>, usize)> {
    let token = tokens
        .get(at)
        .ok_or_else(|| parse_error(source, "expected a column list"))?;
    if let Some(p) = token.find('(') {
        return Ok((paren_list(&token[p..]), at + 1));
    }
    match tokens.get(at + 1) {
        Some(next) if next.starts_with('(') => Ok((paren_list(next), at + 2)),
        _ => Err(parse_error(
            source,
            format!("expected a column list after '{token}'"),
        )),
    }
}

fn paren_list(token: &str) -> Vec<String> {
    let token = token.trim();
    let inner = token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(token);
    split_top_level(inner).into_iter().map(ident).collect()
}

/// Text of a token before any parenthesis (`check(x > 0)` gives `check`).
fn keyword_of(token: &str) -> &str {
    token.split('(').next().unwrap_or_default()
}

fn is_keyword(token: &str) -> bool {
    let word = keyword_of(token);
    COLUMN_KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k))
}

fn starts_with_any(text: &str, words: &[&str]) -> bool {
    let first = text.split_whitespace().next().map(keyword_of).unwrap_or_default();
    words.iter().any(|w| first.eq_ignore_ascii_case(w))
}

/// Unquotes and lowercases an identifier, part by part.
fn ident(raw: &str) -> String {
    raw.trim()
        .split('.')
        .map(|part| {
            part.trim()
                .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
                .to_lowercase()
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Folds native type spellings back to canonical tokens.
fn canonical_type(words: &[String]) -> String {
    let joined = words.join(" ");
    let (base, modifier) = match joined.find('(') {
        Some(p) => (
            &joined[..p],
            joined[p..].chars().filter(|c| !c.is_whitespace()).collect::<String>(),
        ),
        None => (joined.as_str(), String::new()),
    };
    let base = base.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let base = match base.as_str() {
        "character varying" => "varchar",
        "double precision" => "double",
        "timestamp with time zone" => "timestamptz",
        "timestamp without time zone" => "datetime",
        "time with time zone" => "timetz",
        "time without time zone" => "time",
        other => other,
    };
    format!("{base}{modifier}")
}

/// Splits a script into trimmed statements, dropping `--` and `/* */` comments.
fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                current.push(' ');
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ';' if depth == 0 => flush_statement(&mut statements, &mut current),
            _ => current.push(c),
        }
    }
    flush_statement(&mut statements, &mut current);
    statements
}

fn flush_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

/// Splits on commas outside parentheses and quotes.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Splits on whitespace outside parentheses and quotes.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Contents of the parenthesised group opening at byte `open`.
fn balanced(text: &str, open: usize) -> Option<&str> {
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    for (offset, c) in text.get(open..)?.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return text.get(open + 1..open + offset);
                }
            }
            _ => {}
        }
    }
    None
}
