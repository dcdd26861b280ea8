//! Diffing two schema snapshots into an ordered, hashed bundle of DDL.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::dialect::{AlterOperation, DdlObject, Dialect, DialectRegistry};
use crate::error::{CollectError, Result};
use crate::normalize::{normalize_sql, NormalizeOptions};
use crate::resolver::sort_tables;
use crate::schema::{Column, Index, Schema, Table};

/// Statement category of a rendered operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// CREATE TABLE / CREATE INDEX.
    Create,
    /// ALTER TABLE.
    Alter,
    /// DROP TABLE / DROP INDEX.
    Drop,
}

/// One rendered DDL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlOperation {
    /// Statement category.
    pub kind: OperationKind,
    /// What the statement touches (`table users`, `add column users.email`).
    pub target: String,
    /// Dialect SQL, without a trailing semicolon.
    pub sql: String,
}

/// An ordered, hashed bundle of DDL operations forming one migration.
///
/// A change set starts empty and is populated once by [`ChangeSetEmitter`];
/// after that it only exposes read accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    version: String,
    created_at: DateTime<Utc>,
    up: Vec<DdlOperation>,
    down: Vec<DdlOperation>,
    hash: String,
}

impl ChangeSet {
    /// Creates an empty change set stamped with the current time.
    #[must_use]
    pub fn empty(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            created_at: Utc::now(),
            up: Vec::new(),
            down: Vec::new(),
            hash: content_hash(&[]),
        }
    }

    /// Moves the change set from empty to populated.
    pub(crate) fn populate(
        &mut self,
        up: Vec<DdlOperation>,
        down: Vec<DdlOperation>,
    ) -> Result<()> {
        if !self.up.is_empty() {
            return Err(CollectError::InvalidState(format!(
                "Change set '{}' is already populated",
                self.version
            )));
        }
        self.hash = content_hash(&up);
        self.up = up;
        self.down = down;
        Ok(())
    }

    /// Version label.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Operations applying the change, in execution order.
    #[must_use]
    pub fn up(&self) -> &[DdlOperation] {
        &self.up
    }

    /// Operations reverting the change, in execution order.
    #[must_use]
    pub fn down(&self) -> &[DdlOperation] {
        &self.down
    }

    /// Hex SHA-256 over the up statements.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Returns `true` if the diff produced nothing to apply.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.up.is_empty()
    }

    /// Returns `true` if `hash` is this change set's content hash.
    #[must_use]
    pub fn matches_hash(&self, hash: &str) -> bool {
        self.hash.eq_ignore_ascii_case(hash.trim())
    }
}

/// Hex SHA-256 over the statements joined by newlines, in order.
#[must_use]
pub fn content_hash(operations: &[DdlOperation]) -> String {
    let joined = operations
        .iter()
        .map(|op| op.sql.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds change sets from two schema snapshots using one dialect.
#[derive(Debug, Clone)]
pub struct ChangeSetEmitter {
    dialect: Arc<dyn Dialect>,
}

impl ChangeSetEmitter {
    /// Creates an emitter for the dialect registered under `name`.
    pub fn new(registry: &DialectRegistry, name: &str) -> Result<Self> {
        Ok(Self {
            dialect: registry.require(name)?,
        })
    }

    /// Creates an emitter around an explicit dialect.
    #[must_use]
    pub fn with_dialect(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    /// The dialect rendering the statements.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Diffs `previous` against `current` and packages the result.
    ///
    /// Fails without producing anything if `current` does not validate for the
    /// dialect, if its tables cannot be ordered, or if any up statement cannot
    /// be rendered.
    pub fn emit(&self, previous: &Schema, current: &Schema, version: &str) -> Result<ChangeSet> {
        self.dialect.validate_schema(current)?;

        let mut plan = Plan::default();
        self.plan_tables_created(previous, current, &mut plan)?;
        plan_index_drops(previous, current, &mut plan);
        self.plan_columns(previous, current, &mut plan)?;
        plan_index_creates(previous, current, &mut plan);
        plan_tables_dropped(previous, current, &mut plan)?;

        let mut up = Vec::with_capacity(plan.steps.len());
        for (kind, object, _) in &plan.steps {
            let op = self.render(*kind, object)?;
            debug!("up: {}", op.target);
            up.push(op);
        }

        let mut down = Vec::new();
        for (kind, object) in plan.steps.iter().rev().flat_map(|(_, _, inverse)| inverse) {
            match self.render(*kind, object) {
                Ok(op) => down.push(op),
                Err(err @ CollectError::UnsupportedObject { .. }) => {
                    warn!("Down section omits {}: {}", object.describe(), err);
                }
                Err(err) => return Err(err),
            }
        }

        let mut changeset = ChangeSet::empty(version);
        changeset.populate(up, down)?;
        info!(
            "Emitted {} up and {} down operations for '{}' ({})",
            changeset.up().len(),
            changeset.down().len(),
            version,
            self.dialect.name()
        );
        Ok(changeset)
    }

    fn render(&self, kind: OperationKind, object: &DdlObject) -> Result<DdlOperation> {
        let sql = match kind {
            OperationKind::Create => self.dialect.generate_create(object)?,
            OperationKind::Alter => self.dialect.generate_alter(object)?,
            OperationKind::Drop => self.dialect.generate_drop(object)?,
        };
        Ok(DdlOperation {
            kind,
            target: object.describe(),
            sql,
        })
    }

    fn plan_tables_created(
        &self,
        previous: &Schema,
        current: &Schema,
        plan: &mut Plan,
    ) -> Result<()> {
        for table in sort_tables(current.tables())? {
            if previous.get_table(table.name()).is_none() {
                plan.push(
                    OperationKind::Create,
                    DdlObject::Table(table.clone()),
                    vec![(OperationKind::Drop, DdlObject::Table(table.clone()))],
                );
            }
        }
        Ok(())
    }

    fn plan_columns(&self, previous: &Schema, current: &Schema, plan: &mut Plan) -> Result<()> {
        let common: Vec<(&Table, &Table)> = current
            .tables()
            .iter()
            .filter_map(|cur| previous.get_table(cur.name()).map(|prev| (prev, cur)))
            .collect();

        for (prev, cur) in &common {
            for column in cur.columns() {
                if prev.get_column(column.name()).is_none() {
                    plan.push(
                        OperationKind::Alter,
                        add_column(cur.name(), column),
                        vec![(OperationKind::Alter, drop_column(cur.name(), column))],
                    );
                }
            }
        }

        for (prev, cur) in &common {
            for column in cur.columns() {
                let Some(old) = prev.get_column(column.name()) else {
                    continue;
                };
                if self.type_changed(cur.name(), old, column)? {
                    plan.push(
                        OperationKind::Alter,
                        alter_type(cur.name(), column),
                        vec![(OperationKind::Alter, alter_type(cur.name(), old))],
                    );
                }
                if old.nullable != column.nullable {
                    plan.push(
                        OperationKind::Alter,
                        set_nullability(cur.name(), column.name(), column.nullable),
                        vec![(
                            OperationKind::Alter,
                            set_nullability(cur.name(), column.name(), old.nullable),
                        )],
                    );
                }
                if default_changed(old, column) {
                    plan.push(
                        OperationKind::Alter,
                        set_default(cur.name(), column),
                        vec![(OperationKind::Alter, set_default(cur.name(), old))],
                    );
                }
            }
        }

        for (prev, cur) in &common {
            for old in prev.columns() {
                if cur.get_column(old.name()).is_none() {
                    plan.push(
                        OperationKind::Alter,
                        drop_column(cur.name(), old),
                        vec![(OperationKind::Alter, add_column(cur.name(), old))],
                    );
                }
            }
        }
        Ok(())
    }

    fn type_changed(&self, table: &str, old: &Column, new: &Column) -> Result<bool> {
        let options = NormalizeOptions::comparison();
        let before = normalize_sql(&self.dialect.render_type(table, old)?, options);
        let after = normalize_sql(&self.dialect.render_type(table, new)?, options);
        Ok(before != after)
    }
}

/// Drops removed indexes and the old half of changed ones. Runs before the
/// column passes so no index outlives a column it covers.
fn plan_index_drops(previous: &Schema, current: &Schema, plan: &mut Plan) {
    for old in previous.all_indexes() {
        if current.get_table(old.table()).is_none() {
            continue;
        }
        let replaced = current
            .get_index(old.name())
            .map_or(true, |index| !same_index(old, index));
        if replaced {
            plan.push(
                OperationKind::Drop,
                DdlObject::Index(old.clone()),
                vec![(OperationKind::Create, DdlObject::Index(old.clone()))],
            );
        }
    }
}

/// Creates new indexes and the new half of changed ones, after the column
/// passes so every indexed column exists.
fn plan_index_creates(previous: &Schema, current: &Schema, plan: &mut Plan) {
    for index in current.all_indexes() {
        let changed = previous
            .get_index(index.name())
            .map_or(true, |old| !same_index(old, index));
        if changed {
            plan.push(
                OperationKind::Create,
                DdlObject::Index(index.clone()),
                vec![(OperationKind::Drop, DdlObject::Index(index.clone()))],
            );
        }
    }
}

/// Drops removed tables, dependents first. Reverting recreates each table
/// followed by its indexes.
fn plan_tables_dropped(previous: &Schema, current: &Schema, plan: &mut Plan) -> Result<()> {
    let removed: HashSet<&str> = previous
        .table_names()
        .filter(|name| current.get_table(name).is_none())
        .collect();
    if removed.is_empty() {
        return Ok(());
    }

    for table in sort_tables(previous.tables())?.into_iter().rev() {
        if !removed.contains(table.name()) {
            continue;
        }
        let mut inverse = vec![(OperationKind::Create, DdlObject::Table(table.clone()))];
        inverse.extend(
            previous
                .all_indexes()
                .filter(|index| index.table() == table.name())
                .map(|index| (OperationKind::Create, DdlObject::Index(index.clone()))),
        );
        plan.push(OperationKind::Drop, DdlObject::Table(table.clone()), inverse);
    }
    Ok(())
}

type Step = (OperationKind, DdlObject);

/// Up steps paired with the steps that revert each of them, in the order the
/// revert runs them.
#[derive(Debug, Default)]
struct Plan {
    steps: Vec<(OperationKind, DdlObject, Vec<Step>)>,
}

impl Plan {
    fn push(&mut self, kind: OperationKind, object: DdlObject, inverse: Vec<Step>) {
        self.steps.push((kind, object, inverse));
    }
}

fn same_index(a: &Index, b: &Index) -> bool {
    a.table() == b.table() && a.columns() == b.columns() && a.unique == b.unique
}

fn add_column(table: &str, column: &Column) -> DdlObject {
    DdlObject::Alter(AlterOperation::AddColumn {
        table: table.to_string(),
        column: column.clone(),
    })
}

fn drop_column(table: &str, column: &Column) -> DdlObject {
    DdlObject::Alter(AlterOperation::DropColumn {
        table: table.to_string(),
        column: column.name().to_string(),
    })
}

fn alter_type(table: &str, column: &Column) -> DdlObject {
    DdlObject::Alter(AlterOperation::AlterColumnType {
        table: table.to_string(),
        column: column.clone(),
    })
}

fn default_changed(old: &Column, new: &Column) -> bool {
    let options = NormalizeOptions::default();
    let before = old.default.as_deref().map(|d| normalize_sql(d, options));
    let after = new.default.as_deref().map(|d| normalize_sql(d, options));
    before != after
}

fn set_default(table: &str, column: &Column) -> DdlObject {
    DdlObject::Alter(AlterOperation::SetDefault {
        table: table.to_string(),
        column: column.name().to_string(),
        default: column.default.clone(),
    })
}

fn set_nullability(table: &str, column: &str, nullable: bool) -> DdlObject {
    DdlObject::Alter(AlterOperation::SetNullability {
        table: table.to_string(),
        column: column.to_string(),
        nullable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::schema::ForeignKeyConstraint;

    fn emitter() -> ChangeSetEmitter {
        ChangeSetEmitter::new(&DialectRegistry::with_builtin(), "postgres").unwrap()
    }

    fn users() -> Table {
        Table::new("users")
            .unwrap()
            .column(Column::new("id", "serial").unwrap().primary_key())
            .unwrap()
            .column(Column::new("email", "varchar(255)").unwrap().not_null())
            .unwrap()
    }

    fn roles() -> Table {
        Table::new("roles")
            .unwrap()
            .column(Column::new("id", "serial").unwrap().primary_key())
            .unwrap()
    }

    fn user_roles() -> Table {
        Table::new("user_roles")
            .unwrap()
            .column(Column::new("id", "serial").unwrap().primary_key())
            .unwrap()
            .column(
                Column::new("user_id", "int")
                    .unwrap()
                    .references(ForeignKeyConstraint::new("users", "id").unwrap()),
            )
            .unwrap()
            .column(
                Column::new("role_id", "int")
                    .unwrap()
                    .references(ForeignKeyConstraint::new("roles", "id").unwrap()),
            )
            .unwrap()
    }

    fn targets(ops: &[DdlOperation]) -> Vec<&str> {
        ops.iter().map(|op| op.target.as_str()).collect()
    }

    #[test]
    fn test_new_tables_follow_dependencies() {
        let current = Schema::new()
            .table(user_roles())
            .unwrap()
            .table(users())
            .unwrap()
            .table(roles())
            .unwrap();
        let cs = emitter().emit(&Schema::new(), &current, "init").unwrap();

        assert_eq!(
            targets(cs.up()),
            vec!["table users", "table roles", "table user_roles"]
        );
        assert!(cs.up().iter().all(|op| op.kind == OperationKind::Create));
        assert_eq!(
            targets(cs.down()),
            vec!["table user_roles", "table roles", "table users"]
        );
        assert!(cs.down()[0].sql.starts_with("DROP TABLE IF EXISTS"));
    }

    #[test]
    fn test_identical_schemas_are_noop() {
        let schema = Schema::new().table(users()).unwrap();
        let cs = emitter().emit(&schema, &schema, "nothing").unwrap();
        assert!(cs.is_noop());
        assert!(cs.down().is_empty());
        assert_eq!(cs.hash(), content_hash(&[]));
    }

    #[test]
    fn test_column_changes() {
        let previous = Schema::new().table(users()).unwrap();
        let mut changed = Table::new("users")
            .unwrap()
            .column(Column::new("id", "serial").unwrap().primary_key())
            .unwrap()
            .column(Column::new("email", "text").unwrap())
            .unwrap();
        changed
            .add_column(Column::new("bio", "text").unwrap())
            .unwrap();
        let current = Schema::new().table(changed).unwrap();

        let cs = emitter().emit(&previous, &current, "users_v2").unwrap();
        let sql: Vec<&str> = cs.up().iter().map(|op| op.sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"users\" ADD COLUMN \"bio\" text",
                "ALTER TABLE \"users\" ALTER COLUMN \"email\" TYPE text",
                "ALTER TABLE \"users\" ALTER COLUMN \"email\" DROP NOT NULL",
            ]
        );
        let down: Vec<&str> = cs.down().iter().map(|op| op.sql.as_str()).collect();
        assert_eq!(
            down,
            vec![
                "ALTER TABLE \"users\" ALTER COLUMN \"email\" SET NOT NULL",
                "ALTER TABLE \"users\" ALTER COLUMN \"email\" TYPE character varying(255)",
                "ALTER TABLE \"users\" DROP COLUMN IF EXISTS \"bio\"",
            ]
        );
    }

    #[test]
    fn test_type_spelling_is_not_a_change() {
        let a = Schema::new()
            .table(
                Table::new("events")
                    .unwrap()
                    .column(Column::new("at", "timestamp").unwrap())
                    .unwrap(),
            )
            .unwrap();
        let b = Schema::new()
            .table(
                Table::new("events")
                    .unwrap()
                    .column(Column::new("at", "TIMESTAMPTZ").unwrap())
                    .unwrap(),
            )
            .unwrap();
        assert!(emitter().emit(&a, &b, "same").unwrap().is_noop());
    }

    #[test]
    fn test_dropped_column_and_table() {
        let previous = Schema::new()
            .table(users())
            .unwrap()
            .table(roles())
            .unwrap()
            .table(user_roles())
            .unwrap();
        let slim_users = Table::new("users")
            .unwrap()
            .column(Column::new("id", "serial").unwrap().primary_key())
            .unwrap();
        let current = Schema::new().table(slim_users).unwrap();

        let cs = emitter().emit(&previous, &current, "slim").unwrap();
        assert_eq!(
            targets(cs.up()),
            vec![
                "drop column users.email",
                "table user_roles",
                "table roles",
            ]
        );
        assert_eq!(cs.up()[1].kind, OperationKind::Drop);
        assert_eq!(cs.down()[0].kind, OperationKind::Create);
        assert!(cs.down()[0].sql.starts_with("CREATE TABLE \"roles\""));
    }

    #[test]
    fn test_indexes_created_and_dropped() {
        let previous = Schema::new()
            .table(
                users()
                    .index(Index::new("idx_users_id", "users", vec!["id".into()]).unwrap())
                    .unwrap(),
            )
            .unwrap();
        let current = Schema::new()
            .table(
                users()
                    .index(
                        Index::new("idx_users_email", "users", vec!["email".into()])
                            .unwrap()
                            .unique(),
                    )
                    .unwrap(),
            )
            .unwrap();

        let cs = emitter().emit(&previous, &current, "idx").unwrap();
        let sql: Vec<&str> = cs.up().iter().map(|op| op.sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "DROP INDEX IF EXISTS \"idx_users_id\"",
                "CREATE UNIQUE INDEX \"idx_users_email\" ON \"users\" (\"email\")",
            ]
        );
    }

    fn indexed_table(with_x: bool) -> Schema {
        let mut table = Table::new("t")
            .unwrap()
            .column(Column::new("id", "int").unwrap().primary_key())
            .unwrap();
        if with_x {
            table = table
                .column(Column::new("x", "int").unwrap())
                .unwrap()
                .index(Index::new("idx_t_x", "t", vec!["x".into()]).unwrap())
                .unwrap();
        }
        Schema::new().table(table).unwrap()
    }

    #[test]
    fn test_indexed_column_dropped_with_its_index() {
        for name in ["postgres", "sqlite"] {
            let emitter = ChangeSetEmitter::new(&DialectRegistry::with_builtin(), name).unwrap();
            let cs = emitter
                .emit(&indexed_table(true), &indexed_table(false), "drop_x")
                .unwrap();
            assert_eq!(
                targets(cs.up()),
                vec!["index idx_t_x", "drop column t.x"],
                "{name}"
            );
            assert_eq!(
                targets(cs.down()),
                vec!["add column t.x", "index idx_t_x"],
                "{name}"
            );
            assert_eq!(cs.down()[1].kind, OperationKind::Create);
        }
    }

    #[test]
    fn test_indexed_column_added_with_its_index() {
        let cs = emitter()
            .emit(&indexed_table(false), &indexed_table(true), "add_x")
            .unwrap();
        assert_eq!(targets(cs.up()), vec!["add column t.x", "index idx_t_x"]);
        assert_eq!(targets(cs.down()), vec!["index idx_t_x", "drop column t.x"]);
        assert_eq!(cs.down()[0].kind, OperationKind::Drop);
    }

    #[test]
    fn test_dropped_table_restores_its_indexes() {
        let mut previous = indexed_table(true);
        previous
            .add_index(Index::new("idx_t_id_x", "t", vec!["id".into(), "x".into()]).unwrap())
            .unwrap();

        let cs = emitter().emit(&previous, &Schema::new(), "drop_t").unwrap();
        let up: Vec<&str> = cs.up().iter().map(|op| op.sql.as_str()).collect();
        assert_eq!(up, vec!["DROP TABLE IF EXISTS \"t\""]);

        assert_eq!(
            targets(cs.down()),
            vec!["table t", "index idx_t_x", "index idx_t_id_x"]
        );
        assert_eq!(
            cs.down()[1].sql,
            "CREATE INDEX \"idx_t_x\" ON \"t\" (\"x\")"
        );
        assert!(cs.down().iter().all(|op| op.kind == OperationKind::Create));
    }

    #[test]
    fn test_default_changes() {
        let with_default = |default: Option<&str>| {
            let mut column = Column::new("active", "bool").unwrap();
            column.default = default.map(str::to_string);
            Schema::new()
                .table(
                    Table::new("users")
                        .unwrap()
                        .column(Column::new("id", "serial").unwrap().primary_key())
                        .unwrap()
                        .column(column)
                        .unwrap(),
                )
                .unwrap()
        };

        let cs = emitter()
            .emit(&with_default(Some("false")), &with_default(Some("true")), "d")
            .unwrap();
        let up: Vec<&str> = cs.up().iter().map(|op| op.sql.as_str()).collect();
        let down: Vec<&str> = cs.down().iter().map(|op| op.sql.as_str()).collect();
        assert_eq!(
            up,
            vec!["ALTER TABLE \"users\" ALTER COLUMN \"active\" SET DEFAULT true"]
        );
        assert_eq!(
            down,
            vec!["ALTER TABLE \"users\" ALTER COLUMN \"active\" SET DEFAULT false"]
        );

        let cs = emitter()
            .emit(&with_default(Some("true")), &with_default(None), "d")
            .unwrap();
        assert_eq!(
            cs.up()[0].sql,
            "ALTER TABLE \"users\" ALTER COLUMN \"active\" DROP DEFAULT"
        );

        let spaced = emitter()
            .emit(&with_default(Some("true")), &with_default(Some("  true ")), "d")
            .unwrap();
        assert!(spaced.is_noop());
    }

    #[test]
    fn test_sqlite_refuses_default_change() {
        let emitter = ChangeSetEmitter::new(&DialectRegistry::with_builtin(), "sqlite").unwrap();
        let column = |default: &str| Column::new("n", "int").unwrap().default_expr(default);
        let schema = |default: &str| {
            Schema::new()
                .table(Table::new("t").unwrap().column(column(default)).unwrap())
                .unwrap()
        };
        assert!(matches!(
            emitter.emit(&schema("0"), &schema("1"), "d"),
            Err(CollectError::UnsupportedObject { .. })
        ));
    }

    #[test]
    fn test_changed_index_is_recreated() {
        let with = |unique: bool| {
            let mut index = Index::new("idx_users_email", "users", vec!["email".into()]).unwrap();
            index.unique = unique;
            Schema::new()
                .table(users().index(index).unwrap())
                .unwrap()
        };
        let cs = emitter().emit(&with(false), &with(true), "idx").unwrap();
        assert_eq!(cs.up().len(), 2);
        assert_eq!(cs.up()[0].kind, OperationKind::Drop);
        assert_eq!(cs.up()[1].kind, OperationKind::Create);
    }

    #[test]
    fn test_invalid_schema_aborts() {
        let current = Schema::new()
            .table(
                Table::new("areas")
                    .unwrap()
                    .column(Column::new("shape", "geometry").unwrap())
                    .unwrap(),
            )
            .unwrap();
        assert!(matches!(
            emitter().emit(&Schema::new(), &current, "bad"),
            Err(CollectError::UnmappedType { .. })
        ));
    }

    #[test]
    fn test_cycle_aborts() {
        let a = Table::new("a")
            .unwrap()
            .column(Column::new("id", "int").unwrap().primary_key())
            .unwrap()
            .column(
                Column::new("b_id", "int")
                    .unwrap()
                    .references(ForeignKeyConstraint::new("b", "id").unwrap()),
            )
            .unwrap();
        let b = Table::new("b")
            .unwrap()
            .column(Column::new("id", "int").unwrap().primary_key())
            .unwrap()
            .column(
                Column::new("a_id", "int")
                    .unwrap()
                    .references(ForeignKeyConstraint::new("a", "id").unwrap()),
            )
            .unwrap();
        let current = Schema::new().table(a).unwrap().table(b).unwrap();
        assert!(matches!(
            emitter().emit(&Schema::new(), &current, "cycle"),
            Err(CollectError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_sqlite_refuses_type_change() {
        let emitter = ChangeSetEmitter::with_dialect(Arc::new(SqliteDialect::new()));
        let previous = Schema::new()
            .table(
                Table::new("t")
                    .unwrap()
                    .column(Column::new("n", "int").unwrap())
                    .unwrap(),
            )
            .unwrap();
        let current = Schema::new()
            .table(
                Table::new("t")
                    .unwrap()
                    .column(Column::new("n", "text").unwrap())
                    .unwrap(),
            )
            .unwrap();
        assert!(matches!(
            emitter.emit(&previous, &current, "retype"),
            Err(CollectError::UnsupportedObject { .. })
        ));
    }

    #[test]
    fn test_unknown_dialect() {
        assert!(matches!(
            ChangeSetEmitter::new(&DialectRegistry::new(), "postgres"),
            Err(CollectError::UnknownDialect(_))
        ));
    }

    #[test]
    fn test_hash_is_stable_and_order_sensitive() {
        let current = Schema::new().table(users()).unwrap().table(roles()).unwrap();
        let emitter = ChangeSetEmitter::with_dialect(Arc::new(PostgresDialect::new()));
        let first = emitter.emit(&Schema::new(), &current, "a").unwrap();
        let second = emitter.emit(&Schema::new(), &current, "b").unwrap();
        assert_eq!(first.hash(), second.hash());
        assert!(second.matches_hash(&first.hash().to_uppercase()));

        let swapped = Schema::new().table(roles()).unwrap().table(users()).unwrap();
        let third = emitter.emit(&Schema::new(), &swapped, "c").unwrap();
        assert_ne!(first.hash(), third.hash());
    }

    #[test]
    fn test_populate_only_once() {
        let op = DdlOperation {
            kind: OperationKind::Create,
            target: "table t".to_string(),
            sql: "CREATE TABLE \"t\" (\n    \"id\" integer\n)".to_string(),
        };
        let mut cs = ChangeSet::empty("v1");
        assert!(cs.is_noop());
        cs.populate(vec![op.clone()], Vec::new()).unwrap();
        assert_eq!(cs.hash(), content_hash(&[op.clone()]));
        assert!(matches!(
            cs.populate(vec![op], Vec::new()),
            Err(CollectError::InvalidState(_))
        ));
    }

    #[test]
    fn test_changeset_serializes() {
        let current = Schema::new().table(users()).unwrap();
        let cs = emitter().emit(&Schema::new(), &current, "json").unwrap();
        let json = serde_json::to_string(&cs).unwrap();
        let back: ChangeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cs);
    }
}
