//! Example: Blog Application Schema Collection
//!
//! Three modules each declare their own tables. The example parses them,
//! emits the initial migration, then emits a second migration after the
//! comments module gains a column and an index.
//!
//! Run with: cargo run --example collect_blog -p oxide-collect

use oxide_collect::prelude::*;
use oxide_collect::writer::{generate_migration_name, render_migration};

// =============================================================================
// Module Schemas
// =============================================================================

const COMMENTS: &str = "
CREATE TABLE comments (
    id bigserial PRIMARY KEY,
    post_id int NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    author_id int REFERENCES users(id) ON DELETE SET NULL,
    body text NOT NULL
);
";

const POSTS: &str = "
CREATE TABLE posts (
    id serial PRIMARY KEY,
    author_id int NOT NULL REFERENCES users(id),
    title varchar(200) NOT NULL,
    published boolean NOT NULL DEFAULT false
);
CREATE INDEX idx_posts_author ON posts (author_id);
";

const USERS: &str = "
CREATE TABLE users (
    id serial PRIMARY KEY,
    username varchar(100) NOT NULL UNIQUE,
    created_at timestamptz NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

fn load(parser: &SqlScriptParser, modules: &[(&str, &str)]) -> Result<Schema> {
    let mut schema = Schema::new();
    for (source, sql) in modules {
        parser.parse_script(sql, source, &mut schema)?;
    }
    Ok(schema)
}

fn print_changeset(changeset: &ChangeSet, timestamp: i64) {
    println!("=== {} ===", generate_migration_name(timestamp, changeset.version()));
    println!("{}", render_migration(changeset));
}

fn main() -> Result<()> {
    let parser = SqlScriptParser::new()?;
    let registry = DialectRegistry::with_builtin();

    // Modules are read in whatever order they are found.
    let v1 = load(
        &parser,
        &[("comments.sql", COMMENTS), ("posts.sql", POSTS), ("users.sql", USERS)],
    )?;

    for dialect in registry.names() {
        let emitter = ChangeSetEmitter::new(&registry, dialect)?;
        let changeset = emitter.emit(&Schema::new(), &v1, "initial")?;
        println!("--- {dialect} ---");
        print_changeset(&changeset, 1_700_000_000);
    }

    let edited = format!(
        "{COMMENTS}\nALTER TABLE comments ADD COLUMN edited_at timestamptz;\nCREATE INDEX idx_comments_post ON comments (post_id);"
    );
    let v2 = load(
        &parser,
        &[("comments.sql", &edited), ("posts.sql", POSTS), ("users.sql", USERS)],
    )?;

    let emitter = ChangeSetEmitter::new(&registry, PostgresDialect::NAME)?;
    let changeset = emitter.emit(&v1, &v2, "comment_edits")?;
    print_changeset(&changeset, 1_700_000_100);

    let unchanged = emitter.emit(&v2, &v2, "nothing")?;
    println!("Re-running on an unchanged schema is a no-op: {}", unchanged.is_noop());

    Ok(())
}
