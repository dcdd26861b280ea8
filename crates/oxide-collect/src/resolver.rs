//! Foreign-key dependency ordering of tables.
//!
//! Tables without foreign keys go first, in input order. The remaining tables
//! are appended pass by pass, each pass taking (in input order) every table
//! whose references are all already placed. A pass that places nothing means
//! the leftovers reference each other.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{CollectError, Result};
use crate::schema::Table;

/// Orders `tables` so every table follows the tables it references.
///
/// A table referencing itself does not depend on anything else. A reference to
/// a table outside `tables` is a [`CollectError::DanglingReference`]; tables left
/// over once no pass makes progress are a [`CollectError::CircularDependency`].
pub fn sort_tables(tables: &[Table]) -> Result<Vec<&Table>> {
    let known: HashSet<&str> = tables.iter().map(Table::name).collect();
    for table in tables {
        for (column, fk) in table.foreign_keys() {
            if !known.contains(fk.table.as_str()) {
                return Err(CollectError::DanglingReference {
                    table: table.name().to_string(),
                    column: column.name().to_string(),
                    referenced: fk.table.clone(),
                });
            }
        }
    }

    let mut ordered: Vec<&Table> = Vec::with_capacity(tables.len());
    let mut placed: HashSet<&str> = HashSet::with_capacity(tables.len());
    let mut processed = vec![false; tables.len()];

    // Phase 1: tables without foreign keys.
    for (idx, table) in tables.iter().enumerate() {
        if !table.has_foreign_keys() {
            ordered.push(table);
            placed.insert(table.name());
            processed[idx] = true;
        }
    }

    // Phase 2: at most one pass per table; each useful pass places one or more.
    let mut passes = 0;
    while ordered.len() < tables.len() && passes < tables.len() {
        passes += 1;
        let before = ordered.len();

        for (idx, table) in tables.iter().enumerate() {
            if processed[idx] {
                continue;
            }
            let ready = table
                .foreign_keys()
                .all(|(_, fk)| fk.table == table.name() || placed.contains(fk.table.as_str()));
            if ready {
                ordered.push(table);
                placed.insert(table.name());
                processed[idx] = true;
            }
        }

        if ordered.len() == before {
            break;
        }
    }

    if ordered.len() < tables.len() {
        let unresolved: Vec<String> = tables
            .iter()
            .zip(&processed)
            .filter(|(_, done)| !**done)
            .map(|(t, _)| t.name().to_string())
            .collect();
        return Err(CollectError::CircularDependency { tables: unresolved });
    }

    debug!("Ordered {} tables in {} dependency passes", ordered.len(), passes);
    Ok(ordered)
}
