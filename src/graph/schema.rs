//! Renders derived constraints as SQLite DDL and installs them.

use super::classify::SqliteResultExt;
use crate::config::Edition;
use crate::error::{PersistenceError, Result};
use crate::mapping::schema::{is_identifier, Constraint, ConstraintKind, SchemaRegistry, SchemaTarget};
use rusqlite::Connection;
use tracing::{debug, info};

/// Tables and structural indexes every graph needs, independent of the
/// entity registrations.
pub(crate) const BASE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS nodes (
        id INTEGER PRIMARY KEY,
        labels TEXT NOT NULL,
        properties TEXT NOT NULL DEFAULT '{}'
    );
    CREATE TABLE IF NOT EXISTS edges (
        id INTEGER PRIMARY KEY,
        source_id INTEGER NOT NULL REFERENCES nodes (id) ON DELETE CASCADE,
        target_id INTEGER NOT NULL REFERENCES nodes (id) ON DELETE CASCADE,
        type_name TEXT NOT NULL,
        properties TEXT NOT NULL DEFAULT '{}'
    );
    CREATE INDEX IF NOT EXISTS idx_edges_source ON edges (source_id, type_name);
    CREATE INDEX IF NOT EXISTS idx_edges_target ON edges (target_id, type_name);
    CREATE UNIQUE INDEX IF NOT EXISTS uniq_root_folder
        ON edges (source_id) WHERE type_name = 'HAS_ROOT_FOLDER';
    CREATE UNIQUE INDEX IF NOT EXISTS uniq_contains_name
        ON edges (source_id, json_extract(properties, '$.name')) WHERE type_name = 'CONTAINS';
    CREATE UNIQUE INDEX IF NOT EXISTS uniq_shared_target
        ON edges (source_id, target_id) WHERE type_name = 'CONTAINS_SHARED';
";

/// Table and row filter of `target`; `row` qualifies the columns (`NEW.` in
/// triggers).
fn scope(target: SchemaTarget, row: &str) -> (&'static str, String) {
    match target {
        SchemaTarget::Node(label) => ("nodes", format!("instr({row}labels, ':{label}:') > 0")),
        SchemaTarget::Edge(edge_type) => ("edges", format!("{row}type_name = '{edge_type}'")),
    }
}

/// DDL statements implementing `constraint`, all idempotent.
pub fn render(constraint: &Constraint) -> Result<Vec<String>> {
    let label = constraint.target.name();
    let property = constraint.property;
    if !is_identifier(label) || !is_identifier(property) {
        return Err(PersistenceError::invalid(format!(
            "cannot derive constraint for {label}.{property}"
        )));
    }
    let name = constraint.name();
    let (table, filter) = scope(constraint.target, "");
    let value = format!("json_extract(properties, '$.{property}')");
    let statements = match constraint.kind {
        ConstraintKind::Unique => vec![format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {name} ON {table} ({value}) WHERE {filter}"
        )],
        ConstraintKind::Index => vec![format!(
            "CREATE INDEX IF NOT EXISTS {name} ON {table} ({value}) WHERE {filter}"
        )],
        ConstraintKind::Existence => ["INSERT", "UPDATE"]
            .iter()
            .map(|event| {
                let (_, new_filter) = scope(constraint.target, "NEW.");
                format!(
                    "CREATE TRIGGER IF NOT EXISTS {name}_{suffix} BEFORE {event} ON {table} \
                     FOR EACH ROW WHEN {new_filter} \
                     AND json_extract(NEW.properties, '$.{property}') IS NULL \
                     BEGIN SELECT RAISE(ABORT, '{name}'); END",
                    suffix = event.to_ascii_lowercase(),
                )
            })
            .collect(),
    };
    Ok(statements)
}

/// Installs every constraint derived from `registry`. Returns how many were
/// processed; existing ones are left untouched.
pub(crate) fn install(conn: &Connection, registry: &SchemaRegistry, edition: Edition) -> Result<usize> {
    let constraints = registry.constraints(edition);
    for constraint in &constraints {
        for statement in render(constraint)? {
            conn.execute_batch(&statement).write()?;
        }
        debug!(constraint = %constraint, "constraint ensured");
    }
    info!(
        constraints = constraints.len(),
        edition = ?edition,
        "schema installed"
    );
    Ok(constraints.len())
}
