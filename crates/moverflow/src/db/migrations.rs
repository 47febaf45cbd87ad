//! Schema versioning.
//!
//! Each schema step is one embedded SQL script. Applied versions are
//! recorded in `_migrations`; a step and its record commit together, so a
//! crash mid-step leaves the database at the previous version.

use rusqlite::{params, Connection, Transaction, TransactionBehavior};

use super::error::DatabaseError;

/// (version, description, script). Versions are strictly increasing.
const STEPS: &[(u32, &str, &str)] = &[
    (
        1,
        "create_job_records_table",
        include_str!("sql/001_create_job_records.sql"),
    ),
    (
        2,
        "create_movers_table",
        include_str!("sql/002_create_movers.sql"),
    ),
    (
        3,
        "create_generation_stats_table",
        include_str!("sql/003_create_generation_stats.sql"),
    ),
];

/// Highest version this build knows about.
pub fn latest_version() -> u32 {
    STEPS.last().map(|(version, _, _)| *version).unwrap_or(0)
}

/// Version recorded in `_migrations`, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

/// Brings the schema up to [`latest_version`].
///
/// Refuses to open a database written by a newer build.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = current_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(DatabaseError::Migration {
            version: current,
            reason: format!("database schema is newer than this build (v{})", latest),
        });
    }

    for (version, description, script) in STEPS.iter().filter(|(v, _, _)| *v > current) {
        log::info!("Applying schema v{}: {}", version, description);

        let failed = |e: rusqlite::Error| DatabaseError::Migration {
            version: *version,
            reason: e.to_string(),
        };
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate).map_err(failed)?;
        tx.execute_batch(script).map_err(failed)?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            params![version, description],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;
    }

    Ok(())
}
