//! Schema migrations for the review store
//!
//! Migrations run in version order. Each one records its own row in
//! `schema_migrations`, so reopening a database only runs what is new.

use rusqlite::Connection;
use thiserror::Error;

/// Migration errors
#[derive(Debug, Error)]
pub enum MigrationError {
    /// SQLite error during migration
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database was written by a newer revcap
    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version recorded in the database
        found: i32,
        /// Highest version this build knows
        supported: i32,
    },
}

/// Schema version this build writes
pub const SCHEMA_VERSION: i32 = 1;

/// One schema step
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version reached once applied
    pub version: i32,
    /// Recorded in `schema_migrations`
    pub name: &'static str,
    /// Statements to run
    pub sql: &'static str,
}

/// Review-store schema history, oldest first
pub static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "reviews_and_changesets",
    sql: include_str!("schema.sql"),
}];

/// Highest applied version, 0 for a fresh database
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn schema_version(conn: &Connection) -> Result<i32, MigrationError> {
    let tracked: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations')",
        [],
        |row| row.get(0),
    )?;
    if !tracked {
        return Ok(0);
    }
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?)
}

/// Bring the schema up to [`SCHEMA_VERSION`], returning the versions run
///
/// # Errors
///
/// Returns an error if a step fails or the database is newer than this build.
pub fn migrate(conn: &Connection) -> Result<Vec<i32>, MigrationError> {
    let found = schema_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(MigrationError::UnsupportedVersion {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > found).collect();
    for step in &pending {
        tracing::debug!(version = step.version, name = step.name, "running schema step");
        conn.execute_batch(&format!("BEGIN;\n{}\nCOMMIT;", step.sql))?;
    }
    Ok(pending.iter().map(|m| m.version).collect())
}

/// Whether every known step has been applied
#[must_use]
pub fn is_current(conn: &Connection) -> bool {
    matches!(schema_version(conn), Ok(v) if v >= SCHEMA_VERSION)
}
