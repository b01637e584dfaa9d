//! Versioned schema migrations.
//!
//! Each migration carries a version number; `_accord_migrations` records the
//! versions applied so far and `run_migrations` applies every version above
//! the highest recorded one, oldest first. A migration and its tracking row
//! commit together, so a failure leaves the schema at the previous version.

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version. Append only; never renumber.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "trust_levels",
        sql: include_str!("migrations/000_trust_levels.sql"),
    },
    Migration {
        version: 2,
        name: "trust_groups",
        sql: include_str!("migrations/001_trust_groups.sql"),
    },
    Migration {
        version: 3,
        name: "trust_relationships",
        sql: include_str!("migrations/002_trust_relationships.sql"),
    },
    Migration {
        version: 4,
        name: "trust_log",
        sql: include_str!("migrations/003_trust_log.sql"),
    },
];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {version} ({name}) failed: {source}")]
    Failed {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot read schema version: {0}")]
    Version(#[source] rusqlite::Error),

    /// The database was written by a newer build.
    #[error("database schema version {found} is newer than this build ({known})")]
    TooNew { found: u32, known: u32 },
}

/// Brings the schema up to the latest version.
///
/// Returns how many migrations this call applied; zero when the schema is
/// already current.
///
/// # Errors
///
/// `MigrationError::Failed` names the first migration that did not apply.
/// `MigrationError::TooNew` if the database is ahead of this build.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply(conn, MIGRATIONS)
}

/// The highest applied version, or 0 for an empty database.
pub fn schema_version(conn: &Connection) -> Result<u32, MigrationError> {
    let tracked: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master
                           WHERE type = 'table' AND name = '_accord_migrations')",
            [],
            |row| row.get(0),
        )
        .map_err(MigrationError::Version)?;
    if !tracked {
        return Ok(0);
    }
    conn.query_row("SELECT MAX(version) FROM _accord_migrations", [], |row| {
        row.get::<_, Option<u32>>(0)
    })
    .optional()
    .map(|v| v.flatten().unwrap_or(0))
    .map_err(MigrationError::Version)
}

fn apply(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _accord_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );",
    )
    .map_err(MigrationError::Version)?;

    let current = schema_version(conn)?;
    let known = migrations.last().map_or(0, |m| m.version);
    if current > known {
        return Err(MigrationError::TooNew {
            found: current,
            known,
        });
    }

    let pending: Vec<&Migration> = migrations.iter().filter(|m| m.version > current).collect();
    for migration in &pending {
        let failed = |source| MigrationError::Failed {
            version: migration.version,
            name: migration.name,
            source,
        };
        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _accord_migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.name],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;
        tracing::info!(
            version = migration.version,
            migration = migration.name,
            "schema migrated"
        );
    }

    if pending.is_empty() {
        tracing::debug!(version = current, "schema up to date");
    }
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        Connection::open_in_memory().expect("should open in-memory db")
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .expect("should query sqlite_master")
    }

    #[test]
    fn empty_database_reaches_latest_version() {
        let conn = fresh();
        assert_eq!(schema_version(&conn).unwrap(), 0);

        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, MIGRATIONS.len());
        assert_eq!(schema_version(&conn).unwrap(), 4);

        for table in [
            "trust_levels",
            "trust_groups",
            "trust_group_memberships",
            "trust_relationships",
            "trust_log",
        ] {
            assert!(table_exists(&conn, table), "{table} should exist");
        }

        assert_eq!(run_migrations(&conn).expect("rerun"), 0);
    }

    #[test]
    fn only_newer_versions_are_applied() {
        let conn = fresh();
        assert_eq!(apply(&conn, &MIGRATIONS[..2]).unwrap(), 2);
        assert!(!table_exists(&conn, "trust_relationships"));

        assert_eq!(run_migrations(&conn).unwrap(), 2);
        assert!(table_exists(&conn, "trust_relationships"));
        assert!(table_exists(&conn, "trust_log"));
    }

    #[test]
    fn newer_schema_is_refused() {
        let conn = fresh();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO _accord_migrations (version, name) VALUES (99, 'future')",
            [],
        )
        .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(matches!(err, MigrationError::TooNew { found: 99, known: 4 }));
    }

    #[test]
    fn failed_migration_keeps_previous_version() {
        let conn = fresh();
        let migrations = [
            Migration {
                version: 1,
                name: "scratch",
                sql: "CREATE TABLE scratch (id INTEGER PRIMARY KEY);",
            },
            Migration {
                version: 2,
                name: "broken",
                sql: "CREATE TABLE half_done (id INTEGER); INSERT INTO missing VALUES (1);",
            },
        ];

        let err = apply(&conn, &migrations).unwrap_err();
        assert!(matches!(err, MigrationError::Failed { version: 2, .. }));
        assert_eq!(schema_version(&conn).unwrap(), 1);
        assert!(table_exists(&conn, "scratch"));
        assert!(!table_exists(&conn, "half_done"));
    }

    #[test]
    fn relationship_table_rejects_self_trust() {
        let conn = fresh();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO trust_levels (id, name, tier, strength, default_anonymization_level,
                default_access_level, created_by, created_at, updated_at)
             VALUES ('lvl', 'Standard', 'medium', 50, 'partial', 'read', 'admin',
                '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .expect("should insert level");

        let result = conn.execute(
            "INSERT INTO trust_relationships (id, source_org, target_org, relationship_kind,
                trust_level_id, status, valid_from, created_by, created_at, updated_at)
             VALUES ('rel', 'org-a', 'org-a', 'bilateral', 'lvl', 'pending',
                '2024-01-01T00:00:00Z', 'admin', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err(), "source == target must violate the CHECK");
    }

    #[test]
    fn trust_log_is_append_only() {
        let conn = fresh();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO trust_log (action, actor, success, occurred_at)
             VALUES ('relationship_created', 'admin', 1, '2024-01-01T00:00:00Z')",
            [],
        )
        .expect("should append");

        assert!(conn.execute("UPDATE trust_log SET success = 0", []).is_err());
    }
}
