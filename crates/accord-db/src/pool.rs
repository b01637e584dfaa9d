//! File-backed SQLite pool shared by the engine and the audit sink.
//!
//! Audit appends check out their own connection, so every connection in the
//! pool must see the same database. That rules out `:memory:` paths, which
//! give each connection a private database; `create_pool` refuses them.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Connection tuning applied to every pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Upper bound on open connections. Must be at least 2 so an audit
    /// append can proceed next to a long read.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("database path must name a file, got {0:?}")]
    NotAFile(String),

    #[error("pool_max_size must be at least 2, got {0}")]
    TooSmall(u32),

    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Puts a fresh connection into WAL mode with foreign keys enforced.
fn prepare_connection(conn: &mut Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if !journal_mode.eq_ignore_ascii_case("wal") {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("journal_mode is {journal_mode}, expected wal")),
        ));
    }
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {busy_timeout_ms};"
    ))
}

/// Opens (creating if needed) the database at `db_path` behind a pool.
///
/// # Errors
///
/// - `PoolError::NotAFile` for a blank or `:memory:` path.
/// - `PoolError::TooSmall` when the pool could not serve a decision and its
///   audit append at the same time.
/// - `PoolError::PoolInit` when the first connections cannot be opened.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let trimmed = db_path.trim();
    if trimmed.is_empty() || trimmed == ":memory:" || trimmed.starts_with("file::memory:") {
        return Err(PoolError::NotAFile(db_path.to_string()));
    }
    if settings.pool_max_size < 2 {
        return Err(PoolError::TooSmall(settings.pool_max_size));
    }

    let busy_timeout_ms = settings.busy_timeout_ms;
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(move |conn| prepare_connection(conn, busy_timeout_ms));

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;
    tracing::debug!(
        path = db_path,
        max_size = settings.pool_max_size,
        "database pool ready"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn pooled_connections_are_tuned() {
        let file = NamedTempFile::new().expect("temp file");
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
        };
        let pool = create_pool(file.path().to_str().expect("utf-8 path"), settings)
            .expect("pool creation should succeed");
        assert_eq!(pool.max_size(), 3);

        let conn = pool.get().expect("connection");
        let pragma = |name: &str| -> String {
            conn.query_row(&format!("PRAGMA {name};"), [], |row| {
                row.get::<_, rusqlite::types::Value>(0)
            })
            .map(|value| match value {
                rusqlite::types::Value::Integer(n) => n.to_string(),
                rusqlite::types::Value::Text(s) => s,
                other => format!("{other:?}"),
            })
            .expect("pragma")
        };
        assert_eq!(pragma("journal_mode"), "wal");
        assert_eq!(pragma("foreign_keys"), "1");
        assert_eq!(pragma("busy_timeout"), "2500");
    }

    #[test]
    fn in_memory_and_blank_paths_are_refused() {
        for path in [":memory:", "  ", "file::memory:?cache=shared"] {
            let err = create_pool(path, DbRuntimeSettings::default()).unwrap_err();
            assert!(matches!(err, PoolError::NotAFile(_)), "{path}: {err}");
        }
    }

    #[test]
    fn single_connection_pool_is_refused() {
        let file = NamedTempFile::new().expect("temp file");
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 100,
            pool_max_size: 1,
        };
        let err = create_pool(file.path().to_str().expect("utf-8 path"), settings).unwrap_err();
        assert!(matches!(err, PoolError::TooSmall(1)));
    }
}
