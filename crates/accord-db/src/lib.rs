//! Database layer for the Accord trust engine.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Trust levels, relationships, groups,
//! memberships, and the trust log are all created through versioned
//! migrations managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: concurrent readers with a single writer,
//!   which matches the engine's access pattern (many evaluations, few
//!   lifecycle transitions).
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so the schema ships with the code that depends on it.

mod migrations;
mod pool;
mod timestamp;

pub use migrations::{run_migrations, schema_version, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError, PooledConnection};
pub use timestamp::{
    format_timestamp, now_timestamp, parse_optional_timestamp, parse_timestamp, truncate_timestamp,
};
