//! Error types for the audit log.

/// Errors that can occur during trust log operations.
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    /// A database operation failed.
    #[error("audit database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No connection could be checked out of the pool.
    #[error("audit pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization or deserialization failed.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The sink cannot accept entries (e.g. a poisoned lock).
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}
