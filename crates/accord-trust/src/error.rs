use serde::{Deserialize, Serialize};

/// Coarse classification of a failure, stable across error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    InvalidState,
    PermissionDenied,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::PermissionDenied => "permission_denied",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by trust lifecycle and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// The request is malformed (e.g. a relationship from an org to itself).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An organization, relationship, trust level or group does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The requested transition is illegal from the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The caller is not allowed to perform the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrustError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Internal(_) | Self::Database(_) | Self::Pool(_) | Self::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Maps a stored label that fails to parse into a row conversion error.
pub(crate) fn label_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}
