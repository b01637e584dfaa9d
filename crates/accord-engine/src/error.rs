//! Error type returned by every engine operation.

use accord_anonymize::AnonymizeError;
use accord_observe::ObserveError;
use accord_trust::{ErrorKind, TrustError};
use serde_json::{json, Value};

use crate::config::ConfigError;

/// Engine failures, classified by the same taxonomy as [`TrustError`].
///
/// Access denial is never an error; it is a `Decision` with
/// `allowed == false`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Storage, pool or configuration failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The error as `{"kind": ..., "message": ...}`.
    pub fn to_json(&self) -> Value {
        json!({ "kind": self.kind(), "message": self.to_string() })
    }
}

impl From<TrustError> for EngineError {
    fn from(err: TrustError) -> Self {
        match err {
            TrustError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            TrustError::NotFound(msg) => Self::NotFound(msg),
            TrustError::InvalidState(msg) => Self::InvalidState(msg),
            TrustError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            TrustError::Internal(msg) => Self::Internal(msg),
            other => {
                tracing::error!(error = %other, "trust storage failure");
                Self::Internal(other.to_string())
            }
        }
    }
}

impl From<AnonymizeError> for EngineError {
    fn from(err: AnonymizeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<ObserveError> for EngineError {
    fn from(err: ObserveError) -> Self {
        tracing::error!(error = %err, "audit log failure");
        Self::Internal(err.to_string())
    }
}

impl From<r2d2::Error> for EngineError {
    fn from(err: r2d2::Error) -> Self {
        tracing::error!(error = %err, "connection pool exhausted");
        Self::Internal(format!("connection pool: {err}"))
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<accord_db::PoolError> for EngineError {
    fn from(err: accord_db::PoolError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<accord_db::MigrationError> for EngineError {
    fn from(err: accord_db::MigrationError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_errors_keep_their_kind() {
        let cases = [
            TrustError::InvalidArgument("same org".into()),
            TrustError::NotFound("relationship x".into()),
            TrustError::InvalidState("already revoked".into()),
            TrustError::PermissionDenied("not a party".into()),
            TrustError::Database(rusqlite::Error::InvalidQuery),
        ];
        for err in cases {
            let kind = err.kind();
            assert_eq!(EngineError::from(err).kind(), kind);
        }
    }

    #[test]
    fn json_shape() {
        let err = EngineError::NotFound("trust level 'gold'".into());
        let value = err.to_json();
        assert_eq!(value["kind"], "not_found");
        assert_eq!(value["message"], "not found: trust level 'gold'");
    }
}
