//! Error types for record anonymization.

/// Errors that can occur while configuring or applying anonymization.
#[derive(Debug, thiserror::Error)]
pub enum AnonymizeError {
    /// Records must be JSON objects.
    #[error("record is not an object: found {0}")]
    NotAnObject(&'static str),

    /// A custom rule set names an unusable base level.
    #[error("invalid custom base level: {0}")]
    InvalidBase(String),

    /// A rule action label is not `remove`, `hash` or `mask`.
    #[error("unknown field action: {0}")]
    UnknownAction(String),
}
