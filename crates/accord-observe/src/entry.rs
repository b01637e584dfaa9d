//! Action, draft, and record types for the trust log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every action the engine records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustAction {
    // ── Trust levels ─────────────────────────────────────────────────
    TrustLevelCreated,
    TrustLevelUpdated,
    TrustLevelDeleted,

    // ── Relationships ────────────────────────────────────────────────
    RelationshipCreated,
    RelationshipApprovalPartial,
    RelationshipActivated,
    RelationshipSuspended,
    RelationshipReinstated,
    RelationshipRevoked,

    // ── Groups ───────────────────────────────────────────────────────
    GroupCreated,
    GroupJoined,
    GroupLeft,

    // ── Decisions ────────────────────────────────────────────────────
    AccessEvaluated,
    RecordAnonymized,
}

impl TrustAction {
    /// Returns the canonical action name stored in the `action` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrustLevelCreated => "trust_level_created",
            Self::TrustLevelUpdated => "trust_level_updated",
            Self::TrustLevelDeleted => "trust_level_deleted",
            Self::RelationshipCreated => "relationship_created",
            Self::RelationshipApprovalPartial => "relationship_approval_partial",
            Self::RelationshipActivated => "relationship_activated",
            Self::RelationshipSuspended => "relationship_suspended",
            Self::RelationshipReinstated => "relationship_reinstated",
            Self::RelationshipRevoked => "relationship_revoked",
            Self::GroupCreated => "group_created",
            Self::GroupJoined => "group_joined",
            Self::GroupLeft => "group_left",
            Self::AccessEvaluated => "access_evaluated",
            Self::RecordAnonymized => "record_anonymized",
        }
    }
}

impl std::fmt::Display for TrustAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrustAction {
    type Err = ParseTrustActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trust_level_created" => Ok(Self::TrustLevelCreated),
            "trust_level_updated" => Ok(Self::TrustLevelUpdated),
            "trust_level_deleted" => Ok(Self::TrustLevelDeleted),
            "relationship_created" => Ok(Self::RelationshipCreated),
            "relationship_approval_partial" => Ok(Self::RelationshipApprovalPartial),
            "relationship_activated" => Ok(Self::RelationshipActivated),
            "relationship_suspended" => Ok(Self::RelationshipSuspended),
            "relationship_reinstated" => Ok(Self::RelationshipReinstated),
            "relationship_revoked" => Ok(Self::RelationshipRevoked),
            "group_created" => Ok(Self::GroupCreated),
            "group_joined" => Ok(Self::GroupJoined),
            "group_left" => Ok(Self::GroupLeft),
            "access_evaluated" => Ok(Self::AccessEvaluated),
            "record_anonymized" => Ok(Self::RecordAnonymized),
            _ => Err(ParseTrustActionError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown action string.
#[derive(Debug, Clone)]
pub struct ParseTrustActionError(pub String);

impl std::fmt::Display for ParseTrustActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown trust action: {}", self.0)
    }
}

impl std::error::Error for ParseTrustActionError {}

/// An entry that has not been written yet.
///
/// Built with the chained setters and handed to an [`crate::AuditSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogDraft {
    pub action: TrustAction,
    pub source_org: Option<String>,
    pub target_org: Option<String>,
    pub relationship_id: Option<String>,
    pub actor: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub details: serde_json::Value,
}

impl LogDraft {
    /// Starts a successful entry with empty details.
    pub fn new(action: TrustAction, actor: &str) -> Self {
        Self {
            action,
            source_org: None,
            target_org: None,
            relationship_id: None,
            actor: actor.to_string(),
            success: true,
            failure_reason: None,
            details: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Sets the source and target organizations.
    pub fn orgs(mut self, source: &str, target: &str) -> Self {
        self.source_org = Some(source.to_string());
        self.target_org = Some(target.to_string());
        self
    }

    /// Sets only the source organization.
    pub fn source(mut self, source: &str) -> Self {
        self.source_org = Some(source.to_string());
        self
    }

    /// Links the entry to a relationship.
    pub fn relationship(mut self, relationship_id: &str) -> Self {
        self.relationship_id = Some(relationship_id.to_string());
        self
    }

    /// Replaces the structured details.
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Marks the entry as a refused or failed attempt.
    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.success = false;
        self.failure_reason = Some(reason.into());
        self
    }
}

/// A single row from the `trust_log` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustLogEntry {
    /// Auto-incremented row ID; returned to callers as the audit reference.
    pub id: i64,
    pub action: String,
    pub source_org: Option<String>,
    pub target_org: Option<String>,
    pub relationship_id: Option<String>,
    pub actor: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub details: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}
