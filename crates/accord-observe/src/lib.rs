//! Audit log for the Accord trust engine.
//!
//! Every trust lifecycle transition (successful or refused) and every access
//! decision is recorded in the append-only `trust_log` table. Entries are
//! never updated; deletion is left to external retention tooling.
//!
//! # Actions
//!
//! | Area | Actions |
//! |------|---------|
//! | Trust levels | `trust_level_created`, `trust_level_updated`, `trust_level_deleted` |
//! | Relationships | `relationship_created`, `relationship_approval_partial`, `relationship_activated`, `relationship_suspended`, `relationship_reinstated`, `relationship_revoked` |
//! | Groups | `group_created`, `group_joined`, `group_left` |
//! | Decisions | `access_evaluated`, `record_anonymized` |
//!
//! # Usage
//!
//! ```rust,ignore
//! use accord_observe::{append_or_warn, LogDraft, TrustAction};
//!
//! let draft = LogDraft::new(TrustAction::RelationshipCreated, "analyst@org-a")
//!     .orgs("org-a", "org-b")
//!     .relationship(&relationship.id);
//! let degraded = append_or_warn(sink, draft).is_none();
//! ```

mod entry;
mod error;
mod sink;
mod store;

pub use entry::{LogDraft, ParseTrustActionError, TrustAction, TrustLogEntry};
pub use error::ObserveError;
pub use sink::{append_or_warn, AuditSink, AuditTrail, MemoryAuditSink, PoolAuditSink};
pub use store::{append_entry, query_log, LogFilter};

#[cfg(test)]
mod tests;
