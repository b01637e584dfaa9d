//! Access decisions for the Accord trust engine.
//!
//! Decision logic here is pure: an [`AccessContext`] is built from a fully
//! materialized [`accord_trust::TrustResolution`] before any strategy runs,
//! and strategies never touch storage. The only side effect is the audit
//! decorator's append.
//!
//! - [`AccessStrategy`] implementations decide whether one relationship
//!   grants access and at which [`accord_types::AccessLevel`].
//! - [`PolicyContext`] combines strategies with AND semantics.
//! - The decorators in [`decorators`] annotate a [`Decision`] with security,
//!   compliance and audit metadata without ever widening it.

mod context;
pub mod decorators;
mod evaluation;
mod strategy;

#[cfg(test)]
mod fixtures;

pub use context::AccessContext;
pub use decorators::{
    is_sensitive_key, redact_sensitive, with_audit, with_compliance, with_security, AuditDecorator,
    AuditLevel, ComplianceDecorator, SecurityEnhancementDecorator, SecuritySettings,
};
pub use evaluation::{Decision, Evaluator, PolicyContext, NO_ACCESS_GRANTED};
pub use strategy::{
    AccessStrategy, CommunityAccessStrategy, TimeBasedAccessStrategy, TrustLevelAccessStrategy,
    Verdict,
};
