//! Trust lifecycle for the Accord engine.
//!
//! This crate owns the durable trust records and every operation that
//! changes them:
//!
//! - **Trust levels**: named tiers with a strength in `[0, 100]` and default
//!   access/anonymization settings.
//! - **Relationships**: the `pending → active ⇄ suspended → revoked` state
//!   machine between two organizations.
//! - **Groups**: multilateral trust through shared active membership.
//! - **Resolution**: reads everything a decision may consult about a pair
//!   of organizations before any policy runs.
//!
//! All operations are free functions over a `rusqlite::Connection`. Each
//! mutation records a trust log entry through an
//! [`accord_observe::AuditTrail`], including refused attempts.

mod directory;
mod error;
mod groups;
mod levels;
mod lifecycle;
mod locks;
mod relationship;
mod resolve;

pub use directory::{OpenOrgDirectory, OrgDirectory, StaticOrgDirectory};
pub use error::{ErrorKind, TrustError};
pub use groups::{
    create_group, get_group, group_administrators, is_group_admin, join_group, leave_group,
    list_group_members, list_groups, shared_groups, GroupMembership, NewTrustGroup, TrustGroup,
};
pub use levels::{
    create_trust_level, delete_trust_level, get_trust_level, get_trust_level_by_name,
    list_trust_levels, seed_system_levels, update_trust_level_description,
    update_trust_level_policy, NewTrustLevel, TrustLevel, TrustLevelPolicyUpdate,
};
pub use lifecycle::{
    approve_relationship, create_relationship, find_relationship, get_relationship,
    list_relationships_for, reinstate_relationship, revoke_relationship, suspend_relationship,
    NewRelationship,
};
pub use locks::RelationshipLocks;
pub use relationship::TrustRelationship;
pub use resolve::{
    best_of, resolve_trust, GroupRef, ResolvedTrust, TrustResolution, GROUP_TRUST_PREFIX,
};
