//! Lookup of known organizations.
//!
//! Organization identity lives outside the trust engine. The engine only
//! asks whether an identifier names a real organization before it creates
//! relationships or memberships for it.

use std::collections::HashSet;

/// Answers whether an organization identifier is known.
pub trait OrgDirectory: Send + Sync {
    fn org_exists(&self, org_id: &str) -> bool;
}

/// Accepts every non-empty identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOrgDirectory;

impl OrgDirectory for OpenOrgDirectory {
    fn org_exists(&self, org_id: &str) -> bool {
        !org_id.trim().is_empty()
    }
}

/// A fixed set of organization identifiers.
#[derive(Debug, Clone, Default)]
pub struct StaticOrgDirectory {
    orgs: HashSet<String>,
}

impl StaticOrgDirectory {
    pub fn new<I, S>(orgs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            orgs: orgs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn insert(&mut self, org_id: impl Into<String>) {
        self.orgs.insert(org_id.into());
    }
}

impl OrgDirectory for StaticOrgDirectory {
    fn org_exists(&self, org_id: &str) -> bool {
        self.orgs.contains(org_id)
    }
}
