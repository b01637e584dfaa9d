//! The materialized input to every access decision.

use accord_trust::{ResolvedTrust, TrustResolution};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Everything a strategy may consult. Built once per request; strategies
/// never reach back into storage.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub requesting_org: String,
    pub target_org: String,
    /// Kind of object being requested (e.g. `indicator`).
    pub resource_kind: String,
    /// The primary relationship between the two organizations, if any.
    pub relationship: Option<ResolvedTrust>,
    /// Trust derived from groups both organizations belong to.
    pub group_trust: Vec<ResolvedTrust>,
    /// Reference time for validity checks.
    pub now: DateTime<Utc>,
    /// Free-form caller hints (e.g. `data_retention_days`).
    pub hints: Map<String, Value>,
}

impl AccessContext {
    pub fn new(requesting_org: &str, target_org: &str, resource_kind: &str) -> Self {
        Self {
            requesting_org: requesting_org.to_string(),
            target_org: target_org.to_string(),
            resource_kind: resource_kind.to_string(),
            relationship: None,
            group_trust: Vec::new(),
            now: Utc::now(),
            hints: Map::new(),
        }
    }

    /// Pins the reference time. Call before [`Self::with_resolution`] when
    /// evaluating at a time other than now.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Takes the primary relationship and the group-derived trusts from a
    /// resolution.
    pub fn with_resolution(mut self, resolution: TrustResolution) -> Self {
        self.relationship = resolution.primary(self.now).cloned();
        self.group_trust = resolution.via_groups;
        self
    }

    pub fn with_relationship(mut self, trust: ResolvedTrust) -> Self {
        self.relationship = Some(trust);
        self
    }

    pub fn with_group_trust(mut self, trust: ResolvedTrust) -> Self {
        self.group_trust.push(trust);
        self
    }

    pub fn with_hints(mut self, hints: Map<String, Value>) -> Self {
        self.hints.extend(hints);
        self
    }

    pub fn with_hint(mut self, key: &str, value: Value) -> Self {
        self.hints.insert(key.to_string(), value);
        self
    }

    /// The primary relationship followed by every group-derived trust not
    /// already listed.
    pub fn candidates(&self) -> impl Iterator<Item = &ResolvedTrust> {
        let primary_id = self.relationship.as_ref().map(|r| r.relationship.id.as_str());
        self.relationship.iter().chain(
            self.group_trust
                .iter()
                .filter(move |t| Some(t.relationship.id.as_str()) != primary_id),
        )
    }

    /// Reads a numeric hint, accepting numbers and numeric strings.
    pub fn numeric_hint(&self, key: &str) -> Option<i64> {
        match self.hints.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
