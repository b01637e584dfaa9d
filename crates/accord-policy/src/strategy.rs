//! Access control strategies.
//!
//! Each strategy is a predicate over an [`AccessContext`] plus the access
//! level it would grant. Reason strings are matched by callers, so the
//! fragments `no trust relationship`, `relationship not effective`,
//! `too low`, `not a community-based relationship`, `not yet valid` and
//! `expired` must stay literal and lower-case.

use accord_trust::{best_of, ResolvedTrust};
use accord_types::{AccessLevel, RelationshipKind};
use serde::{Deserialize, Serialize};

use crate::context::AccessContext;

/// Outcome of a single strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: String,
}

impl Verdict {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// A pluggable access predicate.
pub trait AccessStrategy: Send + Sync {
    /// Short identifier used to prefix reasons.
    fn name(&self) -> &'static str;

    fn can_access(&self, ctx: &AccessContext) -> Verdict;

    /// The level this strategy grants; `none` whenever it denies.
    fn access_level(&self, ctx: &AccessContext) -> AccessLevel;
}

/// Requires an effective primary relationship whose trust level is at
/// least `minimum_strength`.
#[derive(Debug, Clone, Copy)]
pub struct TrustLevelAccessStrategy {
    pub minimum_strength: u8,
}

impl TrustLevelAccessStrategy {
    pub fn new(minimum_strength: u8) -> Self {
        Self { minimum_strength }
    }
}

impl AccessStrategy for TrustLevelAccessStrategy {
    fn name(&self) -> &'static str {
        "trust_level"
    }

    fn can_access(&self, ctx: &AccessContext) -> Verdict {
        let Some(trust) = &ctx.relationship else {
            return Verdict::deny("no trust relationship");
        };
        if !trust.is_effective(ctx.now) {
            return Verdict::deny(not_effective(trust, ctx));
        }
        if trust.strength() < self.minimum_strength {
            return Verdict::deny(format!(
                "trust level too low: '{}' has strength {} (minimum {})",
                trust.trust_level.name,
                trust.strength(),
                self.minimum_strength
            ));
        }
        Verdict::allow(format!(
            "trust level '{}' (strength {}) meets minimum {}",
            trust.trust_level.name,
            trust.strength(),
            self.minimum_strength
        ))
    }

    fn access_level(&self, ctx: &AccessContext) -> AccessLevel {
        match &ctx.relationship {
            Some(trust) if self.can_access(ctx).allowed => trust.effective_access_level(),
            _ => AccessLevel::None,
        }
    }
}

/// Grants access only through community trust: a community relationship or
/// shared group membership. Bilateral trust never satisfies it, however
/// strong. Only groups both organizations belong to are considered.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommunityAccessStrategy;

impl CommunityAccessStrategy {
    fn select<'a>(&self, ctx: &'a AccessContext) -> Result<&'a ResolvedTrust, Verdict> {
        if ctx.requesting_org.is_empty() || ctx.target_org.is_empty() {
            return Err(Verdict::deny(
                "requesting and target organizations are required",
            ));
        }

        let community = ctx
            .candidates()
            .filter(|t| t.relationship.kind == RelationshipKind::Community);
        if let Some(best) = best_of(community, ctx.now) {
            return Ok(best);
        }

        if ctx.candidates().any(|t| t.is_effective(ctx.now)) {
            return Err(Verdict::deny("not a community-based relationship"));
        }
        match ctx.candidates().next() {
            Some(trust) => Err(Verdict::deny(not_effective(trust, ctx))),
            None => Err(Verdict::deny("no trust relationship")),
        }
    }
}

impl AccessStrategy for CommunityAccessStrategy {
    fn name(&self) -> &'static str {
        "community"
    }

    fn can_access(&self, ctx: &AccessContext) -> Verdict {
        match self.select(ctx) {
            Ok(trust) => match &trust.group {
                Some(group) => {
                    Verdict::allow(format!("community trust via group '{}'", group.name))
                }
                None => Verdict::allow(format!(
                    "community relationship {}",
                    trust.relationship.id
                )),
            },
            Err(verdict) => verdict,
        }
    }

    fn access_level(&self, ctx: &AccessContext) -> AccessLevel {
        self.select(ctx)
            .map(ResolvedTrust::effective_access_level)
            .unwrap_or(AccessLevel::None)
    }
}

/// Requires `now` to fall inside the primary relationship's validity
/// window.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeBasedAccessStrategy;

impl AccessStrategy for TimeBasedAccessStrategy {
    fn name(&self) -> &'static str {
        "time_based"
    }

    fn can_access(&self, ctx: &AccessContext) -> Verdict {
        let Some(trust) = &ctx.relationship else {
            return Verdict::deny("no trust relationship");
        };
        let rel = &trust.relationship;
        if ctx.now < rel.valid_from {
            return Verdict::deny(format!("not yet valid (valid from {})", rel.valid_from));
        }
        if let Some(until) = rel.valid_until {
            if ctx.now > until {
                return Verdict::deny(format!("expired (valid until {until})"));
            }
        }
        Verdict::allow("within validity window")
    }

    fn access_level(&self, ctx: &AccessContext) -> AccessLevel {
        match &ctx.relationship {
            Some(trust) if self.can_access(ctx).allowed => trust.effective_access_level(),
            _ => AccessLevel::None,
        }
    }
}

fn not_effective(trust: &ResolvedTrust, ctx: &AccessContext) -> String {
    let rel = &trust.relationship;
    let mut reason = format!(
        "relationship not effective (status: {})",
        rel.derived_status(ctx.now)
    );
    if !rel.is_fully_approved() {
        reason.push_str(", awaiting approval");
    }
    reason
}
