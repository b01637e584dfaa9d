//! Sharing policy attached to trust levels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default sharing limits carried by a trust level.
///
/// This struct is serialized to JSON and stored in the `sharing_policy_json`
/// column of the `trust_levels` table. Keys other than the well-known ones
/// are preserved in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SharingPolicy {
    /// Highest classification marking that may be shared (e.g. "amber").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_classification: Option<String>,
    /// Records older than this many days are not shared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,
    /// Additional policy keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SharingPolicy {
    /// Creates a policy with the two well-known limits set.
    pub fn new(max_classification: Option<&str>, max_age_days: Option<u32>) -> Self {
        Self {
            max_classification: max_classification.map(str::to_string),
            max_age_days,
            extra: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_empty() {
        let policy = SharingPolicy::default();
        assert!(policy.max_classification.is_none());
        assert!(policy.max_age_days.is_none());
        assert_eq!(serde_json::to_string(&policy).unwrap(), "{}");
    }

    #[test]
    fn unknown_keys_are_preserved() {
        let json = r#"{"max_classification":"amber","max_age_days":90,"allow_pii":false}"#;
        let policy: SharingPolicy = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(policy.max_classification.as_deref(), Some("amber"));
        assert_eq!(policy.max_age_days, Some(90));
        assert_eq!(policy.extra.get("allow_pii"), Some(&serde_json::json!(false)));

        let encoded = serde_json::to_value(&policy).unwrap();
        assert_eq!(encoded["allow_pii"], serde_json::json!(false));
    }
}
