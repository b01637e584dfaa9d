//! JSON-lines command surface.
//!
//! Each input line is one object tagged by `op`; each output line is
//! `{"ok": true, "result": ...}` or `{"ok": false, "error": {"kind", "message"}}`.
//!
//! ```text
//! {"op":"approve_relationship","relationship_id":"…","approving_org":"org-b","actor":"ops@org-b"}
//! {"ok":true,"result":{"value":true,"audit_degraded":false}}
//! ```

use accord_anonymize::CustomRules;
use accord_observe::LogFilter;
use accord_trust::{NewRelationship, NewTrustGroup, NewTrustLevel, TrustLevelPolicyUpdate};
use accord_types::AnonymizationLevel;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::engine::TrustEngine;
use crate::error::EngineError;

/// One request line.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    EvaluateAccess {
        requesting_org: String,
        target_org: String,
        resource_kind: String,
        #[serde(default)]
        hints: Map<String, Value>,
    },
    AnonymizeRecord {
        record: Value,
        level: AnonymizationLevel,
        #[serde(default)]
        rules: Option<CustomRules>,
    },
    ShareRecord {
        requesting_org: String,
        target_org: String,
        resource_kind: String,
        record: Value,
        #[serde(default)]
        hints: Map<String, Value>,
        #[serde(default)]
        rules: Option<CustomRules>,
    },
    CreateRelationship {
        relationship: NewRelationship,
        actor: String,
    },
    ApproveRelationship {
        relationship_id: String,
        approving_org: String,
        actor: String,
    },
    SuspendRelationship {
        relationship_id: String,
        actor: String,
        #[serde(default)]
        reason: String,
    },
    ReinstateRelationship {
        relationship_id: String,
        actor: String,
        #[serde(default)]
        reason: String,
    },
    RevokeRelationship {
        relationship_id: String,
        actor: String,
        #[serde(default)]
        reason: String,
    },
    GetRelationship {
        relationship_id: String,
    },
    ListRelationships {
        organization: String,
    },
    ResolveTrust {
        org_a: String,
        org_b: String,
    },
    CreateGroup {
        group: NewTrustGroup,
        creator_org: String,
        actor: String,
    },
    JoinGroup {
        group_id: String,
        organization: String,
        #[serde(default)]
        invited_by: Option<String>,
        actor: String,
    },
    LeaveGroup {
        group_id: String,
        organization: String,
        actor: String,
    },
    ListGroupMembers {
        group_id: String,
        #[serde(default)]
        include_inactive: bool,
    },
    ListGroups {
        #[serde(default)]
        public_only: bool,
    },
    CreateTrustLevel {
        level: NewTrustLevel,
        actor: String,
    },
    ListTrustLevels,
    GetTrustLevelByName {
        name: String,
    },
    UpdateTrustLevelDescription {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        actor: String,
    },
    UpdateTrustLevelPolicy {
        id: String,
        update: TrustLevelPolicyUpdate,
        actor: String,
    },
    DeleteTrustLevel {
        id: String,
        actor: String,
    },
    QueryAuditLog {
        #[serde(default)]
        filter: LogFilter,
    },
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Internal(format!("serialization: {e}")))
}

/// Runs one command against the engine.
pub fn execute(engine: &TrustEngine, command: Command) -> Result<Value, EngineError> {
    match command {
        Command::EvaluateAccess {
            requesting_org,
            target_org,
            resource_kind,
            hints,
        } => to_value(engine.evaluate_access(&requesting_org, &target_org, &resource_kind, hints)?),
        Command::AnonymizeRecord { record, level, rules } => {
            engine.anonymize_record(&record, level, rules.as_ref())
        }
        Command::ShareRecord {
            requesting_org,
            target_org,
            resource_kind,
            record,
            hints,
            rules,
        } => to_value(engine.share_record(
            &requesting_org,
            &target_org,
            &resource_kind,
            &record,
            hints,
            rules.as_ref(),
        )?),
        Command::CreateRelationship { relationship, actor } => {
            to_value(engine.create_relationship(&relationship, &actor)?)
        }
        Command::ApproveRelationship {
            relationship_id,
            approving_org,
            actor,
        } => to_value(engine.approve_relationship(&relationship_id, &approving_org, &actor)?),
        Command::SuspendRelationship {
            relationship_id,
            actor,
            reason,
        } => to_value(engine.suspend_relationship(&relationship_id, &actor, &reason)?),
        Command::ReinstateRelationship {
            relationship_id,
            actor,
            reason,
        } => to_value(engine.reinstate_relationship(&relationship_id, &actor, &reason)?),
        Command::RevokeRelationship {
            relationship_id,
            actor,
            reason,
        } => to_value(engine.revoke_relationship(&relationship_id, &actor, &reason)?),
        Command::GetRelationship { relationship_id } => {
            to_value(engine.get_relationship(&relationship_id)?)
        }
        Command::ListRelationships { organization } => {
            to_value(engine.list_relationships(&organization)?)
        }
        Command::ResolveTrust { org_a, org_b } => to_value(engine.resolve(&org_a, &org_b)?),
        Command::CreateGroup {
            group,
            creator_org,
            actor,
        } => to_value(engine.create_group(&group, &creator_org, &actor)?),
        Command::JoinGroup {
            group_id,
            organization,
            invited_by,
            actor,
        } => to_value(engine.join_group(&group_id, &organization, invited_by.as_deref(), &actor)?),
        Command::LeaveGroup {
            group_id,
            organization,
            actor,
        } => to_value(engine.leave_group(&group_id, &organization, &actor)?),
        Command::ListGroupMembers {
            group_id,
            include_inactive,
        } => to_value(engine.list_group_members(&group_id, include_inactive)?),
        Command::ListGroups { public_only } => to_value(engine.list_groups(public_only)?),
        Command::CreateTrustLevel { level, actor } => {
            to_value(engine.create_trust_level(&level, &actor)?)
        }
        Command::ListTrustLevels => to_value(engine.list_trust_levels()?),
        Command::GetTrustLevelByName { name } => to_value(engine.get_trust_level_by_name(&name)?),
        Command::UpdateTrustLevelDescription {
            id,
            name,
            description,
            actor,
        } => to_value(engine.update_trust_level_description(
            &id,
            name.as_deref(),
            description.as_deref(),
            &actor,
        )?),
        Command::UpdateTrustLevelPolicy { id, update, actor } => {
            to_value(engine.update_trust_level_policy(&id, &update, &actor)?)
        }
        Command::DeleteTrustLevel { id, actor } => {
            to_value(engine.delete_trust_level(&id, &actor)?)
        }
        Command::QueryAuditLog { filter } => to_value(engine.query_audit_log(&filter)?),
    }
}

/// Parses and runs one input line, always producing a response object.
pub fn handle_line(engine: &TrustEngine, line: &str) -> Value {
    let command: Command = match serde_json::from_str(line) {
        Ok(command) => command,
        Err(e) => {
            let err = EngineError::InvalidArgument(format!("malformed command: {e}"));
            return json!({ "ok": false, "error": err.to_json() });
        }
    };
    match execute(engine, command) {
        Ok(result) => json!({ "ok": true, "result": result }),
        Err(err) => json!({ "ok": false, "error": err.to_json() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_by_op() {
        let cmd: Command = serde_json::from_str(
            r#"{"op":"approve_relationship","relationship_id":"r1","approving_org":"org-b","actor":"b"}"#,
        )
        .unwrap();
        assert!(matches!(
            cmd,
            Command::ApproveRelationship { ref approving_org, .. } if approving_org == "org-b"
        ));

        let cmd: Command = serde_json::from_str(r#"{"op":"list_trust_levels"}"#).unwrap();
        assert!(matches!(cmd, Command::ListTrustLevels));

        let cmd: Command = serde_json::from_str(
            r#"{"op":"query_audit_log","filter":{"organization":"org-a","limit":5}}"#,
        )
        .unwrap();
        match cmd {
            Command::QueryAuditLog { filter } => {
                assert_eq!(filter.organization.as_deref(), Some("org-a"));
                assert_eq!(filter.limit, Some(5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_op_is_rejected() {
        let result: Result<Command, _> = serde_json::from_str(r#"{"op":"drop_tables"}"#);
        assert!(result.is_err());
    }
}
