//! Level-to-strategy selection.

use accord_types::AnonymizationLevel;
use serde_json::{Map, Value};

use crate::error::AnonymizeError;
use crate::strategy::{
    builtin_strategy, AnonymizationStrategy, CustomAnonymization, CustomRules, PartialAnonymization,
};

/// Resolves an effective level to a strategy.
///
/// `custom` uses `rules` when they name at least one field. Without usable
/// rules it degrades to `custom_fallback`, and a fallback of `custom` is
/// itself treated as `partial`.
pub fn select_strategy(
    level: AnonymizationLevel,
    rules: Option<&CustomRules>,
    custom_fallback: AnonymizationLevel,
) -> Result<Box<dyn AnonymizationStrategy>, AnonymizeError> {
    if let Some(strategy) = builtin_strategy(level) {
        return Ok(strategy);
    }

    match rules {
        Some(rules) if !rules.is_empty() => Ok(Box::new(CustomAnonymization::new(rules)?)),
        _ => {
            tracing::debug!(
                fallback = %custom_fallback,
                "custom anonymization requested without rules"
            );
            let fallback: Box<dyn AnonymizationStrategy> = match builtin_strategy(custom_fallback) {
                Some(strategy) => strategy,
                None => Box::new(PartialAnonymization),
            };
            Ok(fallback)
        }
    }
}

/// Anonymizes a JSON record at `level`, returning a new value.
pub fn anonymize_record(
    record: &Value,
    level: AnonymizationLevel,
    rules: Option<&CustomRules>,
    custom_fallback: AnonymizationLevel,
) -> Result<Value, AnonymizeError> {
    let map = as_object(record)?;
    let strategy = select_strategy(level, rules, custom_fallback)?;
    let out = strategy.anonymize(map);
    tracing::debug!(
        requested = %level,
        applied = %strategy.level(),
        fields_in = map.len(),
        fields_out = out.len(),
        "record anonymized"
    );
    Ok(Value::Object(out))
}

fn as_object(record: &Value) -> Result<&Map<String, Value>, AnonymizeError> {
    match record {
        Value::Object(map) => Ok(map),
        Value::Null => Err(AnonymizeError::NotAnObject("null")),
        Value::Bool(_) => Err(AnonymizeError::NotAnObject("boolean")),
        Value::Number(_) => Err(AnonymizeError::NotAnObject("number")),
        Value::String(_) => Err(AnonymizeError::NotAnObject("string")),
        Value::Array(_) => Err(AnonymizeError::NotAnObject("array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::FieldAction;
    use serde_json::json;

    #[test]
    fn fixed_levels_map_directly() {
        for level in [
            AnonymizationLevel::None,
            AnonymizationLevel::Minimal,
            AnonymizationLevel::Partial,
            AnonymizationLevel::Full,
        ] {
            let strategy = select_strategy(level, None, AnonymizationLevel::Partial).unwrap();
            assert_eq!(strategy.level(), level);
        }
    }

    #[test]
    fn custom_without_rules_uses_fallback() {
        let strategy =
            select_strategy(AnonymizationLevel::Custom, None, AnonymizationLevel::Partial).unwrap();
        assert_eq!(strategy.level(), AnonymizationLevel::Partial);

        let empty = CustomRules::default();
        let strategy =
            select_strategy(AnonymizationLevel::Custom, Some(&empty), AnonymizationLevel::Full)
                .unwrap();
        assert_eq!(strategy.level(), AnonymizationLevel::Full);

        let strategy =
            select_strategy(AnonymizationLevel::Custom, None, AnonymizationLevel::Custom).unwrap();
        assert_eq!(strategy.level(), AnonymizationLevel::Partial);
    }

    #[test]
    fn custom_with_rules_is_custom() {
        let rules =
            CustomRules::new(AnonymizationLevel::None).with_field("name", FieldAction::Mask);
        let strategy =
            select_strategy(AnonymizationLevel::Custom, Some(&rules), AnonymizationLevel::Partial)
                .unwrap();
        assert_eq!(strategy.level(), AnonymizationLevel::Custom);
    }

    #[test]
    fn rules_are_ignored_for_fixed_levels() {
        let rules =
            CustomRules::new(AnonymizationLevel::None).with_field("name", FieldAction::Mask);
        let out = anonymize_record(
            &json!({"name": "x"}),
            AnonymizationLevel::None,
            Some(&rules),
            AnonymizationLevel::Partial,
        )
        .unwrap();
        assert_eq!(out, json!({"name": "x"}));
    }

    #[test]
    fn non_objects_are_rejected() {
        let err = anonymize_record(
            &json!(["a"]),
            AnonymizationLevel::Partial,
            None,
            AnonymizationLevel::Partial,
        )
        .unwrap_err();
        assert!(err.to_string().contains("array"));
    }
}
