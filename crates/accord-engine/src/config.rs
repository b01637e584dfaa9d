//! Engine configuration loading from file and environment variables.

use std::collections::HashMap;

use accord_policy::{AuditLevel, SecuritySettings};
use accord_types::AnonymizationLevel;
use serde::Deserialize;
use thiserror::Error;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub anonymization: AnonymizationConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub compliance: ComplianceConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. `:memory:` is rejected: the audit
    /// sink writes through its own pooled connection and would not see the
    /// schema.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections. At least 2.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "accord_trust=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Which organizations exist.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    /// Known organization ids. Empty accepts any non-blank id.
    #[serde(default)]
    pub organizations: Vec<String>,
}

/// An access strategy the engine can compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    TrustLevel,
    Community,
    TimeBased,
}

/// Access policy composition.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyName>,

    /// Minimum trust strength for the `trust_level` strategy.
    #[serde(default = "default_min_trust_strength")]
    pub minimum_trust_strength: u8,

    /// Install the five system trust levels on start-up.
    #[serde(default = "default_true")]
    pub seed_system_levels: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnonymizationConfig {
    /// Level used when `custom` is requested without rules.
    #[serde(default = "default_custom_fallback")]
    pub custom_fallback: AnonymizationLevel,
}

/// Out-of-hours warnings.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_security_level")]
    pub level: String,

    /// UTC hour at which normal hours begin.
    #[serde(default = "default_hours_start")]
    pub normal_hours_start: u32,

    /// UTC hour at which normal hours end.
    #[serde(default = "default_hours_end")]
    pub normal_hours_end: u32,
}

/// Retention checks.
#[derive(Debug, Clone, Deserialize)]
pub struct ComplianceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_framework")]
    pub framework: String,

    /// Per-framework retention limits in days, overriding the built-ins.
    #[serde(default)]
    pub retention_thresholds: HashMap<String, i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub level: AuditLevel,
}

fn default_db_path() -> String {
    "accord.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_strategies() -> Vec<StrategyName> {
    vec![StrategyName::TrustLevel, StrategyName::TimeBased]
}

fn default_min_trust_strength() -> u8 {
    25
}

fn default_true() -> bool {
    true
}

fn default_custom_fallback() -> AnonymizationLevel {
    AnonymizationLevel::Partial
}

fn default_security_level() -> String {
    "standard".to_string()
}

fn default_hours_start() -> u32 {
    8
}

fn default_hours_end() -> u32 {
    18
}

fn default_framework() -> String {
    "gdpr".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            minimum_trust_strength: default_min_trust_strength(),
            seed_system_levels: true,
        }
    }
}

impl Default for AnonymizationConfig {
    fn default() -> Self {
        Self {
            custom_fallback: default_custom_fallback(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_security_level(),
            normal_hours_start: default_hours_start(),
            normal_hours_end: default_hours_end(),
        }
    }
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            framework: default_framework(),
            retention_thresholds: HashMap::new(),
        }
    }
}

impl SecurityConfig {
    pub fn settings(&self) -> SecuritySettings {
        SecuritySettings {
            level: self.level.clone(),
            normal_hours_start: self.normal_hours_start,
            normal_hours_end: self.normal_hours_end,
        }
    }
}

impl Config {
    /// Checks values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.trim().is_empty() || self.database.path == ":memory:" {
            return Err(ConfigError::Invalid(
                "database.path must name a file".to_string(),
            ));
        }
        if self.database.pool_max_size < 2 {
            return Err(ConfigError::Invalid(
                "database.pool_max_size must be at least 2".to_string(),
            ));
        }
        if self.policy.strategies.is_empty() {
            return Err(ConfigError::Invalid(
                "policy.strategies must not be empty".to_string(),
            ));
        }
        if self.policy.minimum_trust_strength > 100 {
            return Err(ConfigError::Invalid(
                "policy.minimum_trust_strength must be within 0..=100".to_string(),
            ));
        }
        if self.security.normal_hours_start > 23 || self.security.normal_hours_end > 23 {
            return Err(ConfigError::Invalid(
                "security normal hours must be within 0..=23".to_string(),
            ));
        }
        Ok(())
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `ACCORD_DB_PATH` overrides `database.path`
/// - `ACCORD_LOG_LEVEL` overrides `logging.level`
/// - `ACCORD_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `ACCORD_MIN_TRUST_STRENGTH` overrides `policy.minimum_trust_strength`
/// - `ACCORD_CUSTOM_FALLBACK` overrides `anonymization.custom_fallback`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the merged configuration is invalid.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Applies overrides from `lookup`. Unparseable values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(db_path) = lookup("ACCORD_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = lookup("ACCORD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("ACCORD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(strength) = lookup("ACCORD_MIN_TRUST_STRENGTH") {
        if let Ok(parsed) = strength.trim().parse() {
            config.policy.minimum_trust_strength = parsed;
        }
    }
    if let Some(fallback) = lookup("ACCORD_CUSTOM_FALLBACK") {
        if let Ok(parsed) = fallback.trim().parse() {
            config.anonymization.custom_fallback = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.database.path, "accord.db");
        assert_eq!(
            config.policy.strategies,
            [StrategyName::TrustLevel, StrategyName::TimeBased]
        );
        assert_eq!(config.anonymization.custom_fallback, AnonymizationLevel::Partial);
        assert_eq!(config.security.normal_hours_start, 8);
        assert_eq!(config.compliance.framework, "gdpr");
        assert_eq!(config.audit.level, AuditLevel::Basic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sections_parse() {
        let config: Config = toml::from_str(
            r#"
            [database]
            path = "/var/lib/accord/trust.db"

            [identity]
            organizations = ["org-a", "org-b"]

            [policy]
            strategies = ["community", "time_based"]
            minimum_trust_strength = 50

            [anonymization]
            custom_fallback = "full"

            [security]
            normal_hours_start = 22
            normal_hours_end = 6

            [compliance]
            framework = "hipaa"
            retention_thresholds = { hipaa = 30 }

            [audit]
            level = "detailed"
            "#,
        )
        .unwrap();
        assert_eq!(config.identity.organizations.len(), 2);
        assert_eq!(
            config.policy.strategies,
            [StrategyName::Community, StrategyName::TimeBased]
        );
        assert_eq!(config.policy.minimum_trust_strength, 50);
        assert_eq!(config.anonymization.custom_fallback, AnonymizationLevel::Full);
        assert_eq!(config.compliance.retention_thresholds["hipaa"], 30);
        assert_eq!(config.audit.level, AuditLevel::Detailed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_strategy_is_a_parse_error() {
        let result: Result<Config, _> = toml::from_str("[policy]\nstrategies = [\"geo\"]");
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| match key {
            "ACCORD_DB_PATH" => Some("/tmp/override.db".to_string()),
            "ACCORD_LOG_JSON" => Some("1".to_string()),
            "ACCORD_MIN_TRUST_STRENGTH" => Some("75".to_string()),
            "ACCORD_CUSTOM_FALLBACK" => Some("full".to_string()),
            _ => None,
        });
        assert_eq!(config.database.path, "/tmp/override.db");
        assert!(config.logging.json);
        assert_eq!(config.policy.minimum_trust_strength, 75);
        assert_eq!(config.anonymization.custom_fallback, AnonymizationLevel::Full);
    }

    #[test]
    fn bad_env_values_are_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| match key {
            "ACCORD_MIN_TRUST_STRENGTH" => Some("lots".to_string()),
            "ACCORD_CUSTOM_FALLBACK" => Some("shredded".to_string()),
            _ => None,
        });
        assert_eq!(config.policy.minimum_trust_strength, 25);
        assert_eq!(config.anonymization.custom_fallback, AnonymizationLevel::Partial);
    }

    #[test]
    fn validation_rejects_unusable_values() {
        let mut config = Config::default();
        config.database.path = ":memory:".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.policy.strategies.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.security.normal_hours_end = 24;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = load_config(Some("/nonexistent/accord-config.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
    }
}
