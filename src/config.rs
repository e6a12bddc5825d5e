//! Engine configuration
//!
//! Loaded from TOML or JSON; every field has a default so partial files work.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::EngineError;
use crate::types::{DEFAULT_LOCALE, DEFAULT_TENANT};

/// Largest accepted anti-repetition window
pub const MAX_ANTI_REPEAT_DAYS: u32 = 365;

/// Runtime settings of a [`RulesEngine`](crate::RulesEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Global daily cap on delivered events, 0 = unlimited
    #[serde(default = "default_max_recs_per_day")]
    pub max_recs_per_day: usize,

    /// Daily cap per category, 0 = unlimited
    #[serde(default = "default_max_recs_per_category_per_day")]
    pub max_recs_per_category_per_day: usize,

    /// Days a fired message is avoided for the same user and rule, 0 = off
    #[serde(default = "default_anti_repeat_days")]
    pub anti_repeat_days: u32,

    #[serde(default = "default_locale")]
    pub default_locale: String,

    #[serde(default = "default_tenant")]
    pub default_tenant: String,

    /// Variables to aggregate instead of the built-in field list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

fn default_max_recs_per_day() -> usize {
    3
}

fn default_max_recs_per_category_per_day() -> usize {
    1
}

fn default_anti_repeat_days() -> u32 {
    7
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

fn default_tenant() -> String {
    DEFAULT_TENANT.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_recs_per_day: default_max_recs_per_day(),
            max_recs_per_category_per_day: default_max_recs_per_category_per_day(),
            anti_repeat_days: default_anti_repeat_days(),
            default_locale: default_locale(),
            default_tenant: default_tenant(),
            fields: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        let config: Self =
            toml::from_str(content).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` files are read as JSON, anything else as TOML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading engine config");
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.anti_repeat_days > MAX_ANTI_REPEAT_DAYS {
            return Err(EngineError::InvalidConfig(format!(
                "anti_repeat_days must be at most {MAX_ANTI_REPEAT_DAYS}, got {}",
                self.anti_repeat_days
            )));
        }
        if self.default_tenant.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "default_tenant must not be blank".to_string(),
            ));
        }
        if matches!(&self.fields, Some(fields) if fields.is_empty()) {
            return Err(EngineError::InvalidConfig(
                "fields override must name at least one variable".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_recs_per_day, 3);
        assert_eq!(config.max_recs_per_category_per_day, 1);
        assert_eq!(config.anti_repeat_days, 7);
        assert_eq!(config.default_locale, "es-ES");
        assert_eq!(config.default_tenant, "default");
        assert!(config.fields.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
max_recs_per_day = 5
fields = ["steps", "readiness_score"]
"#,
        )
        .unwrap();

        assert_eq!(config.max_recs_per_day, 5);
        assert_eq!(config.max_recs_per_category_per_day, 1);
        assert_eq!(
            config.fields,
            Some(vec!["steps".to_string(), "readiness_score".to_string()])
        );
    }

    #[test]
    fn test_json_and_validation() {
        let config = EngineConfig::from_json(r#"{"anti_repeat_days": 0}"#).unwrap();
        assert_eq!(config.anti_repeat_days, 0);

        assert!(matches!(
            EngineConfig::from_json(r#"{"anti_repeat_days": 400}"#),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("fields = []"),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("max_recs_per_day = \"three\""),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut toml_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(toml_file, "anti_repeat_days = 14").unwrap();
        assert_eq!(EngineConfig::from_file(toml_file.path()).unwrap().anti_repeat_days, 14);

        let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(json_file, r#"{{"max_recs_per_day": 0}}"#).unwrap();
        assert_eq!(EngineConfig::from_file(json_file.path()).unwrap().max_recs_per_day, 0);

        assert!(EngineConfig::from_file("/nonexistent/rules.toml").is_err());
    }
}
