//! In-process `Dummy` plugin type.
//!
//! Accounts are usernames (JSON strings), log locations are JSON numbers.
//! Redaction requests are accepted for both modes and only logged.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::traits::{Capability, PluginFactory, ValidationError};
use crate::model::RedactionMode;

pub const TYPE_NAME: &str = "Dummy";

const DEFAULT_USERNAME_FIELD: &str = "username";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DummyConfig {
    #[serde(default)]
    username_field: Option<String>,
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]+$").expect("static pattern compiles"))
}

impl DummyConfig {
    fn parse(config: &serde_json::Value) -> Result<Self, ValidationError> {
        // A plugin stored without config behaves like `{}`.
        let parsed: Self = if config.is_null() {
            Self::default()
        } else {
            serde_json::from_value(config.clone())?
        };
        if let Some(field) = &parsed.username_field {
            if !identifier_pattern().is_match(field) {
                return Err(ValidationError::new(
                    "if given, usernameField must be a legal identifier",
                ));
            }
        }
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DummyFactory;

impl PluginFactory for DummyFactory {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn validate_config(&self, config: &serde_json::Value) -> Result<(), ValidationError> {
        DummyConfig::parse(config).map(|_| ())
    }

    fn instantiate(
        &self,
        config: &serde_json::Value,
    ) -> Result<Box<dyn Capability>, ValidationError> {
        let config = DummyConfig::parse(config)?;
        Ok(Box::new(DummyPlugin {
            username_field: config
                .username_field
                .unwrap_or_else(|| DEFAULT_USERNAME_FIELD.to_string()),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct DummyPlugin {
    username_field: String,
}

impl DummyPlugin {
    pub fn username_field(&self) -> &str {
        &self.username_field
    }
}

#[async_trait]
impl Capability for DummyPlugin {
    fn validate_native_id(&self, id: &serde_json::Value) -> Result<(), ValidationError> {
        if id.is_string() {
            Ok(())
        } else {
            Err(ValidationError::new("account id must be a string"))
        }
    }

    fn validate_native_location(
        &self,
        location: &serde_json::Value,
    ) -> Result<(), ValidationError> {
        if location.is_number() {
            Ok(())
        } else {
            Err(ValidationError::new("log location must be a number"))
        }
    }

    async fn redact_accounts(
        &self,
        native_ids: &[serde_json::Value],
        mode: RedactionMode,
    ) -> anyhow::Result<()> {
        tracing::info!(
            plugin_type = TYPE_NAME,
            username_field = %self.username_field,
            count = native_ids.len(),
            %mode,
            "Dummy plugin redacting accounts"
        );
        Ok(())
    }

    async fn redact_entries(
        &self,
        native_locations: &[serde_json::Value],
        mode: RedactionMode,
    ) -> anyhow::Result<()> {
        tracing::info!(
            plugin_type = TYPE_NAME,
            count = native_locations.len(),
            %mode,
            "Dummy plugin redacting entries"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_accepts_empty_and_null() {
        assert!(DummyFactory.validate_config(&json!({})).is_ok());
        assert!(DummyFactory.validate_config(&serde_json::Value::Null).is_ok());
    }

    #[test]
    fn config_rejects_unexpected_entries() {
        let err = DummyFactory
            .validate_config(&json!({"apiUrl": "http://x"}))
            .unwrap_err();
        assert!(err.0.contains("apiUrl"));
    }

    #[test]
    fn config_checks_username_field() {
        assert!(DummyFactory
            .validate_config(&json!({"usernameField": "login_name"}))
            .is_ok());
        assert!(DummyFactory
            .validate_config(&json!({"usernameField": "1st"}))
            .is_err());
        assert!(DummyFactory
            .validate_config(&json!({"usernameField": 5}))
            .is_err());
    }

    #[test]
    fn username_field_defaults() {
        let config = DummyConfig::parse(&json!({})).unwrap();
        assert!(config.username_field.is_none());
        let plugin = DummyPlugin {
            username_field: config
                .username_field
                .unwrap_or_else(|| DEFAULT_USERNAME_FIELD.into()),
        };
        assert_eq!(plugin.username_field(), "username");
    }

    #[test]
    fn native_shapes() {
        let plugin = DummyFactory.instantiate(&json!({})).unwrap();
        assert!(plugin.validate_native_id(&json!("alice")).is_ok());
        assert!(plugin.validate_native_id(&json!(42)).is_err());
        assert!(plugin.validate_native_location(&json!(42)).is_ok());
        assert!(plugin.validate_native_location(&json!("42")).is_err());
    }

    #[tokio::test]
    async fn redaction_accepts_both_modes() {
        let plugin = DummyFactory.instantiate(&json!({})).unwrap();
        for mode in [RedactionMode::Delete, RedactionMode::Anonymize] {
            plugin.redact_entries(&[json!(2), json!(1)], mode).await.unwrap();
            plugin.redact_accounts(&[json!("alice")], mode).await.unwrap();
        }
    }
}
