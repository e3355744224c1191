//! The capability contract every plugin type satisfies.
//!
//! Validation methods are pure and never touch external resources. The
//! redaction methods perform the side effects in the plugin's own system.

use async_trait::async_trait;
use serde::Serialize;

use crate::model::RedactionMode;

/// A plugin config, native id, or native location failed its shape check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

/// Redaction capability of one configured plugin.
///
/// The orchestrator guarantees that, for a given mode, an account's log
/// entries are redacted (and the call has returned) before the account
/// itself is. Entry locations arrive newest first, but a call may cover a
/// strict subset of an account's entries. Plugins are not asked to cascade;
/// personal data not tracked as log entries is the plugin's to clean up
/// when its account is redacted.
///
/// Either method may fail for a mode the plugin does not support.
#[async_trait]
pub trait Capability: Send + Sync {
    fn validate_native_id(&self, id: &serde_json::Value) -> Result<(), ValidationError>;

    fn validate_native_location(
        &self,
        location: &serde_json::Value,
    ) -> Result<(), ValidationError>;

    async fn redact_accounts(
        &self,
        native_ids: &[serde_json::Value],
        mode: RedactionMode,
    ) -> anyhow::Result<()>;

    async fn redact_entries(
        &self,
        native_locations: &[serde_json::Value],
        mode: RedactionMode,
    ) -> anyhow::Result<()>;
}

/// Constructor side of a plugin type, registered once at startup.
pub trait PluginFactory: Send + Sync {
    /// The `type` string stored on plugins of this kind.
    fn type_name(&self) -> &'static str;

    /// Reject malformed or unexpected config. Never touches the network.
    fn validate_config(&self, config: &serde_json::Value) -> Result<(), ValidationError>;

    /// Build a capability object from a plugin's stored config.
    fn instantiate(
        &self,
        config: &serde_json::Value,
    ) -> Result<Box<dyn Capability>, ValidationError>;
}

// ── Rest plugin wire types ─────────────────────────────────────────────────

/// Body sent to a Rest plugin's account endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RedactAccountsRequest<'a> {
    pub ids: &'a [serde_json::Value],
    pub mode: RedactionMode,
}

/// Body sent to a Rest plugin's entry endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RedactEntriesRequest<'a> {
    pub locations: &'a [serde_json::Value],
    pub mode: RedactionMode,
}
