//! Central bookkeeping records.
//!
//! Accounts and log entries are owned by the central store. The plugin
//! owning an account only ever sees its `native_id` / `native_location`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identity of a registered plugin.
    PluginId
);
uuid_id!(
    /// Identity of an account record.
    AccountId
);
uuid_id!(
    /// Identity of a real person, shared by their accounts across plugins.
    PersonId
);
uuid_id!(
    /// Identity of an access token.
    TokenId
);

/// Sequential identity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogEntryId(pub i64);

impl fmt::Display for LogEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How personal data is redacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedactionMode {
    /// Remove the records entirely.
    Delete,
    /// Keep the records but clear them of personal information.
    Anonymize,
}

impl RedactionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Anonymize => "ANONYMIZE",
        }
    }
}

impl fmt::Display for RedactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`mode` must be either DELETE or ANONYMIZE, got {0:?}")]
pub struct ParseModeError(pub String);

impl FromStr for RedactionMode {
    type Err = ParseModeError;

    /// Exact match only; `delete` is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DELETE" => Ok(Self::Delete),
            "ANONYMIZE" => Ok(Self::Anonymize),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

/// A registered external data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub id: PluginId,
    /// Selects the capability implementation.
    #[serde(rename = "type")]
    pub plugin_type: String,
    pub name: String,
    /// Opaque configuration owned by the plugin type.
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub person_id: PersonId,
    pub plugin_id: PluginId,
    pub native_id: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: LogEntryId,
    pub account_id: AccountId,
    pub native_location: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An account joined with the plugin that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub account: Account,
    pub plugin: Plugin,
}

/// A log entry joined with its account's plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntryRecord {
    pub entry: LogEntry,
    pub plugin: Plugin,
}

/// A credential. The secret itself is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: TokenId,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Permits a token to act on one plugin's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub token_id: TokenId,
    pub plugin_id: PluginId,
}
