//! Service configuration.
//!
//! Loaded from TOML. Every key has a default, so an empty file (or no file
//! at all) is a working local setup.
//!
//! ```toml
//! [gateway]
//! listen = "0.0.0.0:3000"
//!
//! [database]
//! path = "/var/lib/redactor/redactor.sqlite"
//!
//! [redaction]
//! group_timeout_secs = 30
//! max_concurrent_groups = 4
//!
//! [plugins]
//! enabled = ["Rest"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::redact::RedactorOptions;

pub const CONFIG_ENV: &str = "REDACTOR_CONFIG";
pub const LISTEN_ENV: &str = "REDACTOR_LISTEN";
pub const DATABASE_ENV: &str = "REDACTOR_DATABASE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Applies to every route except the redact routes.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_body_limit() -> usize {
    1024 * 1024
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            body_limit_bytes: default_body_limit(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "redactor")
}

fn default_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("redactor.sqlite")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Environment variable holding the pepper for token secret hashes.
    #[serde(default = "default_pepper_env")]
    pub pepper_env: String,
}

fn default_pepper_env() -> String {
    "REDACTOR_AUTH_PEPPER".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            pepper_env: default_pepper_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedactionConfig {
    /// 0 disables the per-group timeout.
    #[serde(default = "default_group_timeout")]
    pub group_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_groups")]
    pub max_concurrent_groups: usize,
}

fn default_group_timeout() -> u64 {
    60
}

fn default_max_concurrent_groups() -> usize {
    8
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            group_timeout_secs: default_group_timeout(),
            max_concurrent_groups: default_max_concurrent_groups(),
        }
    }
}

impl RedactionConfig {
    pub fn options(&self) -> RedactorOptions {
        RedactorOptions {
            group_timeout: (self.group_timeout_secs > 0)
                .then(|| Duration::from_secs(self.group_timeout_secs)),
            max_concurrent_groups: self.max_concurrent_groups.max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginsConfig {
    /// Plugin types registered at startup.
    #[serde(default = "default_enabled_plugins")]
    pub enabled: Vec<String>,
}

fn default_enabled_plugins() -> Vec<String> {
    vec!["Dummy".to_string(), "Rest".to_string()]
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_plugins(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the config file: explicit path, then `$REDACTOR_CONFIG`, then
    /// the platform config directory. Only the last may be absent.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = explicit {
            Self::from_file(path)?
        } else if let Some(path) = std::env::var_os(CONFIG_ENV) {
            Self::from_file(PathBuf::from(path))?
        } else {
            match project_dirs().map(|dirs| dirs.config_dir().join("config.toml")) {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(listen) = lookup(LISTEN_ENV).filter(|v| !v.is_empty()) {
            self.gateway.listen = listen;
        }
        if let Some(path) = lookup(DATABASE_ENV).filter(|v| !v.is_empty()) {
            self.database.path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.gateway.body_limit_bytes == 0 {
            anyhow::bail!("gateway.body_limit_bytes must be greater than 0");
        }
        if self.redaction.max_concurrent_groups == 0 {
            anyhow::bail!("redaction.max_concurrent_groups must be at least 1");
        }
        if self.plugins.enabled.is_empty() {
            anyhow::bail!("plugins.enabled must name at least one plugin type");
        }
        Ok(())
    }
}
