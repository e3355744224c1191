//! Shared application state for the gateway

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::auth::{AccessGate, SecretHasher};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::plugins::CapabilityRegistry;
use crate::redact::Redactor;
use crate::store::{Repository, SqliteRepository};

#[derive(Clone)]
pub struct AppState {
    pub redactor: Arc<Redactor>,
    pub catalog: Arc<Catalog>,
    pub gate: Arc<AccessGate>,
    pub metrics: Metrics,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Open the store and wire every service from `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let repo: Arc<dyn Repository> =
            Arc::new(SqliteRepository::open(&config.database.path).with_context(|| {
                format!("failed to open database {}", config.database.path.display())
            })?);
        tracing::info!(path = %config.database.path.display(), "Opened database");

        let registry = CapabilityRegistry::from_enabled(&config.plugins.enabled)?;
        let hasher = SecretHasher::from_env(&config.auth.pepper_env);
        let metrics = Metrics::new()?;
        let redactor = Redactor::new(repo.clone(), Arc::new(registry), config.redaction.options());
        Ok(Self::new(repo, redactor, hasher, metrics))
    }

    /// Wire the services around an existing repository and orchestrator.
    pub fn new(
        repo: Arc<dyn Repository>,
        redactor: Redactor,
        hasher: SecretHasher,
        metrics: Metrics,
    ) -> Self {
        let registry = redactor.registry().clone();
        let catalog = Catalog::new(repo.clone(), registry, hasher.clone());
        let gate = AccessGate::new(repo, hasher);
        Self {
            redactor: Arc::new(redactor.with_metrics(metrics.clone())),
            catalog: Arc::new(catalog),
            gate: Arc::new(gate),
            metrics,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
