//! Registration of plugins, accounts, log entries and tokens.
//!
//! Everything here is plain bookkeeping, but it is where plugin-specific
//! validation happens: a plugin's config is checked by its factory before
//! the plugin is stored, and native ids and locations are checked by the
//! plugin's capability before an account or log entry is stored.

use std::sync::Arc;

use chrono::Utc;

use crate::auth::{generate_secret, AccessError, AuthContext, Credential, RngError, SecretHasher};
use crate::model::{
    AccessGrant, Account, AccountId, LogEntry, PersonId, Plugin, PluginId, Token, TokenId,
};
use crate::plugins::{Capability, CapabilityRegistry, RegistryError, ValidationError};
use crate::store::{NewLogEntry, Repository, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    InvalidPlugin(#[from] RegistryError),
    #[error("invalid {field}: {source}")]
    Invalid {
        field: &'static str,
        #[source]
        source: ValidationError,
    },
    #[error("{0} already exists")]
    Conflict(String),
    /// A stored plugin whose type or config no longer loads.
    #[error("plugin {plugin_id} cannot be loaded: {source}")]
    Unloadable {
        plugin_id: PluginId,
        #[source]
        source: RegistryError,
    },
    #[error(transparent)]
    Storage(StoreError),
    #[error(transparent)]
    Rng(#[from] RngError),
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => Self::Conflict(what),
            other => Self::Storage(other),
        }
    }
}

/// A newly created token. The credential is only available here.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: Token,
    pub credential: Credential,
}

pub struct Catalog {
    repo: Arc<dyn Repository>,
    registry: Arc<CapabilityRegistry>,
    hasher: SecretHasher,
}

impl Catalog {
    pub fn new(
        repo: Arc<dyn Repository>,
        registry: Arc<CapabilityRegistry>,
        hasher: SecretHasher,
    ) -> Self {
        Self {
            repo,
            registry,
            hasher,
        }
    }

    /// Store a plugin after its type and config were accepted.
    pub async fn create_plugin(
        &self,
        plugin_type: &str,
        name: &str,
        config: serde_json::Value,
    ) -> Result<Plugin, CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::Invalid {
                field: "name",
                source: ValidationError::new("must not be empty"),
            });
        }
        self.registry.validate(plugin_type, &config)?;

        let plugin = Plugin {
            id: PluginId::new(),
            plugin_type: plugin_type.to_string(),
            name: name.to_string(),
            config,
        };
        self.repo.insert_plugin(&plugin).await?;
        tracing::info!(plugin_id = %plugin.id, plugin_type, "Plugin created");
        Ok(plugin)
    }

    pub async fn list_plugins(&self) -> Result<Vec<Plugin>, CatalogError> {
        Ok(self.repo.list_plugins().await?)
    }

    /// Record a native identity reported by a plugin.
    pub async fn register_account(
        &self,
        ctx: &AuthContext,
        plugin_id: PluginId,
        person_id: PersonId,
        native_id: serde_json::Value,
    ) -> Result<Account, CatalogError> {
        ctx.require_access(plugin_id)?;
        let capability = self.capability(plugin_id).await?;
        capability
            .validate_native_id(&native_id)
            .map_err(|source| CatalogError::Invalid {
                field: "nativeId",
                source,
            })?;

        let account = Account {
            id: AccountId::new(),
            person_id,
            plugin_id,
            native_id,
        };
        self.repo.insert_account(&account).await?;
        tracing::debug!(account_id = %account.id, %plugin_id, "Account registered");
        Ok(account)
    }

    /// Record activity of an account within the plugin it belongs to.
    pub async fn record_log_entry(
        &self,
        ctx: &AuthContext,
        plugin_id: PluginId,
        account_id: AccountId,
        native_location: serde_json::Value,
    ) -> Result<LogEntry, CatalogError> {
        ctx.require_access(plugin_id)?;
        let capability = self.capability(plugin_id).await?;

        // An account under another plugin is indistinguishable from a missing one.
        match self.repo.get_account(account_id).await? {
            Some(account) if account.plugin_id == plugin_id => {}
            _ => return Err(CatalogError::NotFound(format!("account {account_id}"))),
        }

        capability
            .validate_native_location(&native_location)
            .map_err(|source| CatalogError::Invalid {
                field: "nativeLocation",
                source,
            })?;

        let entry = self
            .repo
            .insert_log_entry(NewLogEntry {
                account_id,
                native_location,
            })
            .await?;
        tracing::debug!(log_entry_id = %entry.id, %account_id, "Log entry recorded");
        Ok(entry)
    }

    /// Create a token. The returned credential is never stored.
    pub async fn create_token(&self, description: &str) -> Result<IssuedToken, CatalogError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(CatalogError::Invalid {
                field: "description",
                source: ValidationError::new("must not be empty"),
            });
        }
        let secret = generate_secret()?;
        let token = Token {
            id: TokenId::new(),
            secret_hash: self.hasher.hash(&secret),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        self.repo.insert_token(&token).await?;
        tracing::info!(token_id = %token.id, "Token created");

        let credential = Credential {
            token_id: token.id,
            secret,
        };
        Ok(IssuedToken { token, credential })
    }

    pub async fn grant_access(
        &self,
        token_id: TokenId,
        plugin_id: PluginId,
    ) -> Result<AccessGrant, CatalogError> {
        if self.repo.get_token(token_id).await?.is_none() {
            return Err(CatalogError::NotFound(format!("token {token_id}")));
        }
        if self.repo.get_plugin(plugin_id).await?.is_none() {
            return Err(CatalogError::NotFound(format!("plugin {plugin_id}")));
        }

        let grant = AccessGrant {
            token_id,
            plugin_id,
        };
        self.repo.insert_grant(grant).await?;
        tracing::info!(%token_id, %plugin_id, "Access granted");
        Ok(grant)
    }

    async fn capability(&self, plugin_id: PluginId) -> Result<Box<dyn Capability>, CatalogError> {
        let plugin = self
            .repo
            .get_plugin(plugin_id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("plugin {plugin_id}")))?;
        self.registry
            .instantiate(&plugin)
            .map_err(|source| CatalogError::Unloadable { plugin_id, source })
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
