//! Access control gate.
//!
//! A request starts `Unauthenticated`. A credential whose secret matches
//! the stored hash makes it `Authenticated`, carrying the full set of
//! plugins its token was granted. [`AuthContext::require_access`] is the
//! per-plugin authorization check; it fails closed.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;

use super::secret::SecretHasher;
use crate::model::{PluginId, TokenId};
use crate::store::{Repository, StoreError};

/// Authorization failure for one plugin.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("authentication required")]
    Unauthorized,
    #[error("access to plugin {plugin_id} is not granted")]
    Forbidden { plugin_id: PluginId },
}

/// Immutable, request-scoped authentication state.
#[derive(Debug, Clone, Default)]
pub enum AuthContext {
    #[default]
    Unauthenticated,
    Authenticated {
        token_id: TokenId,
        plugins: Arc<HashSet<PluginId>>,
    },
}

impl AuthContext {
    pub fn authenticated(token_id: TokenId, plugins: impl IntoIterator<Item = PluginId>) -> Self {
        Self::Authenticated {
            token_id,
            plugins: Arc::new(plugins.into_iter().collect()),
        }
    }

    pub fn token_id(&self) -> Option<TokenId> {
        match self {
            Self::Unauthenticated => None,
            Self::Authenticated { token_id, .. } => Some(*token_id),
        }
    }

    /// Succeeds only if the caller may act on `plugin_id`. No side effects.
    pub fn require_access(&self, plugin_id: PluginId) -> Result<(), AccessError> {
        match self {
            Self::Unauthenticated => Err(AccessError::Unauthorized),
            Self::Authenticated { plugins, .. } if plugins.contains(&plugin_id) => Ok(()),
            Self::Authenticated { .. } => Err(AccessError::Forbidden { plugin_id }),
        }
    }
}

/// A presented credential, `tokenId:secret`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token_id: TokenId,
    pub secret: String,
}

impl Credential {
    /// Decode the payload of an HTTP `Basic` authorization header.
    pub fn from_basic(encoded: &str) -> Option<Self> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        decoded.parse().ok()
    }
}

impl FromStr for Credential {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (token_id, secret) = s.split_once(':').ok_or(())?;
        Ok(Self {
            token_id: token_id.parse().map_err(|_| ())?,
            secret: secret.to_string(),
        })
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.token_id, self.secret)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token_id", &self.token_id)
            .finish_non_exhaustive()
    }
}

/// Resolves credentials into [`AuthContext`]s.
pub struct AccessGate {
    repo: Arc<dyn Repository>,
    hasher: SecretHasher,
}

impl AccessGate {
    pub fn new(repo: Arc<dyn Repository>, hasher: SecretHasher) -> Self {
        Self { repo, hasher }
    }

    pub fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }

    /// Authenticate a credential and load all of its grants at once.
    ///
    /// A missing credential, unknown token or wrong secret all yield
    /// `Unauthenticated`; only storage failures are errors.
    pub async fn authenticate(
        &self,
        credential: Option<&Credential>,
    ) -> Result<AuthContext, StoreError> {
        let Some(credential) = credential else {
            return Ok(AuthContext::Unauthenticated);
        };

        let token = self.repo.get_token(credential.token_id).await?;
        let matches = match &token {
            Some(token) => self.hasher.verify(&credential.secret, &token.secret_hash),
            None => {
                // Same work as a real comparison.
                let _ = self.hasher.verify(&credential.secret, &self.hasher.hash(""));
                false
            }
        };
        if !matches {
            tracing::debug!(token_id = %credential.token_id, "Credential rejected");
            return Ok(AuthContext::Unauthenticated);
        }

        let plugins = self.repo.grants_for_token(credential.token_id).await?;
        tracing::debug!(
            token_id = %credential.token_id,
            grants = plugins.len(),
            "Credential accepted"
        );
        Ok(AuthContext::authenticated(credential.token_id, plugins))
    }
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}
