//! Token secret generation and one-way comparison.

use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of entropy in a generated secret.
const SECRET_BYTES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("system random number generator failed")]
pub struct RngError;

/// Hashes token secrets with HMAC-SHA256 under an optional pepper.
///
/// Only the hex digest is stored. Verification recomputes the MAC and
/// compares in constant time.
#[derive(Clone, Default)]
pub struct SecretHasher {
    pepper: Vec<u8>,
}

impl SecretHasher {
    pub fn new(pepper: Option<Vec<u8>>) -> Self {
        Self {
            pepper: pepper.unwrap_or_default(),
        }
    }

    /// Read the pepper from the named environment variable; unset or empty
    /// means no pepper.
    pub fn from_env(var: &str) -> Self {
        Self::new(
            std::env::var(var)
                .ok()
                .filter(|v| !v.is_empty())
                .map(String::into_bytes),
        )
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.pepper).expect("HMAC accepts keys of any length")
    }

    pub fn hash(&self, secret: &str) -> String {
        let mut mac = self.mac();
        mac.update(secret.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Whether `secret` hashes to `stored`. Malformed stored hashes never match.
    pub fn verify(&self, secret: &str, stored: &str) -> bool {
        let Ok(expected) = hex::decode(stored) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(secret.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

impl std::fmt::Debug for SecretHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretHasher")
            .field("peppered", &!self.pepper.is_empty())
            .finish()
    }
}

/// Fresh random secret, hex encoded.
pub fn generate_secret() -> Result<String, RngError> {
    let mut buf = [0u8; SECRET_BYTES];
    SystemRandom::new().fill(&mut buf).map_err(|_| RngError)?;
    Ok(hex::encode(buf))
}
