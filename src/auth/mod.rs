//! Token authentication and per-plugin authorization.
//!
//! Callers present `tokenId:secret` as HTTP Basic credentials. The
//! [`AccessGate`] turns that into an immutable [`AuthContext`] holding every
//! plugin the token was granted; handlers and the orchestrator call
//! [`AuthContext::require_access`] for each plugin they touch.

pub mod gate;
pub mod middleware;
pub mod secret;

pub use gate::{AccessError, AccessGate, AuthContext, Credential};
pub use middleware::authenticate;
pub use secret::{generate_secret, RngError, SecretHasher};
