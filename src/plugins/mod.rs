//! Plugin system.
//!
//! A plugin is an external data source holding the native counterparts of
//! central accounts and log entries. Each stored plugin names a `type`;
//! the [`CapabilityRegistry`] maps that type to a [`PluginFactory`] which
//! validates the plugin's config and builds its [`Capability`] object.
//!
//! # Built-in types
//!
//! - `Dummy`: in-process, accepts string account ids and numeric log
//!   locations, logs redaction requests.
//! - `Rest`: forwards redaction requests to an HTTP API.
//!
//! # Example Configuration
//!
//! ```toml
//! [plugins]
//! enabled = ["Dummy", "Rest"]
//! ```
//!
//! A `Rest` plugin's stored config:
//!
//! ```json
//! {
//!   "baseUrl": "https://shop.internal/api",
//!   "accountEndpoint": "/gdpr/accounts",
//!   "entryEndpoint": "/gdpr/entries",
//!   "entryMethod": "DELETE"
//! }
//! ```

pub mod dummy;
pub mod registry;
pub mod rest;
pub mod traits;

pub use dummy::{DummyFactory, DummyPlugin};
pub use registry::{CapabilityRegistry, RegistryError};
pub use rest::{RestFactory, RestPlugin};
pub use traits::{Capability, PluginFactory, ValidationError};
