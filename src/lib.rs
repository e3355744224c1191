#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

//! Redactor: coordinates deletion and anonymization of personal data held
//! by many independent plugins, and the central bookkeeping that tracks it.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod model;
pub mod plugins;
pub mod redact;
pub mod store;

pub use catalog::{Catalog, CatalogError};
pub use config::Config;
pub use error::ApiError;
pub use redact::{RedactError, RedactionReport, Redactor, RedactorOptions};
