//! `Rest` plugin type.
//!
//! Forwards redaction requests as JSON to an HTTP API owned by the data
//! source. Native ids and locations are passed through untouched.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};

use super::traits::{
    Capability, PluginFactory, RedactAccountsRequest, RedactEntriesRequest, ValidationError,
};
use crate::model::RedactionMode;

pub const TYPE_NAME: &str = "Rest";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RestConfig {
    #[serde(alias = "baseURL")]
    base_url: String,
    account_endpoint: String,
    #[serde(default)]
    account_method: Option<String>,
    entry_endpoint: String,
    #[serde(default)]
    entry_method: Option<String>,
}

/// Resolved endpoint: method plus absolute URL.
#[derive(Debug, Clone)]
struct Endpoint {
    method: Method,
    url: Url,
}

impl RestConfig {
    fn parse(config: &serde_json::Value) -> Result<Self, ValidationError> {
        Ok(serde_json::from_value(config.clone())?)
    }

    fn base_url(&self) -> Result<Url, ValidationError> {
        let url = Url::parse(&self.base_url)
            .map_err(|_| ValidationError::new("baseUrl must be a legal http or https URL"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::new(
                "baseUrl must be a legal http or https URL",
            ));
        }
        Ok(url)
    }

    fn endpoint(
        base: &Url,
        path: &str,
        method: Option<&str>,
        field: &str,
    ) -> Result<Endpoint, ValidationError> {
        let method = parse_method(method.unwrap_or("POST"))
            .ok_or_else(|| ValidationError::new(format!("{field}Method is not an HTTP method")))?;
        Ok(Endpoint {
            method,
            url: join_endpoint(base, path)
                .ok_or_else(|| ValidationError::new(format!("{field}Endpoint is not a valid path")))?,
        })
    }

    fn resolve(&self) -> Result<(Endpoint, Endpoint), ValidationError> {
        let base = self.base_url()?;
        let accounts = Self::endpoint(
            &base,
            &self.account_endpoint,
            self.account_method.as_deref(),
            "account",
        )?;
        let entries = Self::endpoint(
            &base,
            &self.entry_endpoint,
            self.entry_method.as_deref(),
            "entry",
        )?;
        Ok((accounts, entries))
    }
}

fn parse_method(raw: &str) -> Option<Method> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return None;
    }
    Method::from_bytes(upper.as_bytes()).ok()
}

/// Endpoints of the form `scheme://...` are used as given; anything else
/// is appended to the base URL's path. Either way the result must be http
/// or https.
fn join_endpoint(base: &Url, endpoint: &str) -> Option<Url> {
    let url = if is_absolute(endpoint) {
        Url::parse(endpoint).ok()?
    } else {
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        Url::parse(&joined).ok()?
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn is_absolute(endpoint: &str) -> bool {
    endpoint.split_once("://").is_some_and(|(scheme, _)| {
        let mut chars = scheme.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RestFactory;

impl PluginFactory for RestFactory {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn validate_config(&self, config: &serde_json::Value) -> Result<(), ValidationError> {
        RestConfig::parse(config)?.resolve().map(|_| ())
    }

    fn instantiate(
        &self,
        config: &serde_json::Value,
    ) -> Result<Box<dyn Capability>, ValidationError> {
        let (accounts, entries) = RestConfig::parse(config)?.resolve()?;
        let client = Client::builder()
            .build()
            .map_err(|e| ValidationError::new(format!("failed to build HTTP client: {e}")))?;
        Ok(Box::new(RestPlugin {
            client,
            accounts,
            entries,
        }))
    }
}

/// Capability that calls the data source's redaction endpoints.
#[derive(Debug, Clone)]
pub struct RestPlugin {
    client: Client,
    accounts: Endpoint,
    entries: Endpoint,
}

impl RestPlugin {
    async fn send<T: Serialize + ?Sized>(&self, endpoint: &Endpoint, body: &T) -> Result<()> {
        tracing::trace!(
            method = %endpoint.method,
            url = %endpoint.url,
            "Calling plugin endpoint"
        );

        let response = self
            .client
            .request(endpoint.method.clone(), endpoint.url.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("{} {} failed", endpoint.method, endpoint.url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!(
                "{} {} returned {}",
                endpoint.method,
                endpoint.url,
                status
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Capability for RestPlugin {
    fn validate_native_id(&self, id: &serde_json::Value) -> Result<(), ValidationError> {
        if id.is_null() {
            return Err(ValidationError::new("account id must not be null"));
        }
        Ok(())
    }

    fn validate_native_location(
        &self,
        location: &serde_json::Value,
    ) -> Result<(), ValidationError> {
        if location.is_null() {
            return Err(ValidationError::new("log location must not be null"));
        }
        Ok(())
    }

    async fn redact_accounts(
        &self,
        native_ids: &[serde_json::Value],
        mode: RedactionMode,
    ) -> Result<()> {
        let request = RedactAccountsRequest {
            ids: native_ids,
            mode,
        };
        self.send(&self.accounts, &request).await
    }

    async fn redact_entries(
        &self,
        native_locations: &[serde_json::Value],
        mode: RedactionMode,
    ) -> Result<()> {
        let request = RedactEntriesRequest {
            locations: native_locations,
            mode,
        };
        self.send(&self.entries, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> serde_json::Value {
        json!({
            "baseUrl": base,
            "accountEndpoint": "/redact/accounts",
            "entryEndpoint": "redact/entries",
            "entryMethod": "put",
        })
    }

    #[test]
    fn config_requires_http_base_url() {
        assert!(RestFactory.validate_config(&config("https://example.org/api")).is_ok());
        assert!(RestFactory.validate_config(&config("ftp://example.org")).is_err());
        assert!(RestFactory.validate_config(&config("not a url")).is_err());
    }

    #[test]
    fn config_rejects_unknown_and_missing_fields() {
        let mut extra = config("http://localhost");
        extra["token"] = json!("x");
        assert!(RestFactory.validate_config(&extra).is_err());

        let missing = json!({"baseUrl": "http://localhost", "accountEndpoint": "/a"});
        assert!(RestFactory.validate_config(&missing).is_err());
    }

    #[test]
    fn config_rejects_bad_method() {
        let mut bad = config("http://localhost");
        bad["accountMethod"] = json!("NOT A METHOD");
        assert!(RestFactory.validate_config(&bad).is_err());
    }

    #[test]
    fn config_rejects_non_http_endpoint() {
        let mut bad = config("http://localhost");
        bad["accountEndpoint"] = json!("ftp://files.example/gdpr");
        assert!(RestFactory.validate_config(&bad).is_err());
    }

    #[test]
    fn scheme_like_endpoint_without_slashes_is_relative() {
        let base = Url::parse("http://127.0.0.1:9").unwrap();
        assert_eq!(
            join_endpoint(&base, "localhost:8080/gdpr").unwrap().as_str(),
            "http://127.0.0.1:9/localhost:8080/gdpr"
        );
        assert_eq!(
            join_endpoint(&base, "mailto:x").unwrap().as_str(),
            "http://127.0.0.1:9/mailto:x"
        );

        let mut cfg = config("http://127.0.0.1:9");
        cfg["accountEndpoint"] = json!("localhost:8080/gdpr");
        assert!(RestFactory.validate_config(&cfg).is_ok());
    }

    #[test]
    fn accepts_legacy_base_url_key() {
        let mut cfg = config("http://localhost");
        let base = cfg
            .as_object_mut()
            .unwrap()
            .remove("baseUrl")
            .unwrap();
        cfg["baseURL"] = base;
        assert!(RestFactory.validate_config(&cfg).is_ok());
    }

    #[test]
    fn endpoints_join_base_path() {
        let base = Url::parse("http://localhost:8080/api/").unwrap();
        assert_eq!(
            join_endpoint(&base, "/redact").unwrap().as_str(),
            "http://localhost:8080/api/redact"
        );
        assert_eq!(
            join_endpoint(&base, "https://other.example/x").unwrap().as_str(),
            "https://other.example/x"
        );
    }

    #[test]
    fn native_values_must_not_be_null() {
        let plugin = RestFactory.instantiate(&config("http://localhost")).unwrap();
        assert!(plugin.validate_native_id(&json!({"uid": 1})).is_ok());
        assert!(plugin.validate_native_id(&serde_json::Value::Null).is_err());
        assert!(plugin.validate_native_location(&json!([1, 2])).is_ok());
        assert!(plugin
            .validate_native_location(&serde_json::Value::Null)
            .is_err());
    }

    #[tokio::test]
    async fn redact_accounts_posts_ids_and_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/redact/accounts"))
            .and(body_json(json!({"ids": ["alice", "bob"], "mode": "DELETE"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let plugin = RestFactory.instantiate(&config(&server.uri())).unwrap();
        plugin
            .redact_accounts(&[json!("alice"), json!("bob")], RedactionMode::Delete)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn redact_entries_uses_configured_method() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/redact/entries"))
            .and(body_json(json!({"locations": [9, 3], "mode": "ANONYMIZE"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let plugin = RestFactory.instantiate(&config(&server.uri())).unwrap();
        plugin
            .redact_entries(&[json!(9), json!(3)], RedactionMode::Anonymize)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(501))
            .mount(&server)
            .await;

        let plugin = RestFactory.instantiate(&config(&server.uri())).unwrap();
        let err = plugin
            .redact_accounts(&[json!("alice")], RedactionMode::Anonymize)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("501"));
    }
}
