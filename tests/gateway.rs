mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{Fixture, MOCK_TYPE};
use redactor::auth::{Credential, SecretHasher};
use redactor::config::GatewayConfig;
use redactor::gateway::{self, AppState};
use redactor::metrics::Metrics;
use redactor::model::{Plugin, PersonId};

struct Harness {
    fx: Arc<Fixture>,
    state: AppState,
    app: Router,
}

impl Harness {
    fn new() -> Self {
        Self::with_gateway(&GatewayConfig::default())
    }

    fn with_gateway(gateway: &GatewayConfig) -> Self {
        let fx = Fixture::new();
        let redactor = redactor::Redactor::new(
            fx.repo.clone(),
            fx.registry.clone(),
            redactor::RedactorOptions::default(),
        );
        let state = AppState::new(
            fx.repo.clone(),
            redactor,
            SecretHasher::new(None),
            Metrics::new().unwrap(),
        );
        let app = gateway::router(state.clone(), gateway);
        Self {
            fx: Arc::new(fx),
            state,
            app,
        }
    }

    async fn plugin(&self, label: &str, extra: Value) -> Plugin {
        let mut config = json!({ "label": label });
        if let (Some(config), Value::Object(extra)) = (config.as_object_mut(), extra) {
            config.extend(extra);
        }
        self.state
            .catalog
            .create_plugin(MOCK_TYPE, label, config)
            .await
            .unwrap()
    }

    async fn credential(&self, plugins: &[&Plugin]) -> Credential {
        let issued = self.state.catalog.create_token("test").await.unwrap();
        for plugin in plugins {
            self.state
                .catalog
                .grant_access(issued.token.id, plugin.id)
                .await
                .unwrap();
        }
        issued.credential
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        credential: Option<&Credential>,
        body: Value,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(credential) = credential {
            let encoded =
                base64::engine::general_purpose::STANDARD.encode(credential.to_string());
            request = request.header(header::AUTHORIZATION, format!("Basic {encoded}"));
        }
        let request = request.body(Body::from(body.to_string())).unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }
}

#[tokio::test]
async fn health_needs_no_credential() {
    let h = Harness::new();
    let response = h
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert!(body["plugin_types"]
        .as_array()
        .unwrap()
        .contains(&json!(MOCK_TYPE)));
}

#[tokio::test]
async fn missing_credential_is_401_with_challenge() {
    let h = Harness::new();
    let shop = h.plugin("shop", json!({})).await;
    let account = h.fx.account(&shop, PersonId::new(), "alice").await;

    let (status, headers, body) = h
        .send(
            "POST",
            "/account/redact",
            None,
            json!({ "accounts": [account.id], "mode": "DELETE" }),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        headers[header::WWW_AUTHENTICATE],
        r#"Basic realm="redactor", charset="UTF-8""#
    );
    assert!(body["error"].is_string());
    assert!(h.fx.account_exists(account.id).await);
}

#[tokio::test]
async fn wrong_secret_is_401() {
    let h = Harness::new();
    let shop = h.plugin("shop", json!({})).await;
    let account = h.fx.account(&shop, PersonId::new(), "alice").await;
    let mut credential = h.credential(&[&shop]).await;
    credential.secret.push('x');

    let (status, _, _) = h
        .send(
            "POST",
            "/account/redact",
            Some(&credential),
            json!({ "accounts": [account.id], "mode": "DELETE" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn person_spanning_ungranted_plugin_is_403() {
    let h = Harness::new();
    let p1 = h.plugin("p1", json!({})).await;
    let p2 = h.plugin("p2", json!({})).await;
    let person = PersonId::new();
    let a1 = h.fx.account(&p1, person, "x@p1").await;
    let a2 = h.fx.account(&p2, person, "x@p2").await;
    let credential = h.credential(&[&p1]).await;

    let (status, headers, _) = h
        .send(
            "POST",
            "/person/redact",
            Some(&credential),
            json!({ "persons": [person], "mode": "DELETE" }),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!headers.contains_key(header::WWW_AUTHENTICATE));
    assert!(h.fx.account_exists(a1.id).await);
    assert!(h.fx.account_exists(a2.id).await);
}

#[tokio::test]
async fn full_success_is_200_with_report() {
    let h = Harness::new();
    let shop = h.plugin("shop", json!({})).await;
    let account = h.fx.account(&shop, PersonId::new(), "alice").await;
    h.fx.entry(&account, 1).await;
    let credential = h.credential(&[&shop]).await;

    let (status, _, body) = h
        .send(
            "POST",
            "/account/redact",
            Some(&credential),
            json!({ "accounts": [account.id], "mode": "ANONYMIZE" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Accounts were redacted successfully.");
    assert_eq!(body["report"]["mode"], "ANONYMIZE");
    assert_eq!(body["report"]["succeeded"][0]["pluginId"], json!(shop.id));
    assert_eq!(body["report"]["failed"], json!([]));
    assert!(!h.fx.account_exists(account.id).await);
}

#[tokio::test]
async fn partial_failure_is_207() {
    let h = Harness::new();
    let good = h.plugin("good", json!({})).await;
    let bad = h.plugin("bad", json!({ "failAccounts": true })).await;
    let a1 = h.fx.account(&good, PersonId::new(), "a1").await;
    let a2 = h.fx.account(&bad, PersonId::new(), "a2").await;
    let credential = h.credential(&[&good, &bad]).await;

    let (status, _, body) = h
        .send(
            "POST",
            "/account/redact",
            Some(&credential),
            json!({ "accounts": [a1.id, a2.id], "mode": "DELETE" }),
        )
        .await;

    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body["report"]["failed"].as_array().unwrap().len(), 1);
    assert_eq!(body["report"]["failed"][0]["pluginId"], json!(bad.id));
    assert_eq!(body["report"]["failed"][0]["stage"], "accounts");
    assert!(!h.fx.account_exists(a1.id).await);
    assert!(h.fx.account_exists(a2.id).await);
}

#[tokio::test]
async fn bad_mode_and_malformed_ids_are_400() {
    let h = Harness::new();
    let shop = h.plugin("shop", json!({})).await;
    let account = h.fx.account(&shop, PersonId::new(), "alice").await;
    let credential = h.credential(&[&shop]).await;

    let (status, _, body) = h
        .send(
            "POST",
            "/account/redact",
            Some(&credential),
            json!({ "accounts": [account.id], "mode": "delete" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("mode"));

    let (status, _, _) = h
        .send(
            "POST",
            "/account/redact",
            Some(&credential),
            json!({ "accounts": ["not-a-uuid"], "mode": "DELETE" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = h
        .send(
            "POST",
            "/log/redact",
            Some(&credential),
            json!({ "mode": "DELETE" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.fx.account_exists(account.id).await);
}

#[tokio::test]
async fn unknown_account_is_404() {
    let h = Harness::new();
    let shop = h.plugin("shop", json!({})).await;
    let credential = h.credential(&[&shop]).await;
    let ghost = redactor::model::AccountId::new();

    let (status, _, body) = h
        .send(
            "POST",
            "/account/redact",
            Some(&credential),
            json!({ "accounts": [ghost], "mode": "DELETE" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains(&ghost.to_string()));
}

#[tokio::test]
async fn registration_then_person_redaction() {
    let h = Harness::new();
    let shop = h.plugin("shop", json!({})).await;
    let credential = h.credential(&[&shop]).await;
    let person = PersonId::new();

    let (status, _, account) = h
        .send(
            "POST",
            &format!("/plugin/{}/account", shop.id),
            Some(&credential),
            json!({ "personId": person, "nativeId": "alice" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(account["pluginId"], json!(shop.id));

    let (status, _, _) = h
        .send(
            "POST",
            &format!("/plugin/{}/account", shop.id),
            Some(&credential),
            json!({ "personId": person, "nativeId": "alice" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, entry) = h
        .send(
            "POST",
            &format!("/plugin/{}/log", shop.id),
            Some(&credential),
            json!({ "accountId": account["id"], "nativeLocation": 42 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["nativeLocation"], 42);

    let (status, _, body) = h
        .send(
            "POST",
            "/person/redact",
            Some(&credential),
            json!({ "persons": [person], "mode": "DELETE" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["succeeded"][0]["entries"], json!([entry["id"]]));
}

#[tokio::test]
async fn registration_requires_grant_for_that_plugin() {
    let h = Harness::new();
    let shop = h.plugin("shop", json!({})).await;
    let forum = h.plugin("forum", json!({})).await;
    let credential = h.credential(&[&forum]).await;

    let (status, _, _) = h
        .send(
            "POST",
            &format!("/plugin/{}/account", shop.id),
            Some(&credential),
            json!({ "personId": PersonId::new(), "nativeId": "alice" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = h
        .send(
            "POST",
            "/plugin/not-a-uuid/account",
            Some(&credential),
            json!({ "personId": PersonId::new(), "nativeId": "alice" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_count_redaction_calls() {
    let h = Harness::new();
    let shop = h.plugin("shop", json!({})).await;
    let account = h.fx.account(&shop, PersonId::new(), "alice").await;
    let credential = h.credential(&[&shop]).await;
    h.send(
        "POST",
        "/account/redact",
        Some(&credential),
        json!({ "accounts": [account.id], "mode": "DELETE" }),
    )
    .await;

    let response = h
        .app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#"redactor_redaction_calls_total{entry_point="accounts",result="ok"} 1"#));
    assert!(text.contains(r#"redactor_redaction_groups_total{outcome="succeeded"} 1"#));
}

#[tokio::test]
async fn slow_redaction_outlives_request_timeout_and_reports() {
    let h = Harness::with_gateway(&GatewayConfig {
        request_timeout_secs: 1,
        ..GatewayConfig::default()
    });
    let shop = h.plugin("shop", json!({ "delayMs": 1500 })).await;
    let account = h.fx.account(&shop, PersonId::new(), "alice").await;
    let credential = h.credential(&[&shop]).await;

    let (status, _, body) = h
        .send(
            "POST",
            "/account/redact",
            Some(&credential),
            json!({ "accounts": [account.id], "mode": "DELETE" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["succeeded"][0]["pluginName"], "shop");
    assert!(!h.fx.account_exists(account.id).await);
}

