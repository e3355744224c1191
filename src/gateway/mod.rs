//! HTTP API.
//!
//! Every route except `/health` and `/metrics` runs behind the
//! authentication middleware, which attaches an [`AuthContext`] to the
//! request. Handlers pass that context to the orchestrator or catalog; they
//! never authorize on their own.
//!
//! The redact routes carry no request timeout. Their plugin groups run to
//! completion in their own tasks, and the caller always gets the report.
//!
//! [`AuthContext`]: crate::auth::AuthContext

pub mod health;
pub mod redact;
pub mod registration;
pub mod state;

use anyhow::Context;
use axum::http::StatusCode;
use axum::{middleware, routing::get, routing::post, Router};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::authenticate;
use crate::config::GatewayConfig;

pub use health::HealthResponse;
pub use redact::{RedactAccountsRequest, RedactEntriesRequest, RedactPersonsRequest, RedactResponse};
pub use registration::{RecordLogEntryRequest, RegisterAccountRequest};
pub use state::AppState;

/// Create the API router
pub fn router(state: AppState, config: &GatewayConfig) -> Router {
    let timeout =
        TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout());

    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .layer(timeout.clone());

    // Bounded by the redactor's group deadline instead.
    let redact_routes = Router::new()
        .route("/account/redact", post(redact::redact_accounts))
        .route("/person/redact", post(redact::redact_persons))
        .route("/log/redact", post(redact::redact_entries));

    let registration_routes = Router::new()
        .route(
            "/plugin/{plugin_id}/account",
            post(registration::register_account),
        )
        .route("/plugin/{plugin_id}/log", post(registration::record_log_entry))
        .layer(timeout);

    let api_routes = redact_routes
        .merge(registration_routes)
        .layer(middleware::from_fn_with_state(
            state.gate.clone(),
            authenticate,
        ));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until ctrl-c or SIGTERM.
pub async fn serve(state: AppState, config: &GatewayConfig) -> anyhow::Result<()> {
    let app = router(state, config);

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Received shutdown signal");
}
