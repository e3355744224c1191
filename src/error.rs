//! HTTP error responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::AccessError;
use crate::catalog::CatalogError;
use crate::redact::RedactError;
use crate::store::StoreError;

const BASIC_CHALLENGE: &str = r#"Basic realm="redactor", charset="UTF-8""#;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Unauthorized => Self::Unauthorized,
            forbidden @ AccessError::Forbidden { .. } => Self::Forbidden(forbidden.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => Self::Conflict(format!("{what} already exists")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<RedactError> for ApiError {
    fn from(err: RedactError) -> Self {
        match err {
            RedactError::InvalidArgument(msg) => Self::BadRequest(msg),
            err @ RedactError::NotFound { .. } => Self::NotFound(err.to_string()),
            RedactError::Access(access) => access.into(),
            err @ RedactError::Plugin { .. } => Self::Internal(err.to_string()),
            RedactError::Storage(store) => Self::Internal(store.to_string()),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Access(access) => access.into(),
            CatalogError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            err @ (CatalogError::InvalidPlugin(_) | CatalogError::Invalid { .. }) => {
                Self::BadRequest(err.to_string())
            }
            CatalogError::Conflict(what) => Self::Conflict(format!("{what} already exists")),
            err @ (CatalogError::Unloadable { .. }
            | CatalogError::Storage(_)
            | CatalogError::Rng(_)) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let body = serde_json::json!({ "error": message });
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(BASIC_CHALLENGE),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PluginId;

    #[test]
    fn unauthorized_carries_basic_challenge() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            BASIC_CHALLENGE
        );
    }

    #[test]
    fn redact_errors_map_to_status() {
        let cases = [
            (
                RedactError::InvalidArgument("bad mode".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                RedactError::NotFound {
                    kind: "accounts",
                    ids: vec!["x".into()],
                },
                StatusCode::NOT_FOUND,
            ),
            (
                RedactError::Access(AccessError::Forbidden {
                    plugin_id: PluginId::new(),
                }),
                StatusCode::FORBIDDEN,
            ),
            (
                RedactError::Storage(StoreError::Database("locked".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ApiError::from(StoreError::Database("disk I/O error at /var/db".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
}
