//! Redaction endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::state::AppState;
use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::model::{AccountId, LogEntryId, PersonId};
use crate::redact::{parse_mode, RedactionReport};

#[derive(Clone, Debug, Deserialize)]
pub struct RedactAccountsRequest {
    pub accounts: Vec<AccountId>,
    pub mode: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RedactPersonsRequest {
    pub persons: Vec<PersonId>,
    pub mode: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RedactEntriesRequest {
    pub entries: Vec<LogEntryId>,
    pub mode: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RedactResponse {
    pub message: String,
    pub report: RedactionReport,
}

/// 200 when every group went through, 207 when some did not.
fn respond(what: &str, report: RedactionReport) -> Response {
    let status = if report.is_complete() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    let body = RedactResponse {
        message: report.message(what),
        report,
    };
    (status, Json(body)).into_response()
}

pub(super) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// POST /account/redact
pub async fn redact_accounts(
    State(state): State<AppState>,
    ctx: AuthContext,
    payload: Result<Json<RedactAccountsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?;
    let mode = parse_mode(&request.mode)?;
    let report = state
        .redactor
        .redact_accounts(&ctx, &request.accounts, mode)
        .await?;
    Ok(respond("Accounts", report))
}

/// POST /person/redact
pub async fn redact_persons(
    State(state): State<AppState>,
    ctx: AuthContext,
    payload: Result<Json<RedactPersonsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?;
    let mode = parse_mode(&request.mode)?;
    let report = state
        .redactor
        .redact_persons(&ctx, &request.persons, mode)
        .await?;
    Ok(respond("Persons", report))
}

/// POST /log/redact
pub async fn redact_entries(
    State(state): State<AppState>,
    ctx: AuthContext,
    payload: Result<Json<RedactEntriesRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?;
    let mode = parse_mode(&request.mode)?;
    let report = state
        .redactor
        .redact_entries(&ctx, &request.entries, mode)
        .await?;
    Ok(respond("Log entries", report))
}
