//! Per-plugin registration of accounts and log entries

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::redact::json_body;
use super::state::AppState;
use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::model::{Account, AccountId, LogEntry, PersonId, PluginId};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAccountRequest {
    pub person_id: PersonId,
    pub native_id: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordLogEntryRequest {
    pub account_id: AccountId,
    pub native_location: serde_json::Value,
}

fn plugin_path(path: Result<Path<PluginId>, PathRejection>) -> Result<PluginId, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// POST /plugin/{plugin_id}/account
pub async fn register_account(
    State(state): State<AppState>,
    ctx: AuthContext,
    path: Result<Path<PluginId>, PathRejection>,
    payload: Result<Json<RegisterAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let plugin_id = plugin_path(path)?;
    let request = json_body(payload)?;
    let account = state
        .catalog
        .register_account(&ctx, plugin_id, request.person_id, request.native_id)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// POST /plugin/{plugin_id}/log
pub async fn record_log_entry(
    State(state): State<AppState>,
    ctx: AuthContext,
    path: Result<Path<PluginId>, PathRejection>,
    payload: Result<Json<RecordLogEntryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LogEntry>), ApiError> {
    let plugin_id = plugin_path(path)?;
    let request = json_body(payload)?;
    let entry = state
        .catalog
        .record_log_entry(&ctx, plugin_id, request.account_id, request.native_location)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}
