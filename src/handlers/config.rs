//! Connection-settings handlers: read the redacted view, replace the config
//! and invalidate the live pool.

use crate::config::{normalize_bool, ConnectionConfig};
use crate::error::AppError;
use crate::response;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::Value;

pub async fn get_db_credentials(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(Json(state.manager.config_store().redacted()))
}

fn required_str(body: &Value, key: &str) -> Result<String, AppError> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::InvalidInput(format!("missing required field: {}", key)))
}

fn optional_bool(body: &Value, key: &str, default: bool) -> bool {
    match body.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => normalize_bool(s),
        _ => default,
    }
}

/// Full replacement: every connection field must be present, mirroring the
/// all-or-nothing readiness invariant.
pub async fn set_db_credentials(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let port = match body.get("port") {
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| AppError::InvalidInput("port out of range".into()))?,
        Some(Value::String(s)) => s
            .parse::<u16>()
            .map_err(|_| AppError::InvalidInput("port must be a number".into()))?,
        _ => return Err(AppError::InvalidInput("missing required field: port".into())),
    };
    let config = ConnectionConfig {
        server: required_str(&body, "server")?,
        port,
        database: required_str(&body, "database")?,
        client_id: required_str(&body, "client_id")?,
        tenant_id: required_str(&body, "tenant_id")?,
        client_secret: required_str(&body, "client_secret")?,
        encrypt: optional_bool(&body, "encrypt", true),
        trust_certificate: optional_bool(&body, "trust_certificate", false),
        timeout: body.get("timeout").and_then(Value::as_u64).unwrap_or(30),
    };
    state.manager.config_store().replace(config);
    state.manager.invalidate().await;
    Ok(Json(response::settings_updated()))
}
