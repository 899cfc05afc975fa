//! Router assembly.

use crate::handlers::{config, data, tables};
use crate::state::AppState;
use axum::{
    routing::{get, patch},
    Json, Router,
};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;

const BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Common routes (no state): GET /health, GET /version.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// Table metadata, row data and settings routes.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/tables", get(tables::list_tables))
        .route("/tables/:table_name", get(tables::table_metadata))
        .route("/tables/:table_name/primary-key", get(tables::table_primary_key))
        .route("/data/:table_name", get(data::query_rows).post(data::insert_row))
        .route(
            "/data/:table_name/:row_id",
            patch(data::update_row).delete(data::delete_row),
        )
        .route(
            "/settings/db-credentials",
            get(config::get_db_credentials).post(config::set_db_credentials),
        )
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .with_state(state)
}
