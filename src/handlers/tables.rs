//! Table metadata handlers: listing and per-table descriptors.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};

pub async fn list_tables(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let tables = state.source.list_tables().await?;
    Ok(Json(tables))
}

pub async fn table_metadata(
    State(state): State<AppState>,
    Path(table_name): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let table = state.source.describe_table(&table_name).await?;
    Ok(Json(table))
}

pub async fn table_primary_key(
    State(state): State<AppState>,
    Path(table_name): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let key = state.source.resolve_primary_key(&table_name).await?;
    Ok(Json(key))
}
