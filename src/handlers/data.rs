//! Row data handlers: paginated reads and keyed writes, all behind the gate.

use crate::error::AppError;
use crate::handlers::{parse_row_id, user_id};
use crate::response;
use crate::source::{PageRequest, RowFilter};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Deserialize)]
pub struct DataQuery {
    page: Option<u32>,
    page_size: Option<u32>,
    filter_column: Option<String>,
    filter_value: Option<String>,
    /// Caller primary-key override for writes on key-less tables.
    pk: Option<String>,
}

impl DataQuery {
    fn page_request(&self) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(PageRequest::DEFAULT_PAGE_SIZE),
        )
    }

    fn filter(&self) -> Option<RowFilter> {
        match (&self.filter_column, &self.filter_value) {
            (Some(column), Some(value)) => Some(RowFilter {
                column: column.clone(),
                value: value.clone(),
            }),
            _ => None,
        }
    }
}

fn body_to_map(value: Value) -> Result<HashMap<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::InvalidInput("body must be a JSON object".into())),
    }
}

pub async fn query_rows(
    State(state): State<AppState>,
    Path(table_name): Path<String>,
    Query(params): Query<DataQuery>,
    headers: HeaderMap,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state
        .gate
        .check(&*state.source, user_id(&headers), &table_name)
        .await?;
    let result = state
        .source
        .query_rows(&table_name, &params.page_request(), params.filter().as_ref())
        .await?;
    Ok(Json(result))
}

pub async fn insert_row(
    State(state): State<AppState>,
    Path(table_name): Path<String>,
    Query(params): Query<DataQuery>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state
        .gate
        .check(&*state.source, user_id(&headers), &table_name)
        .await?;
    let data = body_to_map(body)?;
    let outcome = state
        .source
        .insert_row(&table_name, data, params.pk.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn update_row(
    State(state): State<AppState>,
    Path((table_name, row_id)): Path<(String, String)>,
    Query(params): Query<DataQuery>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state
        .gate
        .check(&*state.source, user_id(&headers), &table_name)
        .await?;
    let updates = body_to_map(body)?;
    let id = parse_row_id(&row_id);
    state
        .source
        .update_row(&table_name, &id, updates, params.pk.as_deref())
        .await?;
    Ok(Json(response::row_updated(&row_id)))
}

pub async fn delete_row(
    State(state): State<AppState>,
    Path((table_name, row_id)): Path<(String, String)>,
    Query(params): Query<DataQuery>,
    headers: HeaderMap,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state
        .gate
        .check(&*state.source, user_id(&headers), &table_name)
        .await?;
    let id = parse_row_id(&row_id);
    state
        .source
        .delete_row(&table_name, &id, params.pk.as_deref())
        .await?;
    Ok(Json(response::row_deleted(&row_id)))
}
