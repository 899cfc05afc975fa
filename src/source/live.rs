//! DataSource backed by PostgreSQL: introspects the schema per request, builds
//! parameterized statements, and runs each operation in one transaction on a
//! handle from the ConnectionManager.

use crate::catalog::{SchemaCatalog, TableDescriptor};
use crate::connection::ConnectionManager;
use crate::error::AppError;
use crate::pk::{PrimaryKeyInfo, PrimaryKeyResolver};
use crate::source::{DataSource, InsertOutcome, PageRequest, PageResult, RowFilter};
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use std::sync::Arc;

pub struct LiveDatabase {
    manager: Arc<ConnectionManager>,
    resolver: PrimaryKeyResolver,
}

impl LiveDatabase {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        LiveDatabase {
            manager,
            resolver: PrimaryKeyResolver::new(),
        }
    }

    pub fn with_resolver(manager: Arc<ConnectionManager>, resolver: PrimaryKeyResolver) -> Self {
        LiveDatabase { manager, resolver }
    }

    async fn pool(&self) -> Result<PgPool, AppError> {
        self.manager.acquire().await
    }

    /// Key column for a write: caller override (validated against the
    /// whitelist) wins, otherwise the resolved key, otherwise the operation
    /// cannot proceed.
    fn write_key(
        table: &TableDescriptor,
        resolved: &PrimaryKeyInfo,
        pk_override: Option<&str>,
    ) -> Result<String, AppError> {
        if let Some(col) = pk_override {
            if !table.has_column(col) {
                return Err(AppError::InvalidInput(format!(
                    "unknown column '{}' for table '{}'",
                    col, table.name
                )));
            }
            return Ok(col.to_string());
        }
        resolved.column.clone().ok_or_else(|| {
            AppError::InvalidOperation(format!("no primary key for table '{}'", table.name))
        })
    }
}

fn bind_all<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &'q [Value],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    let mut query = query;
    for p in params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

async fn fetch_all_tx(tx: &mut PgConnection, q: &QueryBuf) -> Result<Vec<PgRow>, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    Ok(bind_all(sqlx::query(&q.sql), &q.params).fetch_all(tx).await?)
}

async fn execute_tx(tx: &mut PgConnection, q: &QueryBuf) -> Result<u64, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
    let done = bind_all(sqlx::query(&q.sql), &q.params).execute(tx).await?;
    Ok(done.rows_affected())
}

/// Commit on success, roll back on any failure, then surface the result.
async fn finish_tx<T>(
    tx: sqlx::Transaction<'_, sqlx::Postgres>,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(v) => {
            tx.commit().await?;
            Ok(v)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

#[async_trait]
impl DataSource for LiveDatabase {
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>, AppError> {
        let pool = self.pool().await?;
        SchemaCatalog::list_tables(&pool).await
    }

    async fn describe_table(&self, name: &str) -> Result<TableDescriptor, AppError> {
        let pool = self.pool().await?;
        SchemaCatalog::describe_table(&pool, name).await
    }

    async fn resolve_primary_key(&self, name: &str) -> Result<PrimaryKeyInfo, AppError> {
        let pool = self.pool().await?;
        let table = SchemaCatalog::describe_table(&pool, name).await?;
        self.resolver.resolve(&pool, &table).await
    }

    async fn query_rows(
        &self,
        name: &str,
        page: &PageRequest,
        filter: Option<&RowFilter>,
    ) -> Result<PageResult, AppError> {
        page.validate()?;
        let pool = self.pool().await?;
        let table = SchemaCatalog::describe_table(&pool, name).await?;
        let key = self.resolver.resolve(&pool, &table).await?;
        // Deterministic paging order: the resolved key, else the first column.
        let order_column = key
            .column
            .as_deref()
            .or_else(|| table.columns.first().map(|c| c.name.as_str()))
            .ok_or_else(|| AppError::NotFound(format!("table '{}'", name)))?
            .to_string();

        let count = sql::count_rows(&table, filter)?;
        let select = sql::select_page(&table, filter, &order_column, page.page_size, page.offset())?;

        let mut tx = pool.begin().await?;
        let result = async {
            tracing::debug!(sql = %count.sql, params = ?count.params, "query");
            let mut count_query = sqlx::query_scalar::<_, i64>(&count.sql);
            for p in &count.params {
                count_query = count_query.bind(PgBindValue::from_json(p));
            }
            let total: i64 = count_query.fetch_one(&mut *tx).await?;
            let rows = fetch_all_tx(&mut *tx, &select).await?;
            let data = rows.iter().map(row_to_json).collect();
            Ok(PageResult::assemble(total.max(0) as u64, page, data))
        }
        .await;
        finish_tx(tx, result).await
    }

    async fn insert_row(
        &self,
        name: &str,
        data: HashMap<String, Value>,
        pk_override: Option<&str>,
    ) -> Result<InsertOutcome, AppError> {
        let pool = self.pool().await?;
        let table = SchemaCatalog::describe_table(&pool, name).await?;
        let key = self.resolver.resolve(&pool, &table).await?;

        if pk_override.is_none() && key.is_identity {
            if let Some(col) = key.column.as_deref() {
                if data.contains_key(col) {
                    return Err(AppError::InvalidInput(format!(
                        "identity column '{}' must not be supplied",
                        col
                    )));
                }
            }
        }
        let returning_key = pk_override.or(key.column.as_deref());
        let q = sql::insert_row(&table, &data, returning_key)?;

        let mut tx = pool.begin().await?;
        let result = async {
            let id = if returning_key.is_some() {
                tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
                let row = bind_all(sqlx::query(&q.sql), &q.params)
                    .fetch_optional(&mut *tx)
                    .await?;
                row.as_ref().map(|r| cell_to_value(r, 0))
            } else {
                execute_tx(&mut *tx, &q).await?;
                None
            };
            Ok(InsertOutcome {
                id,
                data: Value::Object(data.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            })
        }
        .await;
        finish_tx(tx, result).await
    }

    async fn update_row(
        &self,
        name: &str,
        id: &Value,
        updates: HashMap<String, Value>,
        pk_override: Option<&str>,
    ) -> Result<(), AppError> {
        let pool = self.pool().await?;
        let table = SchemaCatalog::describe_table(&pool, name).await?;
        let key = self.resolver.resolve(&pool, &table).await?;
        let key_column = Self::write_key(&table, &key, pk_override)?;
        let q = sql::update_by_key(&table, &key_column, id, &updates)?;

        let mut tx = pool.begin().await?;
        let result = async {
            let affected = execute_tx(&mut *tx, &q).await?;
            if affected == 0 {
                return Err(AppError::NotFound(format!(
                    "row '{}' in table '{}'",
                    id, name
                )));
            }
            Ok(())
        }
        .await;
        finish_tx(tx, result).await
    }

    async fn delete_row(
        &self,
        name: &str,
        id: &Value,
        pk_override: Option<&str>,
    ) -> Result<(), AppError> {
        let pool = self.pool().await?;
        let table = SchemaCatalog::describe_table(&pool, name).await?;
        let key = self.resolver.resolve(&pool, &table).await?;
        let key_column = Self::write_key(&table, &key, pk_override)?;
        let q = sql::delete_by_key(&table, &key_column, id)?;

        let mut tx = pool.begin().await?;
        let result = async {
            let affected = execute_tx(&mut *tx, &q).await?;
            if affected == 0 {
                return Err(AppError::NotFound(format!(
                    "row '{}' in table '{}'",
                    id, name
                )));
            }
            Ok(())
        }
        .await;
        finish_tx(tx, result).await
    }
}

fn row_to_json(row: &PgRow) -> Value {
    use sqlx::{Column, Row};
    let mut map = serde_json::Map::new();
    for (idx, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), cell_to_value(row, idx));
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, idx: usize) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(idx) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(idx) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(idx) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(idx) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(idx) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(idx) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(idx) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(idx) {
        return j;
    }
    Value::Null
}
