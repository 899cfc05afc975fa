//! Backing-store seam: the same table contract served by the live database or
//! by in-memory fixtures, so the routing layer never special-cases either.

pub mod fixture;
pub mod live;

pub use fixture::FixtureDataSource;
pub use live::LiveDatabase;

use crate::catalog::TableDescriptor;
use crate::error::AppError;
use crate::pk::PrimaryKeyInfo;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Requested page: 1-based page number, page_size capped at 100.
#[derive(Clone, Copy, Debug)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: u32 = 50;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn new(page: u32, page_size: u32) -> Self {
        PageRequest { page, page_size }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.page < 1 {
            return Err(AppError::InvalidInput("page must be >= 1".into()));
        }
        if self.page_size < 1 || self.page_size > Self::MAX_PAGE_SIZE {
            return Err(AppError::InvalidInput(format!(
                "page_size must be between 1 and {}",
                Self::MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Row offset of the first item on this page. Computed in `u64` because
    /// the page number is caller-controlled and `page * page_size` can exceed
    /// `u32` while still being a valid request.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

/// Case-insensitive substring filter on one whitelisted column.
#[derive(Clone, Debug)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PageResult {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
    pub data: Vec<Value>,
}

impl PageResult {
    pub fn assemble(total: u64, request: &PageRequest, data: Vec<Value>) -> Self {
        PageResult {
            total,
            page: request.page,
            page_size: request.page_size,
            total_pages: total.div_ceil(request.page_size as u64),
            data,
        }
    }
}

/// Result of an insert: the generated key when the engine reported one, plus
/// the row data as submitted.
#[derive(Clone, Debug, Serialize)]
pub struct InsertOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub data: Value,
}

/// Generic table read/write contract, driven entirely by runtime schema.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>, AppError>;

    async fn describe_table(&self, name: &str) -> Result<TableDescriptor, AppError>;

    async fn resolve_primary_key(&self, name: &str) -> Result<PrimaryKeyInfo, AppError>;

    async fn query_rows(
        &self,
        name: &str,
        page: &PageRequest,
        filter: Option<&RowFilter>,
    ) -> Result<PageResult, AppError>;

    async fn insert_row(
        &self,
        name: &str,
        data: HashMap<String, Value>,
        pk_override: Option<&str>,
    ) -> Result<InsertOutcome, AppError>;

    async fn update_row(
        &self,
        name: &str,
        id: &Value,
        updates: HashMap<String, Value>,
        pk_override: Option<&str>,
    ) -> Result<(), AppError>;

    async fn delete_row(
        &self,
        name: &str,
        id: &Value,
        pk_override: Option<&str>,
    ) -> Result<(), AppError>;
}
