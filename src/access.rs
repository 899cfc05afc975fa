//! Per-table access decisions. One gate with two interchangeable strategies
//! replaces the original's parallel authenticated/unauthenticated route
//! families.

use crate::connection::ConnectionManager;
use crate::error::AppError;
use crate::source::DataSource;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Identity assumed when the caller supplies none. Matches the original
/// deployment's development superuser.
pub const DEV_SUPERUSER_ID: i64 = 999;

/// How table access is decided.
pub enum AccessStrategy {
    /// Development: every caller may touch any existing table.
    PrivilegedBypass,
    /// Production: the designated identity bypasses grants; everyone else
    /// needs an `(user_id, table_id)` grant row.
    GrantTable { privileged_user: i64 },
}

/// Lookup of the grants registry: table name -> stable table id, and the
/// existence of a grant pair.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn table_id(&self, table: &str) -> Result<Option<i64>, AppError>;
    async fn has_grant(&self, user_id: i64, table_id: i64) -> Result<bool, AppError>;
}

/// Grants held in the database itself: a `tables` registry and a
/// `user_table_access` pair table.
pub struct SqlGrantStore {
    manager: Arc<ConnectionManager>,
}

impl SqlGrantStore {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        SqlGrantStore { manager }
    }
}

#[async_trait]
impl GrantStore for SqlGrantStore {
    async fn table_id(&self, table: &str) -> Result<Option<i64>, AppError> {
        let pool = self.manager.acquire().await?;
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM tables WHERE name = $1")
            .bind(table)
            .fetch_optional(&pool)
            .await?;
        Ok(id)
    }

    async fn has_grant(&self, user_id: i64, table_id: i64) -> Result<bool, AppError> {
        let pool = self.manager.acquire().await?;
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM user_table_access WHERE user_id = $1 AND table_id = $2",
        )
        .bind(user_id)
        .bind(table_id)
        .fetch_optional(&pool)
        .await?;
        Ok(found.is_some())
    }
}

/// Fixed grants for fixture deployments and tests.
#[derive(Default)]
pub struct StaticGrants {
    tables: HashMap<String, i64>,
    grants: HashSet<(i64, i64)>,
}

impl StaticGrants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, id: i64) -> Self {
        self.tables.insert(name.to_string(), id);
        self
    }

    pub fn with_grant(mut self, user_id: i64, table_id: i64) -> Self {
        self.grants.insert((user_id, table_id));
        self
    }
}

#[async_trait]
impl GrantStore for StaticGrants {
    async fn table_id(&self, table: &str) -> Result<Option<i64>, AppError> {
        Ok(self.tables.get(table).copied())
    }

    async fn has_grant(&self, user_id: i64, table_id: i64) -> Result<bool, AppError> {
        Ok(self.grants.contains(&(user_id, table_id)))
    }
}

pub struct AccessGate {
    strategy: AccessStrategy,
    grants: Arc<dyn GrantStore>,
}

impl AccessGate {
    pub fn new(strategy: AccessStrategy, grants: Arc<dyn GrantStore>) -> Self {
        AccessGate { strategy, grants }
    }

    /// Decide whether `user_id` may operate on `table`. Privileged callers
    /// only need the table to exist; others need a grant row keyed by the
    /// registry's table id.
    pub async fn check(
        &self,
        source: &dyn DataSource,
        user_id: i64,
        table: &str,
    ) -> Result<(), AppError> {
        let privileged = match self.strategy {
            AccessStrategy::PrivilegedBypass => true,
            AccessStrategy::GrantTable { privileged_user } => user_id == privileged_user,
        };
        if privileged {
            source.describe_table(table).await?;
            return Ok(());
        }
        let table_id = self
            .grants
            .table_id(table)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("table '{}'", table)))?;
        if self.grants.has_grant(user_id, table_id).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "no access to table '{}'",
                table
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FixtureDataSource;

    #[tokio::test]
    async fn bypass_allows_any_existing_table_only() {
        let source = FixtureDataSource::seeded();
        let gate = AccessGate::new(AccessStrategy::PrivilegedBypass, Arc::new(StaticGrants::new()));
        assert!(gate.check(&source, 1, "orders").await.is_ok());
        assert!(matches!(
            gate.check(&source, 1, "missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn grant_table_denies_without_a_grant_row() {
        let source = FixtureDataSource::seeded();
        let grants = StaticGrants::new().with_table("orders", 2).with_grant(7, 2);
        let gate = AccessGate::new(
            AccessStrategy::GrantTable {
                privileged_user: DEV_SUPERUSER_ID,
            },
            Arc::new(grants),
        );
        assert!(gate.check(&source, 7, "orders").await.is_ok());
        assert!(matches!(
            gate.check(&source, 8, "orders").await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            gate.check(&source, 8, "missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn privileged_identity_skips_grant_lookup() {
        let source = FixtureDataSource::seeded();
        let gate = AccessGate::new(
            AccessStrategy::GrantTable {
                privileged_user: DEV_SUPERUSER_ID,
            },
            Arc::new(StaticGrants::new()),
        );
        assert!(gate.check(&source, DEV_SUPERUSER_ID, "products").await.is_ok());
    }
}
