//! Primary-key resolution: ordered fallback from declared constraint to
//! column flag to static legacy overrides.

use crate::catalog::{SchemaCatalog, TableDescriptor};
use crate::error::AppError;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;

#[derive(Clone, Debug, Default, Serialize)]
pub struct PrimaryKeyInfo {
    pub column: Option<String>,
    /// Engine-generated values; must never be supplied on insert/update.
    pub is_identity: bool,
}

pub struct PrimaryKeyResolver {
    /// table name -> key column, for legacy tables with no declared constraint.
    overrides: HashMap<String, String>,
}

impl Default for PrimaryKeyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimaryKeyResolver {
    pub fn new() -> Self {
        PrimaryKeyResolver {
            overrides: HashMap::new(),
        }
    }

    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        PrimaryKeyResolver { overrides }
    }

    /// Resolve the key column and identity property for one table.
    /// Constraint introspection failure falls through to the next strategy
    /// rather than failing the request.
    pub async fn resolve(
        &self,
        pool: &PgPool,
        table: &TableDescriptor,
    ) -> Result<PrimaryKeyInfo, AppError> {
        let constraint_cols = match SchemaCatalog::primary_key_constraint_columns(pool, &table.name).await {
            Ok(cols) => cols,
            Err(e) => {
                tracing::warn!(table = %table.name, error = %e, "constraint introspection failed, falling back");
                Vec::new()
            }
        };
        let column = choose_key_column(&constraint_cols, table, &self.overrides);
        let is_identity = match &column {
            Some(col) => identity_check(pool, &table.name, col).await,
            None => false,
        };
        Ok(PrimaryKeyInfo { column, is_identity })
    }
}

/// Pick the key column: a single constraint-declared column wins, then the
/// catalog's column flag, then the static override map.
fn choose_key_column(
    constraint_cols: &[String],
    table: &TableDescriptor,
    overrides: &HashMap<String, String>,
) -> Option<String> {
    if constraint_cols.len() == 1 {
        return Some(constraint_cols[0].clone());
    }
    if let Some(flagged) = table.columns.iter().find(|c| c.is_primary_key) {
        return Some(flagged.name.clone());
    }
    overrides.get(&table.name).cloned()
}

/// Whether the column's values are engine-generated. A failed lookup degrades
/// to false (caller must supply the key) instead of aborting the request.
async fn identity_check(pool: &PgPool, table: &str, column: &str) -> bool {
    let row: Result<Option<(String, Option<String>)>, sqlx::Error> = sqlx::query_as(
        "SELECT is_identity, column_default FROM information_schema.columns \
         WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2",
    )
    .bind(table)
    .bind(column)
    .fetch_optional(pool)
    .await;
    match row {
        Ok(Some((is_identity, default))) => {
            is_identity == "YES"
                || default.map(|d| d.starts_with("nextval(")).unwrap_or(false)
        }
        Ok(None) => false,
        Err(e) => {
            tracing::warn!(table, column, error = %e, "identity lookup failed, assuming caller-supplied key");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{derive_description, ColumnDescriptor};

    fn table(name: &str, columns: &[(&str, bool)]) -> TableDescriptor {
        TableDescriptor {
            id: 1,
            name: name.to_string(),
            description: derive_description(name),
            columns: columns
                .iter()
                .map(|(col, pk)| ColumnDescriptor {
                    name: col.to_string(),
                    type_tag: "integer".into(),
                    nullable: false,
                    is_primary_key: *pk,
                })
                .collect(),
        }
    }

    #[test]
    fn constraint_column_wins_over_flag_and_override() {
        let t = table("orders", &[("order_no", true), ("id", false)]);
        let mut overrides = HashMap::new();
        overrides.insert("orders".to_string(), "legacy_id".to_string());
        let chosen = choose_key_column(&["id".to_string()], &t, &overrides);
        assert_eq!(chosen.as_deref(), Some("id"));
    }

    #[test]
    fn composite_constraint_falls_through_to_flag() {
        let t = table("grants", &[("user_id", false), ("table_id", true)]);
        let cols = vec!["user_id".to_string(), "table_id".to_string()];
        let chosen = choose_key_column(&cols, &t, &HashMap::new());
        assert_eq!(chosen.as_deref(), Some("table_id"));
    }

    #[test]
    fn override_applies_only_without_introspected_key() {
        let t = table("legacy_stock", &[("sku", false), ("count", false)]);
        let mut overrides = HashMap::new();
        overrides.insert("legacy_stock".to_string(), "sku".to_string());
        assert_eq!(
            choose_key_column(&[], &t, &overrides).as_deref(),
            Some("sku")
        );
        assert_eq!(choose_key_column(&[], &t, &HashMap::new()), None);
    }
}
