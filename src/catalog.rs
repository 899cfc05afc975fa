//! Live schema introspection: the single source of truth for which tables and
//! columns exist. The column set returned here is the only identifier
//! whitelist the SQL builder may interpolate.

use crate::error::AppError;
use serde::Serialize;
use sqlx::PgPool;

/// Bookkeeping tables never exposed through the API.
const INTERNAL_TABLES: &[&str] = &["alembic_version", "_sqlx_migrations"];

#[derive(Clone, Debug, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Engine-reported type string (e.g. "integer", "character varying").
    #[serde(rename = "type")]
    pub type_tag: String,
    pub nullable: bool,
    pub is_primary_key: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct TableDescriptor {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Names of all columns, in declared order. Used as the interpolation whitelist.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Display label derived from the table name, e.g. "orders" -> "Orders table".
pub fn derive_description(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("{}{} table", first.to_uppercase(), chars.as_str()),
        None => "table".to_string(),
    }
}

pub fn is_internal(name: &str) -> bool {
    INTERNAL_TABLES.contains(&name)
}

pub struct SchemaCatalog;

impl SchemaCatalog {
    /// All user table names in the public schema, ordered by name so ordinal
    /// ids stay stable across requests.
    pub async fn table_names(pool: &PgPool) -> Result<Vec<String>, AppError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(pool)
        .await?;
        Ok(names.into_iter().filter(|n| !is_internal(n)).collect())
    }

    /// Descriptors without columns, for the listing endpoint.
    pub async fn list_tables(pool: &PgPool) -> Result<Vec<TableDescriptor>, AppError> {
        let names = Self::table_names(pool).await?;
        Ok(names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| TableDescriptor {
                id: idx as i64 + 1,
                description: derive_description(&name),
                name,
                columns: Vec::new(),
            })
            .collect())
    }

    /// Full descriptor for one table. `NotFound` when the table is not in
    /// `table_names`.
    pub async fn describe_table(pool: &PgPool, name: &str) -> Result<TableDescriptor, AppError> {
        let names = Self::table_names(pool).await?;
        let position = names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| AppError::NotFound(format!("table '{}'", name)))?;

        let pk_columns = Self::primary_key_constraint_columns(pool, name).await?;
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT column_name, data_type, is_nullable \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(name)
        .fetch_all(pool)
        .await?;

        let columns = rows
            .into_iter()
            .map(|(col, type_tag, nullable)| ColumnDescriptor {
                is_primary_key: pk_columns.contains(&col),
                name: col,
                type_tag,
                nullable: nullable == "YES",
            })
            .collect();

        Ok(TableDescriptor {
            id: position as i64 + 1,
            description: derive_description(name),
            name: name.to_string(),
            columns,
        })
    }

    /// Columns covered by the table's PRIMARY KEY constraint, if declared.
    pub async fn primary_key_constraint_columns(
        pool: &PgPool,
        table: &str,
    ) -> Result<Vec<String>, AppError> {
        let cols: Vec<String> = sqlx::query_scalar(
            "SELECT kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
               AND tc.table_schema = 'public' AND tc.table_name = $1 \
             ORDER BY kcu.ordinal_position",
        )
        .bind(table)
        .fetch_all(pool)
        .await?;
        Ok(cols)
    }
}
