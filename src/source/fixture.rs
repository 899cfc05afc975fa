//! In-memory tables implementing the DataSource contract. Used for demo
//! deployments without a reachable database and as the test double for the
//! full CRUD/paging behavior.

use crate::catalog::{derive_description, ColumnDescriptor, TableDescriptor};
use crate::error::AppError;
use crate::pk::PrimaryKeyInfo;
use crate::source::{DataSource, InsertOutcome, PageRequest, PageResult, RowFilter};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

struct FixtureTable {
    columns: Vec<ColumnDescriptor>,
    key: PrimaryKeyInfo,
    rows: Vec<Map<String, Value>>,
    next_id: i64,
}

impl FixtureTable {
    fn descriptor(&self, id: i64, name: &str) -> TableDescriptor {
        TableDescriptor {
            id,
            name: name.to_string(),
            description: derive_description(name),
            columns: self.columns.clone(),
        }
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Tables keyed by name; BTreeMap keeps listing order stable, matching the
/// live catalog's name ordering.
pub struct FixtureDataSource {
    tables: RwLock<BTreeMap<String, FixtureTable>>,
}

fn column(name: &str, type_tag: &str, is_primary_key: bool) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        type_tag: type_tag.to_string(),
        nullable: !is_primary_key,
        is_primary_key,
    }
}

impl Default for FixtureDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureDataSource {
    pub fn new() -> Self {
        FixtureDataSource {
            tables: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a table with an identity `id` key and seed rows.
    pub fn add_table(&self, name: &str, columns: Vec<ColumnDescriptor>, rows: Vec<Value>) {
        let key_column = columns
            .iter()
            .find(|c| c.is_primary_key)
            .map(|c| c.name.clone());
        let mut table = FixtureTable {
            columns,
            key: PrimaryKeyInfo {
                is_identity: key_column.is_some(),
                column: key_column,
            },
            rows: Vec::new(),
            next_id: 1,
        };
        for row in rows {
            if let Value::Object(map) = row {
                if let Some(id) = table.key.column.as_ref().and_then(|k| map.get(k)).and_then(Value::as_i64) {
                    table.next_id = table.next_id.max(id + 1);
                }
                table.rows.push(map);
            }
        }
        self.tables
            .write()
            .expect("fixture lock poisoned")
            .insert(name.to_string(), table);
    }

    /// The development tables the original deployment shipped with.
    pub fn seeded() -> Self {
        let source = Self::new();
        source.add_table(
            "customers",
            vec![
                column("id", "integer", true),
                column("first_name", "text", false),
                column("last_name", "text", false),
                column("email", "text", false),
                column("phone", "text", false),
                column("address", "text", false),
                column("city", "text", false),
                column("country", "text", false),
            ],
            vec![
                json!({"id": 1, "first_name": "John", "last_name": "Doe", "email": "john.doe@example.com", "phone": "555-123-4567", "address": "123 Main St", "city": "New York", "country": "USA"}),
                json!({"id": 2, "first_name": "Jane", "last_name": "Smith", "email": "jane.smith@example.com", "phone": "555-987-6543", "address": "456 Oak Ave", "city": "Los Angeles", "country": "USA"}),
                json!({"id": 3, "first_name": "Michael", "last_name": "Johnson", "email": "michael.j@example.com", "phone": "555-567-8901", "address": "789 Pine Rd", "city": "Chicago", "country": "USA"}),
                json!({"id": 4, "first_name": "Emily", "last_name": "Brown", "email": "emily.b@example.com", "phone": "555-234-5678", "address": "321 Elm St", "city": "Houston", "country": "USA"}),
                json!({"id": 5, "first_name": "David", "last_name": "Wilson", "email": "david.w@example.com", "phone": "555-345-6789", "address": "654 Maple Dr", "city": "Phoenix", "country": "USA"}),
            ],
        );
        source.add_table(
            "orders",
            vec![
                column("id", "integer", true),
                column("customer_id", "integer", false),
                column("order_date", "date", false),
                column("total_amount", "numeric", false),
                column("status", "text", false),
            ],
            vec![
                json!({"id": 1, "customer_id": 1, "order_date": "2023-01-15", "total_amount": 125.99, "status": "Completed"}),
                json!({"id": 2, "customer_id": 2, "order_date": "2023-02-20", "total_amount": 89.50, "status": "Completed"}),
                json!({"id": 3, "customer_id": 3, "order_date": "2023-03-10", "total_amount": 210.75, "status": "Processing"}),
                json!({"id": 4, "customer_id": 1, "order_date": "2023-04-05", "total_amount": 45.25, "status": "Completed"}),
                json!({"id": 5, "customer_id": 4, "order_date": "2023-05-12", "total_amount": 175.00, "status": "Shipped"}),
            ],
        );
        source.add_table(
            "products",
            vec![
                column("id", "integer", true),
                column("name", "text", false),
                column("description", "text", false),
                column("price", "numeric", false),
                column("category", "text", false),
                column("stock", "integer", false),
            ],
            vec![
                json!({"id": 1, "name": "Laptop", "description": "High-performance laptop with 16GB RAM", "price": 999.99, "category": "Electronics", "stock": 25}),
                json!({"id": 2, "name": "Smartphone", "description": "Latest model with 128GB storage", "price": 699.99, "category": "Electronics", "stock": 50}),
                json!({"id": 3, "name": "Desk Chair", "description": "Ergonomic office chair", "price": 199.99, "category": "Furniture", "stock": 15}),
                json!({"id": 4, "name": "Coffee Maker", "description": "Programmable coffee maker", "price": 49.99, "category": "Appliances", "stock": 30}),
                json!({"id": 5, "name": "Headphones", "description": "Noise-cancelling wireless headphones", "price": 149.99, "category": "Electronics", "stock": 40}),
            ],
        );
        source
    }

    fn with_table<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut FixtureTable) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut tables = self.tables.write().expect("fixture lock poisoned");
        let table = tables
            .get_mut(name)
            .ok_or_else(|| AppError::NotFound(format!("table '{}'", name)))?;
        f(table)
    }
}

fn matches_filter(row: &Map<String, Value>, filter: &RowFilter) -> bool {
    let Some(cell) = row.get(&filter.column) else {
        return false;
    };
    let text = match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.to_lowercase().contains(&filter.value.to_lowercase())
}

/// Loose id comparison: numbers compare numerically, everything else by text.
fn id_matches(cell: Option<&Value>, id: &Value) -> bool {
    match (cell, id) {
        (Some(c), v) if c == v => true,
        (Some(c), v) => cell_text(c) == cell_text(v),
        (None, _) => false,
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn key_column<'a>(
    table: &'a FixtureTable,
    pk_override: Option<&'a str>,
    name: &str,
) -> Result<&'a str, AppError> {
    if let Some(col) = pk_override {
        if !table.has_column(col) {
            return Err(AppError::InvalidInput(format!(
                "unknown column '{}' for table '{}'",
                col, name
            )));
        }
        return Ok(col);
    }
    table
        .key
        .column
        .as_deref()
        .ok_or_else(|| AppError::InvalidOperation(format!("no primary key for table '{}'", name)))
}

#[async_trait]
impl DataSource for FixtureDataSource {
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>, AppError> {
        let tables = self.tables.read().expect("fixture lock poisoned");
        Ok(tables
            .iter()
            .enumerate()
            .map(|(idx, (name, table))| {
                let mut d = table.descriptor(idx as i64 + 1, name);
                d.columns = Vec::new();
                d
            })
            .collect())
    }

    async fn describe_table(&self, name: &str) -> Result<TableDescriptor, AppError> {
        let tables = self.tables.read().expect("fixture lock poisoned");
        let position = tables
            .keys()
            .position(|n| n == name)
            .ok_or_else(|| AppError::NotFound(format!("table '{}'", name)))?;
        Ok(tables[name].descriptor(position as i64 + 1, name))
    }

    async fn resolve_primary_key(&self, name: &str) -> Result<PrimaryKeyInfo, AppError> {
        let tables = self.tables.read().expect("fixture lock poisoned");
        let table = tables
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("table '{}'", name)))?;
        Ok(table.key.clone())
    }

    async fn query_rows(
        &self,
        name: &str,
        page: &PageRequest,
        filter: Option<&RowFilter>,
    ) -> Result<PageResult, AppError> {
        page.validate()?;
        let tables = self.tables.read().expect("fixture lock poisoned");
        let table = tables
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("table '{}'", name)))?;
        if let Some(f) = filter {
            if !table.has_column(&f.column) {
                return Err(AppError::InvalidInput(format!(
                    "unknown column '{}' for table '{}'",
                    f.column, name
                )));
            }
        }
        let mut rows: Vec<&Map<String, Value>> = table
            .rows
            .iter()
            .filter(|r| filter.map(|f| matches_filter(r, f)).unwrap_or(true))
            .collect();
        if let Some(key) = table.key.column.as_deref() {
            rows.sort_by_key(|r| r.get(key).and_then(Value::as_i64).unwrap_or(i64::MAX));
        }
        let total = rows.len() as u64;
        let start = usize::try_from(page.offset()).unwrap_or(usize::MAX).min(rows.len());
        let end = (start + page.page_size as usize).min(rows.len());
        let data = rows[start..end]
            .iter()
            .map(|r| Value::Object((**r).clone()))
            .collect();
        Ok(PageResult::assemble(total, page, data))
    }

    async fn insert_row(
        &self,
        name: &str,
        data: HashMap<String, Value>,
        pk_override: Option<&str>,
    ) -> Result<InsertOutcome, AppError> {
        if data.is_empty() {
            return Err(AppError::InvalidInput("no data provided".into()));
        }
        self.with_table(name, |table| {
            for col in data.keys() {
                if !table.has_column(col) {
                    return Err(AppError::InvalidInput(format!(
                        "unknown column '{}' for table '{}'",
                        col, name
                    )));
                }
            }
            let mut row: Map<String, Value> = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let id = match (table.key.column.clone(), pk_override) {
                (Some(key), None) if table.key.is_identity => {
                    if row.contains_key(&key) {
                        return Err(AppError::InvalidInput(format!(
                            "identity column '{}' must not be supplied",
                            key
                        )));
                    }
                    let id = json!(table.next_id);
                    table.next_id += 1;
                    row.insert(key, id.clone());
                    Some(id)
                }
                (_, Some(col)) => row.get(col).cloned(),
                (Some(key), None) => row.get(&key).cloned(),
                (None, None) => None,
            };
            table.rows.push(row);
            // Echo only what the caller submitted; the generated key travels
            // in `id`, matching the live source.
            Ok(InsertOutcome {
                id,
                data: Value::Object(data.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            })
        })
    }

    async fn update_row(
        &self,
        name: &str,
        id: &Value,
        updates: HashMap<String, Value>,
        pk_override: Option<&str>,
    ) -> Result<(), AppError> {
        self.with_table(name, |table| {
            let key = key_column(table, pk_override, name)?.to_string();
            for col in updates.keys() {
                if !table.has_column(col) {
                    return Err(AppError::InvalidInput(format!(
                        "unknown column '{}' for table '{}'",
                        col, name
                    )));
                }
            }
            let row = table
                .rows
                .iter_mut()
                .find(|r| id_matches(r.get(&key), id))
                .ok_or_else(|| AppError::NotFound(format!("row '{}' in table '{}'", cell_text(id), name)))?;
            for (col, value) in updates {
                if col == key {
                    continue;
                }
                row.insert(col, value);
            }
            Ok(())
        })
    }

    async fn delete_row(
        &self,
        name: &str,
        id: &Value,
        pk_override: Option<&str>,
    ) -> Result<(), AppError> {
        self.with_table(name, |table| {
            let key = key_column(table, pk_override, name)?.to_string();
            let before = table.rows.len();
            table.rows.retain(|r| !id_matches(r.get(&key), id));
            if table.rows.len() == before {
                return Err(AppError::NotFound(format!(
                    "row '{}' in table '{}'",
                    cell_text(id),
                    name
                )));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_listed_table_describes_with_columns() {
        let source = FixtureDataSource::seeded();
        let tables = source.list_tables().await.unwrap();
        assert_eq!(tables.len(), 3);
        for t in tables {
            let d = source.describe_table(&t.name).await.unwrap();
            assert!(!d.columns.is_empty());
        }
    }

    #[tokio::test]
    async fn listing_order_and_ids_are_stable() {
        let source = FixtureDataSource::seeded();
        let names: Vec<String> = source
            .list_tables()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["customers", "orders", "products"]);
        assert_eq!(source.describe_table("orders").await.unwrap().id, 2);
    }

    #[tokio::test]
    async fn paging_covers_all_rows_exactly_once() {
        let source = FixtureDataSource::seeded();
        let mut seen = Vec::new();
        let mut page = 1;
        loop {
            let result = source
                .query_rows("customers", &PageRequest::new(page, 2), None)
                .await
                .unwrap();
            assert_eq!(result.total, 5);
            assert_eq!(result.total_pages, 3);
            if result.data.is_empty() {
                break;
            }
            seen.extend(result.data);
            page += 1;
        }
        assert_eq!(seen.len(), 5);
        let ids: Vec<i64> = seen.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn paging_far_past_the_end_returns_an_empty_page() {
        let source = FixtureDataSource::seeded();
        let result = source
            .query_rows("customers", &PageRequest::new(u32::MAX, 100), None)
            .await
            .unwrap();
        assert_eq!(result.total, 5);
        assert!(result.data.is_empty());
    }

    #[tokio::test]
    async fn first_page_of_orders_matches_ascending_key_order() {
        let source = FixtureDataSource::seeded();
        let result = source
            .query_rows("orders", &PageRequest::new(1, 1), None)
            .await
            .unwrap();
        assert_eq!(result.total, 5);
        assert_eq!(result.total_pages, 5);
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data[0]["id"], json!(1));
    }

    #[tokio::test]
    async fn filter_is_case_insensitive_substring() {
        let source = FixtureDataSource::seeded();
        let filter = RowFilter {
            column: "status".into(),
            value: "SHIP".into(),
        };
        let result = source
            .query_rows("orders", &PageRequest::default(), Some(&filter))
            .await
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.data[0]["id"], json!(5));
    }

    #[tokio::test]
    async fn filter_on_unknown_column_is_invalid_input() {
        let source = FixtureDataSource::seeded();
        let filter = RowFilter {
            column: "nope".into(),
            value: "x".into(),
        };
        let err = source
            .query_rows("orders", &PageRequest::default(), Some(&filter))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn insert_generates_the_identity_key_and_round_trips() {
        let source = FixtureDataSource::seeded();
        let mut data = HashMap::new();
        data.insert("first_name".to_string(), json!("Ada"));
        data.insert("last_name".to_string(), json!("Lovelace"));
        data.insert("email".to_string(), json!("ada@example.com"));
        let outcome = source.insert_row("customers", data, None).await.unwrap();
        assert_eq!(outcome.id, Some(json!(6)));

        let filter = RowFilter {
            column: "email".into(),
            value: "ada@example.com".into(),
        };
        let result = source
            .query_rows("customers", &PageRequest::default(), Some(&filter))
            .await
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.data[0]["first_name"], json!("Ada"));
        assert_eq!(result.data[0]["id"], json!(6));
    }

    #[tokio::test]
    async fn insert_echoes_submitted_columns_only() {
        let source = FixtureDataSource::seeded();
        let mut data = HashMap::new();
        data.insert("first_name".to_string(), json!("Grace"));
        let outcome = source.insert_row("customers", data, None).await.unwrap();
        assert_eq!(outcome.id, Some(json!(6)));
        let echoed = outcome.data.as_object().unwrap();
        assert_eq!(echoed.len(), 1);
        assert_eq!(echoed["first_name"], json!("Grace"));
        assert!(!echoed.contains_key("id"));
    }

    #[tokio::test]
    async fn supplying_the_identity_key_is_rejected_without_override() {
        let source = FixtureDataSource::seeded();
        let mut data = HashMap::new();
        data.insert("id".to_string(), json!(42));
        data.insert("first_name".to_string(), json!("Eve"));
        let err = source.insert_row("customers", data, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn update_missing_row_is_not_found_and_hit_is_visible() {
        let source = FixtureDataSource::seeded();
        let mut updates = HashMap::new();
        updates.insert("status".to_string(), json!("Cancelled"));
        let err = source
            .update_row("orders", &json!(99), updates.clone(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        source
            .update_row("orders", &json!(3), updates, None)
            .await
            .unwrap();
        let filter = RowFilter {
            column: "status".into(),
            value: "cancelled".into(),
        };
        let result = source
            .query_rows("orders", &PageRequest::default(), Some(&filter))
            .await
            .unwrap();
        assert_eq!(result.data[0]["id"], json!(3));
    }

    #[tokio::test]
    async fn delete_missing_row_is_not_found_and_hit_disappears() {
        let source = FixtureDataSource::seeded();
        let err = source.delete_row("products", &json!(99), None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        source.delete_row("products", &json!(2), None).await.unwrap();
        let result = source
            .query_rows("products", &PageRequest::default(), None)
            .await
            .unwrap();
        assert_eq!(result.total, 4);
        assert!(result.data.iter().all(|r| r["id"] != json!(2)));
    }

    #[tokio::test]
    async fn writes_without_a_key_need_an_override() {
        let source = FixtureDataSource::new();
        source.add_table(
            "notes",
            vec![column("body", "text", false), column("tag", "text", false)],
            vec![json!({"body": "first", "tag": "a"})],
        );
        let err = source
            .delete_row("notes", &json!("a"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOperation(_)));
        source.delete_row("notes", &json!("a"), Some("tag")).await.unwrap();
        let result = source.query_rows("notes", &PageRequest::default(), None).await.unwrap();
        assert_eq!(result.total, 0);
    }
}
