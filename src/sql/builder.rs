//! Builds parameterized SELECT, INSERT, UPDATE, DELETE against an introspected
//! table. Identifiers come only from the table descriptor (or a validated
//! caller override); every caller value is bound as a parameter.

use crate::catalog::TableDescriptor;
use crate::error::AppError;
use crate::source::RowFilter;
use serde_json::Value;
use std::collections::HashMap;

/// Quote identifier for PostgreSQL (safe: only whitelisted names reach here).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// Cast target for a bound value, from the engine-reported type. Lets string
/// payloads bind against typed columns the way the engine expects.
fn cast_suffix(table: &TableDescriptor, column: &str) -> String {
    match table.columns.iter().find(|c| c.name == column) {
        Some(c) if c.type_tag != "USER-DEFINED" && !c.type_tag.contains("ARRAY") => {
            format!("::{}", c.type_tag)
        }
        _ => String::new(),
    }
}

fn require_column(table: &TableDescriptor, column: &str) -> Result<(), AppError> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "unknown column '{}' for table '{}'",
            column, table.name
        )))
    }
}

/// WHERE fragment for the substring filter: case-insensitive match with the
/// `%value%` pattern bound, never spliced into the text.
fn filter_clause(
    q: &mut QueryBuf,
    table: &TableDescriptor,
    filter: Option<&RowFilter>,
) -> Result<String, AppError> {
    match filter {
        Some(f) => {
            require_column(table, &f.column)?;
            let n = q.push_param(Value::String(format!("%{}%", f.value)));
            Ok(format!(" WHERE {}::text ILIKE ${}", quoted(&f.column), n))
        }
        None => Ok(String::new()),
    }
}

/// COUNT query matching `select_page`'s WHERE.
pub fn count_rows(table: &TableDescriptor, filter: Option<&RowFilter>) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_clause = filter_clause(&mut q, table, filter)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", quoted(&table.name), where_clause);
    Ok(q)
}

/// Data query: explicit ORDER BY the resolved key (first column when the table
/// has none) so paging is stable, then LIMIT/OFFSET.
pub fn select_page(
    table: &TableDescriptor,
    filter: Option<&RowFilter>,
    order_column: &str,
    limit: u32,
    offset: u64,
) -> Result<QueryBuf, AppError> {
    require_column(table, order_column)?;
    let mut q = QueryBuf::new();
    let where_clause = filter_clause(&mut q, table, filter)?;
    let cols = table
        .columns
        .iter()
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        cols,
        quoted(&table.name),
        where_clause,
        quoted(order_column),
        limit,
        offset
    );
    Ok(q)
}

/// INSERT with columns taken in descriptor order from the provided row data.
/// `returning_key` requests the generated key inline when the table has one.
pub fn insert_row(
    table: &TableDescriptor,
    data: &HashMap<String, Value>,
    returning_key: Option<&str>,
) -> Result<QueryBuf, AppError> {
    for col in data.keys() {
        require_column(table, col)?;
    }
    if data.is_empty() {
        return Err(AppError::InvalidInput("no data provided".into()));
    }
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &table.columns {
        let Some(v) = data.get(&c.name) else { continue };
        let n = q.push_param(v.clone());
        placeholders.push(format!("${}{}", n, cast_suffix(table, &c.name)));
        cols.push(quoted(&c.name));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quoted(&table.name),
        cols.join(", "),
        placeholders.join(", ")
    );
    if let Some(key) = returning_key {
        q.sql.push_str(&format!(" RETURNING {}", quoted(key)));
    }
    Ok(q)
}

/// UPDATE keyed on the resolved (or overridden) primary key. The key column is
/// stripped from the SET list.
pub fn update_by_key(
    table: &TableDescriptor,
    key_column: &str,
    id: &Value,
    updates: &HashMap<String, Value>,
) -> Result<QueryBuf, AppError> {
    require_column(table, key_column)?;
    for col in updates.keys() {
        require_column(table, col)?;
    }
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in &table.columns {
        if c.name == key_column {
            continue;
        }
        let Some(v) = updates.get(&c.name) else { continue };
        let n = q.push_param(v.clone());
        sets.push(format!("{} = ${}{}", quoted(&c.name), n, cast_suffix(table, &c.name)));
    }
    if sets.is_empty() {
        return Err(AppError::InvalidInput("no updatable columns provided".into()));
    }
    let id_param = q.push_param(id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}{}",
        quoted(&table.name),
        sets.join(", "),
        quoted(key_column),
        id_param,
        cast_suffix(table, key_column)
    );
    Ok(q)
}

/// DELETE keyed on the resolved (or overridden) primary key.
pub fn delete_by_key(
    table: &TableDescriptor,
    key_column: &str,
    id: &Value,
) -> Result<QueryBuf, AppError> {
    require_column(table, key_column)?;
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone());
    q.sql = format!(
        "DELETE FROM {} WHERE {} = ${}{}",
        quoted(&table.name),
        quoted(key_column),
        n,
        cast_suffix(table, key_column)
    );
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{derive_description, ColumnDescriptor};
    use serde_json::json;

    fn orders() -> TableDescriptor {
        let cols = [
            ("id", "integer", true),
            ("customer_id", "integer", false),
            ("status", "text", false),
        ];
        TableDescriptor {
            id: 1,
            name: "orders".into(),
            description: derive_description("orders"),
            columns: cols
                .iter()
                .map(|(name, ty, pk)| ColumnDescriptor {
                    name: name.to_string(),
                    type_tag: ty.to_string(),
                    nullable: false,
                    is_primary_key: *pk,
                })
                .collect(),
        }
    }

    #[test]
    fn select_orders_by_key_and_binds_filter() {
        let t = orders();
        let filter = RowFilter {
            column: "status".into(),
            value: "ship".into(),
        };
        let q = select_page(&t, Some(&filter), "id", 50, 100).unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"customer_id\", \"status\" FROM \"orders\" \
             WHERE \"status\"::text ILIKE $1 ORDER BY \"id\" LIMIT 50 OFFSET 100"
        );
        assert_eq!(q.params, vec![json!("%ship%")]);
    }

    #[test]
    fn select_carries_offsets_past_u32() {
        let t = orders();
        let q = select_page(&t, None, "id", 100, 429_496_729_400).unwrap();
        assert!(q.sql.ends_with("LIMIT 100 OFFSET 429496729400"));
    }

    #[test]
    fn count_shares_the_filter_shape() {
        let t = orders();
        let q = count_rows(&t, None).unwrap();
        assert_eq!(q.sql, "SELECT COUNT(*) FROM \"orders\"");
        assert!(q.params.is_empty());
    }

    #[test]
    fn unknown_filter_column_is_rejected_before_sql() {
        let t = orders();
        let filter = RowFilter {
            column: "status; DROP TABLE orders".into(),
            value: "x".into(),
        };
        assert!(matches!(
            count_rows(&t, Some(&filter)),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn insert_orders_columns_by_descriptor_and_returns_key() {
        let t = orders();
        let mut data = HashMap::new();
        data.insert("status".to_string(), json!("Pending"));
        data.insert("customer_id".to_string(), json!(7));
        let q = insert_row(&t, &data, Some("id")).unwrap();
        assert_eq!(
            q.sql,
            "INSERT INTO \"orders\" (\"customer_id\", \"status\") \
             VALUES ($1::integer, $2::text) RETURNING \"id\""
        );
        assert_eq!(q.params, vec![json!(7), json!("Pending")]);
    }

    #[test]
    fn update_strips_key_column_from_set_list() {
        let t = orders();
        let mut updates = HashMap::new();
        updates.insert("id".to_string(), json!(99));
        updates.insert("status".to_string(), json!("Shipped"));
        let q = update_by_key(&t, "id", &json!(3), &updates).unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"orders\" SET \"status\" = $1::text WHERE \"id\" = $2::integer"
        );
        assert_eq!(q.params, vec![json!("Shipped"), json!(3)]);
    }

    #[test]
    fn update_with_only_key_column_is_invalid() {
        let t = orders();
        let mut updates = HashMap::new();
        updates.insert("id".to_string(), json!(99));
        assert!(matches!(
            update_by_key(&t, "id", &json!(3), &updates),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn delete_binds_the_id() {
        let t = orders();
        let q = delete_by_key(&t, "id", &json!(3)).unwrap();
        assert_eq!(q.sql, "DELETE FROM \"orders\" WHERE \"id\" = $1::integer");
        assert_eq!(q.params, vec![json!(3)]);
    }
}
