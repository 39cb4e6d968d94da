//! The row-op dispatcher's statement-building half (pure). Execution
//! against the target store lives in `replbridge-store`.

use crate::error::{CoreError, Result};
use crate::payload::FlatRow;
use crate::pk_policy::{self, BusinessType};

/// The three row-level operations a client can replicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOperation {
    Insert,
    Update,
    Delete,
}

impl RowOperation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// A single replicated row change, already decoded and routed to a
/// physical database for this specific operation's `(store_id, app_id)`
/// by the caller; two ops on the same session are not guaranteed to
/// share a database.
#[derive(Debug, Clone)]
pub struct RowOp {
    pub store_id: String,
    pub app_id: String,
    pub database: String,
    pub table_name: String,
    pub op: RowOperation,
    pub payload: FlatRow,
    pub business_type: BusinessType,
    pub sync_id: String,
}

/// A parameterised statement: `?` placeholders in `sql`, bound in order
/// by `params`. Intentionally driver-agnostic; `replbridge-store` binds
/// these against an `sqlx::MySqlPool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<String>,
}

/// Whether bootstrap-path semantics apply: a duplicate-key condition on
/// INSERT is skipped rather than upgraded to the `ON DUPLICATE KEY
/// UPDATE` upsert used by the incremental path (see §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Incremental path: `ON DUPLICATE KEY UPDATE` upsert.
    Upsert,
    /// Bootstrap path (full/initial sync batches): plain INSERT, relying
    /// on the caller to treat a duplicate-key error as a skip.
    InsertOrSkip,
}

/// Build the parameterised statement for one row-op.
pub fn build_statement(row_op: &RowOp, insert_mode: InsertMode) -> Result<Statement> {
    match row_op.op {
        RowOperation::Insert => build_insert(row_op, insert_mode),
        RowOperation::Update => build_update(row_op),
        RowOperation::Delete => build_delete(row_op),
    }
}

fn build_insert(row_op: &RowOp, mode: InsertMode) -> Result<Statement> {
    if row_op.payload.is_empty() {
        return Err(CoreError::MalformedPayload(
            "INSERT payload has no columns".into(),
        ));
    }

    let columns: Vec<&str> = row_op.payload.keys().map(String::as_str).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let quoted_columns: Vec<String> = columns.iter().map(|c| format!("`{c}`")).collect();

    let mut sql = format!(
        "INSERT INTO `{table}`({cols}) VALUES({ph})",
        table = row_op.table_name,
        cols = quoted_columns.join(", "),
        ph = placeholders,
    );

    if let InsertMode::Upsert = mode {
        let update_clause: Vec<String> = columns
            .iter()
            .map(|c| format!("`{c}` = VALUES(`{c}`)"))
            .collect();
        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        sql.push_str(&update_clause.join(", "));
    }

    let params = row_op.payload.values().cloned().collect();
    Ok(Statement { sql, params })
}

fn build_update(row_op: &RowOp) -> Result<Statement> {
    let pk_columns = pk_policy::primary_key_columns(&row_op.table_name, row_op.business_type);

    let set_columns: Vec<&str> = row_op
        .payload
        .keys()
        .filter(|k| !k.starts_with("old_"))
        .map(String::as_str)
        .collect();

    if set_columns.is_empty() {
        return Err(CoreError::MalformedPayload(
            "UPDATE payload has no non-pre-image columns".into(),
        ));
    }

    let set_clause: Vec<String> = set_columns.iter().map(|c| format!("`{c}` = ?")).collect();
    let mut params: Vec<String> = set_columns
        .iter()
        .map(|c| row_op.payload.get(*c).cloned().unwrap_or_default())
        .collect();

    let mut where_clause = Vec::with_capacity(pk_columns.len());
    for pk in pk_columns {
        let old_key = format!("old_{pk}");
        let value = row_op
            .payload
            .get(&old_key)
            .or_else(|| row_op.payload.get(*pk))
            .ok_or_else(|| CoreError::MissingPrimaryKeyColumn {
                table: row_op.table_name.clone(),
                column: (*pk).to_string(),
                op: "UPDATE",
            })?;
        where_clause.push(format!("`{pk}` = ?"));
        params.push(value.clone());
    }

    let sql = format!(
        "UPDATE `{table}` SET {set} WHERE {where_}",
        table = row_op.table_name,
        set = set_clause.join(", "),
        where_ = where_clause.join(" AND "),
    );

    Ok(Statement { sql, params })
}

fn build_delete(row_op: &RowOp) -> Result<Statement> {
    let pk_columns = pk_policy::primary_key_columns(&row_op.table_name, row_op.business_type);

    let mut where_clause = Vec::with_capacity(pk_columns.len());
    let mut params = Vec::with_capacity(pk_columns.len());
    for pk in pk_columns {
        let value = row_op.payload.get(*pk).ok_or_else(|| {
            CoreError::MissingPrimaryKeyColumn {
                table: row_op.table_name.clone(),
                column: (*pk).to_string(),
                op: "DELETE",
            }
        })?;
        where_clause.push(format!("`{pk}` = ?"));
        params.push(value.clone());
    }

    let sql = format!(
        "DELETE FROM `{table}` WHERE {where_}",
        table = row_op.table_name,
        where_ = where_clause.join(" AND "),
    );

    Ok(Statement { sql, params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn row(table: &str, op: RowOperation, pairs: &[(&str, &str)], bt: BusinessType) -> RowOp {
        let mut payload = IndexMap::new();
        for (k, v) in pairs {
            payload.insert(k.to_string(), v.to_string());
        }
        RowOp {
            store_id: "store1".into(),
            app_id: "app1".into(),
            database: "app1".into(),
            table_name: table.into(),
            op,
            payload,
            business_type: bt,
            sync_id: "s1".into(),
        }
    }

    #[test]
    fn insert_upsert_is_idempotent_shape() {
        let r = row(
            "SalesDetail",
            RowOperation::Insert,
            &[("InvoiceNo", "7"), ("StockId", "S1"), ("Qty", "2")],
            BusinessType::Retail,
        );
        let stmt = build_statement(&r, InsertMode::Upsert).unwrap();
        assert!(stmt.sql.starts_with("INSERT INTO `SalesDetail`"));
        assert!(stmt.sql.contains("ON DUPLICATE KEY UPDATE"));
        assert_eq!(stmt.params, vec!["7", "S1", "2"]);
    }

    #[test]
    fn update_uses_old_prefixed_pk_when_present() {
        let r = row(
            "MenuItem",
            RowOperation::Update,
            &[("ItemCode", "M1"), ("Description1", "b"), ("old_ItemCode", "M1")],
            BusinessType::Hospitality,
        );
        let stmt = build_statement(&r, InsertMode::Upsert).unwrap();
        assert!(stmt.sql.starts_with("UPDATE `MenuItem` SET"));
        assert!(stmt.sql.contains("WHERE `ItemCode` = ?"));
        assert_eq!(stmt.params, vec!["M1", "M1"]);
    }

    #[test]
    fn update_missing_pk_is_non_retryable_error() {
        let r = row(
            "MenuItem",
            RowOperation::Update,
            &[("Description1", "b")],
            BusinessType::Hospitality,
        );
        let err = build_statement(&r, InsertMode::Upsert).unwrap_err();
        assert!(matches!(err, CoreError::MissingPrimaryKeyColumn { .. }));
    }

    #[test]
    fn delete_uses_payload_pk_directly() {
        let r = row(
            "SalesDetail",
            RowOperation::Delete,
            &[("InvoiceNo", "7"), ("StockId", "S1")],
            BusinessType::Retail,
        );
        let stmt = build_statement(&r, InsertMode::Upsert).unwrap();
        assert_eq!(
            stmt.sql,
            "DELETE FROM `SalesDetail` WHERE `InvoiceNo` = ? AND `StockId` = ?"
        );
        assert_eq!(stmt.params, vec!["7", "S1"]);
    }

    #[test]
    fn bootstrap_insert_has_no_upsert_clause() {
        let r = row(
            "StockItems",
            RowOperation::Insert,
            &[("StockId", "007")],
            BusinessType::Retail,
        );
        let stmt = build_statement(&r, InsertMode::InsertOrSkip).unwrap();
        assert!(!stmt.sql.contains("ON DUPLICATE"));
    }
}
