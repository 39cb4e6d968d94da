//! The Schema Materialiser's pure half: rendering a client-supplied
//! column/index descriptor into `CREATE TABLE` / `CREATE INDEX` SQL, and
//! the business-type secondary-index bundles. Actually executing the
//! statements against a database lives in `replbridge-store`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::pk_policy::BusinessType;

/// One column as described by the client's `INFORMATION_SCHEMA`-shaped
/// payload (`COLUMN_NAME`, `DATA_TYPE`, …).
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub column_name: String,
    pub data_type: String,
    pub character_maximum_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub is_identity: bool,
    pub column_key: Option<String>,
}

/// One secondary index as described by the client.
#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    pub index_name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// The full schema descriptor carried by `create_table_from_schema`.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<ColumnDescriptor>,
    pub primary_keys: Vec<String>,
    pub indexes: Vec<IndexDescriptor>,
}

/// Render the `CREATE TABLE` statement for `table` in `database`.
pub fn render_create_table(database: &str, table: &str, schema: &TableSchema) -> String {
    let mut column_clauses: Vec<String> = schema
        .columns
        .iter()
        .map(render_column)
        .collect();

    let mut pk_columns: Vec<&str> = schema
        .columns
        .iter()
        .filter(|c| c.column_key.as_deref() == Some("PRI"))
        .map(|c| c.column_name.as_str())
        .collect();
    if pk_columns.is_empty() {
        pk_columns = schema.primary_keys.iter().map(String::as_str).collect();
    }
    if !pk_columns.is_empty() {
        let quoted: Vec<String> = pk_columns.iter().map(|c| format!("`{c}`")).collect();
        column_clauses.push(format!("PRIMARY KEY({})", quoted.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS `{database}`.`{table}` (\n  {cols}\n)",
        database = database,
        table = table,
        cols = column_clauses.join(",\n  "),
    )
}

/// Render `CREATE INDEX`/`ALTER TABLE … ADD UNIQUE` statements for the
/// schema's supplied `indexes[]`, run after the table is created.
pub fn render_indexes(database: &str, table: &str, schema: &TableSchema) -> Vec<String> {
    schema
        .indexes
        .iter()
        .map(|idx| {
            let unique = if idx.unique { "UNIQUE " } else { "" };
            let cols: Vec<String> = idx.columns.iter().map(|c| format!("`{c}`")).collect();
            format!(
                "CREATE {unique}INDEX `{name}` ON `{database}`.`{table}` ({cols})",
                unique = unique,
                name = idx.index_name,
                database = database,
                table = table,
                cols = cols.join(", "),
            )
        })
        .collect()
}

fn render_column(col: &ColumnDescriptor) -> String {
    let ty = map_column_type(col);
    let default_clause = render_default(col);
    let is_pk = col.column_key.as_deref() == Some("PRI");

    // Emit NOT NULL only when the column is non-nullable in the source AND
    // has a default, is identity, or is a primary key. CSV seeding may
    // otherwise supply blanks that violate the original constraint.
    let nullability = if !col.is_nullable && (default_clause.is_some() || col.is_identity || is_pk)
    {
        "NOT NULL".to_string()
    } else {
        "NULL DEFAULT NULL".to_string()
    };

    let mut clause = format!("`{}` {}", col.column_name, ty);
    // AUTO_INCREMENT columns can't also carry a literal DEFAULT.
    if col.is_identity {
        clause.push_str(" AUTO_INCREMENT ");
        clause.push_str(if !col.is_nullable { "NOT NULL" } else { "NULL" });
    } else if let Some(default_sql) = &default_clause {
        clause.push_str(&format!(" DEFAULT {default_sql} "));
        clause.push_str(if !col.is_nullable { "NOT NULL" } else { "NULL" });
    } else {
        clause.push(' ');
        clause.push_str(&nullability);
    }
    clause
}

fn render_default(col: &ColumnDescriptor) -> Option<String> {
    let raw = col.column_default.as_ref()?.trim();
    if raw.is_empty() {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("getdate") {
        return Some("CURRENT_TIMESTAMP".to_string());
    }
    if lower.starts_with("newid") {
        return None;
    }
    static NUMERIC_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());
    if NUMERIC_LITERAL.is_match(raw) {
        return Some(raw.to_string());
    }
    if col.data_type.eq_ignore_ascii_case("bit") {
        return Some(if raw == "1" || lower == "true" {
            "'1'".to_string()
        } else {
            "'0'".to_string()
        });
    }
    if raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2 {
        let inner = &raw[1..raw.len() - 1];
        return Some(format!("'{}'", inner.replace('\'', "''")));
    }
    // A string literal without quotes in the source payload.
    if raw.chars().all(|c| c.is_alphanumeric() || c == '_' || c == ' ') {
        return Some(format!("'{}'", raw.replace('\'', "''")));
    }
    // Anything else (function calls, expressions) is too complex; drop it.
    None
}

fn map_column_type(col: &ColumnDescriptor) -> String {
    match col.data_type.to_ascii_uppercase().as_str() {
        "INT" => "INT".to_string(),
        "BIGINT" => "BIGINT".to_string(),
        "SMALLINT" => "SMALLINT".to_string(),
        "TINYINT" => "TINYINT".to_string(),
        "DECIMAL" | "NUMERIC" => {
            let p = col.numeric_precision.unwrap_or(18);
            let s = col.numeric_scale.unwrap_or(0);
            format!("DECIMAL({p},{s})")
        }
        "FLOAT" => "FLOAT".to_string(),
        "REAL" => "DOUBLE".to_string(),
        "VARCHAR" | "NVARCHAR" => {
            let len = col.character_maximum_length.unwrap_or(255);
            if len < 0 {
                "TEXT".to_string()
            } else {
                format!("VARCHAR({len})")
            }
        }
        "CHAR" | "NCHAR" => {
            let len = col.character_maximum_length.unwrap_or(1);
            format!("CHAR({len})")
        }
        "TEXT" | "NTEXT" => "TEXT".to_string(),
        "DATETIME" | "DATETIME2" => "DATETIME".to_string(),
        "DATE" => "DATE".to_string(),
        "TIME" => "TIME".to_string(),
        "TIMESTAMP" => "TIMESTAMP".to_string(),
        "BIT" => "BOOLEAN".to_string(),
        "UNIQUEIDENTIFIER" => "VARCHAR(36)".to_string(),
        _ => "TEXT".to_string(),
    }
}

/// The business-type secondary-index bundle for `table`, keyed
/// case-sensitively on the table name as the client sends it. Executed
/// independently per statement; a failing statement is logged and
/// skipped rather than aborting the whole bundle.
pub fn secondary_index_bundle(table: &str, business_type: BusinessType) -> &'static [&'static str] {
    static BUNDLES: Lazy<HashMap<(&'static str, BusinessType), &'static [&'static str]>> =
        Lazy::new(|| {
            use BusinessType::{Hospitality, Retail};
            HashMap::from([
                (
                    ("MenuItem", Hospitality),
                    &[
                        "ALTER TABLE `MenuItem` ADD PRIMARY KEY (`ItemCode`)",
                        "CREATE INDEX `idx_category` ON `MenuItem` (`Category`)",
                        "CREATE FULLTEXT INDEX `idx_description_ngram` ON `MenuItem` (`Description1`, `Description2`) WITH PARSER ngram",
                    ][..],
                ),
                (
                    ("Sales", Hospitality),
                    &[
                        "ALTER TABLE `Sales` ADD PRIMARY KEY (`OrderNo`)",
                        "CREATE INDEX `idx_orderdate` ON `Sales` (`OrderDate`)",
                        "CREATE INDEX `idx_orderdate_orderno` ON `Sales` (`OrderDate`, `OrderNo`)",
                    ][..],
                ),
                (
                    ("StockItems", Retail),
                    &[
                        "ALTER TABLE `StockItems` ADD PRIMARY KEY (`StockId`)",
                        "CREATE INDEX `idx_category` ON `StockItems` (`Category`)",
                        "CREATE INDEX `idx_category_stockid` ON `StockItems` (`Category`, `StockId`)",
                        "CREATE FULLTEXT INDEX `idx_description_ngram` ON `StockItems` (`Description`, `Description1`, `Description2`, `Description3`) WITH PARSER ngram",
                    ][..],
                ),
                (
                    ("Sales", Retail),
                    &[
                        "ALTER TABLE `Sales` ADD PRIMARY KEY (`InvoiceNo`)",
                        "CREATE INDEX `idx_transactiondate` ON `Sales` (`TransactionDate`)",
                        "CREATE INDEX `idx_transactiondate_invoiceno` ON `Sales` (`TransactionDate`, `InvoiceNo`)",
                    ][..],
                ),
                (
                    ("SalesDetail", Retail),
                    &[
                        "CREATE INDEX `idx_invoiceno_stockid` ON `SalesDetail` (`InvoiceNo`, `StockId`)",
                        "CREATE INDEX `idx_stockid` ON `SalesDetail` (`StockId`)",
                        "CREATE INDEX `idx_invoiceno` ON `SalesDetail` (`InvoiceNo`)",
                    ][..],
                ),
            ])
        });

    BUNDLES
        .get(&(table, business_type))
        .copied()
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: &str, nullable: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            column_name: name.into(),
            data_type: ty.into(),
            character_maximum_length: None,
            numeric_precision: None,
            numeric_scale: None,
            is_nullable: nullable,
            column_default: None,
            is_identity: false,
            column_key: None,
        }
    }

    #[test]
    fn non_nullable_without_default_becomes_null_default_null() {
        let schema = TableSchema {
            columns: vec![col("Note", "NVARCHAR", false)],
            primary_keys: vec![],
            indexes: vec![],
        };
        let sql = render_create_table("app1", "Sales", &schema);
        assert!(sql.contains("NULL DEFAULT NULL"));
    }

    #[test]
    fn identity_column_is_auto_increment_and_not_null() {
        let mut c = col("Id", "INT", false);
        c.is_identity = true;
        c.column_key = Some("PRI".into());
        let schema = TableSchema {
            columns: vec![c],
            primary_keys: vec![],
            indexes: vec![],
        };
        let sql = render_create_table("app1", "Sales", &schema);
        assert!(sql.contains("AUTO_INCREMENT"));
        assert!(sql.contains("PRIMARY KEY(`Id`)"));
    }

    #[test]
    fn hospitality_menu_item_bundle_present() {
        let bundle = secondary_index_bundle("MenuItem", BusinessType::Hospitality);
        assert!(bundle.iter().any(|s| s.contains("idx_category")));
    }

    #[test]
    fn bundle_is_empty_for_unlisted_table() {
        let bundle = secondary_index_bundle("Unrelated", BusinessType::Retail);
        assert!(bundle.is_empty());
    }
}
