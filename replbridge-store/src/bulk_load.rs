//! The CSV Bootstrap Pipeline's import step: building the `LOAD DATA`
//! statement from the introspected column list and the file's own
//! header, then executing it via whichever delivery mechanism the
//! server actually supports, in the documented attempt order.

use std::path::{Path, PathBuf};

use replbridge_core::csv_coerce;
use sqlx::{MySqlPool, Row};

use crate::error::{Result, StoreError, DUPLICATE_KEY_ERROR_CODE};

/// Where to stage a copy of the uploaded file when `LOAD DATA LOCAL
/// INFILE` isn't available and the server's `secure_file_priv` is set.
#[derive(Debug, Clone, Default)]
pub struct BulkLoadOptions {
    pub secure_file_priv_dir: Option<PathBuf>,
}

/// The result of one successful `LOAD DATA` execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkLoadOutcome {
    pub affected_rows: u64,
    pub skipped_rows: u64,
}

/// Run the full CSV import pipeline for one file against one table.
/// Does not delete `file_path`; the caller (the session controller)
/// unlinks it once this returns, success or failure, per the cleanup
/// step of the bootstrap pipeline.
pub async fn import_csv(
    pool: &MySqlPool,
    database: &str,
    table: &str,
    table_columns: &[String],
    file_path: &Path,
    options: &BulkLoadOptions,
) -> Result<BulkLoadOutcome> {
    let header = read_header(file_path).await?;
    let line_terminator = detect_line_terminator(file_path).await?;
    let load_sql = build_load_statement(
        database,
        table,
        &header,
        table_columns,
        line_terminator,
        file_path,
    );

    // Attempt order: LOCAL INFILE streamed from the client, then a
    // secure-file-directory copy loaded server-side, then fail with both
    // probes' diagnostics.
    let result = match attempt_local_infile(pool, &load_sql).await {
        Ok(outcome) => outcome,
        Err(local_err) => attempt_secure_file_copy(
            pool,
            database,
            table,
            &header,
            table_columns,
            line_terminator,
            file_path,
            options,
        )
        .await
        .map_err(|secure_err| {
            StoreError::BulkLoadFailed(format!(
                "local infile: {local_err}; secure-file copy: {secure_err}"
            ))
        })?,
    };

    let skipped_rows = count_duplicate_key_warnings(pool).await;

    Ok(BulkLoadOutcome {
        affected_rows: result.affected_rows,
        skipped_rows,
    })
}

async fn read_header(file_path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(file_path).await?;
    let first_line = contents
        .lines()
        .next()
        .ok_or_else(|| StoreError::Validation("CSV file is empty".into()))?;
    Ok(first_line
        .split(',')
        .map(|cell| cell.trim().trim_matches('"').to_string())
        .collect())
}

async fn detect_line_terminator(file_path: &Path) -> Result<&'static str> {
    let contents = tokio::fs::read(file_path).await?;
    if contents.windows(2).any(|w| w == b"\r\n") {
        Ok("\\r\\n")
    } else {
        Ok("\\n")
    }
}

/// Build the full `LOAD DATA … SET …` statement. CSV columns are bound
/// positionally to table columns (the CSV header's *order*, not its
/// names, drives the pairing, per the design doc).
fn build_load_statement(
    database: &str,
    table: &str,
    csv_header: &[String],
    table_columns: &[String],
    line_terminator: &str,
    file_path: &Path,
) -> String {
    let user_vars: Vec<String> = csv_header
        .iter()
        .map(|c| format!("@{}", csv_coerce::sanitize_variable_name(c)))
        .collect();

    let set_clauses: Vec<String> = table_columns
        .iter()
        .zip(user_vars.iter())
        .map(|(table_col, var)| {
            let var_name = var.trim_start_matches('@');
            csv_coerce::coercion_expression(table_col, var_name)
        })
        .collect();

    format!(
        "LOAD DATA INFILE '{path}' IGNORE INTO TABLE `{database}`.`{table}` \
         FIELDS TERMINATED BY ',' OPTIONALLY ENCLOSED BY '\"' \
         LINES TERMINATED BY '{line_terminator}' IGNORE 1 ROWS ({vars}) SET {sets}",
        path = file_path.display().to_string().replace('\'', "\\'"),
        database = database,
        table = table,
        vars = user_vars.join(", "),
        line_terminator = line_terminator,
        sets = set_clauses.join(", "),
    )
}

async fn local_infile_enabled(pool: &MySqlPool) -> bool {
    let row = sqlx::query("SHOW VARIABLES LIKE 'local_infile'")
        .fetch_optional(pool)
        .await
        .ok()
        .flatten();
    match row {
        Some(row) => row
            .try_get::<String, _>(1)
            .map(|v| v.eq_ignore_ascii_case("ON"))
            .unwrap_or(false),
        None => false,
    }
}

async fn attempt_local_infile(pool: &MySqlPool, load_sql: &str) -> Result<BulkLoadOutcome> {
    if !local_infile_enabled(pool).await {
        return Err(StoreError::BulkLoadFailed(
            "server does not advertise local_infile enabled".into(),
        ));
    }
    let local_sql = load_sql.replacen("LOAD DATA INFILE", "LOAD DATA LOCAL INFILE", 1);
    let result = sqlx::query(&local_sql).execute(pool).await?;
    Ok(BulkLoadOutcome {
        affected_rows: result.rows_affected(),
        skipped_rows: 0,
    })
}

#[allow(clippy::too_many_arguments)]
async fn attempt_secure_file_copy(
    pool: &MySqlPool,
    database: &str,
    table: &str,
    csv_header: &[String],
    table_columns: &[String],
    line_terminator: &str,
    file_path: &Path,
    options: &BulkLoadOptions,
) -> Result<BulkLoadOutcome> {
    let Some(secure_dir) = &options.secure_file_priv_dir else {
        return Err(StoreError::BulkLoadFailed(format!(
            "local infile unavailable and no secure-file directory configured (file: {})",
            file_path.display()
        )));
    };

    let file_name = file_path
        .file_name()
        .ok_or_else(|| StoreError::Validation("upload path has no file name".into()))?;
    let staged_path = secure_dir.join(file_name);

    tokio::fs::copy(file_path, &staged_path).await?;

    let load_sql = build_load_statement(
        database,
        table,
        csv_header,
        table_columns,
        line_terminator,
        &staged_path,
    );

    let result = sqlx::query(&load_sql).execute(pool).await;

    tokio::fs::remove_file(&staged_path).await.ok();

    let result = result.map_err(|e| StoreError::from_execute_error(database, e))?;
    Ok(BulkLoadOutcome {
        affected_rows: result.rows_affected(),
        skipped_rows: 0,
    })
}

/// Count `SHOW WARNINGS` rows carrying the duplicate-key error code (the
/// same code `StoreError::is_duplicate_key` checks for the incremental
/// path), so an unrelated warning from the same `LOAD DATA` (truncation,
/// invalid-date coercion) isn't miscounted as a skipped row.
async fn count_duplicate_key_warnings(pool: &MySqlPool) -> u64 {
    let target: i64 = DUPLICATE_KEY_ERROR_CODE
        .parse()
        .expect("DUPLICATE_KEY_ERROR_CODE is a valid integer literal");

    let rows = match sqlx::query("SHOW WARNINGS").fetch_all(pool).await {
        Ok(rows) => rows,
        Err(_) => return 0,
    };

    rows.iter()
        .filter(|row| {
            row.try_get::<i64, _>("Code")
                .map(|code| code == target)
                .unwrap_or(false)
        })
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn load_statement_pairs_csv_and_table_columns_positionally() {
        let header = vec!["Stock_Id".to_string(), "Qty".to_string()];
        let table_columns = vec!["StockId".to_string(), "Qty".to_string()];
        let sql = build_load_statement(
            "app1",
            "StockItems",
            &header,
            &table_columns,
            "\\n",
            &PathBuf::from("/tmp/stock.csv"),
        );
        assert!(sql.contains("LOAD DATA INFILE"));
        assert!(sql.contains("@Stock_Id, @Qty"));
        assert!(sql.contains("`StockId` = CASE"));
        assert!(!sql.contains("CAST(@StockId AS SIGNED)"));
    }
}
