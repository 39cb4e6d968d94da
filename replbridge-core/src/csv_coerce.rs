//! Pure SQL-fragment generation for the CSV bootstrap pipeline's `LOAD
//! DATA` statement: binding CSV columns to user variables and building
//! the per-table-column coercion `SET` clause. Actually running the
//! `LOAD DATA` statement lives in `replbridge-store`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Columns whose CSV-import coercion preserves text form (no boolean or
/// numeric casting) so that leading zeros in identifier strings survive.
pub const PROTECTED_COLUMNS: &[&str] = &["StockId", "ItemCode"];

pub fn is_protected(column: &str) -> bool {
    PROTECTED_COLUMNS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(column))
}

/// Sanitise a CSV header cell into a valid MySQL user-variable suffix:
/// `@<sanitised>`.
pub fn sanitize_variable_name(csv_column: &str) -> String {
    static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());
    let cleaned = NON_WORD.replace_all(csv_column.trim(), "_").to_string();
    if cleaned.is_empty() {
        "col".to_string()
    } else {
        cleaned
    }
}

static ISO_DATETIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").unwrap());
static SPACE_DATETIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}").unwrap());
static DATE_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static INTEGER_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").unwrap());
static DECIMAL_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+\.\d+$").unwrap());

const SENTINEL_DATES: &[&str] = &["1899-12-30", "1900-01-01T00:00:00.000Z", "0000-00-00"];

/// Build the `SET \`col\` = <expr>` coercion clause for one table column,
/// bound from the CSV user variable `@<var>`.
///
/// This is value-driven CASE logic evaluated at import time in SQL, not
/// decided here from sample data: this function only renders the SQL
/// expression shape, which is identical for every row in the load.
pub fn coercion_expression(table_column: &str, csv_variable: &str) -> String {
    let var = format!("@{csv_variable}");
    let protected = is_protected(table_column);

    let mut case_arms = vec![format!("WHEN {var} IS NULL OR {var} = '' THEN NULL")];

    for sentinel in SENTINEL_DATES {
        case_arms.push(format!("WHEN {var} = '{sentinel}' THEN NULL"));
    }

    if !protected {
        case_arms.push(format!(
            "WHEN LOWER(TRIM({var})) IN ('true','yes','y','on') THEN 1"
        ));
        case_arms.push(format!(
            "WHEN LOWER(TRIM({var})) IN ('false','no','n','off') THEN 0"
        ));
    }

    case_arms.push(format!(
        "WHEN {var} REGEXP '^[0-9]{{4}}-[0-9]{{2}}-[0-9]{{2}}T[0-9]{{2}}:[0-9]{{2}}:[0-9]{{2}}' THEN STR_TO_DATE(SUBSTRING({var}, 1, 19), '%Y-%m-%dT%H:%i:%s')"
    ));
    case_arms.push(format!(
        "WHEN {var} REGEXP '^[0-9]{{4}}-[0-9]{{2}}-[0-9]{{2}} [0-9]{{2}}:[0-9]{{2}}:[0-9]{{2}}' THEN STR_TO_DATE(SUBSTRING({var}, 1, 19), '%Y-%m-%d %H:%i:%s')"
    ));
    case_arms.push(format!(
        "WHEN {var} REGEXP '^[0-9]{{4}}-[0-9]{{2}}-[0-9]{{2}}$' THEN STR_TO_DATE({var}, '%Y-%m-%d')"
    ));

    if !protected {
        case_arms.push(format!(
            "WHEN {var} REGEXP '^-?[0-9]+$' THEN CAST({var} AS SIGNED)"
        ));
        case_arms.push(format!(
            "WHEN {var} REGEXP '^-?[0-9]+\\\\.[0-9]+$' THEN CAST({var} AS DECIMAL(18,4))"
        ));
    }

    case_arms.push(format!("ELSE TRIM({var})"));

    format!(
        "`{col}` = CASE {arms} END",
        col = table_column,
        arms = case_arms.join(" "),
    )
}

/// Classify a single already-materialised cell value the way the
/// generated SQL CASE expression would, for use in tests and in the
/// single-row legacy bootstrap path which coerces values in Rust rather
/// than in a `LOAD DATA` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Null,
    Bool(bool),
    DateTime(String),
    Date(String),
    Integer(i64),
    Decimal(String),
    Text(String),
}

pub fn classify_cell(table_column: &str, raw: &str) -> CoercedValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() || SENTINEL_DATES.contains(&trimmed) {
        return CoercedValue::Null;
    }
    let protected = is_protected(table_column);

    if !protected {
        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "on" => return CoercedValue::Bool(true),
            "false" | "no" | "n" | "off" => return CoercedValue::Bool(false),
            _ => {}
        }
    }

    if ISO_DATETIME.is_match(trimmed) || SPACE_DATETIME.is_match(trimmed) {
        return CoercedValue::DateTime(trimmed.chars().take(19).collect());
    }
    if DATE_ONLY.is_match(trimmed) {
        return CoercedValue::Date(trimmed.to_string());
    }
    if !protected {
        if INTEGER_LITERAL.is_match(trimmed) {
            if let Ok(i) = trimmed.parse::<i64>() {
                return CoercedValue::Integer(i);
            }
        }
        if DECIMAL_LITERAL.is_match(trimmed) {
            return CoercedValue::Decimal(trimmed.to_string());
        }
    }
    CoercedValue::Text(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_column_preserves_leading_zeros() {
        assert_eq!(
            classify_cell("StockId", "007"),
            CoercedValue::Text("007".to_string())
        );
    }

    #[test]
    fn non_protected_integer_is_cast() {
        assert_eq!(classify_cell("Qty", "12"), CoercedValue::Integer(12));
    }

    #[test]
    fn sentinel_date_becomes_null() {
        assert_eq!(classify_cell("CreatedAt", "1899-12-30"), CoercedValue::Null);
    }

    #[test]
    fn blank_becomes_null() {
        assert_eq!(classify_cell("Note", "  "), CoercedValue::Null);
    }

    #[test]
    fn bool_word_on_non_protected_column() {
        assert_eq!(classify_cell("IsActive", "Yes"), CoercedValue::Bool(true));
    }

    #[test]
    fn coercion_expression_skips_numeric_casts_for_protected_columns() {
        let expr = coercion_expression("ItemCode", "ItemCode");
        assert!(!expr.contains("CAST(@ItemCode AS SIGNED)"));
    }

    #[test]
    fn coercion_expression_includes_numeric_casts_for_plain_columns() {
        let expr = coercion_expression("Qty", "Qty");
        assert!(expr.contains("CAST(@Qty AS SIGNED)"));
    }
}
