//! Decoding of `recordData`, which arrives as either a JSON object or the
//! reference client's minimal XML envelope, into a flat `column -> value`
//! map. When the envelope carries `<new>…</new>` and `<old>…</old>`
//! siblings, the old side is flattened with its keys prefixed `old_`, per
//! the pre-image convention used by UPDATE's `WHERE` predicate.

use indexmap::IndexMap;

use crate::error::{CoreError, Result};

/// A flattened row payload: column name to its string representation.
///
/// Backed by an `IndexMap` rather than a `BTreeMap` or `HashMap` because
/// INSERT statement building must preserve arrival order of the payload's
/// keys (see the design doc's row-op dispatcher algorithm), which neither
/// of the ordered-by-key alternatives can do.
///
/// Values are kept as strings (not `serde_json::Value`) because both wire
/// encodings ultimately carry scalar cell contents, and every downstream
/// consumer (statement builder, CSV coercion) binds parameters as text
/// anyway.
pub type FlatRow = IndexMap<String, String>;

/// Tagged input: the caller knows whether `record_data` is JSON or XML
/// from the transport envelope; we don't sniff it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Json,
    Xml,
}

/// Decode `record_data` into a flat row using the given encoding.
pub fn decode(record_data: &str, encoding: PayloadEncoding) -> Result<FlatRow> {
    match encoding {
        PayloadEncoding::Json => decode_json(record_data),
        PayloadEncoding::Xml => decode_xml(record_data),
    }
}

fn decode_json(record_data: &str) -> Result<FlatRow> {
    let value: serde_json::Value = serde_json::from_str(record_data)
        .map_err(|e| CoreError::MalformedPayload(format!("invalid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| CoreError::MalformedPayload("JSON recordData must be an object".into()))?;

    let mut flat = FlatRow::new();
    for (key, val) in object {
        flat.insert(key.clone(), json_scalar_to_string(val));
    }
    Ok(flat)
}

fn json_scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Decode the minimal XML envelope described in the design doc.
///
/// Grammar: a sequence of `<tag>value</tag>` pairs at the top level, or
/// two such sequences nested under `<new>…</new>` and `<old>…</old>`.
/// This is intentionally not a general XML parser: the wire format never
/// nests beyond one level, never uses attributes, and never repeats a
/// tag, so a small scanner is clearer than pulling in a full parser for
/// a grammar this constrained.
fn decode_xml(record_data: &str) -> Result<FlatRow> {
    let trimmed = record_data.trim();
    let tags = scan_tags(trimmed)?;

    let has_new = tags.iter().any(|(name, _)| name == "new");
    let has_old = tags.iter().any(|(name, _)| name == "old");

    if has_new || has_old {
        let mut flat = FlatRow::new();
        for (name, body) in &tags {
            match name.as_str() {
                "new" => {
                    for (col, val) in scan_tags(body)? {
                        flat.insert(col, val);
                    }
                }
                "old" => {
                    for (col, val) in scan_tags(body)? {
                        flat.insert(format!("old_{col}"), val);
                    }
                }
                other => {
                    flat.insert(other.to_string(), body.clone());
                }
            }
        }
        Ok(flat)
    } else {
        Ok(tags.into_iter().collect())
    }
}

/// Scan a flat sequence of `<tag>value</tag>` pairs (no nesting within a
/// single tag's body is assumed unless the caller re-scans that body).
fn scan_tags(input: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    let mut rest = input.trim();

    // Drop an optional enclosing <row>...</row> or similar single root tag
    // when it wraps the entire remaining input and isn't `new`/`old`.
    if let Some(stripped) = strip_single_root(rest) {
        rest = stripped;
    }

    while !rest.is_empty() {
        let Some(open_start) = rest.find('<') else {
            break;
        };
        let Some(open_end) = rest[open_start..].find('>') else {
            return Err(CoreError::MalformedPayload("unterminated tag".into()));
        };
        let open_end = open_start + open_end;
        let tag = &rest[open_start + 1..open_end];
        if tag.starts_with('/') {
            return Err(CoreError::MalformedPayload(format!(
                "unexpected closing tag `{tag}`"
            )));
        }

        let close_tag = format!("</{tag}>");
        let Some(close_start) = rest[open_end + 1..].find(&close_tag) else {
            return Err(CoreError::MalformedPayload(format!(
                "missing closing tag for `{tag}`"
            )));
        };
        let close_start = open_end + 1 + close_start;
        let body = rest[open_end + 1..close_start].to_string();

        out.push((tag.to_string(), body));
        rest = rest[close_start + close_tag.len()..].trim_start();
    }

    Ok(out)
}

fn strip_single_root(input: &str) -> Option<&str> {
    let input = input.trim();
    if !input.starts_with('<') {
        return None;
    }
    let open_end = input.find('>')?;
    let tag = &input[1..open_end];
    if tag == "new" || tag == "old" || tag.is_empty() {
        return None;
    }
    let close_tag = format!("</{tag}>");
    if !input.ends_with(&close_tag) {
        return None;
    }
    let body = &input[open_end + 1..input.len() - close_tag.len()];
    // Only unwrap if the body itself contains further tags (otherwise this
    // "root" is really just a leaf column, e.g. a top-level `<Qty>2</Qty>`).
    if body.trim_start().starts_with('<') {
        Some(body)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_flat_xml() {
        let xml = "<row><InvoiceNo>7</InvoiceNo><StockId>S1</StockId><Qty>2</Qty></row>";
        let flat = decode(xml, PayloadEncoding::Xml).unwrap();
        assert_eq!(flat.get("InvoiceNo").unwrap(), "7");
        assert_eq!(flat.get("StockId").unwrap(), "S1");
        assert_eq!(flat.get("Qty").unwrap(), "2");
    }

    #[test]
    fn decodes_new_old_envelope() {
        let xml =
            "<new><ItemCode>M1</ItemCode><Description1>b</Description1></new><old><ItemCode>M1</ItemCode></old>";
        let flat = decode(xml, PayloadEncoding::Xml).unwrap();
        assert_eq!(flat.get("ItemCode").unwrap(), "M1");
        assert_eq!(flat.get("Description1").unwrap(), "b");
        assert_eq!(flat.get("old_ItemCode").unwrap(), "M1");
    }

    #[test]
    fn decodes_json_object() {
        let json = r#"{"InvoiceNo": 7, "StockId": "S1", "Qty": 2}"#;
        let flat = decode(json, PayloadEncoding::Json).unwrap();
        assert_eq!(flat.get("InvoiceNo").unwrap(), "7");
        assert_eq!(flat.get("StockId").unwrap(), "S1");
    }

    #[test]
    fn rejects_malformed_xml() {
        let xml = "<row><InvoiceNo>7</InvoiceNo";
        assert!(decode(xml, PayloadEncoding::Xml).is_err());
    }
}
