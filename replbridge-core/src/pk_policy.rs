//! The primary-key policy table.
//!
//! Embedded as data, not control flow: adding a new table only needs a
//! new entry here, never a new branch in the dispatcher.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// The vertical governing PK policy and the secondary-index bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusinessType {
    Retail,
    Hospitality,
}

impl BusinessType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "retail" => Some(Self::Retail),
            "hospitality" => Some(Self::Hospitality),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retail => "retail",
            Self::Hospitality => "hospitality",
        }
    }
}

/// The `id` fallback used for any table with no explicit policy entry.
const FALLBACK_PK: &[&str] = &["id"];

type PolicyKey = (&'static str, BusinessType);

static POLICY_TABLE: Lazy<HashMap<PolicyKey, &'static [&'static str]>> = Lazy::new(|| {
    use BusinessType::{Hospitality, Retail};
    HashMap::from([
        (("Sales", Retail), &["InvoiceNo"][..]),
        (("Sales", Hospitality), &["OrderNo"][..]),
        (("SalesDetail", Retail), &["InvoiceNo", "StockId"][..]),
        (("SalesDetail", Hospitality), &["OrderNo", "ItemCode"][..]),
        (("StockItems", Retail), &["StockId"][..]),
        (("MenuItem", Hospitality), &["ItemCode"][..]),
        (("SubMenuLinkDetail", Hospitality), &["ItemCode"][..]),
        (("PaymentReceived", Retail), &["InvoiceNo", "Id"][..]),
        (("PaymentReceived", Hospitality), &["OrderNo", "Id"][..]),
        (("Payment", Retail), &["Payment"][..]),
        (("Payment", Hospitality), &["Payment"][..]),
    ])
});

/// Resolve the ordered list of primary-key columns for `table` under
/// `business_type`. Falls back to `["id"]` when there is no explicit
/// entry, matching the *other* row in the design doc's policy table.
pub fn primary_key_columns(table: &str, business_type: BusinessType) -> &'static [&'static str] {
    POLICY_TABLE
        .iter()
        .find(|((t, bt), _)| t.eq_ignore_ascii_case(table) && *bt == business_type)
        .map(|(_, cols)| *cols)
        .unwrap_or(FALLBACK_PK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retail_sales_detail_pk_is_composite() {
        let pk = primary_key_columns("SalesDetail", BusinessType::Retail);
        assert_eq!(pk, &["InvoiceNo", "StockId"]);
    }

    #[test]
    fn hospitality_menu_item_pk() {
        let pk = primary_key_columns("MenuItem", BusinessType::Hospitality);
        assert_eq!(pk, &["ItemCode"]);
    }

    #[test]
    fn unknown_table_falls_back_to_id() {
        let pk = primary_key_columns("CustomTable", BusinessType::Retail);
        assert_eq!(pk, &["id"]);
    }

    #[test]
    fn payment_is_case_sensitive_literal_column() {
        let pk = primary_key_columns("Payment", BusinessType::Hospitality);
        assert_eq!(pk, &["Payment"]);
    }
}
