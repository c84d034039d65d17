use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use invoiceflow_core::Currency;

/// Purchase order status as reported by the PO store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseOrderStatus {
    Open,
    Closed,
}

/// Purchase order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoLine {
    pub line_no: u32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Quantity already invoiced by other invoices.
    #[serde(default)]
    pub billed_quantity: Decimal,
}

impl PoLine {
    pub fn new(line_no: u32, description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            line_no,
            description: description.into(),
            quantity,
            unit_price,
            billed_quantity: Decimal::ZERO,
        }
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity
            .saturating_sub(self.billed_quantity)
            .max(Decimal::ZERO)
    }

    pub fn is_fully_billed(&self) -> bool {
        self.quantity > Decimal::ZERO && self.billed_quantity >= self.quantity
    }
}

/// Purchase order, supplied by the external PO store. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub po_number: String,
    pub vendor_ref: String,
    pub currency: Currency,
    pub status: PurchaseOrderStatus,
    pub lines: Vec<PoLine>,
}

impl PurchaseOrder {
    pub fn line(&self, line_no: u32) -> Option<&PoLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    /// Value still open for invoicing, saturating at `Decimal::MAX`.
    pub fn open_amount(&self) -> Decimal {
        self.lines.iter().fold(Decimal::ZERO, |acc, l| {
            acc.saturating_add(l.remaining_quantity().saturating_mul(l.unit_price))
        })
    }
}

const PO_PREFIXES: [&str; 3] = ["PURCHASE ORDER", "P.O.", "PO"];

/// Canonical form of a PO reference as printed on invoices.
///
/// `po 2024-001`, `PO#2024-001` and `P.O. 2024-001` all become `PO-2024-001`.
/// References without a PO prefix keep their digits (`4500012345`).
pub fn normalize_po_number(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();

    for prefix in PO_PREFIXES {
        if let Some(rest) = upper.strip_prefix(prefix) {
            let rest = rest.trim_start_matches([':', '#', '-', ' ', '\t']);
            if rest.is_empty() {
                break;
            }
            return format!("PO-{}", keep_reference_chars(rest));
        }
    }

    keep_reference_chars(&upper)
}

fn keep_reference_chars(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn po_prefix_variants_normalize_to_same_number() {
        for raw in ["po 2024-001", "PO#2024-001", "P.O. 2024-001", "Purchase Order: 2024-001", "PO-2024-001"] {
            assert_eq!(normalize_po_number(raw), "PO-2024-001", "input {raw}");
        }
    }

    #[test]
    fn bare_numbers_are_kept() {
        assert_eq!(normalize_po_number(" 4500012345 "), "4500012345");
        assert_eq!(normalize_po_number("ref/77"), "REF77");
    }

    #[test]
    fn remaining_quantity_never_negative() {
        let mut line = PoLine::new(1, "Bolts", dec!(10), dec!(1.00));
        line.billed_quantity = dec!(12);
        assert_eq!(line.remaining_quantity(), dec!(0));
        assert!(line.is_fully_billed());
    }

    #[test]
    fn open_amount_saturates_on_extreme_prices() {
        let order = PurchaseOrder {
            po_number: "PO-1".to_string(),
            vendor_ref: "VEND-001".to_string(),
            currency: Currency::new("USD").unwrap(),
            status: PurchaseOrderStatus::Open,
            lines: vec![
                PoLine::new(1, "Bolts", dec!(1000), Decimal::MAX),
                PoLine::new(2, "Nuts", dec!(10), dec!(2.00)),
            ],
        };
        assert_eq!(order.open_amount(), Decimal::MAX);
    }
}
