use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A previously submitted invoice from the same vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorInvoice {
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub total: Decimal,
    /// `fingerprint::content_hash` of the prior invoice.
    pub content_hash: String,
}

/// Snapshot of a vendor's recent activity, supplied by the vendor history
/// collaborator. Scoring reads it and never writes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorHistory {
    pub vendor_ref: String,
    /// Totals of prior invoices, oldest first.
    pub trailing_amounts: Vec<Decimal>,
    /// Invoices submitted inside the current rolling window.
    pub invoices_in_window: u32,
    /// Long-run average number of invoices per rolling window.
    pub historical_rate: f64,
    /// Lifetime invoice count.
    pub total_invoices: u32,
    /// Watch-list style flags (e.g. `sanctions_review`, `bank_change`).
    #[serde(default)]
    pub risk_flags: Vec<String>,
    #[serde(default)]
    pub recent_invoices: Vec<PriorInvoice>,
}

impl VendorHistory {
    /// History for a vendor that has never invoiced before.
    pub fn first_time(vendor_ref: impl Into<String>) -> Self {
        Self {
            vendor_ref: vendor_ref.into(),
            trailing_amounts: Vec::new(),
            invoices_in_window: 0,
            historical_rate: 0.0,
            total_invoices: 0,
            risk_flags: Vec::new(),
            recent_invoices: Vec::new(),
        }
    }
}
