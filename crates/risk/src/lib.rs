//! Risk scoring for invoices.
//!
//! Combines amount-anomaly, vendor-behaviour, PO-mismatch, duplicate and
//! fraud-indicator signals into one weighted score. Scoring is deterministic:
//! the same invoice, match result and vendor history snapshot always produce
//! the same assessment (apart from its id).

pub mod config;
mod factors;
pub mod fingerprint;
pub mod history;
pub mod scorer;

pub use config::{RiskConfig, RiskWeights};
pub use fingerprint::{content_hash, normalize_invoice_number};
pub use history::{PriorInvoice, VendorHistory};
pub use scorer::{RiskAssessment, RiskError, RiskFactor, RiskLevel, RiskScorer};
