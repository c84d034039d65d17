//! Purchasing: purchase order model and invoice/PO reconciliation.
//!
//! Purchase orders are owned by an external store and only read here. The
//! matcher is deterministic domain logic (no IO, no HTTP, no storage).

pub mod matcher;
pub mod order;
pub mod similarity;

pub use matcher::{
    LineMatch, LineOutcome, MatchResult, MatchStatus, MatchTolerances, PoMatcher, Variance,
};
pub use order::{PoLine, PurchaseOrder, PurchaseOrderStatus, normalize_po_number};
pub use similarity::description_similarity;
