//! `invoiceflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the domain error model, currency-aware money helpers and
//! the aggregate traits every workflow model implements.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{DomainError, DomainResult};
pub use id::{
    ApprovalTaskId, AssessmentId, AuditEventId, InvoiceId, MatchResultId, TenantId,
    TransitionId,
};
pub use money::{Currency, amounts_agree};
