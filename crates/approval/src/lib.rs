//! Approval rules engine.
//!
//! Declarative routing rules decide which roles must approve an invoice and by
//! when. Rules are data (see [`condition`]), evaluated in order, and every
//! matching rule contributes approvers.

pub mod book;
pub mod condition;
pub mod error;
pub mod router;
pub mod rules;

pub use book::{RuleBook, load_file};
pub use condition::{Attribute, CompareOp, Condition, Literal, RuleContext};
pub use error::{RoutingError, RuleError};
pub use router::{ApprovalPlan, PlannedApprover, RouteKind, escalation_assignment, route};
pub use rules::{ApprovalRule, ApproverSpec, AutoApprovePolicy, RuleSet};
