use thiserror::Error;

use invoiceflow_approval::RuleError;
use invoiceflow_core::{ApprovalTaskId, AuditEventId, DomainError, InvoiceId};

use crate::audit::AuditError;

/// Errors surfaced by the orchestrator.
///
/// Transient collaborator failures never appear here: they are retried and,
/// once exhausted, park the invoice in `needs_attention`. The same holds for
/// data errors found while screening.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invoice {0} not found")]
    UnknownInvoice(InvoiceId),

    #[error("invoice {0} was already submitted")]
    AlreadySubmitted(InvoiceId),

    /// The cancellation flag is set; no further transitions are accepted.
    #[error("invoice {0} has been withdrawn")]
    Withdrawn(InvoiceId),

    /// The decision lost a race. It is on the audit trail as
    /// `rejected_due_to_conflict`.
    #[error("decision on task {task_id} of invoice {invoice_id} conflicted: {reason}")]
    ConcurrentDecisionConflict {
        invoice_id: InvoiceId,
        task_id: ApprovalTaskId,
        reason: String,
        audit_event_id: AuditEventId,
    },

    #[error("task {0} is already at the top of the escalation chain")]
    NoEscalationTier(ApprovalTaskId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error("transition produced {0} events; exactly one expected")]
    UnexpectedEventCount(usize),

    #[error("invoice arena lock poisoned")]
    Poisoned,
}
