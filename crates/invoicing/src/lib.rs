//! Invoice workflow domain module.
//!
//! This crate contains the invoice aggregate, its approval tasks and the
//! workflow commands/events that move it through review, implemented purely
//! as deterministic domain logic (no IO, no clock, no storage).

pub mod invoice;
pub mod task;
pub mod workflow;

pub use invoice::{
    ExtractedInvoice, Invoice, InvoiceHeader, InvoiceStatus, LineAnnotation, LineItem,
    validate_header,
};
pub use task::{ApprovalAction, ApprovalTask, SlaStatus, TaskAssignment};
pub use workflow::{
    AuthorizePayment, AutoApprove, ConfirmPayment, CorrectInvoice, DecisionConflicted,
    InvoiceApproved, InvoiceAutoApproved, InvoiceCorrected, InvoiceParked, InvoiceRejected,
    InvoiceWithdrawn, ParkInvoice, PaymentAuthorized, PaymentConfirmed, RecordDecision,
    RecordSlaBreach, ReviewStarted, ScreeningOutcome, SlaAutoRejected, SlaBreached, StartReview,
    TaskDecided, TaskEscalated, WithdrawInvoice, WorkflowCommand, WorkflowEvent,
};
