//! Workflow orchestration: the only component that moves invoices between
//! states, and the only writer of invoice audit entries.

mod arena;
pub mod error;
pub mod orchestrator;
pub mod signal;


pub use arena::Screening;
pub use error::WorkflowError;
pub use orchestrator::{
    CorrectionRequest, DecisionRequest, INGESTION_ACTOR, Orchestrator, ProcessOutcome,
    RULES_PARTITION, SlaReport, TransitionOutcome,
};
pub use signal::{WorkflowSignal, idempotency_key};
