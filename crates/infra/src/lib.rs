//! Infrastructure layer: audit ledger, collaborator ports, retries,
//! configuration and the workflow orchestrator.

pub mod audit;
pub mod config;
pub mod external;
pub mod retry;
pub mod workflow;

pub use config::{AppConfig, AuditConfig, ConfigError, SlaConfig};
pub use retry::{RetryPolicy, retry_external};
pub use workflow::{Orchestrator, WorkflowError, WorkflowSignal};
