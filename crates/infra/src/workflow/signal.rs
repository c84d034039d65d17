//! Outbound signals for notification/UI and payment collaborators.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use invoiceflow_core::{ApprovalTaskId, Currency, InvoiceId, TenantId, TransitionId};
use invoiceflow_events::Event;
use invoiceflow_invoicing::InvoiceStatus;

/// Published after the matching audit entry is durable. Delivery is
/// at-least-once; consumers dedupe on IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum WorkflowSignal {
    StatusChanged {
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        from: InvoiceStatus,
        to: InvoiceStatus,
        deadline: Option<DateTime<Utc>>,
        occurred_at: DateTime<Utc>,
    },
    SlaWarning {
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        task_id: ApprovalTaskId,
        role: String,
        deadline: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
    SlaBreached {
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        task_id: ApprovalTaskId,
        role: String,
        deadline: DateTime<Utc>,
        escalation_role: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    PaymentAuthorized {
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        transition_id: TransitionId,
        amount: Decimal,
        currency: Currency,
        /// `<invoice_id>:<transition_id>`; stable across redeliveries.
        idempotency_key: String,
        occurred_at: DateTime<Utc>,
    },
}

impl WorkflowSignal {
    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            WorkflowSignal::StatusChanged { invoice_id, .. }
            | WorkflowSignal::SlaWarning { invoice_id, .. }
            | WorkflowSignal::SlaBreached { invoice_id, .. }
            | WorkflowSignal::PaymentAuthorized { invoice_id, .. } => *invoice_id,
        }
    }
}

pub fn idempotency_key(invoice_id: InvoiceId, transition_id: TransitionId) -> String {
    format!("{invoice_id}:{transition_id}")
}

impl Event for WorkflowSignal {
    fn event_type(&self) -> &'static str {
        match self {
            WorkflowSignal::StatusChanged { .. } => "workflow.invoice.status_changed",
            WorkflowSignal::SlaWarning { .. } => "workflow.task.sla_warning",
            WorkflowSignal::SlaBreached { .. } => "workflow.task.sla_breached",
            WorkflowSignal::PaymentAuthorized { .. } => "workflow.payment.authorized",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WorkflowSignal::StatusChanged { occurred_at, .. }
            | WorkflowSignal::SlaWarning { occurred_at, .. }
            | WorkflowSignal::SlaBreached { occurred_at, .. }
            | WorkflowSignal::PaymentAuthorized { occurred_at, .. } => *occurred_at,
        }
    }
}
