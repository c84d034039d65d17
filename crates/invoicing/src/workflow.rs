//! Workflow commands and events for the invoice aggregate.
//!
//! Every command yields exactly one event, which becomes exactly one audit
//! ledger entry. Decisions that lose a race are not errors here: they produce
//! `DecisionConflicted` so the attempt is recorded instead of discarded.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use invoiceflow_core::{
    Aggregate, ApprovalTaskId, AssessmentId, Currency, DomainError, InvoiceId, MatchResultId,
    TenantId, TransitionId,
};
use invoiceflow_events::Event;

use crate::invoice::{Invoice, InvoiceHeader, InvoiceStatus, LineAnnotation, validate_header};
use crate::task::{ApprovalAction, ApprovalTask, TaskAssignment};

/// Results of the matching/scoring/routing pipeline carried into the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningOutcome {
    pub match_result_id: Option<MatchResultId>,
    pub assessment_id: AssessmentId,
    pub risk_score: f64,
    /// Routing path taken: `rules`, `low_risk_tier`, `fallback` or `auto_approve`.
    pub route: String,
    pub matched_rules: Vec<String>,
    pub line_annotations: Vec<LineAnnotation>,
}

/// Command: StartReview (`extracted -> review_pending`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartReview {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub screening: ScreeningOutcome,
    pub assignments: Vec<TaskAssignment>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AutoApprove (`extracted -> approved`, no human tier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoApprove {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub screening: ScreeningOutcome,
    pub policy: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDecision (an approver acted on a task).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDecision {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub task_id: ApprovalTaskId,
    pub actor: String,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    /// Replacement task; required for `escalate`.
    pub escalate_to: Option<TaskAssignment>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordSlaBreach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSlaBreach {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub task_id: ApprovalTaskId,
    /// Role notified about the breach.
    pub escalation_role: Option<String>,
    /// Reject once this many breaches accumulated; `None` never auto-rejects.
    pub auto_reject_after: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ParkInvoice (`-> needs_attention`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub error_kind: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WithdrawInvoice (sets the cancellation flag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub actor: String,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CorrectInvoice (`needs_attention -> extracted`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub actor: String,
    pub reason: String,
    pub header: InvoiceHeader,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AuthorizePayment (`approved -> authorized`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizePayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub transition_id: TransitionId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmPayment (`authorized -> paid`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment_reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowCommand {
    StartReview(StartReview),
    AutoApprove(AutoApprove),
    RecordDecision(RecordDecision),
    RecordSlaBreach(RecordSlaBreach),
    ParkInvoice(ParkInvoice),
    WithdrawInvoice(WithdrawInvoice),
    CorrectInvoice(CorrectInvoice),
    AuthorizePayment(AuthorizePayment),
    ConfirmPayment(ConfirmPayment),
}

/// Event: ReviewStarted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewStarted {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub screening: ScreeningOutcome,
    pub assignments: Vec<TaskAssignment>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceAutoApproved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceAutoApproved {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub screening: ScreeningOutcome,
    pub policy: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TaskDecided (non-final decision: partial approval or info request).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDecided {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub task_id: ApprovalTaskId,
    pub actor: String,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub remaining_open: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceApproved (last required approval arrived).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceApproved {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub task_id: ApprovalTaskId,
    pub actor: String,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceRejected (single veto).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRejected {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub task_id: ApprovalTaskId,
    pub actor: String,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TaskEscalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEscalated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub task_id: ApprovalTaskId,
    pub actor: String,
    pub comment: Option<String>,
    pub new_task: TaskAssignment,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlaBreached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaBreached {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub task_id: ApprovalTaskId,
    pub deadline: DateTime<Utc>,
    pub breach_count: u32,
    pub escalation_role: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlaAutoRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaAutoRejected {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub task_id: ApprovalTaskId,
    pub breach_count: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DecisionConflicted (recorded as rejected-due-to-conflict).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionConflicted {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub task_id: ApprovalTaskId,
    pub actor: String,
    pub attempted: ApprovalAction,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceParked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceParked {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub error_kind: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceWithdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceWithdrawn {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub actor: String,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCorrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCorrected {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub actor: String,
    pub reason: String,
    pub header: InvoiceHeader,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentAuthorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAuthorized {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub transition_id: TransitionId,
    pub actor: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment_reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    ReviewStarted(ReviewStarted),
    InvoiceAutoApproved(InvoiceAutoApproved),
    TaskDecided(TaskDecided),
    InvoiceApproved(InvoiceApproved),
    InvoiceRejected(InvoiceRejected),
    TaskEscalated(TaskEscalated),
    SlaBreached(SlaBreached),
    SlaAutoRejected(SlaAutoRejected),
    DecisionConflicted(DecisionConflicted),
    InvoiceParked(InvoiceParked),
    InvoiceWithdrawn(InvoiceWithdrawn),
    InvoiceCorrected(InvoiceCorrected),
    PaymentAuthorized(PaymentAuthorized),
    PaymentConfirmed(PaymentConfirmed),
}

impl Event for WorkflowEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::ReviewStarted(_) => "invoicing.invoice.review_started",
            WorkflowEvent::InvoiceAutoApproved(_) => "invoicing.invoice.auto_approved",
            WorkflowEvent::TaskDecided(_) => "invoicing.invoice.task_decided",
            WorkflowEvent::InvoiceApproved(_) => "invoicing.invoice.approved",
            WorkflowEvent::InvoiceRejected(_) => "invoicing.invoice.rejected",
            WorkflowEvent::TaskEscalated(_) => "invoicing.invoice.task_escalated",
            WorkflowEvent::SlaBreached(_) => "invoicing.invoice.sla_breached",
            WorkflowEvent::SlaAutoRejected(_) => "invoicing.invoice.sla_auto_rejected",
            WorkflowEvent::DecisionConflicted(_) => "invoicing.invoice.decision_conflicted",
            WorkflowEvent::InvoiceParked(_) => "invoicing.invoice.parked",
            WorkflowEvent::InvoiceWithdrawn(_) => "invoicing.invoice.withdrawn",
            WorkflowEvent::InvoiceCorrected(_) => "invoicing.invoice.corrected",
            WorkflowEvent::PaymentAuthorized(_) => "invoicing.invoice.payment_authorized",
            WorkflowEvent::PaymentConfirmed(_) => "invoicing.invoice.payment_confirmed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WorkflowEvent::ReviewStarted(e) => e.occurred_at,
            WorkflowEvent::InvoiceAutoApproved(e) => e.occurred_at,
            WorkflowEvent::TaskDecided(e) => e.occurred_at,
            WorkflowEvent::InvoiceApproved(e) => e.occurred_at,
            WorkflowEvent::InvoiceRejected(e) => e.occurred_at,
            WorkflowEvent::TaskEscalated(e) => e.occurred_at,
            WorkflowEvent::SlaBreached(e) => e.occurred_at,
            WorkflowEvent::SlaAutoRejected(e) => e.occurred_at,
            WorkflowEvent::DecisionConflicted(e) => e.occurred_at,
            WorkflowEvent::InvoiceParked(e) => e.occurred_at,
            WorkflowEvent::InvoiceWithdrawn(e) => e.occurred_at,
            WorkflowEvent::InvoiceCorrected(e) => e.occurred_at,
            WorkflowEvent::PaymentAuthorized(e) => e.occurred_at,
            WorkflowEvent::PaymentConfirmed(e) => e.occurred_at,
        }
    }
}

impl WorkflowEvent {
    /// The approver/actor behind the event, `system` for automated steps.
    pub fn actor(&self) -> &str {
        match self {
            WorkflowEvent::TaskDecided(e) => &e.actor,
            WorkflowEvent::InvoiceApproved(e) => &e.actor,
            WorkflowEvent::InvoiceRejected(e) => &e.actor,
            WorkflowEvent::TaskEscalated(e) => &e.actor,
            WorkflowEvent::DecisionConflicted(e) => &e.actor,
            WorkflowEvent::InvoiceWithdrawn(e) => &e.actor,
            WorkflowEvent::InvoiceCorrected(e) => &e.actor,
            WorkflowEvent::PaymentAuthorized(e) => &e.actor,
            _ => "system",
        }
    }

    /// Short action verb for the audit record.
    pub fn action(&self) -> &'static str {
        match self {
            WorkflowEvent::ReviewStarted(_) => "route",
            WorkflowEvent::InvoiceAutoApproved(_) => "auto_approve",
            WorkflowEvent::TaskDecided(e) => e.action.as_str(),
            WorkflowEvent::InvoiceApproved(_) => "approve",
            WorkflowEvent::InvoiceRejected(_) => "reject",
            WorkflowEvent::TaskEscalated(_) => "escalate",
            WorkflowEvent::SlaBreached(_) => "sla_breach",
            WorkflowEvent::SlaAutoRejected(_) => "sla_auto_reject",
            WorkflowEvent::DecisionConflicted(_) => "rejected_due_to_conflict",
            WorkflowEvent::InvoiceParked(_) => "park",
            WorkflowEvent::InvoiceWithdrawn(_) => "withdraw",
            WorkflowEvent::InvoiceCorrected(_) => "correct",
            WorkflowEvent::PaymentAuthorized(_) => "authorize",
            WorkflowEvent::PaymentConfirmed(_) => "confirm_payment",
        }
    }

    /// Human-readable reason, when the event has one.
    pub fn reason(&self) -> Option<String> {
        match self {
            WorkflowEvent::ReviewStarted(e) => {
                let roles: Vec<&str> = e.assignments.iter().map(|a| a.role.as_str()).collect();
                let roles = roles.join(", ");
                Some(match e.screening.route.as_str() {
                    "fallback" => {
                        format!("no applicable rule; routed to fallback approver {roles}")
                    }
                    "low_risk_tier" => {
                        format!("no rule matched below the auto-approve floors; routed to {roles}")
                    }
                    _ => format!("routed by rules: {}", e.screening.matched_rules.join(", ")),
                })
            }
            WorkflowEvent::InvoiceAutoApproved(e) => Some(format!("auto-approved by {}", e.policy)),
            WorkflowEvent::TaskDecided(e) => e.comment.clone(),
            WorkflowEvent::InvoiceApproved(e) => e.comment.clone(),
            WorkflowEvent::InvoiceRejected(e) => e.comment.clone(),
            WorkflowEvent::TaskEscalated(e) => Some(format!("escalated to {}", e.new_task.role)),
            WorkflowEvent::SlaBreached(e) => Some(format!("deadline {} exceeded", e.deadline)),
            WorkflowEvent::SlaAutoRejected(e) => {
                Some(format!("auto-rejected after {} SLA breaches", e.breach_count))
            }
            WorkflowEvent::DecisionConflicted(e) => Some(e.reason.clone()),
            WorkflowEvent::InvoiceParked(e) => Some(format!("{}: {}", e.error_kind, e.reason)),
            WorkflowEvent::InvoiceWithdrawn(e) => e.reason.clone(),
            WorkflowEvent::InvoiceCorrected(e) => Some(e.reason.clone()),
            WorkflowEvent::PaymentAuthorized(_) | WorkflowEvent::PaymentConfirmed(_) => None,
        }
    }
}

impl Aggregate for Invoice {
    type Command = WorkflowCommand;
    type Event = WorkflowEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WorkflowEvent::ReviewStarted(e) => {
                self.apply_screening(&e.screening);
                for assignment in &e.assignments {
                    self.tasks.push(ApprovalTask::open(assignment, e.occurred_at));
                }
                self.status = InvoiceStatus::ReviewPending;
                self.refresh_assignment();
            }
            WorkflowEvent::InvoiceAutoApproved(e) => {
                self.apply_screening(&e.screening);
                self.status = InvoiceStatus::Approved;
                self.refresh_assignment();
            }
            WorkflowEvent::TaskDecided(e) => {
                self.record_on_task(e.task_id, &e.actor, e.action, &e.comment, e.occurred_at);
                self.refresh_assignment();
            }
            WorkflowEvent::InvoiceApproved(e) => {
                self.record_on_task(
                    e.task_id,
                    &e.actor,
                    ApprovalAction::Approve,
                    &e.comment,
                    e.occurred_at,
                );
                self.status = InvoiceStatus::Approved;
                self.refresh_assignment();
            }
            WorkflowEvent::InvoiceRejected(e) => {
                self.record_on_task(
                    e.task_id,
                    &e.actor,
                    ApprovalAction::Reject,
                    &e.comment,
                    e.occurred_at,
                );
                self.status = InvoiceStatus::Rejected;
                self.refresh_assignment();
            }
            WorkflowEvent::TaskEscalated(e) => {
                self.record_on_task(
                    e.task_id,
                    &e.actor,
                    ApprovalAction::Escalate,
                    &e.comment,
                    e.occurred_at,
                );
                if let Some(task) = self.tasks.iter_mut().find(|t| t.id == e.task_id) {
                    task.superseded_by = Some(e.new_task.task_id);
                }
                self.tasks.push(ApprovalTask::open(&e.new_task, e.occurred_at));
                self.refresh_assignment();
            }
            WorkflowEvent::SlaBreached(e) => {
                self.mark_breached(e.task_id, e.occurred_at);
                self.breach_count = e.breach_count;
            }
            WorkflowEvent::SlaAutoRejected(e) => {
                self.mark_breached(e.task_id, e.occurred_at);
                self.breach_count = e.breach_count;
                self.status = InvoiceStatus::Rejected;
                self.refresh_assignment();
            }
            WorkflowEvent::DecisionConflicted(_) => {}
            WorkflowEvent::InvoiceParked(e) => {
                self.status = InvoiceStatus::NeedsAttention;
                self.parked_reason = Some(format!("{}: {}", e.error_kind, e.reason));
            }
            WorkflowEvent::InvoiceWithdrawn(_) => {
                self.withdrawn = true;
            }
            WorkflowEvent::InvoiceCorrected(e) => {
                self.header = e.header.clone();
                self.status = InvoiceStatus::Extracted;
                self.risk_score = None;
                self.tasks.clear();
                self.match_result_id = None;
                self.assessment_id = None;
                self.matched_rules.clear();
                self.breach_count = 0;
                self.parked_reason = None;
                self.refresh_assignment();
            }
            WorkflowEvent::PaymentAuthorized(_) => {
                self.status = InvoiceStatus::Authorized;
            }
            WorkflowEvent::PaymentConfirmed(_) => {
                self.status = InvoiceStatus::Paid;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WorkflowCommand::StartReview(cmd) => self.handle_start_review(cmd),
            WorkflowCommand::AutoApprove(cmd) => self.handle_auto_approve(cmd),
            WorkflowCommand::RecordDecision(cmd) => self.handle_decision(cmd),
            WorkflowCommand::RecordSlaBreach(cmd) => self.handle_sla_breach(cmd),
            WorkflowCommand::ParkInvoice(cmd) => self.handle_park(cmd),
            WorkflowCommand::WithdrawInvoice(cmd) => self.handle_withdraw(cmd),
            WorkflowCommand::CorrectInvoice(cmd) => self.handle_correct(cmd),
            WorkflowCommand::AuthorizePayment(cmd) => self.handle_authorize(cmd),
            WorkflowCommand::ConfirmPayment(cmd) => self.handle_confirm_payment(cmd),
        }
    }
}

impl Invoice {
    fn apply_screening(&mut self, screening: &ScreeningOutcome) {
        self.risk_score = Some(screening.risk_score);
        self.match_result_id = screening.match_result_id;
        self.assessment_id = Some(screening.assessment_id);
        self.matched_rules = screening.matched_rules.clone();
        self.annotate_lines(&screening.line_annotations);
    }

    fn record_on_task(
        &mut self,
        task_id: ApprovalTaskId,
        actor: &str,
        action: ApprovalAction,
        comment: &Option<String>,
        at: DateTime<Utc>,
    ) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) {
            task.assignee = Some(actor.to_string());
            task.action = Some(action);
            task.comment = comment.clone();
            task.decided_at = Some(at);
        }
    }

    fn mark_breached(&mut self, task_id: ApprovalTaskId, at: DateTime<Utc>) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) {
            task.breached_at = Some(at);
        }
    }

    fn ensure_scope(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if self.tenant_id != tenant_id {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn ensure_not_withdrawn(&self) -> Result<(), DomainError> {
        if self.withdrawn {
            return Err(DomainError::conflict("invoice has been withdrawn"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: InvoiceStatus, operation: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::conflict(format!(
                "cannot {operation} an invoice in status {}",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_start_review(&self, cmd: &StartReview) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_scope(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_not_withdrawn()?;
        self.ensure_status(InvoiceStatus::Extracted, "start review of")?;
        self.validate()?;
        validate_screening(&cmd.screening)?;

        // An invoice must never be left without an owner.
        if cmd.assignments.is_empty() {
            return Err(DomainError::invariant("review requires at least one approver"));
        }
        for a in &cmd.assignments {
            if a.role.trim().is_empty() {
                return Err(DomainError::validation("approver role must not be empty"));
            }
        }

        Ok(vec![WorkflowEvent::ReviewStarted(ReviewStarted {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            screening: cmd.screening.clone(),
            assignments: cmd.assignments.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_auto_approve(&self, cmd: &AutoApprove) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_scope(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_not_withdrawn()?;
        self.ensure_status(InvoiceStatus::Extracted, "auto-approve")?;
        self.validate()?;
        validate_screening(&cmd.screening)?;

        Ok(vec![WorkflowEvent::InvoiceAutoApproved(InvoiceAutoApproved {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            screening: cmd.screening.clone(),
            policy: cmd.policy.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decision(&self, cmd: &RecordDecision) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_scope(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_not_withdrawn()?;

        let task = self.task(cmd.task_id).ok_or_else(DomainError::not_found)?;

        let conflict = |reason: String| -> Result<Vec<WorkflowEvent>, DomainError> {
            Ok(vec![WorkflowEvent::DecisionConflicted(DecisionConflicted {
                tenant_id: cmd.tenant_id,
                invoice_id: cmd.invoice_id,
                task_id: cmd.task_id,
                actor: cmd.actor.clone(),
                attempted: cmd.action,
                reason,
                occurred_at: cmd.occurred_at,
            })])
        };

        if self.status != InvoiceStatus::ReviewPending {
            return conflict(format!("invoice already {}", self.status));
        }
        if !task.is_active() {
            return conflict("task was superseded by an escalation".to_string());
        }
        if !task.is_open() {
            return conflict(format!(
                "task already decided ({})",
                task.action.map(|a| a.as_str()).unwrap_or("none")
            ));
        }

        match cmd.action {
            ApprovalAction::Reject => Ok(vec![WorkflowEvent::InvoiceRejected(InvoiceRejected {
                tenant_id: cmd.tenant_id,
                invoice_id: cmd.invoice_id,
                task_id: cmd.task_id,
                actor: cmd.actor.clone(),
                comment: cmd.comment.clone(),
                occurred_at: cmd.occurred_at,
            })]),
            ApprovalAction::Approve => {
                let remaining_open = self
                    .tasks
                    .iter()
                    .filter(|t| t.is_open() && t.id != cmd.task_id)
                    .count();
                if remaining_open == 0 {
                    Ok(vec![WorkflowEvent::InvoiceApproved(InvoiceApproved {
                        tenant_id: cmd.tenant_id,
                        invoice_id: cmd.invoice_id,
                        task_id: cmd.task_id,
                        actor: cmd.actor.clone(),
                        comment: cmd.comment.clone(),
                        occurred_at: cmd.occurred_at,
                    })])
                } else {
                    Ok(vec![WorkflowEvent::TaskDecided(TaskDecided {
                        tenant_id: cmd.tenant_id,
                        invoice_id: cmd.invoice_id,
                        task_id: cmd.task_id,
                        actor: cmd.actor.clone(),
                        action: cmd.action,
                        comment: cmd.comment.clone(),
                        remaining_open,
                        occurred_at: cmd.occurred_at,
                    })])
                }
            }
            ApprovalAction::RequestInfo => Ok(vec![WorkflowEvent::TaskDecided(TaskDecided {
                tenant_id: cmd.tenant_id,
                invoice_id: cmd.invoice_id,
                task_id: cmd.task_id,
                actor: cmd.actor.clone(),
                action: cmd.action,
                comment: cmd.comment.clone(),
                remaining_open: self.open_tasks().count(),
                occurred_at: cmd.occurred_at,
            })]),
            ApprovalAction::Escalate => {
                let new_task = cmd
                    .escalate_to
                    .clone()
                    .ok_or_else(|| DomainError::validation("escalation requires a target task"))?;
                if self.task(new_task.task_id).is_some() {
                    return Err(DomainError::conflict("escalation task id already in use"));
                }
                Ok(vec![WorkflowEvent::TaskEscalated(TaskEscalated {
                    tenant_id: cmd.tenant_id,
                    invoice_id: cmd.invoice_id,
                    task_id: cmd.task_id,
                    actor: cmd.actor.clone(),
                    comment: cmd.comment.clone(),
                    new_task,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn handle_sla_breach(&self, cmd: &RecordSlaBreach) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_scope(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_not_withdrawn()?;
        self.ensure_status(InvoiceStatus::ReviewPending, "record an SLA breach on")?;

        let task = self.task(cmd.task_id).ok_or_else(DomainError::not_found)?;
        if !task.is_open() {
            return Err(DomainError::conflict("task is no longer open"));
        }
        if task.breached_at.is_some() {
            return Err(DomainError::conflict("task breach already recorded"));
        }
        if cmd.occurred_at <= task.deadline {
            return Err(DomainError::validation("task deadline has not passed"));
        }

        let breach_count = self.breach_count + 1;
        if let Some(limit) = cmd.auto_reject_after {
            if limit > 0 && breach_count >= limit {
                return Ok(vec![WorkflowEvent::SlaAutoRejected(SlaAutoRejected {
                    tenant_id: cmd.tenant_id,
                    invoice_id: cmd.invoice_id,
                    task_id: cmd.task_id,
                    breach_count,
                    occurred_at: cmd.occurred_at,
                })]);
            }
        }

        Ok(vec![WorkflowEvent::SlaBreached(SlaBreached {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            task_id: cmd.task_id,
            deadline: task.deadline,
            breach_count,
            escalation_role: cmd.escalation_role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_park(&self, cmd: &ParkInvoice) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_scope(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_not_withdrawn()?;
        if !matches!(
            self.status,
            InvoiceStatus::Extracted | InvoiceStatus::ReviewPending
        ) {
            return Err(DomainError::conflict(format!(
                "cannot park an invoice in status {}",
                self.status
            )));
        }

        Ok(vec![WorkflowEvent::InvoiceParked(InvoiceParked {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            error_kind: cmd.error_kind.clone(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_withdraw(&self, cmd: &WithdrawInvoice) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_scope(cmd.tenant_id, cmd.invoice_id)?;
        if self.withdrawn {
            return Err(DomainError::conflict("invoice is already withdrawn"));
        }
        if self.status.is_terminal() {
            return Err(DomainError::conflict(format!(
                "cannot withdraw an invoice in status {}",
                self.status
            )));
        }

        Ok(vec![WorkflowEvent::InvoiceWithdrawn(InvoiceWithdrawn {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            actor: cmd.actor.clone(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_correct(&self, cmd: &CorrectInvoice) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_scope(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_not_withdrawn()?;
        self.ensure_status(InvoiceStatus::NeedsAttention, "correct")?;
        validate_header(&cmd.header)?;

        Ok(vec![WorkflowEvent::InvoiceCorrected(InvoiceCorrected {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            actor: cmd.actor.clone(),
            reason: cmd.reason.clone(),
            header: cmd.header.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_authorize(&self, cmd: &AuthorizePayment) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_scope(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_not_withdrawn()?;
        self.ensure_status(InvoiceStatus::Approved, "authorize")?;

        Ok(vec![WorkflowEvent::PaymentAuthorized(PaymentAuthorized {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            transition_id: cmd.transition_id,
            actor: cmd.actor.clone(),
            amount: self.total(),
            currency: self.currency().clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm_payment(
        &self,
        cmd: &ConfirmPayment,
    ) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_scope(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_status(InvoiceStatus::Authorized, "confirm payment of")?;
        if cmd.payment_reference.trim().is_empty() {
            return Err(DomainError::validation("payment_reference must not be empty"));
        }

        Ok(vec![WorkflowEvent::PaymentConfirmed(PaymentConfirmed {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            payment_reference: cmd.payment_reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn validate_screening(screening: &ScreeningOutcome) -> Result<(), DomainError> {
    if !(0.0..=1.0).contains(&screening.risk_score) {
        return Err(DomainError::invariant(format!(
            "risk score {} outside [0, 1]",
            screening.risk_score
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::tests::{sample_header, sample_invoice, test_time};
    use crate::task::SlaStatus;
    use chrono::Duration;
    use invoiceflow_core::AggregateRoot;
    use rust_decimal_macros::dec;

    fn screening() -> ScreeningOutcome {
        ScreeningOutcome {
            match_result_id: Some(MatchResultId::new()),
            assessment_id: AssessmentId::new(),
            risk_score: 0.12,
            route: "rules".to_string(),
            matched_rules: vec!["High Value Review".to_string()],
            line_annotations: vec![LineAnnotation {
                line_index: 0,
                po_line_ref: Some(1),
                matched: true,
                variance_pct: Some(dec!(0)),
            }],
        }
    }

    fn assignment(role: &str, hours: i64) -> TaskAssignment {
        TaskAssignment {
            task_id: ApprovalTaskId::new(),
            role: role.to_string(),
            deadline: test_time() + Duration::hours(hours),
        }
    }

    fn run(cmd: WorkflowCommand, invoice: &mut Invoice) -> WorkflowEvent {
        let events = invoice.handle(&cmd).unwrap();
        assert_eq!(events.len(), 1);
        invoice.apply(&events[0]);
        events.into_iter().next().unwrap()
    }

    fn under_review(roles: &[&str]) -> (Invoice, Vec<TaskAssignment>) {
        let mut invoice = sample_invoice();
        let assignments: Vec<TaskAssignment> = roles.iter().map(|r| assignment(r, 24)).collect();
        run(
            WorkflowCommand::StartReview(StartReview {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                screening: screening(),
                assignments: assignments.clone(),
                occurred_at: test_time(),
            }),
            &mut invoice,
        );
        (invoice, assignments)
    }

    fn decide(invoice: &Invoice, task: &TaskAssignment, actor: &str, action: ApprovalAction) -> WorkflowCommand {
        WorkflowCommand::RecordDecision(RecordDecision {
            tenant_id: invoice.tenant_id(),
            invoice_id: invoice.id_typed(),
            task_id: task.task_id,
            actor: actor.to_string(),
            action,
            comment: None,
            escalate_to: None,
            occurred_at: test_time() + Duration::minutes(5),
        })
    }

    #[test]
    fn start_review_assigns_tasks_and_annotates_lines() {
        let (invoice, assignments) = under_review(&["ap_manager", "compliance"]);
        assert_eq!(invoice.status(), InvoiceStatus::ReviewPending);
        assert_eq!(invoice.approvers(), &["ap_manager".to_string(), "compliance".to_string()]);
        assert_eq!(invoice.approval_deadline(), Some(assignments[0].deadline));
        assert_eq!(invoice.risk_score(), Some(0.12));
        assert_eq!(invoice.line_items()[0].matched, Some(true));
        assert_eq!(invoice.line_items()[0].po_line_ref, Some(1));
        assert_eq!(invoice.version(), 1);
    }

    #[test]
    fn review_reason_names_the_routing_path() {
        let invoice = sample_invoice();
        let mut fallback = screening();
        fallback.route = "fallback".to_string();
        fallback.matched_rules.clear();
        let events = invoice
            .handle(&WorkflowCommand::StartReview(StartReview {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                screening: fallback,
                assignments: vec![assignment("ap_manager", 48)],
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(
            events[0].reason().as_deref(),
            Some("no applicable rule; routed to fallback approver ap_manager")
        );

        let events = invoice
            .handle(&WorkflowCommand::StartReview(StartReview {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                screening: screening(),
                assignments: vec![assignment("finance_director", 48)],
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(
            events[0].reason().as_deref(),
            Some("routed by rules: High Value Review")
        );
    }

    #[test]
    fn start_review_without_approvers_is_refused() {
        let invoice = sample_invoice();
        let err = invoice
            .handle(&WorkflowCommand::StartReview(StartReview {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                screening: screening(),
                assignments: vec![],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn partial_approval_keeps_review_pending() {
        let (mut invoice, tasks) = under_review(&["ap_manager", "compliance"]);
        let event = run(decide(&invoice, &tasks[0], "alice", ApprovalAction::Approve), &mut invoice);
        match event {
            WorkflowEvent::TaskDecided(e) => assert_eq!(e.remaining_open, 1),
            other => panic!("Expected TaskDecided, got {other:?}"),
        }
        assert_eq!(invoice.status(), InvoiceStatus::ReviewPending);
        assert_eq!(invoice.approvers(), &["compliance".to_string()]);
    }

    #[test]
    fn unanimous_approval_approves() {
        let (mut invoice, tasks) = under_review(&["ap_manager", "compliance"]);
        run(decide(&invoice, &tasks[0], "alice", ApprovalAction::Approve), &mut invoice);
        let event = run(decide(&invoice, &tasks[1], "bob", ApprovalAction::Approve), &mut invoice);
        assert!(matches!(event, WorkflowEvent::InvoiceApproved(_)));
        assert_eq!(invoice.status(), InvoiceStatus::Approved);
        assert!(invoice.approvers().is_empty());
    }

    #[test]
    fn single_veto_rejects_after_other_approvals() {
        let (mut invoice, tasks) = under_review(&["ap_manager", "compliance", "director"]);
        run(decide(&invoice, &tasks[0], "alice", ApprovalAction::Approve), &mut invoice);
        run(decide(&invoice, &tasks[1], "bob", ApprovalAction::Approve), &mut invoice);
        let event = run(decide(&invoice, &tasks[2], "carol", ApprovalAction::Reject), &mut invoice);
        assert!(matches!(event, WorkflowEvent::InvoiceRejected(_)));
        assert_eq!(invoice.status(), InvoiceStatus::Rejected);
    }

    #[test]
    fn decision_after_rejection_is_recorded_as_conflict() {
        let (mut invoice, tasks) = under_review(&["ap_manager", "compliance"]);
        run(decide(&invoice, &tasks[1], "bob", ApprovalAction::Reject), &mut invoice);
        let event = run(decide(&invoice, &tasks[0], "alice", ApprovalAction::Approve), &mut invoice);
        match event {
            WorkflowEvent::DecisionConflicted(e) => {
                assert_eq!(e.attempted, ApprovalAction::Approve);
                assert!(e.reason.contains("rejected"));
            }
            other => panic!("Expected DecisionConflicted, got {other:?}"),
        }
        assert_eq!(invoice.status(), InvoiceStatus::Rejected);
        assert_eq!(invoice.version(), 3);
    }

    #[test]
    fn escalation_supersedes_task_and_resets_deadline() {
        let (mut invoice, tasks) = under_review(&["ap_manager"]);
        let target = assignment("director", 48);
        let mut cmd = decide(&invoice, &tasks[0], "alice", ApprovalAction::Escalate);
        if let WorkflowCommand::RecordDecision(d) = &mut cmd {
            d.escalate_to = Some(target.clone());
        }
        run(cmd, &mut invoice);

        assert_eq!(invoice.status(), InvoiceStatus::ReviewPending);
        assert_eq!(invoice.approvers(), &["director".to_string()]);
        assert_eq!(invoice.approval_deadline(), Some(target.deadline));

        // The superseded task can no longer decide.
        let event = run(decide(&invoice, &tasks[0], "alice", ApprovalAction::Approve), &mut invoice);
        assert!(matches!(event, WorkflowEvent::DecisionConflicted(_)));

        let event = run(decide(&invoice, &target, "dave", ApprovalAction::Approve), &mut invoice);
        assert!(matches!(event, WorkflowEvent::InvoiceApproved(_)));
    }

    #[test]
    fn escalate_without_target_is_a_validation_error() {
        let (invoice, tasks) = under_review(&["ap_manager"]);
        let err = invoice
            .handle(&decide(&invoice, &tasks[0], "alice", ApprovalAction::Escalate))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn sla_breach_marks_task_without_rejecting() {
        let (mut invoice, tasks) = under_review(&["ap_manager"]);
        let late = test_time() + Duration::hours(30);
        let event = run(
            WorkflowCommand::RecordSlaBreach(RecordSlaBreach {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                task_id: tasks[0].task_id,
                escalation_role: Some("director".to_string()),
                auto_reject_after: None,
                occurred_at: late,
            }),
            &mut invoice,
        );
        assert!(matches!(event, WorkflowEvent::SlaBreached(_)));
        assert_eq!(invoice.status(), InvoiceStatus::ReviewPending);
        assert_eq!(invoice.breach_count(), 1);
        assert_eq!(invoice.tasks()[0].sla_status(late, 0.75), SlaStatus::Breached);
    }

    #[test]
    fn sla_policy_can_auto_reject_after_n_breaches() {
        let (mut invoice, tasks) = under_review(&["ap_manager"]);
        let event = run(
            WorkflowCommand::RecordSlaBreach(RecordSlaBreach {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                task_id: tasks[0].task_id,
                escalation_role: None,
                auto_reject_after: Some(1),
                occurred_at: test_time() + Duration::hours(25),
            }),
            &mut invoice,
        );
        assert!(matches!(event, WorkflowEvent::SlaAutoRejected(_)));
        assert_eq!(invoice.status(), InvoiceStatus::Rejected);
    }

    #[test]
    fn parked_invoice_can_be_corrected_back_to_extracted() {
        let mut invoice = sample_invoice();
        run(
            WorkflowCommand::ParkInvoice(ParkInvoice {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                error_kind: "validation".to_string(),
                reason: "total mismatch".to_string(),
                occurred_at: test_time(),
            }),
            &mut invoice,
        );
        assert_eq!(invoice.status(), InvoiceStatus::NeedsAttention);
        assert!(invoice.parked_reason().unwrap().contains("total mismatch"));

        let mut header = sample_header();
        header.invoice_number = "INV-1001-A".to_string();
        run(
            WorkflowCommand::CorrectInvoice(CorrectInvoice {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                actor: "clerk".to_string(),
                reason: "fixed invoice number".to_string(),
                header,
                occurred_at: test_time(),
            }),
            &mut invoice,
        );
        assert_eq!(invoice.status(), InvoiceStatus::Extracted);
        assert_eq!(invoice.invoice_number(), "INV-1001-A");
        assert_eq!(invoice.parked_reason(), None);
    }

    #[test]
    fn withdrawn_invoice_refuses_further_transitions() {
        let mut invoice = sample_invoice();
        run(
            WorkflowCommand::WithdrawInvoice(WithdrawInvoice {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                actor: "vendor-portal".to_string(),
                reason: Some("vendor cancelled".to_string()),
                occurred_at: test_time(),
            }),
            &mut invoice,
        );
        assert!(invoice.is_withdrawn());
        assert_eq!(invoice.status(), InvoiceStatus::Extracted);

        let err = invoice
            .handle(&WorkflowCommand::StartReview(StartReview {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                screening: screening(),
                assignments: vec![assignment("ap_manager", 8)],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("withdrawn") => {}
            _ => panic!("Expected conflict for withdrawn invoice"),
        }
    }

    #[test]
    fn authorize_and_confirm_payment_after_approval() {
        let (mut invoice, tasks) = under_review(&["ap_manager"]);
        run(decide(&invoice, &tasks[0], "alice", ApprovalAction::Approve), &mut invoice);

        let event = run(
            WorkflowCommand::AuthorizePayment(AuthorizePayment {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                transition_id: TransitionId::new(),
                actor: "payments".to_string(),
                occurred_at: test_time(),
            }),
            &mut invoice,
        );
        match event {
            WorkflowEvent::PaymentAuthorized(e) => assert_eq!(e.amount, dec!(1080.00)),
            other => panic!("Expected PaymentAuthorized, got {other:?}"),
        }
        assert_eq!(invoice.status(), InvoiceStatus::Authorized);

        run(
            WorkflowCommand::ConfirmPayment(ConfirmPayment {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                payment_reference: "PAY-77".to_string(),
                occurred_at: test_time(),
            }),
            &mut invoice,
        );
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
    }

    #[test]
    fn authorize_requires_approved_status() {
        let invoice = sample_invoice();
        let err = invoice
            .handle(&WorkflowCommand::AuthorizePayment(AuthorizePayment {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                transition_id: TransitionId::new(),
                actor: "payments".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn auto_approve_goes_straight_to_approved() {
        let mut invoice = sample_invoice();
        run(
            WorkflowCommand::AutoApprove(AutoApprove {
                tenant_id: invoice.tenant_id(),
                invoice_id: invoice.id_typed(),
                screening: screening(),
                policy: "low-risk floor".to_string(),
                occurred_at: test_time(),
            }),
            &mut invoice,
        );
        assert_eq!(invoice.status(), InvoiceStatus::Approved);
        assert!(invoice.tasks().is_empty());
    }
}
