//! Drives invoices from `extracted` through review to payment.
//!
//! For every transition the orchestrator:
//!
//! 1. takes the invoice's mutex (transitions on one invoice are serialized)
//! 2. checks the cancellation flag
//! 3. asks the aggregate to `handle` the command (exactly one event)
//! 4. appends one audit entry with before/after snapshots
//! 5. applies the event, then publishes signals
//!
//! If the audit append fails, the invoice is left untouched.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value as JsonValue, json};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use invoiceflow_approval::{
    RoutingError, RuleBook, RuleSet, escalation_assignment, load_file, route,
};
use invoiceflow_core::{
    Aggregate, ApprovalTaskId, AuditEventId, DomainError, InvoiceId, TransitionId,
};
use invoiceflow_events::{Event, EventBus, InMemoryEventBus, Subscription};
use invoiceflow_invoicing::{
    ApprovalAction, ApprovalTask, AuthorizePayment, AutoApprove, ConfirmPayment, CorrectInvoice,
    ExtractedInvoice, Invoice, InvoiceHeader, InvoiceStatus, ParkInvoice, RecordDecision,
    RecordSlaBreach, ScreeningOutcome, SlaStatus, StartReview, TaskAssignment, WithdrawInvoice,
    WorkflowCommand, WorkflowEvent,
};
use invoiceflow_purchasing::{MatchResult, PoMatcher, normalize_po_number};
use invoiceflow_risk::{RiskAssessment, RiskScorer, VendorHistory};

use crate::audit::{
    AuditCursor, AuditError, AuditEvent, AuditFilter, AuditLedger, AuditWriter, NewAuditEvent,
    PartitionKey, SequenceRange, VerifyReport,
};
use crate::config::{AppConfig, ConfigError, SlaConfig};
use crate::external::{ExternalError, PurchaseOrderStore, VendorHistorySource};
use crate::retry::{RetryPolicy, retry_external};

use super::arena::{InvoiceArena, InvoiceSlot, InvoiceState, Screening};
use super::error::WorkflowError;
use super::signal::{WorkflowSignal, idempotency_key};

pub const INGESTION_ACTOR: &str = "ingestion";
pub const RULES_PARTITION: &str = "system:rules";
const RESOURCE_INVOICE: &str = "invoice";

/// An approver's action on one task.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub invoice_id: InvoiceId,
    pub task_id: ApprovalTaskId,
    pub actor: String,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

impl DecisionRequest {
    pub fn new(
        invoice_id: InvoiceId,
        task_id: ApprovalTaskId,
        actor: impl Into<String>,
        action: ApprovalAction,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            invoice_id,
            task_id,
            actor: actor.into(),
            action,
            comment: None,
            at,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Corrected header for a parked invoice.
#[derive(Debug, Clone)]
pub struct CorrectionRequest {
    pub invoice_id: InvoiceId,
    pub actor: String,
    pub reason: String,
    pub header: InvoiceHeader,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub invoice_id: InvoiceId,
    pub from: InvoiceStatus,
    pub status: InvoiceStatus,
    pub event: WorkflowEvent,
    pub audit_event_id: AuditEventId,
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub invoice_id: InvoiceId,
    pub status: InvoiceStatus,
    /// `None` when the invoice was parked before routing.
    pub screening: Option<Screening>,
    pub parked_reason: Option<String>,
    pub audit_event_id: AuditEventId,
}

#[derive(Debug, Clone, Default)]
pub struct SlaReport {
    pub warnings: Vec<(InvoiceId, ApprovalTaskId)>,
    pub breaches: Vec<(InvoiceId, ApprovalTaskId)>,
    pub auto_rejected: Vec<InvoiceId>,
    /// Invoices whose breach could not be recorded.
    pub failures: Vec<(InvoiceId, String)>,
}

pub struct Orchestrator {
    invoices: InvoiceArena,
    audit: AuditWriter,
    rules: Arc<RuleBook>,
    matcher: PoMatcher,
    scorer: RiskScorer,
    purchase_orders: Arc<dyn PurchaseOrderStore>,
    vendor_history: Arc<dyn VendorHistorySource>,
    retry: RetryPolicy,
    sla: SlaConfig,
    signals: InMemoryEventBus<WorkflowSignal>,
}

impl Orchestrator {
    pub fn new(
        audit: AuditWriter,
        rules: Arc<RuleBook>,
        purchase_orders: Arc<dyn PurchaseOrderStore>,
        vendor_history: Arc<dyn VendorHistorySource>,
    ) -> Self {
        Self {
            invoices: InvoiceArena::default(),
            audit,
            rules,
            matcher: PoMatcher::default(),
            scorer: RiskScorer::default(),
            purchase_orders,
            vendor_history,
            retry: RetryPolicy::default(),
            sla: SlaConfig::default(),
            signals: InMemoryEventBus::new(),
        }
    }

    /// Wire an orchestrator from loaded configuration.
    pub fn from_config(
        config: &AppConfig,
        ledger: Arc<dyn AuditLedger>,
        purchase_orders: Arc<dyn PurchaseOrderStore>,
        vendor_history: Arc<dyn VendorHistorySource>,
    ) -> Result<Self, ConfigError> {
        let rules = match &config.rules_path {
            Some(path) => RuleBook::from_file(path)?,
            None => RuleBook::default(),
        };
        let audit = AuditWriter::new(ledger)
            .with_redacted_fields(config.audit.redacted_fields.clone())
            .with_max_attempts(config.audit.append_max_attempts);

        Ok(
            Self::new(audit, Arc::new(rules), purchase_orders, vendor_history)
                .with_matcher(PoMatcher::new(config.matching.clone()))
                .with_scorer(RiskScorer::new(config.risk.clone())?)
                .with_retry(config.retry.clone())
                .with_sla(config.sla.clone()),
        )
    }

    pub fn with_matcher(mut self, matcher: PoMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_scorer(mut self, scorer: RiskScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sla(mut self, sla: SlaConfig) -> Self {
        self.sla = sla;
        self
    }

    pub fn rules(&self) -> &Arc<RuleBook> {
        &self.rules
    }

    pub fn ledger(&self) -> &Arc<dyn AuditLedger> {
        self.audit.ledger()
    }

    pub fn subscribe(&self) -> Subscription<WorkflowSignal> {
        self.signals.subscribe()
    }

    /// Accept an ingestion hand-off in `extracted` status.
    pub async fn submit(&self, extracted: ExtractedInvoice) -> Result<InvoiceId, WorkflowError> {
        let invoice = Invoice::from_extracted(extracted);
        let invoice_id = invoice.id_typed();
        let partition = PartitionKey::tenant(invoice.tenant_id());

        let record = NewAuditEvent::new(
            "invoicing.invoice.received",
            INGESTION_ACTOR,
            RESOURCE_INVOICE,
            invoice_id,
            "receive",
            invoice.received_at(),
        )
        .with_states(JsonValue::Null, received_snapshot(&invoice)?);

        let mut state = self.invoices.insert(invoice)?;
        match self.audit.record(&partition, record) {
            Ok(stored) => {
                state.last_audit_event = Some(stored.event_id);
                info!(
                    invoice_id = %invoice_id,
                    tenant_id = %state.invoice.tenant_id(),
                    "invoice received"
                );
                Ok(invoice_id)
            }
            Err(err) => {
                drop(state);
                self.invoices.remove(invoice_id)?;
                Err(err.into())
            }
        }
    }

    /// Match, score and route an `extracted` invoice.
    ///
    /// Data errors, scoring errors and exhausted collaborator retries park the
    /// invoice; they are reported in the outcome, not as `Err`.
    pub async fn process(
        &self,
        invoice_id: InvoiceId,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, WorkflowError> {
        let slot = self.invoices.get(invoice_id)?;
        ensure_active(&slot, invoice_id)?;
        let mut state = slot.state.lock().await;
        // A failed receipt removes the slot; it must not be processed.
        if state.last_audit_event.is_none() {
            return Err(WorkflowError::UnknownInvoice(invoice_id));
        }

        let status = state.invoice.status();
        if status != InvoiceStatus::Extracted {
            return Err(DomainError::conflict(format!(
                "cannot process an invoice in status {status}"
            ))
            .into());
        }

        if let Err(err) = state.invoice.validate() {
            if err.is_data_error() {
                return self.park(&slot, &mut state, "validation_error", err.to_string(), None, now);
            }
            return Err(err.into());
        }

        let matched = self.match_purchase_order(&state.invoice).await;
        let match_result = match matched {
            Ok(result) => result,
            Err(err) => {
                return self.park(&slot, &mut state, "external_unavailable", err.to_string(), None, now);
            }
        };
        let fetched = self.fetch_vendor_history(&state.invoice).await;
        let history = match fetched {
            Ok(history) => history,
            Err(err) => {
                let decisions = decision_record(Some(&match_result), None)?;
                return self.park(
                    &slot,
                    &mut state,
                    "external_unavailable",
                    err.to_string(),
                    Some(decisions),
                    now,
                );
            }
        };

        let scored = self
            .scorer
            .score(&state.invoice, &match_result, history.as_ref());
        let assessment = match scored {
            Ok(assessment) => assessment,
            Err(err) => {
                let decisions = decision_record(Some(&match_result), None)?;
                return self.park(
                    &slot,
                    &mut state,
                    "scoring_error",
                    err.to_string(),
                    Some(decisions),
                    now,
                );
            }
        };

        let rules = self.rules.snapshot()?;
        let plan = match route(&state.invoice, &assessment, &rules, now) {
            Ok(plan) => plan,
            Err(RoutingError::NoApplicableRule { fallback }) => {
                warn!(
                    invoice_id = %invoice_id,
                    fallback = ?fallback.roles(),
                    risk_score = assessment.score,
                    "no approval rule applies; routing to fallback approver"
                );
                fallback
            }
        };

        let screening = ScreeningOutcome {
            match_result_id: Some(match_result.id),
            assessment_id: assessment.id,
            risk_score: assessment.score,
            route: plan.route.as_str().to_string(),
            matched_rules: plan.matched_rules.clone(),
            line_annotations: match_result.line_annotations(),
        };
        let tenant_id = state.invoice.tenant_id();
        let command = if plan.requires_review() {
            WorkflowCommand::StartReview(StartReview {
                tenant_id,
                invoice_id,
                screening,
                assignments: plan.assignments(),
                occurred_at: now,
            })
        } else {
            WorkflowCommand::AutoApprove(AutoApprove {
                tenant_id,
                invoice_id,
                screening,
                policy: format!("auto_approve:{}", plan.rule_set_version),
                occurred_at: now,
            })
        };

        debug!(
            invoice_id = %invoice_id,
            match_status = match_result.status.as_str(),
            risk_level = assessment.level.as_str(),
            route = plan.route.as_str(),
            "screening complete"
        );

        let decisions = decision_record(Some(&match_result), Some(&assessment))?;
        ensure_active(&slot, invoice_id)?;
        let outcome = self.transition_with(&mut state, command, None, Some(decisions))?;
        let screening = Screening {
            match_result,
            assessment,
            plan,
        };
        state.screening = Some(screening.clone());

        Ok(ProcessOutcome {
            invoice_id,
            status: outcome.status,
            screening: Some(screening),
            parked_reason: None,
            audit_event_id: outcome.audit_event_id,
        })
    }

    /// Process every invoice still in `extracted`, concurrently across
    /// invoices. Results come back in invoice ID order.
    pub async fn process_pending(
        self: &Arc<Self>,
        now: DateTime<Utc>,
    ) -> Result<Vec<(InvoiceId, Result<ProcessOutcome, WorkflowError>)>, WorkflowError> {
        let mut pending = Vec::new();
        for id in self.invoices.ids()? {
            let slot = self.invoices.get(id)?;
            if slot.is_withdrawn() {
                continue;
            }
            if slot.state.lock().await.invoice.status() == InvoiceStatus::Extracted {
                pending.push(id);
            }
        }

        let mut set = JoinSet::new();
        for id in pending {
            let this = Arc::clone(self);
            set.spawn(async move { (id, this.process(id, now).await) });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => error!(error = %err, "invoice processing task failed"),
            }
        }
        results.sort_by_key(|(id, _)| *id);
        Ok(results)
    }

    /// Record an approver's decision.
    ///
    /// A decision that arrives after the invoice or task already moved on is
    /// written to the audit trail as `rejected_due_to_conflict` and reported as
    /// `ConcurrentDecisionConflict`.
    pub async fn decide(&self, request: DecisionRequest) -> Result<TransitionOutcome, WorkflowError> {
        if request.actor.trim().is_empty() {
            return Err(DomainError::validation("actor must not be empty").into());
        }

        let slot = self.invoices.get(request.invoice_id)?;
        ensure_active(&slot, request.invoice_id)?;
        let mut state = slot.state.lock().await;
        ensure_active(&slot, request.invoice_id)?;

        let escalate_to = if request.action == ApprovalAction::Escalate {
            self.escalation_target(&state.invoice, request.task_id, request.at)?
        } else {
            None
        };

        let command = WorkflowCommand::RecordDecision(RecordDecision {
            tenant_id: state.invoice.tenant_id(),
            invoice_id: request.invoice_id,
            task_id: request.task_id,
            actor: request.actor.clone(),
            action: request.action,
            comment: request.comment.clone(),
            escalate_to,
            occurred_at: request.at,
        });
        let outcome = self.transition(&mut state, command, None)?;

        if let WorkflowEvent::DecisionConflicted(conflict) = &outcome.event {
            warn!(
                invoice_id = %request.invoice_id,
                task_id = %request.task_id,
                actor = %request.actor,
                attempted = request.action.as_str(),
                reason = %conflict.reason,
                "decision lost a race; recorded as rejected_due_to_conflict"
            );
            return Err(WorkflowError::ConcurrentDecisionConflict {
                invoice_id: request.invoice_id,
                task_id: request.task_id,
                reason: conflict.reason.clone(),
                audit_event_id: outcome.audit_event_id,
            });
        }

        Ok(outcome)
    }

    /// Sweep all invoices under review: signal tasks entering the warning
    /// zone (once per task) and record deadline breaches.
    pub async fn check_sla(&self, now: DateTime<Utc>) -> Result<SlaReport, WorkflowError> {
        let rules = self.rules.snapshot()?;
        let mut report = SlaReport::default();

        for invoice_id in self.invoices.ids()? {
            let slot = self.invoices.get(invoice_id)?;
            if slot.is_withdrawn() {
                continue;
            }
            let mut state = slot.state.lock().await;
            if state.invoice.status() != InvoiceStatus::ReviewPending {
                continue;
            }

            let tenant_id = state.invoice.tenant_id();
            let open: Vec<ApprovalTask> = state.invoice.open_tasks().cloned().collect();
            for task in open {
                match task.sla_status(now, self.sla.warning_fraction) {
                    SlaStatus::OnTrack => {}
                    SlaStatus::Warning => {
                        if state.warned.insert(task.id) {
                            self.publish(WorkflowSignal::SlaWarning {
                                tenant_id,
                                invoice_id,
                                task_id: task.id,
                                role: task.role.clone(),
                                deadline: task.deadline,
                                occurred_at: now,
                            });
                            report.warnings.push((invoice_id, task.id));
                        }
                    }
                    SlaStatus::Breached if task.breached_at.is_none() => {
                        let escalation_role = rules.next_tier(&task.role).map(str::to_string);
                        let command = WorkflowCommand::RecordSlaBreach(RecordSlaBreach {
                            tenant_id,
                            invoice_id,
                            task_id: task.id,
                            escalation_role: escalation_role.clone(),
                            auto_reject_after: self.sla.auto_reject_after,
                            occurred_at: now,
                        });
                        let outcome = match self.transition(&mut state, command, None) {
                            Ok(outcome) => outcome,
                            Err(err) => {
                                error!(
                                    invoice_id = %invoice_id,
                                    task_id = %task.id,
                                    error = %err,
                                    "failed to record SLA breach"
                                );
                                report.failures.push((invoice_id, err.to_string()));
                                break;
                            }
                        };

                        self.publish(WorkflowSignal::SlaBreached {
                            tenant_id,
                            invoice_id,
                            task_id: task.id,
                            role: task.role.clone(),
                            deadline: task.deadline,
                            escalation_role,
                            occurred_at: now,
                        });
                        report.breaches.push((invoice_id, task.id));

                        if outcome.status == InvoiceStatus::Rejected {
                            report.auto_rejected.push(invoice_id);
                            break;
                        }
                    }
                    SlaStatus::Breached => {}
                }
            }
        }

        if !report.breaches.is_empty() {
            info!(
                breaches = report.breaches.len(),
                auto_rejected = report.auto_rejected.len(),
                "SLA sweep recorded breaches"
            );
        }
        Ok(report)
    }

    /// `approved -> authorized`; emits the payment signal.
    pub async fn authorize(
        &self,
        invoice_id: InvoiceId,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let slot = self.invoices.get(invoice_id)?;
        ensure_active(&slot, invoice_id)?;
        let mut state = slot.state.lock().await;
        ensure_active(&slot, invoice_id)?;

        let command = WorkflowCommand::AuthorizePayment(AuthorizePayment {
            tenant_id: state.invoice.tenant_id(),
            invoice_id,
            transition_id: TransitionId::new(),
            actor: actor.into(),
            occurred_at: at,
        });
        let outcome = self.transition(&mut state, command, None)?;

        if let WorkflowEvent::PaymentAuthorized(e) = &outcome.event {
            self.publish(WorkflowSignal::PaymentAuthorized {
                tenant_id: e.tenant_id,
                invoice_id: e.invoice_id,
                transition_id: e.transition_id,
                amount: e.amount,
                currency: e.currency.clone(),
                idempotency_key: idempotency_key(e.invoice_id, e.transition_id),
                occurred_at: e.occurred_at,
            });
        }
        Ok(outcome)
    }

    /// `authorized -> paid`, on the payment system's confirmation.
    pub async fn confirm_payment(
        &self,
        invoice_id: InvoiceId,
        payment_reference: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let slot = self.invoices.get(invoice_id)?;
        let mut state = slot.state.lock().await;

        let command = WorkflowCommand::ConfirmPayment(ConfirmPayment {
            tenant_id: state.invoice.tenant_id(),
            invoice_id,
            payment_reference: payment_reference.into(),
            occurred_at: at,
        });
        self.transition(&mut state, command, None)
    }

    /// Raise the cancellation flag, then record the withdrawal.
    ///
    /// The flag is visible to in-flight work immediately; the audit entry is
    /// written once the invoice's mutex is free.
    pub async fn withdraw(
        &self,
        invoice_id: InvoiceId,
        actor: impl Into<String>,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let slot = self.invoices.get(invoice_id)?;
        if !slot.raise_withdrawn() {
            return Err(WorkflowError::Withdrawn(invoice_id));
        }

        let mut state = slot.state.lock().await;
        let command = WorkflowCommand::WithdrawInvoice(WithdrawInvoice {
            tenant_id: state.invoice.tenant_id(),
            invoice_id,
            actor: actor.into(),
            reason,
            occurred_at: at,
        });
        match self.transition(&mut state, command, None) {
            Ok(outcome) => {
                info!(invoice_id = %invoice_id, status = %outcome.status, "invoice withdrawn");
                Ok(outcome)
            }
            Err(err) => {
                slot.clear_withdrawn();
                Err(err)
            }
        }
    }

    /// Replace a parked invoice's header and run the pipeline again. The
    /// correction's audit entry references the invoice's previous entry.
    pub async fn correct_and_resubmit(
        &self,
        request: CorrectionRequest,
    ) -> Result<ProcessOutcome, WorkflowError> {
        let invoice_id = request.invoice_id;
        {
            let slot = self.invoices.get(invoice_id)?;
            ensure_active(&slot, invoice_id)?;
            let mut state = slot.state.lock().await;

            let references = state.last_audit_event;
            let command = WorkflowCommand::CorrectInvoice(CorrectInvoice {
                tenant_id: state.invoice.tenant_id(),
                invoice_id,
                actor: request.actor,
                reason: request.reason,
                header: request.header,
                occurred_at: request.at,
            });
            self.transition(&mut state, command, references)?;
            state.screening = None;
            state.warned.clear();
        }

        self.process(invoice_id, request.at).await
    }

    /// Validate and swap in a new rule set, recording `rules.reloaded`.
    pub fn reload_rules(
        &self,
        rules: RuleSet,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<AuditEvent, WorkflowError> {
        let version = rules.version.clone();
        let names: Vec<String> = rules.rules.iter().map(|r| r.name.clone()).collect();
        let previous = self.rules.replace(rules)?;

        let record = NewAuditEvent::new(
            "rules.reloaded",
            actor,
            "rule_set",
            &version,
            "reload",
            at,
        )
        .with_states(
            json!({ "version": previous.version }),
            json!({ "version": version, "rules": names }),
        );
        let stored = self
            .audit
            .record(&PartitionKey::named(RULES_PARTITION), record)?;

        info!(from_version = %previous.version, to_version = %version, "approval rules reloaded");
        Ok(stored)
    }

    pub fn reload_rules_from_file(
        &self,
        path: impl AsRef<Path>,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<AuditEvent, WorkflowError> {
        let rules = load_file(path)?;
        self.reload_rules(rules, actor, at)
    }

    /// Re-verify a tenant's audit chain from genesis.
    pub fn verify_audit(&self, partition: &PartitionKey) -> Result<VerifyReport, WorkflowError> {
        Ok(self.ledger().verify(partition, SequenceRange::all())?)
    }

    /// Verify every partition; one result per partition.
    pub fn verify_all(&self) -> Result<Vec<(PartitionKey, Result<VerifyReport, AuditError>)>, WorkflowError> {
        let ledger = self.ledger();
        Ok(ledger
            .partitions()?
            .into_iter()
            .map(|p| {
                let result = ledger.verify(&p, SequenceRange::all());
                (p, result)
            })
            .collect())
    }

    /// Every audit entry about `invoice_id`, in chain order.
    pub async fn audit_trail(&self, invoice_id: InvoiceId) -> Result<Vec<AuditEvent>, WorkflowError> {
        let slot = self.invoices.get(invoice_id)?;
        let tenant_id = slot.state.lock().await.invoice.tenant_id();

        let cursor = AuditCursor::new(
            self.ledger().as_ref(),
            PartitionKey::tenant(tenant_id),
            AuditFilter::for_resource(RESOURCE_INVOICE, invoice_id),
        );
        Ok(cursor.collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn invoice(&self, invoice_id: InvoiceId) -> Result<Invoice, WorkflowError> {
        let slot = self.invoices.get(invoice_id)?;
        let state = slot.state.lock().await;
        Ok(state.invoice.clone())
    }

    pub async fn screening(&self, invoice_id: InvoiceId) -> Result<Option<Screening>, WorkflowError> {
        let slot = self.invoices.get(invoice_id)?;
        let state = slot.state.lock().await;
        Ok(state.screening.clone())
    }

    pub fn invoice_ids(&self) -> Result<Vec<InvoiceId>, WorkflowError> {
        self.invoices.ids()
    }

    fn transition(
        &self,
        state: &mut InvoiceState,
        command: WorkflowCommand,
        references: Option<AuditEventId>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.transition_with(state, command, references, None)
    }

    /// `decisions` carries the full matcher and scorer output; it is stored in
    /// the same audit entry as the transition it led to.
    fn transition_with(
        &self,
        state: &mut InvoiceState,
        command: WorkflowCommand,
        references: Option<AuditEventId>,
        decisions: Option<JsonValue>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let mut events = state.invoice.handle(&command)?;
        if events.len() != 1 {
            return Err(WorkflowError::UnexpectedEventCount(events.len()));
        }
        let event = events.remove(0);

        let from = state.invoice.status();
        let mut next = state.invoice.clone();
        next.apply(&event);

        let mut after = snapshot(&next);
        after["event"] = serde_json::to_value(&event).map_err(AuditError::from)?;
        if let Some(decisions) = decisions {
            after["decisions"] = decisions;
        }

        let mut record = NewAuditEvent::new(
            event.event_type(),
            event.actor(),
            RESOURCE_INVOICE,
            next.id_typed(),
            event.action(),
            event.occurred_at(),
        )
        .with_states(snapshot(&state.invoice), after)
        .with_optional_reason(event.reason());
        if let Some(previous) = references {
            record = record.referencing(previous);
        }

        let stored = self
            .audit
            .record(&PartitionKey::tenant(next.tenant_id()), record)?;

        state.invoice = next;
        state.last_audit_event = Some(stored.event_id);
        let status = state.invoice.status();

        info!(
            invoice_id = %state.invoice.id_typed(),
            tenant_id = %state.invoice.tenant_id(),
            from = %from,
            status = %status,
            action = event.action(),
            sequence = stored.sequence,
            "invoice transition recorded"
        );

        if from != status {
            self.publish(WorkflowSignal::StatusChanged {
                tenant_id: state.invoice.tenant_id(),
                invoice_id: state.invoice.id_typed(),
                from,
                to: status,
                deadline: state.invoice.approval_deadline(),
                occurred_at: event.occurred_at(),
            });
        }

        Ok(TransitionOutcome {
            invoice_id: state.invoice.id_typed(),
            from,
            status,
            event,
            audit_event_id: stored.event_id,
        })
    }

    fn park(
        &self,
        slot: &InvoiceSlot,
        state: &mut InvoiceState,
        error_kind: &str,
        reason: String,
        decisions: Option<JsonValue>,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, WorkflowError> {
        let invoice_id = state.invoice.id_typed();
        ensure_active(slot, invoice_id)?;
        warn!(invoice_id = %invoice_id, error_kind, reason = %reason, "parking invoice");

        let command = WorkflowCommand::ParkInvoice(ParkInvoice {
            tenant_id: state.invoice.tenant_id(),
            invoice_id,
            error_kind: error_kind.to_string(),
            reason,
            occurred_at: now,
        });
        let outcome = self.transition_with(state, command, None, decisions)?;

        Ok(ProcessOutcome {
            invoice_id,
            status: outcome.status,
            screening: None,
            parked_reason: state.invoice.parked_reason().map(str::to_string),
            audit_event_id: outcome.audit_event_id,
        })
    }

    fn escalation_target(
        &self,
        invoice: &Invoice,
        task_id: ApprovalTaskId,
        at: DateTime<Utc>,
    ) -> Result<Option<TaskAssignment>, WorkflowError> {
        // Stale escalations fall through to the aggregate, which records the conflict.
        let Some(task) = invoice.task(task_id) else {
            return Ok(None);
        };
        if invoice.status() != InvoiceStatus::ReviewPending || !task.is_open() {
            return Ok(None);
        }
        let rules = self.rules.snapshot()?;
        escalation_assignment(&rules, &task.role, at)
            .map(Some)
            .ok_or(WorkflowError::NoEscalationTier(task_id))
    }

    async fn match_purchase_order(&self, invoice: &Invoice) -> Result<MatchResult, ExternalError> {
        let Some(reference) = invoice.po_reference() else {
            return Ok(MatchResult::no_po(invoice));
        };
        let tenant_id = invoice.tenant_id();
        let store = &self.purchase_orders;

        match retry_external(&self.retry, "purchase_order_lookup", || {
            store.fetch(tenant_id, reference)
        })
        .await
        {
            Ok(po) => Ok(self.matcher.match_invoice(invoice, &po)),
            Err(ExternalError::NotFound(_)) => {
                let normalized = normalize_po_number(reference);
                let mut result = MatchResult::no_po(invoice);
                result.recommendation = format!(
                    "Purchase order {normalized} not found; confirm the reference with the vendor"
                );
                result.po_number = Some(normalized);
                Ok(result)
            }
            Err(err) => Err(err),
        }
    }

    async fn fetch_vendor_history(
        &self,
        invoice: &Invoice,
    ) -> Result<Option<VendorHistory>, ExternalError> {
        let tenant_id = invoice.tenant_id();
        let vendor_ref = invoice.vendor_ref();
        let source = &self.vendor_history;

        match retry_external(&self.retry, "vendor_history_lookup", || {
            source.fetch(tenant_id, vendor_ref)
        })
        .await
        {
            Ok(history) => Ok(history),
            Err(ExternalError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn publish(&self, signal: WorkflowSignal) {
        if let Err(err) = self.signals.publish(signal) {
            warn!(error = ?err, "failed to publish workflow signal");
        }
    }
}

fn ensure_active(slot: &InvoiceSlot, invoice_id: InvoiceId) -> Result<(), WorkflowError> {
    if slot.is_withdrawn() {
        return Err(WorkflowError::Withdrawn(invoice_id));
    }
    Ok(())
}

/// Decision context carried in every audit snapshot.
fn snapshot(invoice: &Invoice) -> JsonValue {
    json!({
        "status": invoice.status().as_str(),
        "withdrawn": invoice.is_withdrawn(),
        "match_result_id": invoice.match_result_id(),
        "assessment_id": invoice.assessment_id(),
        "risk_score": invoice.risk_score(),
        "approvers": invoice.approvers(),
        "approval_deadline": invoice.approval_deadline(),
    })
}

/// Full matcher and scorer output for the audit entry of the transition
/// they decided.
fn decision_record(
    match_result: Option<&MatchResult>,
    assessment: Option<&RiskAssessment>,
) -> Result<JsonValue, WorkflowError> {
    Ok(json!({
        "match_result": serde_json::to_value(match_result).map_err(AuditError::from)?,
        "risk_assessment": serde_json::to_value(assessment).map_err(AuditError::from)?,
    }))
}

fn received_snapshot(invoice: &Invoice) -> Result<JsonValue, WorkflowError> {
    let mut after = snapshot(invoice);
    after["header"] = serde_json::to_value(invoice.header()).map_err(AuditError::from)?;
    Ok(after)
}
