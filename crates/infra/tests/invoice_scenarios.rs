//! End-to-end scenarios through the public orchestrator API.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use invoiceflow_approval::{ApprovalRule, ApproverSpec, Condition, RouteKind, RuleBook, RuleSet};
use invoiceflow_core::{Currency, InvoiceId, TenantId};
use invoiceflow_infra::audit::{AuditLedger, AuditWriter, InMemoryAuditLedger, PartitionKey};
use invoiceflow_infra::external::{InMemoryPurchaseOrderStore, InMemoryVendorHistory};
use invoiceflow_infra::workflow::DecisionRequest;
use invoiceflow_infra::{Orchestrator, RetryPolicy, WorkflowError};
use invoiceflow_invoicing::{ApprovalAction, ExtractedInvoice, InvoiceHeader, InvoiceStatus, LineItem};
use invoiceflow_purchasing::{PoLine, PurchaseOrder, PurchaseOrderStatus};
use invoiceflow_risk::{RiskLevel, VendorHistory};

fn received_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 10, 30, 0).unwrap()
}

fn usd() -> Currency {
    Currency::new("USD").unwrap()
}

fn header(vendor: &str, total: Decimal, po_reference: Option<&str>) -> InvoiceHeader {
    InvoiceHeader {
        vendor_ref: vendor.to_string(),
        invoice_number: format!("INV-{}", uuid::Uuid::now_v7().simple()),
        invoice_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
        currency: usd(),
        subtotal: total,
        tax: Decimal::ZERO,
        total,
        line_items: vec![LineItem::new("Consulting services", dec!(10), total / dec!(10), total)],
        po_reference: po_reference.map(str::to_string),
        payment_terms: Some("Net 30".to_string()),
        vendor_tax_id: Some("98-7654321".to_string()),
        bank_account: Some("GB29NWBK60161331926819".to_string()),
    }
}

fn history(vendor: &str, amounts: &[Decimal]) -> VendorHistory {
    VendorHistory {
        vendor_ref: vendor.to_string(),
        trailing_amounts: amounts.to_vec(),
        invoices_in_window: 2,
        historical_rate: 2.0,
        total_invoices: 50,
        risk_flags: Vec::new(),
        recent_invoices: Vec::new(),
    }
}

fn open_po(number: &str, vendor: &str, total: Decimal) -> PurchaseOrder {
    PurchaseOrder {
        po_number: number.to_string(),
        vendor_ref: vendor.to_string(),
        currency: usd(),
        status: PurchaseOrderStatus::Open,
        lines: vec![PoLine::new(1, "Consulting services", dec!(10), total / dec!(10))],
    }
}

struct World {
    orchestrator: Arc<Orchestrator>,
    purchase_orders: Arc<InMemoryPurchaseOrderStore>,
    tenant_id: TenantId,
}

fn world(ledger: Arc<dyn AuditLedger>, rules: RuleSet, retry: RetryPolicy) -> World {
    let purchase_orders = Arc::new(InMemoryPurchaseOrderStore::new());
    let vendors = Arc::new(InMemoryVendorHistory::new());
    let tenant_id = TenantId::new();

    vendors.insert(
        tenant_id,
        history("VEND-ACME", &[dec!(10800), dec!(11200), dec!(10950), dec!(11100), dec!(10900)]),
    );
    vendors.insert(
        tenant_id,
        history("VEND-BIGCO", &[dec!(58000), dec!(61000), dec!(59500), dec!(60500), dec!(60200)]),
    );

    let orchestrator = Orchestrator::new(
        AuditWriter::new(ledger),
        Arc::new(RuleBook::new(rules).unwrap()),
        purchase_orders.clone(),
        vendors,
    )
    .with_retry(retry);

    World {
        orchestrator: Arc::new(orchestrator),
        purchase_orders,
        tenant_id,
    }
}

fn default_world() -> World {
    world(
        Arc::new(InMemoryAuditLedger::new()),
        RuleSet::default(),
        RetryPolicy::immediate(3),
    )
}

async fn submit(world: &World, header: InvoiceHeader) -> InvoiceId {
    world
        .orchestrator
        .submit(ExtractedInvoice {
            invoice_id: InvoiceId::new(),
            tenant_id: world.tenant_id,
            received_at: received_at(),
            header,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn matched_mid_size_invoice_needs_one_approver() {
    let w = default_world();
    w.purchase_orders
        .insert(w.tenant_id, open_po("PO-2026-118", "VEND-ACME", dec!(11000)));
    let id = submit(&w, header("VEND-ACME", dec!(11000), Some("PO-2026-118"))).await;

    let outcome = w.orchestrator.process(id, received_at()).await.unwrap();
    let screening = outcome.screening.unwrap();

    assert_eq!(outcome.status, InvoiceStatus::ReviewPending);
    assert_eq!(screening.assessment.level, RiskLevel::Low, "score {}", screening.assessment.score);
    assert_eq!(screening.plan.route, RouteKind::LowRiskTier);
    assert_eq!(screening.plan.roles(), vec!["ap_manager"]);
    assert!(screening.plan.matched_rules.is_empty());

    let invoice = w.orchestrator.invoice(id).await.unwrap();
    assert_eq!(invoice.approval_deadline(), Some(received_at() + Duration::hours(48)));
}

#[tokio::test]
async fn large_invoice_without_po_needs_every_matching_role() {
    let w = default_world();
    let id = submit(&w, header("VEND-BIGCO", dec!(60000), None)).await;

    let outcome = w.orchestrator.process(id, received_at()).await.unwrap();
    let screening = outcome.screening.unwrap();

    let po = screening.assessment.factor("po_mismatch").unwrap();
    assert_eq!(po.value, 1.0);
    assert!(po.contribution >= 0.20 - f64::EPSILON);

    let mut roles = screening.plan.roles();
    roles.sort();
    assert_eq!(roles, vec!["finance_director", "procurement_manager"]);
    assert!(screening.plan.matched_rules.contains(&"High Value Review".to_string()));
    assert!(screening.plan.matched_rules.contains(&"No PO".to_string()));

    // Tightest deadline across the matched rules.
    let invoice = w.orchestrator.invoice(id).await.unwrap();
    assert_eq!(invoice.approval_deadline(), Some(received_at() + Duration::hours(48)));
    assert_eq!(invoice.open_tasks().count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_approve_and_reject_ends_rejected() {
    let dual = RuleSet {
        version: "dual-control-1".to_string(),
        rules: vec![ApprovalRule::new(
            "Dual Control",
            Condition::Always,
            vec![
                ApproverSpec::new("ap_manager", 48),
                ApproverSpec::new("finance_manager", 24),
            ],
        )],
        ..RuleSet::default()
    };

    for _ in 0..20 {
        let w = world(Arc::new(InMemoryAuditLedger::new()), dual.clone(), RetryPolicy::immediate(3));
        w.purchase_orders
            .insert(w.tenant_id, open_po("PO-77", "VEND-ACME", dec!(11000)));
        let id = submit(&w, header("VEND-ACME", dec!(11000), Some("PO-77"))).await;
        w.orchestrator.process(id, received_at()).await.unwrap();

        let tasks: Vec<_> = w
            .orchestrator
            .invoice(id)
            .await
            .unwrap()
            .tasks()
            .iter()
            .map(|t| t.id)
            .collect();
        let (first_task, second_task) = (tasks[0], tasks[1]);
        let at = received_at() + Duration::hours(1);

        let approver = Arc::clone(&w.orchestrator);
        let approve = tokio::spawn(async move {
            approver
                .decide(DecisionRequest::new(id, first_task, "alice", ApprovalAction::Approve, at))
                .await
        });
        let rejecter = Arc::clone(&w.orchestrator);
        let reject = tokio::spawn(async move {
            rejecter
                .decide(DecisionRequest::new(id, second_task, "bob", ApprovalAction::Reject, at))
                .await
        });

        let approve = approve.await.unwrap();
        reject.await.unwrap().unwrap();

        assert_eq!(w.orchestrator.invoice(id).await.unwrap().status(), InvoiceStatus::Rejected);

        let trail = w.orchestrator.audit_trail(id).await.unwrap();
        let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
        let reject_at = actions.iter().position(|a| *a == "reject").unwrap();
        match approve {
            Ok(_) => {
                let approve_at = actions.iter().position(|a| *a == "approve").unwrap();
                assert!(approve_at < reject_at);
            }
            Err(WorkflowError::ConcurrentDecisionConflict { .. }) => {
                let conflict_at = actions
                    .iter()
                    .position(|a| *a == "rejected_due_to_conflict")
                    .unwrap();
                assert!(reject_at < conflict_at);
            }
            Err(other) => panic!("unexpected: {other}"),
        }
        assert!(trail.windows(2).all(|p| p[0].sequence < p[1].sequence));
    }
}

#[tokio::test]
async fn slow_po_lookup_times_out_and_parks() {
    let retry = RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 0,
        max_delay_ms: 0,
        jitter: 0.0,
        timeout_ms: 20,
    };
    let w = world(Arc::new(InMemoryAuditLedger::new()), RuleSet::default(), retry);
    w.purchase_orders
        .insert(w.tenant_id, open_po("PO-9", "VEND-ACME", dec!(11000)));
    w.purchase_orders.set_delay(StdDuration::from_millis(200));
    let id = submit(&w, header("VEND-ACME", dec!(11000), Some("PO-9"))).await;

    let outcome = w.orchestrator.process(id, received_at()).await.unwrap();

    assert_eq!(outcome.status, InvoiceStatus::NeedsAttention);
    let reason = outcome.parked_reason.unwrap();
    assert!(reason.starts_with("external_unavailable"), "{reason}");
    assert!(reason.contains("timed out"), "{reason}");
    assert_eq!(w.purchase_orders.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn withdrawal_during_lookup_stops_the_pipeline() {
    let retry = RetryPolicy {
        timeout_ms: 5_000,
        ..RetryPolicy::immediate(1)
    };
    let w = world(Arc::new(InMemoryAuditLedger::new()), RuleSet::default(), retry);
    w.purchase_orders
        .insert(w.tenant_id, open_po("PO-12", "VEND-ACME", dec!(11000)));
    w.purchase_orders.set_delay(StdDuration::from_millis(150));
    let id = submit(&w, header("VEND-ACME", dec!(11000), Some("PO-12"))).await;

    let worker = Arc::clone(&w.orchestrator);
    let processing = tokio::spawn(async move { worker.process(id, received_at()).await });
    tokio::time::sleep(StdDuration::from_millis(30)).await;

    w.orchestrator
        .withdraw(id, "vendor-portal", Some("issued in error".into()), received_at())
        .await
        .unwrap();

    assert!(matches!(processing.await.unwrap(), Err(WorkflowError::Withdrawn(_))));
    let invoice = w.orchestrator.invoice(id).await.unwrap();
    assert!(invoice.is_withdrawn());
    assert_eq!(invoice.status(), InvoiceStatus::Extracted);

    let trail = w.orchestrator.audit_trail(id).await.unwrap();
    let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["receive", "withdraw"]);
}

#[tokio::test]
async fn batch_processing_keeps_tenants_on_separate_chains() {
    let ledger = Arc::new(InMemoryAuditLedger::new());
    let first = world(ledger.clone(), RuleSet::default(), RetryPolicy::immediate(3));
    let second = world(ledger.clone(), RuleSet::default(), RetryPolicy::immediate(3));

    for _ in 0..3 {
        submit(&first, header("VEND-ACME", dec!(11000), None)).await;
    }
    submit(&second, header("VEND-BIGCO", dec!(60000), None)).await;

    let results = first.orchestrator.process_pending(received_at()).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.windows(2).all(|p| p[0].0 < p[1].0));
    for (_, result) in &results {
        assert_eq!(result.as_ref().unwrap().status, InvoiceStatus::ReviewPending);
    }
    second.orchestrator.process_pending(received_at()).await.unwrap();

    let first_partition = PartitionKey::tenant(first.tenant_id);
    let second_partition = PartitionKey::tenant(second.tenant_id);
    assert_eq!(ledger.tail(&first_partition).unwrap().sequence, 6);
    assert_eq!(ledger.tail(&second_partition).unwrap().sequence, 2);

    for (_, report) in first.orchestrator.verify_all().unwrap() {
        report.unwrap();
    }
}

#[tokio::test]
async fn edited_journal_halts_the_partition_on_reload() {
    let path = std::env::temp_dir().join(format!("invoiceflow-audit-{}.jsonl", uuid::Uuid::now_v7()));

    let tenant_id = {
        let ledger = Arc::new(InMemoryAuditLedger::with_journal(&path).unwrap());
        let w = world(ledger, RuleSet::default(), RetryPolicy::immediate(3));
        w.purchase_orders
            .insert(w.tenant_id, open_po("PO-5", "VEND-ACME", dec!(11000)));
        let id = submit(&w, header("VEND-ACME", dec!(11000), Some("PO-5"))).await;
        w.orchestrator.process(id, received_at()).await.unwrap();
        w.orchestrator.verify_audit(&PartitionKey::tenant(w.tenant_id)).unwrap();
        w.tenant_id
    };

    let original = std::fs::read_to_string(&path).unwrap();
    let edited = original.replacen("\"actor\":\"system\"", "\"actor\":\"mallory\"", 1);
    assert_ne!(original, edited);
    std::fs::write(&path, edited).unwrap();

    let reopened = Arc::new(InMemoryAuditLedger::with_journal(&path).unwrap());
    let partition = PartitionKey::tenant(tenant_id);
    assert!(reopened.is_halted(&partition).unwrap());

    let w = world(reopened.clone(), RuleSet::default(), RetryPolicy::immediate(3));
    let reports = w.orchestrator.verify_all().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].1.is_err());

    let _ = std::fs::remove_file(&path);
}
