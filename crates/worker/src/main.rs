//! Batch worker: screens a file of extracted invoices, runs the SLA sweep and
//! re-verifies every audit chain.
//!
//! Usage: `invoiceflow-worker <batch.json> [config.json]`. The config path may
//! also come from `INVOICEFLOW_CONFIG`; `INVOICEFLOW__*` variables override it.

mod batch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use tracing::{error, info, warn};

use invoiceflow_infra::audit::{AuditLedger, InMemoryAuditLedger};
use invoiceflow_infra::{AppConfig, Orchestrator};

use crate::batch::Batch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args_os().skip(1);
    let batch_path = args
        .next()
        .map(PathBuf::from)
        .context("usage: invoiceflow-worker <batch.json> [config.json]")?;

    let config = match args.next().or_else(|| std::env::var_os("INVOICEFLOW_CONFIG")) {
        Some(path) => AppConfig::load(PathBuf::from(path))?,
        None => AppConfig::from_env()?,
    };
    invoiceflow_observability::init_with(&config.logging);

    let ledger: Arc<dyn AuditLedger> = match &config.audit.journal_path {
        Some(path) => Arc::new(
            InMemoryAuditLedger::with_journal(path)
                .with_context(|| format!("opening audit journal {}", path.display()))?,
        ),
        None => {
            warn!("no audit journal configured; the ledger lives in memory only");
            Arc::new(InMemoryAuditLedger::new())
        }
    };

    let batch = Batch::load(&batch_path)?;
    let (purchase_orders, vendors) = batch.stores();
    let orchestrator = Arc::new(Orchestrator::from_config(
        &config,
        ledger,
        Arc::new(purchase_orders),
        Arc::new(vendors),
    )?);

    let mut rejected_at_intake = 0usize;
    for invoice in batch.invoices {
        let invoice_id = invoice.invoice_id;
        if let Err(err) = orchestrator.submit(invoice).await {
            rejected_at_intake += 1;
            warn!(invoice_id = %invoice_id, error = %err, "invoice not accepted");
        }
    }

    let now = Utc::now();
    let results = orchestrator.process_pending(now).await?;
    let mut parked = 0usize;
    let mut failed = 0usize;
    for (invoice_id, result) in &results {
        match result {
            Ok(outcome) => {
                if outcome.parked_reason.is_some() {
                    parked += 1;
                }
                info!(
                    invoice_id = %invoice_id,
                    status = %outcome.status,
                    risk_score = outcome.screening.as_ref().map(|s| s.assessment.score),
                    approvers = ?outcome.screening.as_ref().map(|s| s.plan.roles()),
                    parked_reason = outcome.parked_reason.as_deref(),
                    "invoice processed"
                );
            }
            Err(err) => {
                failed += 1;
                error!(invoice_id = %invoice_id, error = %err, "invoice processing failed");
            }
        }
    }

    let sla = orchestrator.check_sla(now).await?;

    let mut tampered = 0usize;
    for (partition, report) in orchestrator.verify_all()? {
        match report {
            Ok(report) => info!(
                partition = %partition,
                events = report.events_checked,
                tail_hash = %report.tail_hash,
                "audit chain verified"
            ),
            Err(err) => {
                tampered += 1;
                error!(partition = %partition, error = %err, "audit chain verification failed");
            }
        }
    }

    info!(
        processed = results.len(),
        rejected_at_intake,
        parked,
        failed,
        sla_warnings = sla.warnings.len(),
        sla_breaches = sla.breaches.len(),
        "batch complete"
    );

    if tampered > 0 {
        bail!("audit verification failed for {tampered} partition(s)");
    }
    Ok(())
}
