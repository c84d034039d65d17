//! ID-keyed arena of invoices under workflow.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, OwnedMutexGuard};

use invoiceflow_approval::ApprovalPlan;
use invoiceflow_core::{ApprovalTaskId, AuditEventId, InvoiceId};
use invoiceflow_invoicing::Invoice;
use invoiceflow_purchasing::MatchResult;
use invoiceflow_risk::RiskAssessment;

use super::error::WorkflowError;

/// Results of the last screening run, kept for inspection.
#[derive(Debug, Clone)]
pub struct Screening {
    pub match_result: MatchResult,
    pub assessment: RiskAssessment,
    pub plan: ApprovalPlan,
}

#[derive(Debug)]
pub(crate) struct InvoiceState {
    pub invoice: Invoice,
    /// Most recent audit entry about this invoice; corrections reference it.
    pub last_audit_event: Option<AuditEventId>,
    pub screening: Option<Screening>,
    /// Tasks already signalled as in the warning zone.
    pub warned: HashSet<ApprovalTaskId>,
}

/// One invoice: its state behind a per-invoice mutex, plus a cancellation
/// flag that can be raised without waiting for that mutex.
#[derive(Debug)]
pub(crate) struct InvoiceSlot {
    pub state: Arc<Mutex<InvoiceState>>,
    withdrawn: AtomicBool,
}

impl InvoiceSlot {
    fn new(invoice: Invoice) -> Self {
        Self {
            state: Arc::new(Mutex::new(InvoiceState {
                invoice,
                last_audit_event: None,
                screening: None,
                warned: HashSet::new(),
            })),
            withdrawn: AtomicBool::new(false),
        }
    }

    pub fn is_withdrawn(&self) -> bool {
        self.withdrawn.load(Ordering::SeqCst)
    }

    /// Raise the flag; `false` if it was already raised.
    pub fn raise_withdrawn(&self) -> bool {
        !self.withdrawn.swap(true, Ordering::SeqCst)
    }

    pub fn clear_withdrawn(&self) {
        self.withdrawn.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub(crate) struct InvoiceArena {
    slots: RwLock<HashMap<InvoiceId, Arc<InvoiceSlot>>>,
}

impl InvoiceArena {
    /// Add a new invoice and return its state already locked, so no other
    /// transition can run before the caller records the receipt.
    pub fn insert(&self, invoice: Invoice) -> Result<OwnedMutexGuard<InvoiceState>, WorkflowError> {
        let id = invoice.id_typed();
        let mut slots = self.slots.write().map_err(|_| WorkflowError::Poisoned)?;
        if slots.contains_key(&id) {
            return Err(WorkflowError::AlreadySubmitted(id));
        }
        let slot = Arc::new(InvoiceSlot::new(invoice));
        let guard = Arc::clone(&slot.state)
            .try_lock_owned()
            .map_err(|_| WorkflowError::Poisoned)?;
        slots.insert(id, slot);
        Ok(guard)
    }

    pub fn remove(&self, id: InvoiceId) -> Result<(), WorkflowError> {
        let mut slots = self.slots.write().map_err(|_| WorkflowError::Poisoned)?;
        slots.remove(&id);
        Ok(())
    }

    pub fn get(&self, id: InvoiceId) -> Result<Arc<InvoiceSlot>, WorkflowError> {
        let slots = self.slots.read().map_err(|_| WorkflowError::Poisoned)?;
        slots
            .get(&id)
            .cloned()
            .ok_or(WorkflowError::UnknownInvoice(id))
    }

    /// IDs in ascending (time-ordered) order.
    pub fn ids(&self) -> Result<Vec<InvoiceId>, WorkflowError> {
        let slots = self.slots.read().map_err(|_| WorkflowError::Poisoned)?;
        let mut ids: Vec<InvoiceId> = slots.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
