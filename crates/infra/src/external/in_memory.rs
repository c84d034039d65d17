//! In-memory collaborators with failure injection, for tests and local runs.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use invoiceflow_core::TenantId;
use invoiceflow_purchasing::{PurchaseOrder, normalize_po_number};
use invoiceflow_risk::VendorHistory;

use super::{ExternalError, PurchaseOrderStore, VendorHistorySource};

/// Scripted failures shared by both fakes.
#[derive(Debug, Default)]
struct Faults {
    fail_next: AtomicU32,
    delay_ms: AtomicU32,
    calls: AtomicU32,
}

impl Faults {
    async fn before_call(&self, what: &str) -> Result<(), ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        let remaining = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            return Err(ExternalError::Transient(format!("{what} unavailable")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPurchaseOrderStore {
    orders: RwLock<HashMap<(TenantId, String), PurchaseOrder>>,
    faults: Faults,
}

impl InMemoryPurchaseOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: TenantId, po: PurchaseOrder) {
        let key = (tenant_id, normalize_po_number(&po.po_number));
        if let Ok(mut orders) = self.orders.write() {
            orders.insert(key, po);
        }
    }

    /// The next `n` calls fail with `Transient`.
    pub fn fail_next(&self, n: u32) {
        self.faults.fail_next.store(n, Ordering::SeqCst);
    }

    /// Every call sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        let ms = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        self.faults.delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.faults.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PurchaseOrderStore for InMemoryPurchaseOrderStore {
    async fn fetch(
        &self,
        tenant_id: TenantId,
        po_number: &str,
    ) -> Result<PurchaseOrder, ExternalError> {
        self.faults.before_call("purchase order store").await?;
        let key = (tenant_id, normalize_po_number(po_number));
        let orders = self
            .orders
            .read()
            .map_err(|_| ExternalError::Transient("purchase order store lock poisoned".into()))?;
        orders
            .get(&key)
            .cloned()
            .ok_or_else(|| ExternalError::NotFound(key.1))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryVendorHistory {
    histories: RwLock<HashMap<(TenantId, String), VendorHistory>>,
    faults: Faults,
}

impl InMemoryVendorHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: TenantId, history: VendorHistory) {
        if let Ok(mut histories) = self.histories.write() {
            histories.insert((tenant_id, history.vendor_ref.clone()), history);
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.faults.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.faults.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VendorHistorySource for InMemoryVendorHistory {
    async fn fetch(
        &self,
        tenant_id: TenantId,
        vendor_ref: &str,
    ) -> Result<Option<VendorHistory>, ExternalError> {
        self.faults.before_call("vendor history").await?;
        let histories = self
            .histories
            .read()
            .map_err(|_| ExternalError::Transient("vendor history lock poisoned".into()))?;
        Ok(histories.get(&(tenant_id, vendor_ref.to_string())).cloned())
    }
}
