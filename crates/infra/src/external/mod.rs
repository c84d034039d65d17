//! Ports for the read-only collaborators the pipeline depends on.
//!
//! Both are async and may fail transiently; the orchestrator wraps every call
//! in `retry::retry_external`.

pub mod in_memory;

use std::sync::Arc;

use thiserror::Error;

use invoiceflow_core::TenantId;
use invoiceflow_purchasing::PurchaseOrder;
use invoiceflow_risk::VendorHistory;

pub use in_memory::{InMemoryPurchaseOrderStore, InMemoryVendorHistory};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExternalError {
    /// Worth retrying (connection reset, 5xx, throttling).
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    /// The collaborator answered, but the answer cannot be used.
    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },
}

impl ExternalError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExternalError::Transient(_) | ExternalError::Timeout { .. })
    }
}

/// Read-only purchase order lookup.
#[async_trait::async_trait]
pub trait PurchaseOrderStore: Send + Sync {
    /// Fetch a PO by number. Implementations normalise the number first.
    async fn fetch(
        &self,
        tenant_id: TenantId,
        po_number: &str,
    ) -> Result<PurchaseOrder, ExternalError>;
}

/// Read-only vendor statistics.
#[async_trait::async_trait]
pub trait VendorHistorySource: Send + Sync {
    /// `Ok(None)` when the vendor has no recorded history.
    async fn fetch(
        &self,
        tenant_id: TenantId,
        vendor_ref: &str,
    ) -> Result<Option<VendorHistory>, ExternalError>;
}

#[async_trait::async_trait]
impl<S> PurchaseOrderStore for Arc<S>
where
    S: PurchaseOrderStore + ?Sized,
{
    async fn fetch(
        &self,
        tenant_id: TenantId,
        po_number: &str,
    ) -> Result<PurchaseOrder, ExternalError> {
        (**self).fetch(tenant_id, po_number).await
    }
}

#[async_trait::async_trait]
impl<S> VendorHistorySource for Arc<S>
where
    S: VendorHistorySource + ?Sized,
{
    async fn fetch(
        &self,
        tenant_id: TenantId,
        vendor_ref: &str,
    ) -> Result<Option<VendorHistory>, ExternalError> {
        (**self).fetch(tenant_id, vendor_ref).await
    }
}
