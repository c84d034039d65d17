//! Batch input: extracted invoices plus the collaborator data they are
//! screened against.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use invoiceflow_core::TenantId;
use invoiceflow_infra::external::{InMemoryPurchaseOrderStore, InMemoryVendorHistory};
use invoiceflow_invoicing::ExtractedInvoice;
use invoiceflow_purchasing::PurchaseOrder;
use invoiceflow_risk::VendorHistory;

#[derive(Debug, Clone, Deserialize)]
pub struct TenantPurchaseOrder {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub order: PurchaseOrder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantVendorHistory {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub history: VendorHistory,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Batch {
    pub purchase_orders: Vec<TenantPurchaseOrder>,
    pub vendor_histories: Vec<TenantVendorHistory>,
    pub invoices: Vec<ExtractedInvoice>,
}

impl Batch {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading batch file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing batch file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// In-memory collaborators seeded with this batch's data.
    pub fn stores(&self) -> (InMemoryPurchaseOrderStore, InMemoryVendorHistory) {
        let purchase_orders = InMemoryPurchaseOrderStore::new();
        for entry in &self.purchase_orders {
            purchase_orders.insert(entry.tenant_id, entry.order.clone());
        }
        let vendors = InMemoryVendorHistory::new();
        for entry in &self.vendor_histories {
            vendors.insert(entry.tenant_id, entry.history.clone());
        }
        (purchase_orders, vendors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoiceflow_infra::external::{PurchaseOrderStore, VendorHistorySource};

    const TENANT: &str = "0191c0de-0000-7000-8000-000000000001";

    fn sample() -> String {
        format!(
            r#"{{
                "purchase_orders": [{{
                    "tenant_id": "{TENANT}",
                    "po_number": "PO-2026-001",
                    "vendor_ref": "VEND-001",
                    "currency": "USD",
                    "status": "open",
                    "lines": [{{"line_no": 1, "description": "Bolts", "quantity": "100", "unit_price": "10.80"}}]
                }}],
                "vendor_histories": [{{
                    "tenant_id": "{TENANT}",
                    "vendor_ref": "VEND-001",
                    "trailing_amounts": ["1050", "1100", "1075"],
                    "invoices_in_window": 1,
                    "historical_rate": 1.5,
                    "total_invoices": 12
                }}],
                "invoices": [{{
                    "invoice_id": "0191c0de-0000-7000-8000-0000000000aa",
                    "tenant_id": "{TENANT}",
                    "received_at": "2026-03-04T10:30:00Z",
                    "vendor_ref": "VEND-001",
                    "invoice_number": "INV-1001",
                    "invoice_date": "2026-03-02",
                    "due_date": "2026-04-01",
                    "currency": "USD",
                    "subtotal": "1080",
                    "tax": "0",
                    "total": "1080",
                    "line_items": [{{"description": "Bolts", "quantity": "100", "unit_price": "10.80", "line_total": "1080"}}],
                    "po_reference": "po 2026-001"
                }}]
            }}"#
        )
    }

    #[test]
    fn parses_invoices_with_flattened_headers() {
        let batch = Batch::parse(&sample()).unwrap();
        assert_eq!(batch.invoices.len(), 1);
        let invoice = &batch.invoices[0];
        assert_eq!(invoice.header.invoice_number, "INV-1001");
        assert_eq!(invoice.header.po_reference.as_deref(), Some("po 2026-001"));
        assert!(invoice.header.bank_account.is_none());
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let batch = Batch::parse("{}").unwrap();
        assert!(batch.invoices.is_empty());
        assert!(batch.purchase_orders.is_empty());
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(Batch::parse(r#"{"invoices": [{"tenant_id": 7}]}"#).is_err());
    }

    #[tokio::test]
    async fn stores_are_keyed_by_tenant() {
        let batch = Batch::parse(&sample()).unwrap();
        let (purchase_orders, vendors) = batch.stores();
        let tenant = batch.invoices[0].tenant_id;

        let po = purchase_orders.fetch(tenant, "PO 2026-001").await.unwrap();
        assert_eq!(po.lines.len(), 1);
        assert!(vendors.fetch(tenant, "VEND-001").await.unwrap().is_some());
        assert!(vendors.fetch(TenantId::new(), "VEND-001").await.unwrap().is_none());
    }
}
