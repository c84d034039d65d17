use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use invoiceflow_core::{
    AggregateRoot, AssessmentId, Currency, DomainError, DomainResult, InvoiceId, MatchResultId,
    TenantId, amounts_agree,
};

use crate::task::ApprovalTask;

/// Invoice status lifecycle.
///
/// `uploaded` and `preprocessing` belong to ingestion; this crate starts at
/// `extracted`. `needs_attention` is the parking state for data/logic errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Uploaded,
    Preprocessing,
    Extracted,
    ReviewPending,
    Approved,
    Rejected,
    Authorized,
    Paid,
    NeedsAttention,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Uploaded => "uploaded",
            InvoiceStatus::Preprocessing => "preprocessing",
            InvoiceStatus::Extracted => "extracted",
            InvoiceStatus::ReviewPending => "review_pending",
            InvoiceStatus::Approved => "approved",
            InvoiceStatus::Rejected => "rejected",
            InvoiceStatus::Authorized => "authorized",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::NeedsAttention => "needs_attention",
        }
    }

    /// No further workflow decisions apply.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Rejected | InvoiceStatus::Authorized | InvoiceStatus::Paid
        )
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoice line as extracted from the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    /// PO line number this line was reconciled against.
    #[serde(default)]
    pub po_line_ref: Option<u32>,
    #[serde(default)]
    pub matched: Option<bool>,
    /// Percent variance against the PO line (largest of quantity/price).
    #[serde(default)]
    pub variance_pct: Option<Decimal>,
}

impl LineItem {
    pub fn new(
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
        line_total: Decimal,
    ) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            line_total,
            po_line_ref: None,
            matched: None,
            variance_pct: None,
        }
    }
}

/// Per-line outcome of PO matching, copied onto the invoice's line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAnnotation {
    pub line_index: usize,
    pub po_line_ref: Option<u32>,
    pub matched: bool,
    pub variance_pct: Option<Decimal>,
}

/// The extracted business content of an invoice. Replaced wholesale on correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    pub vendor_ref: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: Currency,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub po_reference: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    /// Raw PII; redacted from audit snapshots.
    #[serde(default)]
    pub vendor_tax_id: Option<String>,
    #[serde(default)]
    pub bank_account: Option<String>,
}

/// Structured record handed over by ingestion once extraction finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedInvoice {
    pub invoice_id: InvoiceId,
    pub tenant_id: TenantId,
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub header: InvoiceHeader,
}

/// Aggregate root: Invoice.
///
/// Only the workflow orchestrator drives it (through `Aggregate::handle` and
/// `Aggregate::apply`); everything else reads it through the getters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub(crate) id: InvoiceId,
    pub(crate) tenant_id: TenantId,
    pub(crate) header: InvoiceHeader,
    pub(crate) received_at: DateTime<Utc>,
    pub(crate) status: InvoiceStatus,
    pub(crate) risk_score: Option<f64>,
    pub(crate) approvers: Vec<String>,
    pub(crate) approval_deadline: Option<DateTime<Utc>>,
    pub(crate) tasks: Vec<ApprovalTask>,
    pub(crate) match_result_id: Option<MatchResultId>,
    pub(crate) assessment_id: Option<AssessmentId>,
    pub(crate) matched_rules: Vec<String>,
    pub(crate) breach_count: u32,
    pub(crate) parked_reason: Option<String>,
    pub(crate) withdrawn: bool,
    pub(crate) version: u64,
}

impl Invoice {
    /// Accept an ingestion hand-off. Validation is deliberately deferred to the
    /// workflow so that a malformed record can be parked with a reason.
    pub fn from_extracted(extracted: ExtractedInvoice) -> Self {
        Self {
            id: extracted.invoice_id,
            tenant_id: extracted.tenant_id,
            header: extracted.header,
            received_at: extracted.received_at,
            status: InvoiceStatus::Extracted,
            risk_score: None,
            approvers: Vec::new(),
            approval_deadline: None,
            tasks: Vec::new(),
            match_result_id: None,
            assessment_id: None,
            matched_rules: Vec::new(),
            breach_count: 0,
            parked_reason: None,
            withdrawn: false,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn header(&self) -> &InvoiceHeader {
        &self.header
    }

    pub fn vendor_ref(&self) -> &str {
        &self.header.vendor_ref
    }

    pub fn invoice_number(&self) -> &str {
        &self.header.invoice_number
    }

    pub fn invoice_date(&self) -> NaiveDate {
        self.header.invoice_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.header.due_date
    }

    pub fn currency(&self) -> &Currency {
        &self.header.currency
    }

    pub fn subtotal(&self) -> Decimal {
        self.header.subtotal
    }

    pub fn tax(&self) -> Decimal {
        self.header.tax
    }

    pub fn total(&self) -> Decimal {
        self.header.total
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.header.line_items
    }

    pub fn po_reference(&self) -> Option<&str> {
        self.header
            .po_reference
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    pub fn payment_terms(&self) -> Option<&str> {
        self.header.payment_terms.as_deref()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn risk_score(&self) -> Option<f64> {
        self.risk_score
    }

    pub fn approvers(&self) -> &[String] {
        &self.approvers
    }

    pub fn approval_deadline(&self) -> Option<DateTime<Utc>> {
        self.approval_deadline
    }

    pub fn tasks(&self) -> &[ApprovalTask] {
        &self.tasks
    }

    pub fn task(&self, id: invoiceflow_core::ApprovalTaskId) -> Option<&ApprovalTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks still awaiting a binding decision.
    pub fn open_tasks(&self) -> impl Iterator<Item = &ApprovalTask> {
        self.tasks.iter().filter(|t| t.is_open())
    }

    pub fn match_result_id(&self) -> Option<MatchResultId> {
        self.match_result_id
    }

    pub fn assessment_id(&self) -> Option<AssessmentId> {
        self.assessment_id
    }

    pub fn matched_rules(&self) -> &[String] {
        &self.matched_rules
    }

    pub fn breach_count(&self) -> u32 {
        self.breach_count
    }

    pub fn parked_reason(&self) -> Option<&str> {
        self.parked_reason.as_deref()
    }

    pub fn is_withdrawn(&self) -> bool {
        self.withdrawn
    }

    /// Sum of all line totals (the matcher's denominator).
    /// Saturates at `Decimal::MAX`; validation rejects sums that overflow.
    pub fn line_amount_total(&self) -> Decimal {
        self.header
            .line_items
            .iter()
            .fold(Decimal::ZERO, |acc, l| acc.saturating_add(l.line_total))
    }

    /// Check amounts, lines and dates.
    ///
    /// Invariant: `subtotal + tax == total` within one minor unit of the
    /// invoice currency.
    pub fn validate(&self) -> DomainResult<()> {
        validate_header(&self.header)
    }

    pub(crate) fn refresh_assignment(&mut self) {
        let mut roles: Vec<String> = Vec::new();
        let mut deadline: Option<DateTime<Utc>> = None;
        for task in self.tasks.iter().filter(|t| t.is_open()) {
            if !roles.contains(&task.role) {
                roles.push(task.role.clone());
            }
            deadline = Some(match deadline {
                Some(d) if d <= task.deadline => d,
                _ => task.deadline,
            });
        }
        self.approvers = roles;
        self.approval_deadline = deadline;
    }

    pub(crate) fn annotate_lines(&mut self, annotations: &[LineAnnotation]) {
        for a in annotations {
            if let Some(line) = self.header.line_items.get_mut(a.line_index) {
                line.po_line_ref = a.po_line_ref;
                line.matched = Some(a.matched);
                line.variance_pct = a.variance_pct;
            }
        }
    }
}

/// Header validation shared by intake and correction.
pub fn validate_header(header: &InvoiceHeader) -> DomainResult<()> {
    if header.invoice_number.trim().is_empty() {
        return Err(DomainError::validation("invoice_number must not be empty"));
    }
    if header.vendor_ref.trim().is_empty() {
        return Err(DomainError::validation("vendor_ref must not be empty"));
    }
    if header.line_items.is_empty() {
        return Err(DomainError::validation("invoice must have at least one line item"));
    }
    if header.subtotal.is_sign_negative() || header.tax.is_sign_negative() {
        return Err(DomainError::validation("subtotal and tax must not be negative"));
    }

    let currency = &header.currency;
    let expected = header
        .subtotal
        .checked_add(header.tax)
        .ok_or_else(|| DomainError::validation("subtotal + tax overflows"))?;
    if !amounts_agree(expected, header.total, currency) {
        return Err(DomainError::validation(format!(
            "total {} does not equal subtotal {} + tax {} ({} epsilon {})",
            header.total,
            header.subtotal,
            header.tax,
            currency,
            currency.epsilon()
        )));
    }

    for (idx, line) in header.line_items.iter().enumerate() {
        if line.quantity.is_sign_negative() {
            return Err(DomainError::validation(format!(
                "line {idx}: quantity must not be negative"
            )));
        }
        if line.unit_price.is_sign_negative() {
            return Err(DomainError::validation(format!(
                "line {idx}: unit_price must not be negative"
            )));
        }
        let computed = line
            .quantity
            .checked_mul(line.unit_price)
            .ok_or_else(|| DomainError::validation(format!("line {idx}: amount overflow")))?;
        if !amounts_agree(computed, line.line_total, currency) {
            return Err(DomainError::validation(format!(
                "line {idx}: line_total {} does not equal quantity x unit_price {}",
                line.line_total, computed
            )));
        }
    }

    header
        .line_items
        .iter()
        .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.line_total))
        .ok_or_else(|| DomainError::validation("sum of line totals overflows"))?;

    if header.due_date < header.invoice_date {
        return Err(DomainError::validation("due_date precedes invoice_date"));
    }

    Ok(())
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
