//! Invoice to purchase order reconciliation.
//!
//! Each invoice line is paired with the best-scoring unclaimed PO line. A pair
//! counts as matched when the description is plausibly the same item and the
//! quantity/price variances are inside tolerance. Poor matches are a normal
//! result, never an error.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::debug;

use invoiceflow_core::{InvoiceId, MatchResultId};
use invoiceflow_invoicing::{Invoice, LineAnnotation, LineItem};

use crate::order::{PoLine, PurchaseOrder, PurchaseOrderStatus, normalize_po_number};
use crate::similarity::description_similarity;

/// Matching thresholds and candidate scoring weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchTolerances {
    /// Maximum quantity variance in percent for a line to count as matched.
    pub quantity_pct: Decimal,
    /// Maximum unit price variance in percent.
    pub price_pct: Decimal,
    /// Descriptions below this similarity never match.
    pub min_description_similarity: f64,
    pub description_weight: f64,
    pub quantity_weight: f64,
    pub price_weight: f64,
}

impl Default for MatchTolerances {
    fn default() -> Self {
        Self {
            quantity_pct: Decimal::new(2, 0),
            price_pct: Decimal::new(5, 0),
            min_description_similarity: 0.3,
            description_weight: 0.6,
            quantity_weight: 0.2,
            price_weight: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    FullMatch,
    PartialMatch,
    Mismatch,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::FullMatch => "full_match",
            MatchStatus::PartialMatch => "partial_match",
            MatchStatus::Mismatch => "mismatch",
        }
    }

    fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.99 {
            MatchStatus::FullMatch
        } else if confidence >= 0.5 {
            MatchStatus::PartialMatch
        } else {
            MatchStatus::Mismatch
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineOutcome {
    Matched,
    Unmatched,
    /// Best candidate has no remaining quantity.
    AlreadyBilled,
}

/// One record per invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineMatch {
    pub invoice_line: usize,
    /// Nearest candidate, `None` when no PO line was available.
    pub po_line: Option<u32>,
    pub outcome: LineOutcome,
    pub description_similarity: f64,
    pub quantity_variance_pct: Option<Decimal>,
    pub price_variance_pct: Option<Decimal>,
    pub score: f64,
}

impl LineMatch {
    fn worst_variance(&self) -> Option<Decimal> {
        match (self.quantity_variance_pct, self.price_variance_pct) {
            (Some(q), Some(p)) => Some(q.max(p)),
            (q, p) => q.or(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variance {
    pub field: String,
    pub expected: String,
    pub actual: String,
    pub variance_pct: Option<Decimal>,
    /// Invoice line index for line-level variances.
    pub line: Option<usize>,
}

impl Variance {
    fn header(field: &str, expected: impl ToString, actual: impl ToString) -> Self {
        Self {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            variance_pct: None,
            line: None,
        }
    }
}

/// Outcome of one matching attempt. Immutable; re-matching yields a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: MatchResultId,
    pub invoice_id: InvoiceId,
    /// Normalized PO number; `None` for the no-PO sentinel.
    pub po_number: Option<String>,
    pub status: MatchStatus,
    pub confidence: f64,
    pub line_matches: Vec<LineMatch>,
    pub variances: Vec<Variance>,
    pub recommendation: String,
}

impl MatchResult {
    /// Sentinel for invoices that reference no purchase order.
    pub fn no_po(invoice: &Invoice) -> Self {
        Self {
            id: MatchResultId::new(),
            invoice_id: invoice.id_typed(),
            po_number: None,
            status: MatchStatus::Mismatch,
            confidence: 0.0,
            line_matches: (0..invoice.line_items().len())
                .map(|idx| LineMatch {
                    invoice_line: idx,
                    po_line: None,
                    outcome: LineOutcome::Unmatched,
                    description_similarity: 0.0,
                    quantity_variance_pct: None,
                    price_variance_pct: None,
                    score: 0.0,
                })
                .collect(),
            variances: Vec::new(),
            recommendation: "No purchase order referenced; route for non-PO approval".to_string(),
        }
    }

    pub fn has_po(&self) -> bool {
        self.po_number.is_some()
    }

    /// Equality ignoring the attempt id.
    pub fn same_outcome(&self, other: &MatchResult) -> bool {
        self.invoice_id == other.invoice_id
            && self.po_number == other.po_number
            && self.status == other.status
            && self.confidence == other.confidence
            && self.line_matches == other.line_matches
            && self.variances == other.variances
            && self.recommendation == other.recommendation
    }

    /// Per-line outcomes in the shape the invoice stores on its line items.
    pub fn line_annotations(&self) -> Vec<LineAnnotation> {
        self.line_matches
            .iter()
            .map(|m| LineAnnotation {
                line_index: m.invoice_line,
                po_line_ref: m.po_line,
                matched: m.outcome == LineOutcome::Matched,
                variance_pct: m.worst_variance(),
            })
            .collect()
    }
}

/// Variance-tolerant invoice/PO matcher.
#[derive(Debug, Clone, Default)]
pub struct PoMatcher {
    tolerances: MatchTolerances,
}

struct Candidate<'a> {
    po_line: &'a PoLine,
    similarity: f64,
    quantity_variance: Decimal,
    price_variance: Decimal,
    score: f64,
}

impl PoMatcher {
    pub fn new(tolerances: MatchTolerances) -> Self {
        Self { tolerances }
    }

    pub fn tolerances(&self) -> &MatchTolerances {
        &self.tolerances
    }

    /// Reconcile `invoice` against `po`. Pure and repeatable: the same inputs
    /// give the same outcome (see `MatchResult::same_outcome`).
    pub fn match_invoice(&self, invoice: &Invoice, po: &PurchaseOrder) -> MatchResult {
        let mut claimed = vec![false; po.lines.len()];
        let mut line_matches = Vec::with_capacity(invoice.line_items().len());
        let mut variances = Vec::new();
        let mut matched_amount = Decimal::ZERO;

        for (idx, line) in invoice.line_items().iter().enumerate() {
            let best = self.best_candidate(line, po, &claimed);

            let Some((po_idx, cand)) = best else {
                line_matches.push(LineMatch {
                    invoice_line: idx,
                    po_line: None,
                    outcome: LineOutcome::Unmatched,
                    description_similarity: 0.0,
                    quantity_variance_pct: None,
                    price_variance_pct: None,
                    score: 0.0,
                });
                variances.push(Variance {
                    field: "po_line".to_string(),
                    expected: "matching PO line".to_string(),
                    actual: line.description.clone(),
                    variance_pct: None,
                    line: Some(idx),
                });
                continue;
            };

            let within_tolerance = cand.similarity >= self.tolerances.min_description_similarity
                && cand.quantity_variance <= self.tolerances.quantity_pct
                && cand.price_variance <= self.tolerances.price_pct;

            let outcome = if !within_tolerance {
                LineOutcome::Unmatched
            } else if cand.po_line.is_fully_billed() {
                LineOutcome::AlreadyBilled
            } else {
                LineOutcome::Matched
            };

            match outcome {
                LineOutcome::Matched => {
                    claimed[po_idx] = true;
                    matched_amount = matched_amount.saturating_add(line.line_total);
                }
                LineOutcome::AlreadyBilled => {
                    claimed[po_idx] = true;
                    variances.push(Variance {
                        field: "po_line".to_string(),
                        expected: format!("open quantity on PO line {}", cand.po_line.line_no),
                        actual: "PO line already billed".to_string(),
                        variance_pct: None,
                        line: Some(idx),
                    });
                }
                LineOutcome::Unmatched => {}
            }

            if cand.quantity_variance > Decimal::ZERO {
                variances.push(Variance {
                    field: "quantity".to_string(),
                    expected: expected_quantity(cand.po_line).to_string(),
                    actual: line.quantity.to_string(),
                    variance_pct: Some(cand.quantity_variance),
                    line: Some(idx),
                });
            }
            if cand.price_variance > Decimal::ZERO {
                variances.push(Variance {
                    field: "unit_price".to_string(),
                    expected: cand.po_line.unit_price.to_string(),
                    actual: line.unit_price.to_string(),
                    variance_pct: Some(cand.price_variance),
                    line: Some(idx),
                });
            }

            line_matches.push(LineMatch {
                invoice_line: idx,
                po_line: Some(cand.po_line.line_no),
                outcome,
                description_similarity: cand.similarity,
                quantity_variance_pct: Some(cand.quantity_variance),
                price_variance_pct: Some(cand.price_variance),
                score: cand.score,
            });
        }

        let denominator = invoice.line_amount_total();
        let confidence = if denominator > Decimal::ZERO {
            matched_amount
                .checked_div(denominator)
                .and_then(|ratio| ratio.to_f64())
                .unwrap_or(0.0)
                .clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut status = MatchStatus::from_confidence(confidence);
        let header = header_variances(invoice, po);
        let blocking = header
            .iter()
            .any(|v| v.field == "currency" || v.field == "po_status");
        if blocking {
            status = MatchStatus::Mismatch;
        }
        variances.extend(header);

        let po_number = normalize_po_number(&po.po_number);
        let recommendation = match status {
            MatchStatus::FullMatch => format!("Approve: invoice matches purchase order {po_number}"),
            MatchStatus::PartialMatch => {
                format!("Review {} variance(s) against {po_number} before approval", variances.len())
            }
            MatchStatus::Mismatch => format!("Hold: invoice does not match purchase order {po_number}"),
        };

        debug!(
            invoice_id = %invoice.id_typed(),
            po_number = %po_number,
            confidence,
            status = status.as_str(),
            "invoice matched against purchase order"
        );

        MatchResult {
            id: MatchResultId::new(),
            invoice_id: invoice.id_typed(),
            po_number: Some(po_number),
            status,
            confidence,
            line_matches,
            variances,
            recommendation,
        }
    }

    /// Highest scoring unclaimed PO line; ties go to the lower PO index.
    fn best_candidate<'a>(
        &self,
        line: &LineItem,
        po: &'a PurchaseOrder,
        claimed: &[bool],
    ) -> Option<(usize, Candidate<'a>)> {
        let mut best: Option<(usize, Candidate<'a>)> = None;

        for (po_idx, po_line) in po.lines.iter().enumerate() {
            if claimed[po_idx] {
                continue;
            }
            let cand = self.score_candidate(line, po_line);
            let better = match &best {
                None => true,
                Some((_, current)) => cand.score > current.score,
            };
            if better {
                best = Some((po_idx, cand));
            }
        }

        best
    }

    fn score_candidate<'a>(&self, line: &LineItem, po_line: &'a PoLine) -> Candidate<'a> {
        let similarity = description_similarity(&line.description, &po_line.description);
        let quantity_variance = variance_pct(expected_quantity(po_line), line.quantity);
        let price_variance = variance_pct(po_line.unit_price, line.unit_price);

        let t = &self.tolerances;
        let score = t.description_weight * similarity
            + t.quantity_weight * proximity(quantity_variance)
            + t.price_weight * proximity(price_variance);

        Candidate {
            po_line,
            similarity,
            quantity_variance,
            price_variance,
            score,
        }
    }
}

/// Quantity the next invoice is expected to bill. Fully billed lines fall back
/// to the ordered quantity so the variance stays meaningful.
fn expected_quantity(po_line: &PoLine) -> Decimal {
    if po_line.is_fully_billed() {
        po_line.quantity
    } else {
        po_line.remaining_quantity()
    }
}

/// `|actual - expected| / expected` in percent, rounded to two places.
fn variance_pct(expected: Decimal, actual: Decimal) -> Decimal {
    if expected.is_zero() {
        return if actual.is_zero() {
            Decimal::ZERO
        } else {
            Decimal::ONE_HUNDRED
        };
    }
    // Out-of-range variances saturate; `proximity` treats them as no match.
    actual
        .checked_sub(expected)
        .and_then(|diff| diff.abs().checked_div(expected.abs()))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map_or(Decimal::MAX, |pct| pct.round_dp(2))
}

/// 1.0 at zero variance, 0.0 at 100% or more.
fn proximity(variance: Decimal) -> f64 {
    let v = variance.to_f64().unwrap_or(100.0) / 100.0;
    1.0 - v.clamp(0.0, 1.0)
}

fn header_variances(invoice: &Invoice, po: &PurchaseOrder) -> Vec<Variance> {
    let mut out = Vec::new();

    if invoice.currency() != &po.currency {
        out.push(Variance::header("currency", &po.currency, invoice.currency()));
    }
    if !invoice.vendor_ref().eq_ignore_ascii_case(po.vendor_ref.trim()) {
        out.push(Variance::header("vendor", &po.vendor_ref, invoice.vendor_ref()));
    }
    if po.status == PurchaseOrderStatus::Closed {
        out.push(Variance::header("po_status", "open", "closed"));
    }

    let open = po.open_amount();
    if invoice.subtotal() > open.saturating_add(invoice.currency().epsilon()) {
        out.push(Variance {
            field: "subtotal".to_string(),
            expected: open.to_string(),
            actual: invoice.subtotal().to_string(),
            variance_pct: Some(variance_pct(open, invoice.subtotal())),
            line: None,
        });
    }

    out
}
