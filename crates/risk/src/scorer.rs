//! Weighted multi-factor risk scoring.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use invoiceflow_core::{AssessmentId, InvoiceId};
use invoiceflow_invoicing::Invoice;
use invoiceflow_purchasing::{MatchResult, MatchStatus};

use crate::config::RiskConfig;
use crate::factors::{self, Signal};
use crate::history::VendorHistory;

pub const AMOUNT_ANOMALY: &str = "amount_anomaly";
pub const VENDOR_BEHAVIOR: &str = "vendor_behavior";
pub const PO_MISMATCH: &str = "po_mismatch";
pub const DUPLICATE: &str = "duplicate";
pub const FRAUD_INDICATORS: &str = "fraud_indicators";

/// Factor values at or above this count as triggered.
const TRIGGER_LEVEL: f64 = 0.5;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("invalid risk weights: {0}")]
    InvalidWeights(String),

    #[error("invalid risk configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid scoring input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            RiskLevel::Low
        } else if score < 0.7 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One weighted signal. `contribution = weight * value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub weight: f64,
    pub value: f64,
    pub contribution: f64,
    pub reason: String,
}

/// Immutable scoring result for one invoice version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: AssessmentId,
    pub invoice_id: InvoiceId,
    pub score: f64,
    pub level: RiskLevel,
    /// Status of the match result the score was computed against.
    pub match_status: MatchStatus,
    /// Always in the same fixed order.
    pub factors: Vec<RiskFactor>,
    pub recommendations: Vec<String>,
    /// Vendor watch-list flags plus behaviour flags raised during scoring.
    pub vendor_flags: Vec<String>,
    /// Every indicator raised by any factor.
    pub indicators: Vec<String>,
    pub history_available: bool,
}

impl RiskAssessment {
    pub fn factor(&self, name: &str) -> Option<&RiskFactor> {
        self.factors.iter().find(|f| f.name == name)
    }

    pub fn has_vendor_flag(&self, flag: &str) -> bool {
        self.vendor_flags.iter().any(|f| f.eq_ignore_ascii_case(flag))
    }

    /// Equality ignoring the assessment id; scores compare bit-for-bit.
    pub fn same_outcome(&self, other: &RiskAssessment) -> bool {
        self.invoice_id == other.invoice_id
            && self.score.to_bits() == other.score.to_bits()
            && self.level == other.level
            && self.match_status == other.match_status
            && self.factors.len() == other.factors.len()
            && self
                .factors
                .iter()
                .zip(&other.factors)
                .all(|(a, b)| {
                    a.name == b.name
                        && a.contribution.to_bits() == b.contribution.to_bits()
                        && a.reason == b.reason
                })
            && self.recommendations == other.recommendations
            && self.vendor_flags == other.vendor_flags
            && self.indicators == other.indicators
            && self.history_available == other.history_available
    }
}

/// Deterministic risk scorer. Holds no mutable state.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    config: RiskConfig,
}

impl RiskScorer {
    pub fn new(config: RiskConfig) -> Result<Self, RiskError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Score `invoice` given its match result and an optional vendor history
    /// snapshot. Missing history is not an error.
    pub fn score(
        &self,
        invoice: &Invoice,
        match_result: &MatchResult,
        history: Option<&VendorHistory>,
    ) -> Result<RiskAssessment, RiskError> {
        if match_result.invoice_id != invoice.id_typed() {
            return Err(RiskError::InvalidInput(format!(
                "match result {} belongs to invoice {}, not {}",
                match_result.id,
                match_result.invoice_id,
                invoice.id_typed()
            )));
        }
        if !match_result.confidence.is_finite() {
            return Err(RiskError::InvalidInput(
                "match confidence is not a finite number".to_string(),
            ));
        }
        if let Some(h) = history {
            if !h.vendor_ref.trim().eq_ignore_ascii_case(invoice.vendor_ref().trim()) {
                return Err(RiskError::InvalidInput(format!(
                    "vendor history for {} supplied for vendor {}",
                    h.vendor_ref,
                    invoice.vendor_ref()
                )));
            }
        }

        let cfg = &self.config;
        let w = &cfg.weights;
        let signals: [(&str, f64, Signal); 5] = [
            (AMOUNT_ANOMALY, w.amount_anomaly, factors::amount_anomaly(invoice, history, cfg)),
            (VENDOR_BEHAVIOR, w.vendor_behavior, factors::vendor_behavior(history, cfg)),
            (PO_MISMATCH, w.po_mismatch, factors::po_mismatch(match_result)),
            (DUPLICATE, w.duplicate, factors::duplicate(invoice, history, cfg)),
            (FRAUD_INDICATORS, w.fraud_indicators, factors::fraud_indicators(invoice, cfg)),
        ];

        let mut factors_out = Vec::with_capacity(signals.len());
        let mut indicators = Vec::new();
        let mut vendor_flags: Vec<String> = history
            .map(|h| h.risk_flags.clone())
            .unwrap_or_default();
        let mut score = 0.0;

        for (name, weight, signal) in signals {
            let contribution = weight * signal.value;
            score += contribution;
            if name == VENDOR_BEHAVIOR {
                vendor_flags.extend(signal.flags.iter().cloned());
            }
            indicators.extend(signal.flags);
            factors_out.push(RiskFactor {
                name: name.to_string(),
                weight,
                value: signal.value,
                contribution,
                reason: signal.reason,
            });
        }
        dedup_in_order(&mut vendor_flags);

        let score = score.clamp(0.0, 1.0);
        let level = RiskLevel::from_score(score);
        let recommendations = recommendations(&factors_out, match_result, history.is_some(), level);

        debug!(
            invoice_id = %invoice.id_typed(),
            score,
            level = level.as_str(),
            history = history.is_some(),
            "risk scored"
        );

        Ok(RiskAssessment {
            id: AssessmentId::new(),
            invoice_id: invoice.id_typed(),
            score,
            level,
            match_status: match_result.status,
            factors: factors_out,
            recommendations,
            vendor_flags,
            indicators,
            history_available: history.is_some(),
        })
    }
}

fn recommendations(
    factors: &[RiskFactor],
    match_result: &MatchResult,
    history_available: bool,
    level: RiskLevel,
) -> Vec<String> {
    let mut out = Vec::new();
    if !history_available {
        out.push("Vendor history unavailable; verify vendor details manually".to_string());
    }
    for factor in factors.iter().filter(|f| f.value >= TRIGGER_LEVEL) {
        let text = match factor.name.as_str() {
            AMOUNT_ANOMALY if history_available => {
                "Confirm the amount with the vendor; it deviates from their usual billing"
            }
            VENDOR_BEHAVIOR if history_available => {
                "Review recent vendor activity for unusual invoicing frequency"
            }
            PO_MISMATCH if !match_result.has_po() => {
                "Obtain a purchase order or documented non-PO justification"
            }
            PO_MISMATCH => "Reconcile the variances against the purchase order before approval",
            DUPLICATE if history_available => {
                "Check prior payments to this vendor for a duplicate"
            }
            FRAUD_INDICATORS => {
                "Confirm bank details and payment terms with the vendor through a known contact"
            }
            _ => continue,
        };
        out.push(text.to_string());
    }
    if level == RiskLevel::High {
        out.push("Escalate to senior finance review".to_string());
    }
    out
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
