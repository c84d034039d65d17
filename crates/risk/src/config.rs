use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::scorer::RiskError;

/// Factor weights. Must be non-negative and sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub amount_anomaly: f64,
    pub vendor_behavior: f64,
    pub po_mismatch: f64,
    pub duplicate: f64,
    pub fraud_indicators: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            amount_anomaly: 0.30,
            vendor_behavior: 0.20,
            po_mismatch: 0.20,
            duplicate: 0.15,
            fraud_indicators: 0.15,
        }
    }
}

impl RiskWeights {
    fn as_array(&self) -> [f64; 5] {
        [
            self.amount_anomaly,
            self.vendor_behavior,
            self.po_mismatch,
            self.duplicate,
            self.fraud_indicators,
        ]
    }

    pub fn validate(&self) -> Result<(), RiskError> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(RiskError::InvalidWeights(
                "weights must be finite and non-negative".to_string(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(RiskError::InvalidWeights(format!(
                "weights must sum to 1.0, got {sum:.6}"
            )));
        }
        Ok(())
    }
}

/// Scoring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub weights: RiskWeights,
    /// Approval thresholds an amount may be tuned to sit just under.
    pub approval_thresholds: Vec<Decimal>,
    /// Width of the "just under" band as a fraction of the threshold.
    pub just_under_band: Decimal,
    /// Totals that are an exact multiple of this are "round".
    pub round_number_unit: Decimal,
    pub holidays: Vec<NaiveDate>,
    pub rush_terms: Vec<String>,
    pub duplicate_lookback_days: i64,
    /// Prior invoices closer than this (in days) count toward fuzzy duplicates.
    pub duplicate_amount_window_days: i64,
    /// Number of fraud flags that saturate the fraud factor.
    pub fraud_flag_cap: u32,
    /// Value used for history factors when no history is available.
    pub neutral_score: f64,
    /// Vendors with fewer lifetime invoices are treated as new.
    pub new_vendor_threshold: u32,
    /// Minimum trailing amounts for a z-score.
    pub min_history: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            approval_thresholds: [1_000, 5_000, 10_000, 25_000, 50_000]
                .into_iter()
                .map(Decimal::from)
                .collect(),
            just_under_band: Decimal::new(10, 2),
            round_number_unit: Decimal::from(1_000),
            holidays: Vec::new(),
            rush_terms: ["immediate", "due upon receipt", "urgent", "asap", "net 0"]
                .into_iter()
                .map(String::from)
                .collect(),
            duplicate_lookback_days: 90,
            duplicate_amount_window_days: 7,
            fraud_flag_cap: 3,
            neutral_score: 0.5,
            new_vendor_threshold: 3,
            min_history: 3,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), RiskError> {
        self.weights.validate()?;
        if self.fraud_flag_cap == 0 {
            return Err(RiskError::InvalidConfig("fraud_flag_cap must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.neutral_score) {
            return Err(RiskError::InvalidConfig(
                "neutral_score must be within [0, 1]".to_string(),
            ));
        }
        if self.round_number_unit <= Decimal::ZERO {
            return Err(RiskError::InvalidConfig(
                "round_number_unit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
