//! Individual risk signals. Every function returns a value in `[0, 1]` plus a
//! human-readable reason, and is a pure function of its inputs.

use chrono::{Datelike, Weekday};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use invoiceflow_invoicing::Invoice;
use invoiceflow_purchasing::MatchResult;

use crate::config::RiskConfig;
use crate::fingerprint::{content_hash, normalize_invoice_number};
use crate::history::VendorHistory;

/// Z-score that saturates the amount factor.
const Z_SATURATION: f64 = 3.0;

/// Weight of the frequency deviation inside the vendor factor.
const FREQUENCY_SHARE: f64 = 0.6;
const NEW_VENDOR_SHARE: f64 = 0.4;

const SAME_NUMBER_SIMILARITY: f64 = 0.95;
const FUZZY_DUPLICATE_CEILING: f64 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Signal {
    pub value: f64,
    pub reason: String,
    /// Individual triggers, used for recommendations.
    pub flags: Vec<String>,
}

impl Signal {
    fn new(value: f64, reason: impl Into<String>) -> Self {
        Self {
            value: clamp_unit(value),
            reason: reason.into(),
            flags: Vec::new(),
        }
    }

    fn neutral(config: &RiskConfig, what: &str) -> Self {
        Self::new(
            config.neutral_score,
            format!("no vendor history available; {what} treated as uncertain"),
        )
    }
}

pub(crate) fn amount_anomaly(
    invoice: &Invoice,
    history: Option<&VendorHistory>,
    config: &RiskConfig,
) -> Signal {
    let Some(history) = history else {
        return Signal::neutral(config, "amount anomaly");
    };
    let amounts: Vec<f64> = history
        .trailing_amounts
        .iter()
        .filter_map(|a| a.to_f64())
        .collect();
    if amounts.len() < config.min_history {
        return Signal::new(
            config.neutral_score,
            format!(
                "only {} prior invoice amount(s) on record; amount anomaly treated as uncertain",
                amounts.len()
            ),
        );
    }

    let total = invoice.total().to_f64().unwrap_or(0.0);
    let mean = mean(&amounts);
    let std = stddev_sample(&amounts, mean);

    if std <= f64::EPSILON {
        if (total - mean).abs() > 0.0 {
            return Signal::new(
                1.0,
                format!("total {total:.2} deviates from a constant baseline of {mean:.2}"),
            );
        }
        return Signal::new(0.0, format!("total matches constant baseline of {mean:.2}"));
    }

    let z = (total - mean).abs() / std;
    Signal::new(
        z / Z_SATURATION,
        format!("total {total:.2} vs trailing mean={mean:.2}, std={std:.2}, z={z:.2}"),
    )
}

pub(crate) fn vendor_behavior(history: Option<&VendorHistory>, config: &RiskConfig) -> Signal {
    let Some(history) = history else {
        return Signal::neutral(config, "vendor behaviour");
    };

    let observed = f64::from(history.invoices_in_window);
    let rate = if history.historical_rate.is_finite() {
        history.historical_rate.max(0.0)
    } else {
        0.0
    };
    let deviation = clamp_unit((observed - rate).abs() / rate.max(1.0));
    let is_new = history.total_invoices < config.new_vendor_threshold;
    let new_vendor = if is_new { 1.0 } else { 0.0 };

    let mut signal = Signal::new(
        FREQUENCY_SHARE * deviation + NEW_VENDOR_SHARE * new_vendor,
        format!(
            "{observed} invoice(s) in window vs historical rate {rate:.2} (deviation {deviation:.2}){}",
            if is_new { "; new vendor" } else { "" }
        ),
    );
    if is_new {
        signal.flags.push("new_vendor".to_string());
    }
    if deviation >= 0.5 {
        signal.flags.push("frequency_spike".to_string());
    }
    signal
}

pub(crate) fn po_mismatch(match_result: &MatchResult) -> Signal {
    let confidence = clamp_unit(match_result.confidence);
    let reason = match &match_result.po_number {
        None => "no purchase order referenced".to_string(),
        Some(po) => format!(
            "match against {po} is {} (confidence {confidence:.2})",
            match_result.status.as_str()
        ),
    };
    Signal::new(1.0 - confidence, reason)
}

pub(crate) fn duplicate(
    invoice: &Invoice,
    history: Option<&VendorHistory>,
    config: &RiskConfig,
) -> Signal {
    let Some(history) = history else {
        return Signal::neutral(config, "duplicate check");
    };

    let hash = content_hash(invoice);
    let number = normalize_invoice_number(invoice.invoice_number());
    let date = invoice.invoice_date();

    let mut best = Signal::new(0.0, "no similar invoices in lookback window");
    for prior in &history.recent_invoices {
        let gap = (date - prior.invoice_date).num_days().abs();
        if gap > config.duplicate_lookback_days {
            continue;
        }

        let (value, reason) = if prior.content_hash == hash {
            (1.0, format!("identical to prior invoice {}", prior.invoice_number))
        } else if !number.is_empty() && normalize_invoice_number(&prior.invoice_number) == number {
            (
                SAME_NUMBER_SIMILARITY,
                format!("invoice number reused from {}", prior.invoice_date),
            )
        } else if gap <= config.duplicate_amount_window_days {
            let similarity = amount_similarity(invoice.total(), prior.total);
            if similarity <= 0.0 {
                continue;
            }
            (
                FUZZY_DUPLICATE_CEILING * similarity,
                format!(
                    "similar amount {} to prior invoice {} within {} day(s)",
                    prior.total,
                    prior.invoice_number,
                    gap
                ),
            )
        } else {
            continue;
        };

        if value > best.value {
            best = Signal::new(value, reason);
        }
    }
    if best.value >= 0.5 {
        best.flags.push("possible_duplicate".to_string());
    }
    best
}

pub(crate) fn fraud_indicators(invoice: &Invoice, config: &RiskConfig) -> Signal {
    let total = invoice.total();
    let mut flags = Vec::new();

    if total > Decimal::ZERO
        && !config.round_number_unit.is_zero()
        && (total % config.round_number_unit).is_zero()
    {
        flags.push("round_number_total".to_string());
    }

    let received = invoice.received_at().date_naive();
    if matches!(received.weekday(), Weekday::Sat | Weekday::Sun) {
        flags.push("weekend_submission".to_string());
    } else if config.holidays.contains(&received) {
        flags.push("holiday_submission".to_string());
    }

    let just_under = config.approval_thresholds.iter().find(|threshold| {
        let floor = **threshold * (Decimal::ONE - config.just_under_band);
        total >= floor && total < **threshold
    });
    if let Some(threshold) = just_under {
        flags.push(format!("just_under_threshold_{}", threshold.normalize()));
    }

    if let Some(terms) = invoice.payment_terms() {
        let terms = terms.to_ascii_lowercase();
        if config
            .rush_terms
            .iter()
            .any(|rush| terms.contains(&rush.to_ascii_lowercase()))
        {
            flags.push("rush_payment_terms".to_string());
        }
    }

    let cap = f64::from(config.fraud_flag_cap.max(1));
    let reason = if flags.is_empty() {
        "no fraud indicators".to_string()
    } else {
        format!("{} indicator(s): {}", flags.len(), flags.join(", "))
    };
    let mut signal = Signal::new(flags.len() as f64 / cap, reason);
    signal.flags = flags;
    signal
}

/// 1.0 within 1%, 0.8 within 10%, 0.5 within 20%, otherwise 0.
fn amount_similarity(a: Decimal, b: Decimal) -> f64 {
    let larger = a.abs().max(b.abs());
    if larger.is_zero() {
        return 1.0;
    }
    let diff = a.checked_sub(b).map_or(Decimal::ONE, |d| d.abs() / larger);
    if diff <= Decimal::new(1, 2) {
        1.0
    } else if diff <= Decimal::new(10, 2) {
        0.8
    } else if diff <= Decimal::new(20, 2) {
        0.5
    } else {
        0.0
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / (xs.len() as f64)
}

/// Sample standard deviation (n-1), deterministic.
fn stddev_sample(xs: &[f64], mean: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let var = xs
        .iter()
        .map(|x| {
            let d = x - mean;
            d * d
        })
        .sum::<f64>()
        / ((xs.len() - 1) as f64);
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::PriorInvoice;
    use chrono::{NaiveDate, TimeZone, Utc};
    use invoiceflow_core::{Currency, InvoiceId, TenantId};
    use invoiceflow_invoicing::{ExtractedInvoice, InvoiceHeader, LineItem};
    use rust_decimal_macros::dec;

    fn invoice_with(total: Decimal, received_day: u32, terms: Option<&str>) -> Invoice {
        let header = InvoiceHeader {
            vendor_ref: "VEND-1".to_string(),
            invoice_number: "INV-100".to_string(),
            invoice_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap_or_default(),
            due_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap_or_default(),
            currency: Currency::new("USD").unwrap(),
            subtotal: total,
            tax: Decimal::ZERO,
            total,
            line_items: vec![LineItem::new("Widgets", Decimal::ONE, total, total)],
            po_reference: None,
            payment_terms: terms.map(str::to_string),
            vendor_tax_id: None,
            bank_account: None,
        };
        Invoice::from_extracted(ExtractedInvoice {
            invoice_id: InvoiceId::new(),
            tenant_id: TenantId::new(),
            received_at: Utc.with_ymd_and_hms(2026, 3, received_day, 10, 0, 0).unwrap(),
            header,
        })
    }

    fn history(amounts: &[Decimal]) -> VendorHistory {
        VendorHistory {
            vendor_ref: "VEND-1".to_string(),
            trailing_amounts: amounts.to_vec(),
            invoices_in_window: 4,
            historical_rate: 4.0,
            total_invoices: 50,
            risk_flags: Vec::new(),
            recent_invoices: Vec::new(),
        }
    }

    #[test]
    fn amount_anomaly_saturates_past_three_sigma() {
        let h = history(&[dec!(100), dec!(110), dec!(90), dec!(100), dec!(105), dec!(95)]);
        let typical = amount_anomaly(&invoice_with(dec!(101), 3, None), Some(&h), &RiskConfig::default());
        assert!(typical.value < 0.1, "{typical:?}");

        let outlier = amount_anomaly(&invoice_with(dec!(5000), 3, None), Some(&h), &RiskConfig::default());
        assert_eq!(outlier.value, 1.0);
    }

    #[test]
    fn amount_anomaly_with_constant_baseline() {
        let h = history(&[dec!(250), dec!(250), dec!(250)]);
        let cfg = RiskConfig::default();
        assert_eq!(amount_anomaly(&invoice_with(dec!(250), 3, None), Some(&h), &cfg).value, 0.0);
        assert_eq!(amount_anomaly(&invoice_with(dec!(251), 3, None), Some(&h), &cfg).value, 1.0);
    }

    #[test]
    fn missing_history_is_neutral() {
        let cfg = RiskConfig::default();
        let inv = invoice_with(dec!(100), 3, None);
        for signal in [
            amount_anomaly(&inv, None, &cfg),
            vendor_behavior(None, &cfg),
            duplicate(&inv, None, &cfg),
        ] {
            assert_eq!(signal.value, 0.5);
            assert!(signal.reason.contains("no vendor history"));
        }
    }

    #[test]
    fn new_vendor_contributes_to_vendor_behaviour() {
        let cfg = RiskConfig::default();
        let steady = vendor_behavior(Some(&history(&[])), &cfg);
        assert_eq!(steady.value, 0.0);

        let fresh = VendorHistory::first_time("VEND-9");
        let signal = vendor_behavior(Some(&fresh), &cfg);
        assert!((signal.value - 0.4).abs() < 1e-12);
        assert!(signal.flags.contains(&"new_vendor".to_string()));
    }

    #[test]
    fn duplicate_detection_prefers_strongest_match() {
        let cfg = RiskConfig::default();
        let inv = invoice_with(dec!(1234.50), 3, None);
        let mut h = history(&[]);
        h.recent_invoices.push(PriorInvoice {
            invoice_number: "OTHER-1".to_string(),
            invoice_date: NaiveDate::from_ymd_opt(2026, 2, 28).unwrap_or_default(),
            total: dec!(1234.00),
            content_hash: "x".to_string(),
        });
        let fuzzy = duplicate(&inv, Some(&h), &cfg);
        assert!((fuzzy.value - 0.7).abs() < 1e-12);

        h.recent_invoices.push(PriorInvoice {
            invoice_number: "inv 100".to_string(),
            invoice_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap_or_default(),
            total: dec!(99),
            content_hash: "y".to_string(),
        });
        assert_eq!(duplicate(&inv, Some(&h), &cfg).value, 0.95);

        h.recent_invoices.push(PriorInvoice {
            invoice_number: "INV-100".to_string(),
            invoice_date: inv.invoice_date(),
            total: inv.total(),
            content_hash: content_hash(&inv),
        });
        let exact = duplicate(&inv, Some(&h), &cfg);
        assert_eq!(exact.value, 1.0);
        assert!(exact.flags.contains(&"possible_duplicate".to_string()));
    }

    #[test]
    fn duplicates_outside_lookback_are_ignored() {
        let cfg = RiskConfig::default();
        let inv = invoice_with(dec!(500), 3, None);
        let mut h = history(&[]);
        h.recent_invoices.push(PriorInvoice {
            invoice_number: "INV-100".to_string(),
            invoice_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap_or_default(),
            total: dec!(500),
            content_hash: "old".to_string(),
        });
        assert_eq!(duplicate(&inv, Some(&h), &cfg).value, 0.0);
    }

    #[test]
    fn fraud_flags_are_counted_and_capped() {
        let cfg = RiskConfig::default();
        // 2026-03-03 is a Tuesday.
        let clean = fraud_indicators(&invoice_with(dec!(1234.56), 3, Some("Net 30")), &cfg);
        assert_eq!(clean.value, 0.0);

        // 2026-03-07 is a Saturday; 9,500 sits within 10% under 10,000.
        let sneaky = fraud_indicators(&invoice_with(dec!(9500), 7, Some("Due upon receipt")), &cfg);
        assert_eq!(
            sneaky.flags,
            vec![
                "weekend_submission".to_string(),
                "just_under_threshold_10000".to_string(),
                "rush_payment_terms".to_string(),
            ]
        );
        assert_eq!(sneaky.value, 1.0);

        let round = fraud_indicators(&invoice_with(dec!(11000), 3, None), &cfg);
        assert_eq!(round.flags, vec!["round_number_total".to_string()]);
        assert!((round.value - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn holiday_submission_is_flagged() {
        let cfg = RiskConfig {
            holidays: vec![NaiveDate::from_ymd_opt(2026, 3, 3).unwrap_or_default()],
            ..RiskConfig::default()
        };
        let signal = fraud_indicators(&invoice_with(dec!(1234.56), 3, None), &cfg);
        assert_eq!(signal.flags, vec!["holiday_submission".to_string()]);
    }
}
