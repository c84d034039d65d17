//! Approval routing: which roles must sign off, and by when.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use invoiceflow_core::ApprovalTaskId;
use invoiceflow_invoicing::{Invoice, TaskAssignment};
use invoiceflow_risk::RiskAssessment;

use crate::condition::RuleContext;
use crate::error::RoutingError;
use crate::rules::{ApproverSpec, RuleSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// One or more rules matched.
    Rules,
    /// No rule matched; low-risk single approver tier.
    LowRiskTier,
    /// No rule matched; approved without human review.
    AutoApprove,
    /// No rule matched above the floors.
    Fallback,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Rules => "rules",
            RouteKind::LowRiskTier => "low_risk_tier",
            RouteKind::AutoApprove => "auto_approve",
            RouteKind::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedApprover {
    pub role: String,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPlan {
    pub route: RouteKind,
    pub approvers: Vec<PlannedApprover>,
    /// `None` only for `AutoApprove`.
    pub deadline: Option<DateTime<Utc>>,
    pub matched_rules: Vec<String>,
    pub rule_set_version: String,
}

impl ApprovalPlan {
    fn single(route: RouteKind, role: &str, offset_hours: i64, now: DateTime<Utc>, version: &str) -> Self {
        let deadline = now + Duration::hours(offset_hours);
        Self {
            route,
            approvers: vec![PlannedApprover {
                role: role.to_string(),
                deadline,
            }],
            deadline: Some(deadline),
            matched_rules: Vec::new(),
            rule_set_version: version.to_string(),
        }
    }

    pub fn roles(&self) -> Vec<&str> {
        self.approvers.iter().map(|a| a.role.as_str()).collect()
    }

    pub fn requires_review(&self) -> bool {
        !self.approvers.is_empty()
    }

    /// One task per approver, each with a fresh task id.
    pub fn assignments(&self) -> Vec<TaskAssignment> {
        self.approvers
            .iter()
            .map(|a| TaskAssignment {
                task_id: ApprovalTaskId::new(),
                role: a.role.clone(),
                deadline: a.deadline,
            })
            .collect()
    }
}

/// Compute the approval plan for `invoice`.
///
/// Every enabled rule whose condition holds contributes its approvers; roles
/// are de-duplicated in first-seen order. All approvers share the tightest
/// deadline among the matched rules.
pub fn route(
    invoice: &Invoice,
    assessment: &RiskAssessment,
    rules: &RuleSet,
    now: DateTime<Utc>,
) -> Result<ApprovalPlan, RoutingError> {
    let ctx = RuleContext::new(invoice, assessment);

    let mut matched_rules = Vec::new();
    let mut roles: Vec<&str> = Vec::new();
    let mut min_offset: Option<i64> = None;

    for rule in rules.rules.iter().filter(|r| r.enabled) {
        if !rule.condition.evaluate(&ctx) {
            continue;
        }
        matched_rules.push(rule.name.clone());
        for approver in &rule.approvers {
            if !roles.contains(&approver.role.as_str()) {
                roles.push(approver.role.as_str());
            }
            min_offset = Some(match min_offset {
                Some(current) => current.min(approver.deadline_offset_hours),
                None => approver.deadline_offset_hours,
            });
        }
    }

    if let Some(offset) = min_offset {
        let deadline = now + Duration::hours(offset);
        debug!(
            invoice_id = %invoice.id_typed(),
            rules = ?matched_rules,
            approvers = ?roles,
            "approval rules matched"
        );
        return Ok(ApprovalPlan {
            route: RouteKind::Rules,
            approvers: roles
                .into_iter()
                .map(|role| PlannedApprover {
                    role: role.to_string(),
                    deadline,
                })
                .collect(),
            deadline: Some(deadline),
            matched_rules,
            rule_set_version: rules.version.clone(),
        });
    }

    let auto = &rules.auto_approve;
    let below_floors =
        auto.enabled && invoice.total() < auto.max_amount && assessment.score < auto.max_risk_score;
    if below_floors {
        return Ok(match &auto.approver {
            Some(role) => ApprovalPlan::single(
                RouteKind::LowRiskTier,
                role,
                auto.deadline_offset_hours,
                now,
                &rules.version,
            ),
            None => ApprovalPlan {
                route: RouteKind::AutoApprove,
                approvers: Vec::new(),
                deadline: None,
                matched_rules: Vec::new(),
                rule_set_version: rules.version.clone(),
            },
        });
    }

    let ApproverSpec {
        role,
        deadline_offset_hours,
    } = &rules.fallback_approver;
    Err(RoutingError::NoApplicableRule {
        fallback: ApprovalPlan::single(
            RouteKind::Fallback,
            role,
            *deadline_offset_hours,
            now,
            &rules.version,
        ),
    })
}

/// Replacement task one tier above `role`, or `None` at the top of the chain.
pub fn escalation_assignment(
    rules: &RuleSet,
    role: &str,
    now: DateTime<Utc>,
) -> Option<TaskAssignment> {
    rules.next_tier(role).map(|next| TaskAssignment {
        task_id: ApprovalTaskId::new(),
        role: next.to_string(),
        deadline: now + Duration::hours(rules.escalation_deadline_hours),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Attribute, CompareOp, Condition, Literal};
    use crate::rules::ApprovalRule;
    use chrono::{NaiveDate, TimeZone};
    use invoiceflow_core::{AssessmentId, Currency, InvoiceId, TenantId};
    use invoiceflow_invoicing::{ExtractedInvoice, InvoiceHeader, LineItem};
    use invoiceflow_purchasing::MatchStatus;
    use invoiceflow_risk::RiskLevel;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap()
    }

    fn invoice(total: Decimal, po: Option<&str>) -> Invoice {
        Invoice::from_extracted(ExtractedInvoice {
            invoice_id: InvoiceId::new(),
            tenant_id: TenantId::new(),
            received_at: test_time(),
            header: InvoiceHeader {
                vendor_ref: "ACME".to_string(),
                invoice_number: "A-1".to_string(),
                invoice_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                due_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
                currency: Currency::new("USD").unwrap(),
                subtotal: total,
                tax: Decimal::ZERO,
                total,
                line_items: vec![LineItem::new("Services", Decimal::ONE, total, total)],
                po_reference: po.map(str::to_string),
                payment_terms: None,
                vendor_tax_id: None,
                bank_account: None,
            },
        })
    }

    fn assessment(inv: &Invoice, score: f64, flags: &[&str]) -> RiskAssessment {
        RiskAssessment {
            id: AssessmentId::new(),
            invoice_id: inv.id_typed(),
            score,
            level: RiskLevel::from_score(score),
            match_status: if inv.po_reference().is_some() {
                MatchStatus::FullMatch
            } else {
                MatchStatus::Mismatch
            },
            factors: Vec::new(),
            recommendations: Vec::new(),
            vendor_flags: flags.iter().map(|f| f.to_string()).collect(),
            indicators: Vec::new(),
            history_available: true,
        }
    }

    #[test]
    fn high_value_without_po_requires_union_of_both_rules() {
        let inv = invoice(dec!(60000), None);
        let plan = route(&inv, &assessment(&inv, 0.45, &[]), &RuleSet::default(), test_time()).unwrap();

        assert_eq!(plan.route, RouteKind::Rules);
        assert_eq!(plan.matched_rules, vec!["High Value Review", "No PO"]);
        assert_eq!(plan.roles(), vec!["finance_director", "procurement_manager"]);
        // Tightest of 48h and 72h, applied to everyone.
        let expected = test_time() + Duration::hours(48);
        assert_eq!(plan.deadline, Some(expected));
        assert!(plan.approvers.iter().all(|a| a.deadline == expected));
    }

    #[test]
    fn overlapping_rules_do_not_duplicate_roles() {
        let inv = invoice(dec!(900), Some("PO-1"));
        let a = assessment(&inv, 0.82, &["bank_change"]);
        let plan = route(&inv, &a, &RuleSet::default(), test_time()).unwrap();
        assert_eq!(plan.matched_rules, vec!["High Risk", "Vendor Watchlist"]);
        assert_eq!(plan.roles(), vec!["compliance_officer"]);
    }

    #[test]
    fn low_risk_small_invoice_gets_single_tier() {
        let inv = invoice(dec!(11000), Some("PO-1"));
        let plan = route(&inv, &assessment(&inv, 0.08, &[]), &RuleSet::default(), test_time()).unwrap();
        assert_eq!(plan.route, RouteKind::LowRiskTier);
        assert_eq!(plan.roles(), vec!["ap_manager"]);
        assert_eq!(plan.assignments().len(), 1);
    }

    #[test]
    fn auto_approve_without_configured_tier() {
        let mut rules = RuleSet::default();
        rules.auto_approve.approver = None;
        let inv = invoice(dec!(120), Some("PO-1"));
        let plan = route(&inv, &assessment(&inv, 0.1, &[]), &rules, test_time()).unwrap();
        assert_eq!(plan.route, RouteKind::AutoApprove);
        assert!(!plan.requires_review());
        assert_eq!(plan.deadline, None);
    }

    #[test]
    fn unmatched_invoice_above_floor_fails_closed_to_fallback() {
        let inv = invoice(dec!(12000), Some("PO-1"));
        let err = route(&inv, &assessment(&inv, 0.45, &[]), &RuleSet::default(), test_time())
            .unwrap_err();
        let RoutingError::NoApplicableRule { fallback } = err;
        assert_eq!(fallback.route, RouteKind::Fallback);
        assert_eq!(fallback.roles(), vec!["ap_manager"]);
    }

    #[test]
    fn disabled_rules_are_ignored() {
        let mut rules = RuleSet::default();
        for rule in &mut rules.rules {
            rule.enabled = false;
        }
        let inv = invoice(dec!(60000), None);
        assert!(route(&inv, &assessment(&inv, 0.45, &[]), &rules, test_time()).is_err());
    }

    #[test]
    fn rules_apply_in_configured_order() {
        let mut rules = RuleSet::default();
        rules.rules.insert(
            0,
            ApprovalRule::new(
                "Foreign Currency",
                Condition::Compare {
                    attr: Attribute::Currency,
                    op: CompareOp::Ne,
                    value: Literal::Text("EUR".to_string()),
                },
                vec![ApproverSpec::new("treasury", 96)],
            ),
        );
        let inv = invoice(dec!(70000), Some("PO-1"));
        let plan = route(&inv, &assessment(&inv, 0.2, &[]), &rules, test_time()).unwrap();
        assert_eq!(plan.roles(), vec!["treasury", "finance_director"]);
    }

    #[test]
    fn escalation_uses_chain() {
        let rules = RuleSet::default();
        let next = escalation_assignment(&rules, "finance_manager", test_time()).unwrap();
        assert_eq!(next.role, "finance_director");
        assert_eq!(next.deadline, test_time() + Duration::hours(24));
        assert!(escalation_assignment(&rules, "cfo", test_time()).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn every_invoice_gets_an_owner_or_is_below_floors(
            cents in 1i64..20_000_000,
            score in 0.0f64..1.0,
            has_po in any::<bool>(),
        ) {
            let inv = invoice(Decimal::new(cents, 2), has_po.then_some("PO-1"));
            let rules = RuleSet::default();
            match route(&inv, &assessment(&inv, score, &[]), &rules, test_time()) {
                Ok(plan) if plan.route == RouteKind::AutoApprove => {
                    prop_assert!(inv.total() < rules.auto_approve.max_amount);
                    prop_assert!(score < rules.auto_approve.max_risk_score);
                }
                Ok(plan) => prop_assert!(!plan.approvers.is_empty()),
                Err(RoutingError::NoApplicableRule { fallback }) => {
                    prop_assert!(!fallback.approvers.is_empty());
                }
            }
        }
    }
}
