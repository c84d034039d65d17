//! Rule set model and the built-in default rules.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::condition::{Attribute, CompareOp, Condition, Literal};
use crate::error::RuleError;

/// A required approver role and how long it has to act.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverSpec {
    pub role: String,
    pub deadline_offset_hours: i64,
}

impl ApproverSpec {
    pub fn new(role: impl Into<String>, deadline_offset_hours: i64) -> Self {
        Self {
            role: role.into(),
            deadline_offset_hours,
        }
    }

    fn validate(&self, rule: &str) -> Result<(), RuleError> {
        if self.role.trim().is_empty() {
            return Err(RuleError::invalid_rule(rule, "approver role must not be empty"));
        }
        if self.deadline_offset_hours <= 0 {
            return Err(RuleError::invalid_rule(
                rule,
                format!("deadline offset for `{}` must be positive", self.role),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub name: String,
    pub condition: Condition,
    /// Required approvers, in order.
    pub approvers: Vec<ApproverSpec>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl ApprovalRule {
    pub fn new(name: impl Into<String>, condition: Condition, approvers: Vec<ApproverSpec>) -> Self {
        Self {
            name: name.into(),
            condition,
            approvers,
            enabled: true,
        }
    }

    fn validate(&self) -> Result<(), RuleError> {
        if self.name.trim().is_empty() {
            return Err(RuleError::InvalidRuleSet("rule name must not be empty".to_string()));
        }
        if self.approvers.is_empty() {
            return Err(RuleError::invalid_rule(&self.name, "at least one approver is required"));
        }
        self.condition
            .validate()
            .map_err(|e| RuleError::invalid_rule(&self.name, e.to_string()))?;
        self.approvers.iter().try_for_each(|a| a.validate(&self.name))
    }
}

/// Low-risk path taken when no rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoApprovePolicy {
    pub enabled: bool,
    /// Invoice total must be strictly below this.
    pub max_amount: Decimal,
    /// Risk score must be strictly below this.
    pub max_risk_score: f64,
    /// Single approver tier for low-risk invoices. `None` approves without review.
    pub approver: Option<String>,
    pub deadline_offset_hours: i64,
}

impl Default for AutoApprovePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_amount: Decimal::from(25_000),
            max_risk_score: 0.3,
            approver: Some("ap_manager".to_string()),
            deadline_offset_hours: 48,
        }
    }
}

/// Versioned, immutable set of routing rules. Evaluated in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    pub rules: Vec<ApprovalRule>,
    #[serde(default)]
    pub auto_approve: AutoApprovePolicy,
    pub fallback_approver: ApproverSpec,
    /// Approver tiers from lowest to highest, used by `escalate`.
    #[serde(default)]
    pub escalation_chain: Vec<String>,
    #[serde(default = "default_escalation_deadline_hours")]
    pub escalation_deadline_hours: i64,
}

fn default_escalation_deadline_hours() -> i64 {
    24
}

impl RuleSet {
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let rules: RuleSet = serde_json::from_str(json)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        if self.version.trim().is_empty() {
            return Err(RuleError::InvalidRuleSet("version must not be empty".to_string()));
        }
        let mut names = HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !names.insert(rule.name.as_str()) {
                return Err(RuleError::invalid_rule(&rule.name, "duplicate rule name"));
            }
        }
        self.fallback_approver.validate("fallback")?;

        let auto = &self.auto_approve;
        if auto.enabled {
            if !(auto.max_risk_score.is_finite() && (0.0..=1.0).contains(&auto.max_risk_score)) {
                return Err(RuleError::InvalidRuleSet(
                    "auto_approve.max_risk_score must be within [0, 1]".to_string(),
                ));
            }
            if auto.approver.is_some() && auto.deadline_offset_hours <= 0 {
                return Err(RuleError::InvalidRuleSet(
                    "auto_approve.deadline_offset_hours must be positive".to_string(),
                ));
            }
        }

        let mut tiers = HashSet::new();
        if self.escalation_chain.iter().any(|t| !tiers.insert(t.as_str())) {
            return Err(RuleError::InvalidRuleSet(
                "escalation chain contains a tier twice".to_string(),
            ));
        }
        if self.escalation_deadline_hours <= 0 {
            return Err(RuleError::InvalidRuleSet(
                "escalation_deadline_hours must be positive".to_string(),
            ));
        }
        if !self.escalation_chain.is_empty() {
            if let Some(role) = self.assignable_roles().find(|r| !tiers.contains(r)) {
                return Err(RuleError::InvalidRuleSet(format!(
                    "approver role `{role}` is missing from the escalation chain"
                )));
            }
        }
        Ok(())
    }

    /// Every role a task can be assigned to on first routing.
    fn assignable_roles(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .flat_map(|r| r.approvers.iter().map(|a| a.role.as_str()))
            .chain(std::iter::once(self.fallback_approver.role.as_str()))
            .chain(self.auto_approve.approver.as_deref())
    }

    pub fn rule(&self, name: &str) -> Option<&ApprovalRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Next tier above `role` in the escalation chain. Neither the top tier nor
    /// a role outside the chain has anywhere to go.
    pub fn next_tier(&self, role: &str) -> Option<&str> {
        let idx = self.escalation_chain.iter().position(|t| t == role)?;
        self.escalation_chain.get(idx + 1).map(String::as_str)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        let amount_at_least = |v: i64| Condition::Compare {
            attr: Attribute::Amount,
            op: CompareOp::Gte,
            value: Literal::Number(Decimal::from(v)),
        };

        Self {
            version: "builtin-1".to_string(),
            rules: vec![
                ApprovalRule::new(
                    "High Value Review",
                    amount_at_least(50_000),
                    vec![ApproverSpec::new("finance_director", 48)],
                ),
                ApprovalRule::new(
                    "Mid Value Review",
                    Condition::All(vec![
                        amount_at_least(25_000),
                        Condition::Compare {
                            attr: Attribute::Amount,
                            op: CompareOp::Lt,
                            value: Literal::Number(Decimal::from(50_000)),
                        },
                    ]),
                    vec![ApproverSpec::new("finance_manager", 48)],
                ),
                ApprovalRule::new(
                    "No PO",
                    Condition::Compare {
                        attr: Attribute::HasPoReference,
                        op: CompareOp::Eq,
                        value: Literal::Bool(false),
                    },
                    vec![ApproverSpec::new("procurement_manager", 72)],
                ),
                ApprovalRule::new(
                    "High Risk",
                    Condition::Compare {
                        attr: Attribute::RiskScore,
                        op: CompareOp::Gte,
                        value: Literal::Number(Decimal::new(7, 1)),
                    },
                    vec![ApproverSpec::new("compliance_officer", 24)],
                ),
                ApprovalRule::new(
                    "Vendor Watchlist",
                    Condition::Any(vec![
                        Condition::HasVendorFlag("sanctions_review".to_string()),
                        Condition::HasVendorFlag("bank_change".to_string()),
                    ]),
                    vec![ApproverSpec::new("compliance_officer", 24)],
                ),
            ],
            auto_approve: AutoApprovePolicy::default(),
            fallback_approver: ApproverSpec::new("ap_manager", 48),
            escalation_chain: [
                "ap_clerk",
                "procurement_manager",
                "ap_manager",
                "finance_manager",
                "compliance_officer",
                "finance_director",
                "cfo",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            escalation_deadline_hours: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_set_is_valid() {
        assert!(RuleSet::default().validate().is_ok());
    }

    #[test]
    fn bundled_rule_file_matches_builtin_defaults() {
        let json = include_str!("../../../config/approval_rules.json");
        let parsed = RuleSet::from_json(json).unwrap();
        assert_eq!(parsed.rules, RuleSet::default().rules);
        assert_eq!(parsed.escalation_chain, RuleSet::default().escalation_chain);
    }

    #[test]
    fn escalation_walks_the_chain() {
        let rules = RuleSet::default();
        assert_eq!(rules.next_tier("ap_manager"), Some("finance_manager"));
        assert_eq!(rules.next_tier("procurement_manager"), Some("ap_manager"));
        assert_eq!(rules.next_tier("compliance_officer"), Some("finance_director"));
        assert_eq!(rules.next_tier("cfo"), None);
    }

    #[test]
    fn roles_outside_the_chain_do_not_escalate() {
        let rules = RuleSet::default();
        assert_eq!(rules.next_tier("treasury"), None);
    }

    #[test]
    fn rejects_approver_roles_missing_from_chain() {
        let mut rules = RuleSet::default();
        rules.escalation_chain.retain(|t| t != "procurement_manager");
        let err = rules.validate().unwrap_err();
        assert!(err.to_string().contains("procurement_manager"));

        let mut rules = RuleSet::default();
        rules.fallback_approver = ApproverSpec::new("office_admin", 48);
        assert!(rules.validate().is_err());
    }

    #[test]
    fn empty_chain_skips_the_membership_check() {
        let rules = RuleSet {
            escalation_chain: Vec::new(),
            ..RuleSet::default()
        };
        assert!(rules.validate().is_ok());
        assert_eq!(rules.next_tier("ap_manager"), None);
    }

    #[test]
    fn rejects_duplicate_rule_names() {
        let mut rules = RuleSet::default();
        let dup = rules.rules[0].clone();
        rules.rules.push(dup);
        assert!(matches!(rules.validate(), Err(RuleError::InvalidRule { .. })));
    }

    #[test]
    fn rejects_rule_without_approvers() {
        let mut rules = RuleSet::default();
        rules.rules[0].approvers.clear();
        assert!(rules.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_deadlines() {
        let mut rules = RuleSet::default();
        rules.rules[1].approvers[0].deadline_offset_hours = 0;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn unparseable_json_is_a_parse_error() {
        assert!(matches!(RuleSet::from_json("{ nope"), Err(RuleError::Parse(_))));
    }
}
