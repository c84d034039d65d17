use thiserror::Error;

use crate::router::ApprovalPlan;

/// Rule set loading and validation errors.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("invalid rule `{rule}`: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("invalid rule set: {0}")]
    InvalidRuleSet(String),

    #[error("failed to parse rule set: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read rule set: {0}")]
    Io(#[from] std::io::Error),

    #[error("rule book lock poisoned")]
    Poisoned,
}

impl RuleError {
    pub fn invalid_condition(msg: impl Into<String>) -> Self {
        Self::InvalidCondition(msg.into())
    }

    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RoutingError {
    /// No rule matched and the invoice is above the auto-approve floors. The
    /// invoice still gets an owner: the carried plan assigns the fallback approver.
    #[error("no applicable approval rule; routed to fallback approver `{}`", .fallback.roles().join(","))]
    NoApplicableRule { fallback: ApprovalPlan },
}
