//! Rule condition language.
//!
//! Conditions are plain data: a boolean expression tree over a fixed set of
//! invoice/risk attributes. There is no way to express arbitrary code, so a
//! rule file can be reviewed, versioned and hot-reloaded safely.
//!
//! JSON shape (externally tagged, snake_case):
//!
//! ```json
//! { "all": [
//!     { "compare": { "attr": "amount", "op": "gte", "value": 50000 } },
//!     { "not": { "has_vendor_flag": "preferred" } }
//! ] }
//! ```

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};

use invoiceflow_invoicing::Invoice;
use invoiceflow_purchasing::MatchStatus;
use invoiceflow_risk::RiskAssessment;

use crate::error::RuleError;

/// Attributes a condition may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// Invoice total.
    Amount,
    Currency,
    RiskScore,
    /// `low`, `medium` or `high`.
    RiskLevel,
    /// `full_match`, `partial_match` or `mismatch`.
    MatchStatus,
    HasPoReference,
}

impl Attribute {
    fn kind(&self) -> ValueKind {
        match self {
            Attribute::Amount | Attribute::RiskScore => ValueKind::Number,
            Attribute::Currency | Attribute::RiskLevel | Attribute::MatchStatus => ValueKind::Text,
            Attribute::HasPoReference => ValueKind::Bool,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Amount => "amount",
            Attribute::Currency => "currency",
            Attribute::RiskScore => "risk_score",
            Attribute::RiskLevel => "risk_level",
            Attribute::MatchStatus => "match_status",
            Attribute::HasPoReference => "has_po_reference",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    fn is_ordering(&self) -> bool {
        !matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

/// Literal operand. Numbers are parsed as exact decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Number(Decimal),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Number,
    Text,
    Bool,
}

impl Literal {
    fn kind(&self) -> ValueKind {
        match self {
            Literal::Bool(_) => ValueKind::Bool,
            Literal::Number(_) => ValueKind::Number,
            Literal::Text(_) => ValueKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Matches every invoice.
    Always,
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
    Compare {
        attr: Attribute,
        op: CompareOp,
        value: Literal,
    },
    In {
        attr: Attribute,
        values: Vec<Literal>,
    },
    /// Vendor carries the flag (case-insensitive).
    HasVendorFlag(String),
}

/// Attribute values for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleContext {
    pub amount: Decimal,
    pub currency: String,
    pub risk_score: Decimal,
    pub risk_level: String,
    pub match_status: MatchStatus,
    pub has_po_reference: bool,
    pub vendor_flags: Vec<String>,
}

impl RuleContext {
    pub fn new(invoice: &Invoice, assessment: &RiskAssessment) -> Self {
        Self {
            amount: invoice.total(),
            currency: invoice.currency().code().to_string(),
            risk_score: Decimal::from_f64(assessment.score)
                .unwrap_or(Decimal::ONE)
                .round_dp(6),
            risk_level: assessment.level.as_str().to_string(),
            match_status: assessment.match_status,
            has_po_reference: invoice.po_reference().is_some(),
            vendor_flags: assessment.vendor_flags.clone(),
        }
    }

    fn value(&self, attr: Attribute) -> Literal {
        match attr {
            Attribute::Amount => Literal::Number(self.amount),
            Attribute::Currency => Literal::Text(self.currency.clone()),
            Attribute::RiskScore => Literal::Number(self.risk_score),
            Attribute::RiskLevel => Literal::Text(self.risk_level.clone()),
            Attribute::MatchStatus => Literal::Text(self.match_status.as_str().to_string()),
            Attribute::HasPoReference => Literal::Bool(self.has_po_reference),
        }
    }
}

impl Condition {
    /// Type-check the tree: operands must have the attribute's type and
    /// ordering operators only apply to numbers.
    pub fn validate(&self) -> Result<(), RuleError> {
        match self {
            Condition::Always => Ok(()),
            Condition::All(items) | Condition::Any(items) => {
                if items.is_empty() {
                    return Err(RuleError::invalid_condition("all/any needs at least one operand"));
                }
                items.iter().try_for_each(Condition::validate)
            }
            Condition::Not(inner) => inner.validate(),
            Condition::Compare { attr, op, value } => {
                check_kind(*attr, value)?;
                if op.is_ordering() && attr.kind() != ValueKind::Number {
                    return Err(RuleError::invalid_condition(format!(
                        "operator {op:?} is not defined for {}",
                        attr.as_str()
                    )));
                }
                Ok(())
            }
            Condition::In { attr, values } => {
                if values.is_empty() {
                    return Err(RuleError::invalid_condition("`in` needs at least one value"));
                }
                values.iter().try_for_each(|v| check_kind(*attr, v))
            }
            Condition::HasVendorFlag(flag) => {
                if flag.trim().is_empty() {
                    return Err(RuleError::invalid_condition("vendor flag must not be empty"));
                }
                Ok(())
            }
        }
    }

    pub fn evaluate(&self, ctx: &RuleContext) -> bool {
        match self {
            Condition::Always => true,
            Condition::All(items) => items.iter().all(|c| c.evaluate(ctx)),
            Condition::Any(items) => items.iter().any(|c| c.evaluate(ctx)),
            Condition::Not(inner) => !inner.evaluate(ctx),
            Condition::Compare { attr, op, value } => compare(&ctx.value(*attr), *op, value),
            Condition::In { attr, values } => {
                let actual = ctx.value(*attr);
                values.iter().any(|v| compare(&actual, CompareOp::Eq, v))
            }
            Condition::HasVendorFlag(flag) => ctx
                .vendor_flags
                .iter()
                .any(|f| f.trim().eq_ignore_ascii_case(flag.trim())),
        }
    }
}

fn check_kind(attr: Attribute, value: &Literal) -> Result<(), RuleError> {
    if attr.kind() == value.kind() {
        Ok(())
    } else {
        Err(RuleError::invalid_condition(format!(
            "{} cannot be compared with {value:?}",
            attr.as_str()
        )))
    }
}

/// Mismatched operand types never match.
fn compare(actual: &Literal, op: CompareOp, expected: &Literal) -> bool {
    use std::cmp::Ordering;

    let ordering = match (actual, expected) {
        (Literal::Number(a), Literal::Number(b)) => a.cmp(b),
        (Literal::Text(a), Literal::Text(b)) => {
            if a.trim().eq_ignore_ascii_case(b.trim()) {
                Ordering::Equal
            } else {
                return op == CompareOp::Ne;
            }
        }
        (Literal::Bool(a), Literal::Bool(b)) => {
            return match op {
                CompareOp::Eq => a == b,
                CompareOp::Ne => a != b,
                _ => false,
            };
        }
        _ => return false,
    };

    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Lte => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Gte => ordering != Ordering::Less,
    }
}
