//! Application configuration.
//!
//! Layering: built-in defaults, then an optional file (any format the `config`
//! crate understands), then `INVOICEFLOW__SECTION__KEY` environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use invoiceflow_approval::RuleError;
use invoiceflow_observability::LoggingConfig;
use invoiceflow_purchasing::MatchTolerances;
use invoiceflow_risk::{RiskConfig, RiskError};

use crate::retry::RetryPolicy;

pub const ENV_PREFIX: &str = "INVOICEFLOW";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid approval rules: {0}")]
    Rules(#[from] RuleError),

    #[error("invalid risk configuration: {0}")]
    Risk(#[from] RiskError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// SLA monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaConfig {
    /// Share of the task window after which a task reports `warning`.
    pub warning_fraction: f64,
    /// Reject once this many breaches accumulated; unset never auto-rejects.
    pub auto_reject_after: Option<u32>,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            warning_fraction: 0.75,
            auto_reject_after: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON Lines journal; in-memory only when unset.
    pub journal_path: Option<PathBuf>,
    pub redacted_fields: Vec<String>,
    /// Cap on optimistic append attempts per event.
    pub append_max_attempts: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            journal_path: None,
            redacted_fields: vec!["bank_account".to_string(), "vendor_tax_id".to_string()],
            append_max_attempts: 16,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub matching: MatchTolerances,
    pub risk: RiskConfig,
    pub retry: RetryPolicy,
    pub sla: SlaConfig,
    pub audit: AuditConfig,
    /// JSON rule set; the built-in rules apply when unset.
    pub rules_path: Option<PathBuf>,
}

impl AppConfig {
    /// Defaults overlaid with environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::build(None)
    }

    /// Defaults, then `path` if it exists, then environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::build(Some(path.as_ref()))
    }

    fn build(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = settings.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk.validate()?;
        if !(0.0..=1.0).contains(&self.sla.warning_fraction) {
            return Err(ConfigError::Invalid(format!(
                "sla.warning_fraction must be within [0, 1], got {}",
                self.sla.warning_fraction
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be > 0".into()));
        }
        if self.retry.timeout_ms == 0 {
            return Err(ConfigError::Invalid("retry.timeout_ms must be > 0".into()));
        }
        if self.audit.append_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "audit.append_max_attempts must be > 0".into(),
            ));
        }
        Ok(())
    }
}
