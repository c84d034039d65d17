use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::error::RuleError;
use crate::rules::RuleSet;

/// Holds the active rule set. Readers take a cheap `Arc` snapshot that stays
/// valid while a reload swaps in a new set.
#[derive(Debug)]
pub struct RuleBook {
    current: RwLock<Arc<RuleSet>>,
}

impl Default for RuleBook {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(RuleSet::default())),
        }
    }
}

impl RuleBook {
    pub fn new(rules: RuleSet) -> Result<Self, RuleError> {
        rules.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(rules)),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        Self::new(load_file(path)?)
    }

    pub fn snapshot(&self) -> Result<Arc<RuleSet>, RuleError> {
        let guard = self.current.read().map_err(|_| RuleError::Poisoned)?;
        Ok(Arc::clone(&guard))
    }

    /// Validate and atomically swap in `rules`. Returns the previous set.
    pub fn replace(&self, rules: RuleSet) -> Result<Arc<RuleSet>, RuleError> {
        rules.validate()?;
        let next = Arc::new(rules);
        let mut guard = self.current.write().map_err(|_| RuleError::Poisoned)?;
        let previous = std::mem::replace(&mut *guard, Arc::clone(&next));
        info!(
            from_version = %previous.version,
            to_version = %next.version,
            "approval rules replaced"
        );
        Ok(previous)
    }
}

/// Read and validate a JSON rule file.
pub fn load_file(path: impl AsRef<Path>) -> Result<RuleSet, RuleError> {
    let raw = std::fs::read_to_string(path)?;
    RuleSet::from_json(&raw)
}
