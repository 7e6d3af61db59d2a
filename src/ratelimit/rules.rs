//! Rule resolution: mapping an API identifier to its rate limit rule.
//!
//! The engine treats whatever a [`RuleService`] returns as authoritative. An
//! API with no rule is reported as [`GatekeeperError::RuleNotFound`] rather
//! than being silently allowed or denied.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::rule::Rule;
use crate::error::{GatekeeperError, Result};

/// Resolves API identifiers to rules.
pub trait RuleService: Send + Sync {
    /// Get the rule for `api`.
    fn get_rule(&self, api: &str) -> Result<Rule>;
}

/// A rule service that applies one rule to every API.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRuleService {
    rule: Rule,
}

impl StaticRuleService {
    pub fn new(rule: Rule) -> Self {
        Self { rule }
    }
}

impl RuleService for StaticRuleService {
    fn get_rule(&self, _api: &str) -> Result<Rule> {
        Ok(self.rule)
    }
}

/// Per-API rules with an optional fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    /// Rule for APIs without an entry of their own
    #[serde(default)]
    pub default_rule: Option<Rule>,
    /// Map of API identifier to rule
    #[serde(default)]
    pub apis: HashMap<String, Rule>,
}

impl RuleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the rule for one API.
    pub fn with_api(mut self, api: impl Into<String>, rule: Rule) -> Self {
        self.apis.insert(api.into(), rule);
        self
    }

    /// Set the fallback rule.
    pub fn with_default(mut self, rule: Rule) -> Self {
        self.default_rule = Some(rule);
        self
    }

    /// Load a table from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a table from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            GatekeeperError::Config(format!("Failed to parse rate limit rules: {}", e))
        })
    }

    /// Find the rule for `api`, falling back to the default rule.
    pub fn find_rule(&self, api: &str) -> Option<Rule> {
        self.apis.get(api).copied().or(self.default_rule)
    }
}

/// A rule service backed by a replaceable [`RuleTable`].
///
/// Replacing the table affects every lookup that starts afterwards.
#[derive(Debug, Default)]
pub struct ConfigRuleService {
    table: RwLock<RuleTable>,
}

impl ConfigRuleService {
    pub fn new(table: RuleTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// Swap in a new rule table.
    pub fn replace(&self, table: RuleTable) {
        info!(
            apis = table.apis.len(),
            has_default = table.default_rule.is_some(),
            "Replacing rate limit rules"
        );
        *self.table.write() = table;
    }

    /// Get a copy of the current table.
    pub fn table(&self) -> RuleTable {
        self.table.read().clone()
    }
}

impl RuleService for ConfigRuleService {
    fn get_rule(&self, api: &str) -> Result<Rule> {
        match self.table.read().find_rule(api) {
            Some(rule) => Ok(rule),
            None => {
                debug!(api = %api, "No rate limit rule configured");
                Err(GatekeeperError::RuleNotFound {
                    api: api.to_string(),
                })
            }
        }
    }
}
