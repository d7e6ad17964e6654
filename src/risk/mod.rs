//! Risk classification matrix
//!
//! Maps (setting key, observed value) to a risk level. The table is data:
//! a JSON document ships with the crate and can be replaced or extended
//! without touching the evaluator.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::models::{RiskLevel, SettingValue};

const DEFAULT_MATRIX: &str = include_str!("default_matrix.json");

/// Classification rule for one setting
#[derive(Debug, Clone, PartialEq)]
pub enum RiskRule {
    /// Exact value lookup; unlisted values fall back to the matrix default
    Values(HashMap<String, RiskLevel>),
    /// `true` is risky at the given level, `false` is `None`
    WhenTrue(RiskLevel),
    /// `false` is risky at the given level, `true` is `None`
    WhenFalse(RiskLevel),
    /// Integers strictly above the threshold are risky
    Above { threshold: i64, level: RiskLevel },
}

#[derive(Debug, Clone, PartialEq)]
struct SettingRule {
    rule: RiskRule,
    missing: Option<RiskLevel>,
}

#[derive(Debug, thiserror::Error)]
pub enum RiskMatrixError {
    #[error("failed to parse risk matrix: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("risk rule for '{key}' is invalid: {reason}")]
    InvalidRule { key: String, reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MatrixDocument {
    default: Option<RiskLevel>,
    #[serde(default)]
    settings: BTreeMap<String, RuleDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RuleDocument {
    values: Option<HashMap<String, RiskLevel>>,
    when_true: Option<RiskLevel>,
    when_false: Option<RiskLevel>,
    above: Option<i64>,
    level: Option<RiskLevel>,
    missing: Option<RiskLevel>,
}

impl RuleDocument {
    fn into_rule(self, key: &str) -> Result<SettingRule, RiskMatrixError> {
        let invalid = |reason: &str| RiskMatrixError::InvalidRule {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let rule = match (self.values, self.when_true, self.when_false, self.above, self.level) {
            (Some(values), None, None, None, None) => RiskRule::Values(values),
            (None, Some(level), None, None, None) => RiskRule::WhenTrue(level),
            (None, None, Some(level), None, None) => RiskRule::WhenFalse(level),
            (None, None, None, Some(threshold), Some(level)) => RiskRule::Above { threshold, level },
            (None, None, None, Some(_), None) => return Err(invalid("'above' needs a 'level'")),
            (None, None, None, None, Some(_)) => return Err(invalid("'level' needs an 'above' threshold")),
            (None, None, None, None, None) => return Err(invalid("no rule given")),
            _ => return Err(invalid("exactly one of values, whenTrue, whenFalse or above is allowed")),
        };

        Ok(SettingRule {
            rule,
            missing: self.missing,
        })
    }
}

/// Read-only once built; shared across workers behind an `Arc`
#[derive(Debug, Clone, PartialEq)]
pub struct RiskMatrix {
    default: RiskLevel,
    rules: HashMap<String, SettingRule>,
}

impl RiskMatrix {
    /// Empty matrix: everything classifies as `default`
    pub fn new(default: RiskLevel) -> Self {
        Self {
            default,
            rules: HashMap::new(),
        }
    }

    /// The matrix shipped with the crate
    pub fn builtin() -> Result<Self, RiskMatrixError> {
        Self::from_json(DEFAULT_MATRIX)
    }

    pub fn from_json(content: &str) -> Result<Self, RiskMatrixError> {
        let doc: MatrixDocument = serde_json::from_str(content)?;
        let mut matrix = Self::new(doc.default.unwrap_or(RiskLevel::Medium));
        for (key, rule) in doc.settings {
            let rule = rule.into_rule(&key)?;
            matrix.rules.insert(key, rule);
        }
        Ok(matrix)
    }

    /// Overlay a JSON document: its rules replace ours key by key, and its
    /// `default` replaces ours when present.
    pub fn merge(&mut self, content: &str) -> Result<(), RiskMatrixError> {
        let doc: MatrixDocument = serde_json::from_str(content)?;
        let mut rules = Vec::with_capacity(doc.settings.len());
        for (key, rule) in doc.settings {
            let rule = rule.into_rule(&key)?;
            rules.push((key, rule));
        }

        if let Some(default) = doc.default {
            self.default = default;
        }
        self.rules.extend(rules);
        Ok(())
    }

    pub fn with_rule(mut self, key: impl Into<String>, rule: RiskRule) -> Self {
        self.rules.insert(key.into(), SettingRule { rule, missing: None });
        self
    }

    pub fn with_missing(mut self, key: &str, level: RiskLevel) -> Self {
        if let Some(rule) = self.rules.get_mut(key) {
            rule.missing = Some(level);
        }
        self
    }

    pub fn default_level(&self) -> RiskLevel {
        self.default
    }

    pub fn has_rule(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    /// Classify an observation. `None` means the scope did not report the setting.
    pub fn classify(&self, key: &str, observed: Option<&SettingValue>) -> RiskLevel {
        let Some(setting) = self.rules.get(key) else {
            return self.default;
        };

        let Some(value) = observed else {
            return setting.missing.unwrap_or(self.default);
        };

        match (&setting.rule, value) {
            (RiskRule::Values(table), v) => table.get(&v.match_key()).copied().unwrap_or(self.default),
            (RiskRule::WhenTrue(level), SettingValue::Bool(b)) => {
                if *b {
                    *level
                } else {
                    RiskLevel::None
                }
            }
            (RiskRule::WhenFalse(level), SettingValue::Bool(b)) => {
                if *b {
                    RiskLevel::None
                } else {
                    *level
                }
            }
            (RiskRule::Above { threshold, level }, SettingValue::Int(n)) => {
                if n > threshold {
                    *level
                } else {
                    RiskLevel::None
                }
            }
            // Rule shape does not fit the observed type
            _ => self.default,
        }
    }
}
