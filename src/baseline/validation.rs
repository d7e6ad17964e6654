use std::collections::HashSet;

use crate::error::BaselineError;
use crate::models::{Baseline, BaselineEntry, CompareMode, ScopeKind, SettingValue, ValueType};

/// Structural checks shared by the document parser and the builder
pub(crate) fn validate_entries(baseline: &str, entries: &[BaselineEntry]) -> Result<(), BaselineError> {
    if entries.is_empty() {
        return Err(BaselineError::validation(baseline, "baseline declares no settings"));
    }

    let mut seen: HashSet<(ScopeKind, &str)> = HashSet::new();
    let tenant_keys: HashSet<&str> = entries
        .iter()
        .filter(|e| e.scope_kind == ScopeKind::Tenant)
        .map(|e| e.key.as_str())
        .collect();

    for entry in entries {
        let at = |reason: &str| {
            BaselineError::validation(
                baseline,
                format!("{} setting '{}': {}", entry.scope_kind.as_str(), entry.key, reason),
            )
        };

        if entry.key.trim().is_empty() {
            return Err(at("setting key must not be empty"));
        }
        if !seen.insert((entry.scope_kind, entry.key.as_str())) {
            return Err(at("duplicate setting key"));
        }
        if !entry.risk_weight.is_finite() || entry.risk_weight <= 0.0 {
            return Err(at("riskWeight must be a positive number"));
        }
        if entry.compare_mode == CompareMode::MaxBound && entry.expected.value_type() != ValueType::Int {
            return Err(at("maxBound applies only to int settings"));
        }
        if let SettingValue::Enum(s) = &entry.expected {
            if s.trim().is_empty() {
                return Err(at("enum value must not be empty"));
            }
        }

        if let Some(dep) = &entry.depends_on {
            if entry.scope_kind == ScopeKind::Tenant {
                return Err(at("dependsOn is only valid on site settings"));
            }
            if !tenant_keys.contains(dep.as_str()) {
                return Err(at(&format!("dependsOn '{}' is not a tenant setting of this baseline", dep)));
            }
        }
    }

    Ok(())
}

/// Programmatic baseline construction with the same validation as documents
#[derive(Debug, Clone)]
pub struct BaselineBuilder {
    name: String,
    version: String,
    entries: Vec<BaselineEntry>,
}

impl BaselineBuilder {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            entries: Vec::new(),
        }
    }

    pub fn tenant(self, key: &str, expected: SettingValue, mode: CompareMode, weight: f64) -> Self {
        self.entry(BaselineEntry::new(ScopeKind::Tenant, key, expected, mode, weight))
    }

    pub fn site(self, key: &str, expected: SettingValue, mode: CompareMode, weight: f64) -> Self {
        self.entry(BaselineEntry::new(ScopeKind::Site, key, expected, mode, weight))
    }

    pub fn entry(mut self, entry: BaselineEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn build(self) -> Result<Baseline, BaselineError> {
        if self.name.trim().is_empty() {
            return Err(BaselineError::validation(&self.name, "name must not be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(BaselineError::validation(&self.name, "version must not be empty"));
        }
        validate_entries(&self.name, &self.entries)?;
        Ok(Baseline::from_validated(self.name, self.version, self.entries))
    }
}
