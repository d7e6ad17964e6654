use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::scope::ScopeKind;
use super::value::SettingValue;

/// How an observed value is judged against the expected one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CompareMode {
    /// Observed must equal expected
    #[serde(rename = "equals")]
    Equals,
    /// Observed integer must be less than or equal to expected
    #[serde(rename = "maxBound")]
    MaxBound,
}

impl CompareMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareMode::Equals => "equals",
            CompareMode::MaxBound => "maxBound",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "equals" => Some(CompareMode::Equals),
            "maxBound" => Some(CompareMode::MaxBound),
            _ => None,
        }
    }
}

/// One expected setting within a baseline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaselineEntry {
    pub key: String,
    pub scope_kind: ScopeKind,
    pub expected: SettingValue,
    pub compare_mode: CompareMode,
    pub risk_weight: f64,
    /// False when the setting can only be changed by hand on the platform
    pub remediable: bool,
    /// Tenant key that bounds this site setting
    pub depends_on: Option<String>,
    pub description: Option<String>,
}

impl BaselineEntry {
    pub fn new(
        scope_kind: ScopeKind,
        key: impl Into<String>,
        expected: SettingValue,
        compare_mode: CompareMode,
        risk_weight: f64,
    ) -> Self {
        Self {
            key: key.into(),
            scope_kind,
            expected,
            compare_mode,
            risk_weight,
            remediable: true,
            depends_on: None,
            description: None,
        }
    }

    pub fn manual_only(mut self) -> Self {
        self.remediable = false;
        self
    }

    pub fn depends_on(mut self, tenant_key: impl Into<String>) -> Self {
        self.depends_on = Some(tenant_key.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A named, versioned security baseline.
///
/// Immutable once built. Entries keep declaration order per scope kind, which
/// is the order findings and remediation actions are produced in.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub name: String,
    pub version: String,
    entries: Vec<BaselineEntry>,
    index: HashMap<(ScopeKind, String), usize>,
}

impl Baseline {
    /// Assemble an already-validated entry list
    pub(crate) fn from_validated(name: String, version: String, entries: Vec<BaselineEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| ((e.scope_kind, e.key.clone()), i))
            .collect();

        Self {
            name,
            version,
            entries,
            index,
        }
    }

    pub fn entries(&self) -> &[BaselineEntry] {
        &self.entries
    }

    pub fn entries_for(&self, kind: ScopeKind) -> impl Iterator<Item = &BaselineEntry> {
        self.entries.iter().filter(move |e| e.scope_kind == kind)
    }

    pub fn entry(&self, kind: ScopeKind, key: &str) -> Option<&BaselineEntry> {
        self.index
            .get(&(kind, key.to_string()))
            .map(|&i| &self.entries[i])
    }

    /// Declaration position of a setting, used for deterministic ordering
    pub fn position(&self, kind: ScopeKind, key: &str) -> Option<usize> {
        self.index.get(&(kind, key.to_string())).copied()
    }

    pub fn total_weight(&self, kind: ScopeKind) -> f64 {
        self.entries_for(kind).map(|e| e.risk_weight).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
