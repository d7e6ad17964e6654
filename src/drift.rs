//! Drift detection between two snapshots of the same scope

use serde::{Deserialize, Serialize};

use crate::models::{Scope, SettingSnapshot, SettingValue};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangedSetting {
    pub key: String,
    pub before: SettingValue,
    pub after: SettingValue,
}

/// Keys that appeared, disappeared or changed value between two captures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub scope: Scope,
    pub previous_captured_at: String,
    pub current_captured_at: String,
    pub added: Vec<(String, SettingValue)>,
    pub removed: Vec<(String, SettingValue)>,
    pub changed: Vec<ChangedSetting>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        !(self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty())
    }

    pub fn changed_keys(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .map(|(k, _)| k.as_str())
            .chain(self.removed.iter().map(|(k, _)| k.as_str()))
            .chain(self.changed.iter().map(|c| c.key.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot diff snapshots of different scopes: {previous} vs {current}")]
pub struct ScopeMismatch {
    pub previous: String,
    pub current: String,
}

/// Compare two snapshots. Keys come out sorted since snapshots are ordered maps.
pub fn diff(previous: &SettingSnapshot, current: &SettingSnapshot) -> Result<DriftReport, ScopeMismatch> {
    if previous.scope != current.scope {
        return Err(ScopeMismatch {
            previous: previous.scope.to_string(),
            current: current.scope.to_string(),
        });
    }

    let mut report = DriftReport {
        scope: current.scope.clone(),
        previous_captured_at: previous.captured_at.clone(),
        current_captured_at: current.captured_at.clone(),
        added: Vec::new(),
        removed: Vec::new(),
        changed: Vec::new(),
    };

    for (key, after) in &current.values {
        match previous.values.get(key) {
            None => report.added.push((key.clone(), after.clone())),
            Some(before) if before != after => report.changed.push(ChangedSetting {
                key: key.clone(),
                before: before.clone(),
                after: after.clone(),
            }),
            Some(_) => {}
        }
    }

    for (key, before) in &previous.values {
        if !current.values.contains_key(key) {
            report.removed.push((key.clone(), before.clone()));
        }
    }

    Ok(report)
}
