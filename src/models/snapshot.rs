use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::scope::Scope;
use super::value::SettingValue;

/// Observed configuration at one scope, captured during an audit pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingSnapshot {
    pub scope: Scope,
    pub values: BTreeMap<String, SettingValue>,
    pub captured_at: String,
}

impl SettingSnapshot {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            values: BTreeMap::new(),
            captured_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: SettingValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: SettingValue) -> Option<SettingValue> {
        self.values.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
