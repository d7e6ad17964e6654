use serde::{Deserialize, Serialize};

use super::baseline::CompareMode;
use super::scope::Scope;
use super::value::SettingValue;

/// Qualitative severity attached to a non-compliant finding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "None",
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "None" => Some(RiskLevel::None),
            "Low" => Some(RiskLevel::Low),
            "Medium" => Some(RiskLevel::Medium),
            "High" => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn numeric_value(&self) -> i32 {
        match self {
            RiskLevel::None => 0,
            RiskLevel::Low => 1,
            RiskLevel::Medium => 2,
            RiskLevel::High => 3,
        }
    }
}

/// Result of comparing one setting at one scope.
///
/// `risk_level` is `None` exactly when `compliant` is true. The constructors
/// are the only way to build one that upholds this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceFinding {
    pub scope: Scope,
    pub setting_key: String,
    /// `None` when the scope did not report the setting at all
    pub current_value: Option<SettingValue>,
    pub expected_value: SettingValue,
    pub compare_mode: CompareMode,
    pub compliant: bool,
    pub risk_level: RiskLevel,
    pub risk_weight: f64,
}

impl ComplianceFinding {
    pub fn compliant(
        scope: Scope,
        setting_key: String,
        current_value: SettingValue,
        expected_value: SettingValue,
        compare_mode: CompareMode,
        risk_weight: f64,
    ) -> Self {
        Self {
            scope,
            setting_key,
            current_value: Some(current_value),
            expected_value,
            compare_mode,
            compliant: true,
            risk_level: RiskLevel::None,
            risk_weight,
        }
    }

    /// A failed comparison; a `None` risk level is raised to `Low`
    pub fn non_compliant(
        scope: Scope,
        setting_key: String,
        current_value: Option<SettingValue>,
        expected_value: SettingValue,
        compare_mode: CompareMode,
        risk_weight: f64,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            scope,
            setting_key,
            current_value,
            expected_value,
            compare_mode,
            compliant: false,
            risk_level: risk_level.max(RiskLevel::Low),
            risk_weight,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.current_value.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_round_trip() {
        for level in [RiskLevel::None, RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            assert_eq!(RiskLevel::from_str(level.as_str()), Some(level));
        }
        assert_eq!(RiskLevel::from_str("Critical"), None);
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
        assert!(RiskLevel::Low > RiskLevel::None);
        assert!(RiskLevel::High.numeric_value() > RiskLevel::Low.numeric_value());
    }

    #[test]
    fn test_risk_level_serializes_as_name() {
        assert_eq!(serde_json::to_string(&RiskLevel::High).unwrap(), "\"High\"");
    }

    #[test]
    fn test_non_compliant_never_carries_none() {
        let finding = ComplianceFinding::non_compliant(
            Scope::tenant("contoso"),
            "legacyAuthProtocolsEnabled".to_string(),
            Some(SettingValue::Bool(true)),
            SettingValue::Bool(false),
            CompareMode::Equals,
            1.0,
            RiskLevel::None,
        );
        assert!(!finding.compliant);
        assert_eq!(finding.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_compliant_carries_none() {
        let finding = ComplianceFinding::compliant(
            Scope::tenant("contoso"),
            "legacyAuthProtocolsEnabled".to_string(),
            SettingValue::Bool(false),
            SettingValue::Bool(false),
            CompareMode::Equals,
            1.0,
        );
        assert!(finding.compliant);
        assert_eq!(finding.risk_level, RiskLevel::None);
        assert!(!finding.is_missing());
    }
}
