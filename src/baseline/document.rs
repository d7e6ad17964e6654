//! On-disk baseline document
//!
//! ```json
//! {
//!   "name": "strict", "version": "1.0",
//!   "tenantSettings": { "sharingCapability": { "expected": "Disabled", "valueType": "enum",
//!                                              "compareMode": "equals", "riskWeight": 10 } },
//!   "siteSettings":   { "anonymousLinkExpirationInDays": { "expected": 30,
//!                                                          "compareMode": "maxBound", "riskWeight": 3 } }
//! }
//! ```

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;

use super::validation::validate_entries;
use crate::error::BaselineError;
use crate::models::{Baseline, BaselineEntry, CompareMode, ScopeKind, SettingValue, ValueType};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BaselineDocument {
    name: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tenant_settings: OrderedEntries,
    #[serde(default)]
    site_settings: OrderedEntries,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EntryDocument {
    expected: Option<Value>,
    value_type: Option<String>,
    compare_mode: Option<String>,
    risk_weight: Option<Value>,
    remediable: Option<bool>,
    depends_on: Option<String>,
    description: Option<String>,
}

/// Settings object kept as a list so duplicate keys survive until validation
#[derive(Debug, Default)]
struct OrderedEntries(Vec<(String, EntryDocument)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of setting entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, entry)) = map.next_entry::<String, EntryDocument>()? {
                    entries.push((key, entry));
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Parse and fully validate a baseline document. `origin` is only used in errors.
pub fn parse_baseline(content: &str, origin: &Path) -> Result<Baseline, BaselineError> {
    let doc: BaselineDocument = serde_json::from_str(content).map_err(|e| BaselineError::Parse {
        path: origin.to_path_buf(),
        message: e.to_string(),
    })?;

    if doc.name.trim().is_empty() {
        return Err(BaselineError::validation(&doc.name, "name must not be empty"));
    }
    if doc.version.trim().is_empty() {
        return Err(BaselineError::validation(&doc.name, "version must not be empty"));
    }

    let mut entries = Vec::with_capacity(doc.tenant_settings.0.len() + doc.site_settings.0.len());
    for (kind, settings) in [
        (ScopeKind::Tenant, doc.tenant_settings),
        (ScopeKind::Site, doc.site_settings),
    ] {
        for (key, entry) in settings.0 {
            entries.push(convert_entry(&doc.name, kind, key, entry)?);
        }
    }

    validate_entries(&doc.name, &entries)?;

    tracing::debug!(
        baseline = %doc.name,
        version = %doc.version,
        entries = entries.len(),
        description = doc.description.as_deref().unwrap_or(""),
        "Parsed baseline"
    );

    Ok(Baseline::from_validated(doc.name, doc.version, entries))
}

fn convert_entry(
    baseline: &str,
    kind: ScopeKind,
    key: String,
    doc: EntryDocument,
) -> Result<BaselineEntry, BaselineError> {
    let at = |reason: String| BaselineError::validation(baseline, format!("{} setting '{}': {}", kind.as_str(), key, reason));

    let declared = match doc.value_type.as_deref() {
        None => None,
        Some(s) => Some(ValueType::from_str(s).ok_or_else(|| at(format!("unknown valueType '{}'", s)))?),
    };

    let raw = doc.expected.ok_or_else(|| at("missing expected value".to_string()))?;
    let expected = SettingValue::from_json(&raw, declared)
        .ok_or_else(|| at(format!("expected value {} is malformed or does not match its type", raw)))?;

    let compare_mode = match doc.compare_mode.as_deref() {
        Some(s) => CompareMode::from_str(s).ok_or_else(|| at(format!("unknown compareMode '{}'", s)))?,
        None => match expected.value_type() {
            ValueType::Bool | ValueType::String => CompareMode::Equals,
            ValueType::Int | ValueType::Enum => {
                return Err(at(format!(
                    "compareMode is required for {} settings",
                    expected.value_type().as_str()
                )))
            }
        },
    };

    let risk_weight = doc
        .risk_weight
        .as_ref()
        .ok_or_else(|| at("missing riskWeight".to_string()))?
        .as_f64()
        .ok_or_else(|| at("riskWeight must be a number".to_string()))?;

    let mut entry = BaselineEntry::new(kind, key.clone(), expected, compare_mode, risk_weight);
    entry.remediable = doc.remediable.unwrap_or(true);
    entry.depends_on = doc.depends_on;
    entry.description = doc.description;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    fn origin() -> PathBuf {
        PathBuf::from("test.json")
    }

    fn doc(tenant: &str, site: &str) -> String {
        format!(
            r#"{{"name": "strict", "version": "1.0", "tenantSettings": {{{}}}, "siteSettings": {{{}}}}}"#,
            tenant, site
        )
    }

    fn validation_reason(content: &str) -> String {
        match parse_baseline(content, &origin()) {
            Err(BaselineError::Validation { reason, .. }) => reason,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_full_document() {
        let content = doc(
            r#""sharingCapability": {"expected": "Disabled", "valueType": "enum", "compareMode": "equals", "riskWeight": 10},
               "legacyAuthProtocolsEnabled": {"expected": false, "riskWeight": 8}"#,
            r#""anonymousLinkExpirationInDays": {"expected": 30, "compareMode": "maxBound", "riskWeight": 3, "dependsOn": "sharingCapability"},
               "conditionalAccessPolicy": {"expected": "BlockAccess", "riskWeight": 2.5, "remediable": false, "description": "Managed in the admin center"}"#,
        );

        let baseline = parse_baseline(&content, &origin()).unwrap();
        assert_eq!(baseline.name, "strict");
        assert_eq!(baseline.len(), 4);

        let sharing = baseline.entry(ScopeKind::Tenant, "sharingCapability").unwrap();
        assert_eq!(sharing.expected, SettingValue::Enum("Disabled".to_string()));

        let legacy = baseline.entry(ScopeKind::Tenant, "legacyAuthProtocolsEnabled").unwrap();
        assert_eq!(legacy.compare_mode, CompareMode::Equals);

        let expiry = baseline.entry(ScopeKind::Site, "anonymousLinkExpirationInDays").unwrap();
        assert_eq!(expiry.compare_mode, CompareMode::MaxBound);
        assert_eq!(expiry.depends_on.as_deref(), Some("sharingCapability"));

        let cap = baseline.entry(ScopeKind::Site, "conditionalAccessPolicy").unwrap();
        assert_eq!(cap.expected, SettingValue::String("BlockAccess".to_string()));
        assert!(!cap.remediable);
        assert_eq!(cap.description.as_deref(), Some("Managed in the admin center"));
    }

    #[test]
    fn test_declaration_order_preserved() {
        let content = doc(
            "",
            r#""zeta": {"expected": true, "riskWeight": 1},
               "alpha": {"expected": true, "riskWeight": 1},
               "mid": {"expected": true, "riskWeight": 1}"#,
        );
        let baseline = parse_baseline(&content, &origin()).unwrap();
        let keys: Vec<&str> = baseline.entries_for(ScopeKind::Site).map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let content = doc(
            r#""k": {"expected": true, "riskWeight": 1}, "k": {"expected": false, "riskWeight": 1}"#,
            "",
        );
        assert!(validation_reason(&content).contains("duplicate"));
    }

    #[test]
    fn test_same_key_in_both_scopes_allowed() {
        let content = doc(
            r#""k": {"expected": true, "riskWeight": 1}"#,
            r#""k": {"expected": true, "riskWeight": 1}"#,
        );
        assert_eq!(parse_baseline(&content, &origin()).unwrap().len(), 2);
    }

    #[rstest]
    #[case::missing_expected(r#""k": {"riskWeight": 1}"#, "missing expected")]
    #[case::null_expected(r#""k": {"expected": null, "riskWeight": 1}"#, "missing expected")]
    #[case::float_expected(r#""k": {"expected": 1.5, "compareMode": "equals", "riskWeight": 1}"#, "malformed")]
    #[case::array_expected(r#""k": {"expected": [1], "riskWeight": 1}"#, "malformed")]
    #[case::type_mismatch(r#""k": {"expected": "yes", "valueType": "bool", "riskWeight": 1}"#, "malformed")]
    #[case::unknown_type(r#""k": {"expected": 1, "valueType": "float", "riskWeight": 1}"#, "unknown valueType")]
    #[case::int_without_mode(r#""k": {"expected": 30, "riskWeight": 1}"#, "compareMode is required")]
    #[case::enum_without_mode(r#""k": {"expected": "Off", "valueType": "enum", "riskWeight": 1}"#, "compareMode is required")]
    #[case::unknown_mode(r#""k": {"expected": true, "compareMode": "atLeast", "riskWeight": 1}"#, "unknown compareMode")]
    #[case::max_bound_on_bool(r#""k": {"expected": true, "compareMode": "maxBound", "riskWeight": 1}"#, "maxBound")]
    #[case::missing_weight(r#""k": {"expected": true}"#, "missing riskWeight")]
    #[case::string_weight(r#""k": {"expected": true, "riskWeight": "high"}"#, "must be a number")]
    #[case::zero_weight(r#""k": {"expected": true, "riskWeight": 0}"#, "riskWeight")]
    #[case::negative_weight(r#""k": {"expected": true, "riskWeight": -2}"#, "riskWeight")]
    fn test_malformed_tenant_entries(#[case] entry: &str, #[case] reason: &str) {
        let got = validation_reason(&doc(entry, ""));
        assert!(got.contains(reason), "'{}' does not mention '{}'", got, reason);
    }

    #[test]
    fn test_depends_on_must_name_tenant_key() {
        let content = doc(
            r#""sharingCapability": {"expected": "Disabled", "valueType": "enum", "compareMode": "equals", "riskWeight": 1}"#,
            r#""k": {"expected": true, "riskWeight": 1, "dependsOn": "nope"}"#,
        );
        assert!(validation_reason(&content).contains("dependsOn"));
    }

    #[test]
    fn test_depends_on_rejected_on_tenant_entries() {
        let content = doc(
            r#""a": {"expected": true, "riskWeight": 1},
               "b": {"expected": true, "riskWeight": 1, "dependsOn": "a"}"#,
            "",
        );
        assert!(validation_reason(&content).contains("dependsOn"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let content = r#"{"name": " ", "version": "1", "tenantSettings": {"k": {"expected": true, "riskWeight": 1}}}"#;
        assert!(validation_reason(content).contains("name"));
    }

    #[test]
    fn test_no_entries_rejected() {
        assert!(validation_reason(&doc("", "")).contains("no settings"));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = parse_baseline("{not json", &origin()).unwrap_err();
        assert!(matches!(err, BaselineError::Parse { .. }));
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let content = r#"{"name": "a", "version": "1", "tenantSettings": {"k": {"expected": true, "riskWeight": 1, "weight": 2}}}"#;
        assert!(matches!(
            parse_baseline(content, &origin()),
            Err(BaselineError::Parse { .. })
        ));
    }
}
