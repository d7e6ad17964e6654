use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a setting value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "enum")]
    Enum,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::String => "string",
            ValueType::Enum => "enum",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bool" => Some(ValueType::Bool),
            "int" => Some(ValueType::Int),
            "string" => Some(ValueType::String),
            "enum" => Some(ValueType::Enum),
            _ => None,
        }
    }
}

/// A typed configuration value observed at, or expected for, a scope.
///
/// Values of different variants never compare equal. An enum setting reported
/// as a plain string is a mismatch, not a coercion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    String(String),
    Enum(String),
}

impl SettingValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            SettingValue::Bool(_) => ValueType::Bool,
            SettingValue::Int(_) => ValueType::Int,
            SettingValue::String(_) => ValueType::String,
            SettingValue::Enum(_) => ValueType::Enum,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Text of a string or enum value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) | SettingValue::Enum(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Key used for exact-value lookups in the risk matrix
    pub fn match_key(&self) -> String {
        match self {
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::Int(n) => n.to_string(),
            SettingValue::String(s) | SettingValue::Enum(s) => s.clone(),
        }
    }

    /// Build a value from a plain JSON scalar.
    ///
    /// Without a declared type the JSON type decides (bool, integer, string).
    /// Enums are only produced when declared. Returns `None` for anything that
    /// does not fit: floats, nulls, arrays, objects, or a scalar that disagrees
    /// with the declared type.
    pub fn from_json(value: &serde_json::Value, declared: Option<ValueType>) -> Option<Self> {
        use serde_json::Value;

        match (declared, value) {
            (None | Some(ValueType::Bool), Value::Bool(b)) => Some(SettingValue::Bool(*b)),
            (None | Some(ValueType::Int), Value::Number(n)) => n.as_i64().map(SettingValue::Int),
            (None | Some(ValueType::String), Value::String(s)) => {
                Some(SettingValue::String(s.clone()))
            }
            (Some(ValueType::Enum), Value::String(s)) if !s.trim().is_empty() => {
                Some(SettingValue::Enum(s.clone()))
            }
            _ => None,
        }
    }

    /// Plain JSON scalar for this value (type tag dropped)
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SettingValue::Bool(b) => serde_json::Value::Bool(*b),
            SettingValue::Int(n) => serde_json::Value::from(*n),
            SettingValue::String(s) | SettingValue::Enum(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Int(n) => write!(f, "{}", n),
            SettingValue::String(s) => write!(f, "\"{}\"", s),
            SettingValue::Enum(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_type_round_trip() {
        for t in [ValueType::Bool, ValueType::Int, ValueType::String, ValueType::Enum] {
            assert_eq!(ValueType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(ValueType::from_str("float"), None);
    }

    #[test]
    fn test_from_json_infers_scalar_types() {
        assert_eq!(SettingValue::from_json(&json!(true), None), Some(SettingValue::Bool(true)));
        assert_eq!(SettingValue::from_json(&json!(30), None), Some(SettingValue::Int(30)));
        assert_eq!(
            SettingValue::from_json(&json!("Disabled"), None),
            Some(SettingValue::String("Disabled".to_string()))
        );
    }

    #[test]
    fn test_from_json_rejects_untyped_values() {
        assert_eq!(SettingValue::from_json(&json!(null), None), None);
        assert_eq!(SettingValue::from_json(&json!(1.5), None), None);
        assert_eq!(SettingValue::from_json(&json!([1, 2]), None), None);
        assert_eq!(SettingValue::from_json(&json!({"a": 1}), None), None);
    }

    #[test]
    fn test_from_json_honours_declared_type() {
        assert_eq!(
            SettingValue::from_json(&json!("Disabled"), Some(ValueType::Enum)),
            Some(SettingValue::Enum("Disabled".to_string()))
        );
        assert_eq!(SettingValue::from_json(&json!("30"), Some(ValueType::Int)), None);
        assert_eq!(SettingValue::from_json(&json!(true), Some(ValueType::String)), None);
        assert_eq!(SettingValue::from_json(&json!("  "), Some(ValueType::Enum)), None);
    }

    #[test]
    fn test_variants_never_coerce() {
        let as_enum = SettingValue::Enum("Disabled".to_string());
        let as_string = SettingValue::String("Disabled".to_string());
        assert_ne!(as_enum, as_string);
        assert_eq!(as_enum.match_key(), as_string.match_key());
    }

    #[test]
    fn test_tagged_serde_shape() {
        let value = SettingValue::Int(7);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, json!({"type": "int", "value": 7}));

        let back: SettingValue = serde_json::from_value(json!({"type": "enum", "value": "Guest"})).unwrap();
        assert_eq!(back, SettingValue::Enum("Guest".to_string()));
    }
}
