//! Field access through a record's serde representation.
//!
//! Only bool, string and integer fields can be read or assigned here; these
//! are the kinds a primary key or lookup column can have.

use crate::error::{OrmError, OrmResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::type_name;
use std::fmt;

/// A bool, string or integer field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    /// Boolean.
    Bool(bool),
    /// String.
    Str(String),
    /// 64-bit integer.
    Int(i64),
}

impl FieldValue {
    /// Returns true for `false`, `""` and `0`, the values treated as unset.
    pub fn is_zero(&self) -> bool {
        match self {
            FieldValue::Bool(b) => !b,
            FieldValue::Str(s) => s.is_empty(),
            FieldValue::Int(n) => *n == 0,
        }
    }

    /// Converts to JSON.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Str(s) => Value::String(s.clone()),
            FieldValue::Int(n) => Value::from(*n),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "map",
    }
}

fn to_object<T: Serialize>(record: &T) -> OrmResult<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(OrmError::InvalidFieldKind {
            model: type_name::<T>().to_string(),
            field: String::new(),
            kind: kind_of(&other),
        }),
    }
}

fn unsupported<T>(field: &str, value: &Value) -> OrmError {
    OrmError::InvalidFieldKind {
        model: type_name::<T>().to_string(),
        field: field.to_string(),
        kind: kind_of(value),
    }
}

/// Converts a JSON value into a [`FieldValue`]. `null` is `None`.
fn from_json<T>(field: &str, value: &Value) -> OrmResult<Option<FieldValue>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(FieldValue::Bool(*b))),
        Value::String(s) => Ok(Some(FieldValue::Str(s.clone()))),
        Value::Number(n) => n
            .as_i64()
            .map(|n| Some(FieldValue::Int(n)))
            .ok_or_else(|| unsupported::<T>(field, value)),
        _ => Err(unsupported::<T>(field, value)),
    }
}

/// Reads a field. Absent and `null` fields are `None`.
///
/// Fails with [`OrmError::InvalidFieldKind`] when the field holds anything
/// other than a bool, string or integer.
pub fn get_field_value<T: Serialize>(record: &T, field: &str) -> OrmResult<Option<FieldValue>> {
    let map = to_object(record)?;
    match map.get(field) {
        Some(value) => from_json::<T>(field, value),
        None => Ok(None),
    }
}

/// Assigns a field by rewriting the record through its serde representation.
///
/// Fails with [`OrmError::InvalidFieldKind`] when the current value is not a
/// bool, string or integer, and with a serialization error when the new
/// value does not fit the field's type.
pub fn set_field_value<T: Serialize + DeserializeOwned>(
    record: &mut T,
    field: &str,
    value: FieldValue,
) -> OrmResult<()> {
    let mut map = to_object(record)?;
    if let Some(current) = map.get(field) {
        from_json::<T>(field, current)?;
    }
    map.insert(field.to_string(), value.to_json());
    *record = serde_json::from_value(Value::Object(map))?;
    Ok(())
}

/// Reads several fields for use as equality filters.
///
/// Every named field must hold a value: an absent or `null` field fails with
/// bad arguments rather than being left out of the filter.
pub(crate) fn field_values<T: Serialize>(
    record: &T,
    fields: &[String],
) -> OrmResult<Vec<(String, Value)>> {
    let map = to_object(record)?;
    let mut values = Vec::with_capacity(fields.len());
    for field in fields {
        let value = match map.get(field) {
            Some(value) => from_json::<T>(field, value)?,
            None => None,
        };
        match value {
            Some(value) => values.push((field.clone(), value.to_json())),
            None => {
                return Err(OrmError::bad_arguments(format!(
                    "no value set for `{field}`"
                )))
            }
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    struct Rule {
        id: i64,
        name: String,
        enabled: bool,
        weight: f64,
        tags: Vec<String>,
        owner: Option<String>,
    }

    #[test]
    fn get_supported_kinds() {
        let rule = Rule {
            id: 7,
            name: "overheat".into(),
            enabled: true,
            ..Rule::default()
        };
        assert_eq!(get_field_value(&rule, "id").unwrap(), Some(FieldValue::Int(7)));
        assert_eq!(
            get_field_value(&rule, "name").unwrap(),
            Some(FieldValue::Str("overheat".into()))
        );
        assert_eq!(
            get_field_value(&rule, "enabled").unwrap(),
            Some(FieldValue::Bool(true))
        );
        assert_eq!(get_field_value(&rule, "owner").unwrap(), None);
        assert_eq!(get_field_value(&rule, "missing").unwrap(), None);
    }

    #[test]
    fn unsupported_kinds_fail() {
        let rule = Rule::default();
        assert!(matches!(
            get_field_value(&rule, "tags"),
            Err(OrmError::InvalidFieldKind { kind: "sequence", .. })
        ));
        assert!(matches!(
            get_field_value(&rule, "weight"),
            Err(OrmError::InvalidFieldKind { kind: "float", .. })
        ));

        let mut rule = Rule::default();
        assert!(set_field_value(&mut rule, "tags", FieldValue::Int(1)).is_err());
    }

    #[test]
    fn set_rewrites_the_record() {
        let mut rule = Rule::default();
        set_field_value(&mut rule, "id", FieldValue::Int(1_700_000_000_000)).unwrap();
        set_field_value(&mut rule, "name", "door".into()).unwrap();
        set_field_value(&mut rule, "owner", "ops".into()).unwrap();

        assert_eq!(rule.id, 1_700_000_000_000);
        assert_eq!(rule.name, "door");
        assert_eq!(rule.owner.as_deref(), Some("ops"));
    }

    #[test]
    fn mismatched_value_is_serialization_error() {
        let mut rule = Rule::default();
        let err = set_field_value(&mut rule, "id", "abc".into()).unwrap_err();
        assert!(matches!(err, OrmError::Serialization(_)));
    }

    #[test]
    fn filter_values_require_every_field() {
        let rule = Rule {
            id: 7,
            name: "overheat".into(),
            ..Rule::default()
        };
        let fields = ["id".to_string(), "name".to_string()];
        let values = field_values(&rule, &fields).unwrap();
        assert_eq!(values[1], ("name".to_string(), Value::from("overheat")));

        let fields = ["name".to_string(), "owner".to_string()];
        assert!(matches!(
            field_values(&rule, &fields),
            Err(OrmError::BadArguments(message)) if message.contains("owner")
        ));
        let fields = ["missing".to_string()];
        assert!(field_values(&rule, &fields).is_err());
    }

    #[test]
    fn zero_values() {
        assert!(FieldValue::Int(0).is_zero());
        assert!(FieldValue::Str(String::new()).is_zero());
        assert!(!FieldValue::Int(3).is_zero());
        assert_eq!(FieldValue::Int(42).to_string(), "42");
    }
}
