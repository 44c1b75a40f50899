//! Record model
//!
//! A [`Record`] carries two independently sourced views of one row: the
//! ordered field list (from the message schema) and a name → value map (from
//! the message payload). Serialization always reconciles the two by looking
//! values up **by field name**; the position of a value in the map means
//! nothing.

use crate::error::{ConnectorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Semantic type of a field, as declared by the upstream schema.
///
/// Informational: literal rendering is driven by the value, not the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    String,
    Bytes,
    Array,
    Map,
    Struct,
}

impl FieldType {
    /// Best-effort type for a JSON value. `null` has no type and maps to
    /// `String`.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_f64() => Self::Float64,
            Value::Number(_) => Self::Int64,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Struct,
            Value::String(_) | Value::Null => Self::String,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Array => "array",
            Self::Map => "map",
            Self::Struct => "struct",
        };
        f.write_str(name)
    }
}

/// A named, typed column of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// One row delivered by the streaming platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<Field>,
    values: Map<String, Value>,
}

impl Record {
    pub fn new(fields: Vec<Field>, values: Map<String, Value>) -> Self {
        Self { fields, values }
    }

    /// Build a record from a field list and a JSON object payload.
    pub fn from_json(fields: Vec<Field>, value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self::new(fields, values)),
            other => Err(ConnectorError::config(format!(
                "record payload must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Build a record from a schemaless JSON object, deriving the field list
    /// from its keys.
    ///
    /// Columns follow the key order of the payload (`serde_json` is built
    /// with `preserve_order`).
    pub fn infer(value: Value) -> Result<Self> {
        let Value::Object(values) = value else {
            return Err(ConnectorError::config(format!(
                "cannot infer fields from a JSON {}",
                json_kind(&value)
            )));
        };
        let fields = values
            .iter()
            .map(|(name, v)| Field::new(name.clone(), FieldType::infer(v)))
            .collect();
        Ok(Self::new(fields, values))
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Value stored under `name`, if any. An explicit JSON `null` is
    /// `Some(&Value::Null)`, a missing key is `None`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Whether both records declare the same field names in the same order.
    pub fn same_fields(&self, other: &Record) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name == b.name)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_lookup_by_name() {
        let record = Record::from_json(
            vec![
                Field::new("name", FieldType::String),
                Field::new("id", FieldType::Int64),
            ],
            json!({"id": 7, "name": "acme", "note": null}),
        )
        .unwrap();

        assert_eq!(record.value("id"), Some(&json!(7)));
        assert_eq!(record.value("name"), Some(&json!("acme")));
        assert_eq!(record.value("note"), Some(&Value::Null));
        assert_eq!(record.value("missing"), None);
        assert_eq!(record.fields()[0].name, "name");
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = Record::from_json(vec![], json!([1, 2])).unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_infer_fields() {
        let record = Record::infer(json!({
            "active": true,
            "price": 9.5,
            "qty": 3,
            "tags": ["a"],
            "ticker": "ACME",
        }))
        .unwrap();

        let types: Vec<(&str, FieldType)> = record
            .fields()
            .iter()
            .map(|f| (f.name.as_str(), f.field_type))
            .collect();
        assert!(types.contains(&("active", FieldType::Boolean)));
        assert!(types.contains(&("price", FieldType::Float64)));
        assert!(types.contains(&("qty", FieldType::Int64)));
        assert!(types.contains(&("tags", FieldType::Array)));
        assert!(types.contains(&("ticker", FieldType::String)));

        assert!(Record::infer(json!("scalar")).is_err());
    }

    #[test]
    fn test_infer_keeps_payload_key_order() {
        let record = Record::infer(json!({
            "ticker": "ACME",
            "price": 9.5,
            "active": true,
            "qty": 3,
        }))
        .unwrap();

        let names: Vec<&str> = record.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["ticker", "price", "active", "qty"]);
    }

    #[test]
    fn test_same_fields_ignores_types() {
        let a = Record::from_json(
            vec![Field::new("id", FieldType::Int32)],
            json!({"id": 1}),
        )
        .unwrap();
        let b = Record::from_json(
            vec![Field::new("id", FieldType::Int64)],
            json!({"id": 2}),
        )
        .unwrap();
        let c = Record::from_json(
            vec![Field::new("key", FieldType::Int64)],
            json!({"key": 2}),
        )
        .unwrap();
        assert!(a.same_fields(&b));
        assert!(!a.same_fields(&c));
    }

    #[test]
    fn test_field_type_serde() {
        let t: FieldType = serde_json::from_str("\"float64\"").unwrap();
        assert_eq!(t, FieldType::Float64);
        assert_eq!(FieldType::Int32.to_string(), "int32");
    }
}
