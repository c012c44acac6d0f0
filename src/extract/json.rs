//! JSON payload → [`DataSet`] conversion.
//!
//! Supported payloads at the configured field path:
//! - An array of objects: `[{"strGlass": "Coupe"}, ...]` (keys become columns, first-seen order)
//! - `null` or `[]`: an empty dataset
//!
//! The field path uses dot notation (e.g. `data.items`); an empty path selects the body itself.

use crate::error::ExtractionErrorKind;
use crate::types::{DataSet, DataType, Field, Schema, Value};

/// Locate the tabular payload in `body` and convert it.
pub fn payload_to_dataset(body: &serde_json::Value, data_field: &str) -> Result<DataSet, ExtractionErrorKind> {
    let payload = get_by_dot_path(body, data_field).ok_or_else(|| ExtractionErrorKind::MissingField {
        path: data_field.to_string(),
    })?;

    match payload {
        serde_json::Value::Null => Ok(DataSet::default()),
        serde_json::Value::Array(items) => records_to_dataset(items),
        other => Err(ExtractionErrorKind::Malformed {
            message: format!(
                "field '{data_field}' must hold an array of objects, found {}",
                json_kind(other)
            ),
        }),
    }
}

/// Convert an array of JSON objects to a dataset, inferring one type per column.
pub fn records_to_dataset(records: &[serde_json::Value]) -> Result<DataSet, ExtractionErrorKind> {
    let mut objects = Vec::with_capacity(records.len());
    let mut names: Vec<String> = Vec::new();
    for (idx0, v) in records.iter().enumerate() {
        let obj = v.as_object().ok_or_else(|| ExtractionErrorKind::Malformed {
            message: format!("record {} is not a json object", idx0 + 1),
        })?;
        for key in obj.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let types: Vec<DataType> = names
        .iter()
        .map(|name| infer_type(objects.iter().filter_map(|o| o.get(name))))
        .collect();

    let rows = objects
        .iter()
        .map(|obj| {
            names
                .iter()
                .zip(types.iter())
                .map(|(name, t)| obj.get(name).map(|v| convert_json_value(v, *t)).unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    let fields = names
        .into_iter()
        .zip(types)
        .map(|(n, t)| Field::new(n, t))
        .collect();
    Ok(DataSet::new(Schema::new(fields), rows))
}

fn get_by_dot_path<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        match current {
            serde_json::Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

fn infer_type<'a>(values: impl Iterator<Item = &'a serde_json::Value>) -> DataType {
    let mut seen: Option<DataType> = None;
    for v in values {
        let t = match v {
            serde_json::Value::Null => continue,
            serde_json::Value::Bool(_) => DataType::Bool,
            serde_json::Value::Number(n) if n.is_i64() => DataType::Int64,
            serde_json::Value::Number(_) => DataType::Float64,
            _ => DataType::Utf8,
        };
        seen = Some(match (seen, t) {
            (None, t) => t,
            (Some(a), b) if a == b => a,
            (Some(DataType::Int64), DataType::Float64) | (Some(DataType::Float64), DataType::Int64) => {
                DataType::Float64
            }
            _ => return DataType::Utf8,
        });
    }
    seen.unwrap_or(DataType::Utf8)
}

fn convert_json_value(v: &serde_json::Value, data_type: DataType) -> Value {
    match (v, data_type) {
        (serde_json::Value::Null, _) => Value::Null,
        (serde_json::Value::Bool(b), DataType::Bool) => Value::Bool(*b),
        (serde_json::Value::Number(n), DataType::Int64) => n.as_i64().map(Value::Int64).unwrap_or(Value::Null),
        (serde_json::Value::Number(n), DataType::Float64) => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
        (serde_json::Value::String(s), _) => Value::Utf8(s.clone()),
        (other, _) => Value::Utf8(other.to_string()),
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
