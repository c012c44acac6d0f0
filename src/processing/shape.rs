//! Source-specific shaping applied right after a raw read.
//!
//! [`apply_shaping`] runs the configured steps in a fixed order:
//! drop columns → rename columns → deduplicate rows → title-case text columns.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ExtractionErrorKind;
use crate::types::{row_key, DataSet, DataType, Field, Schema, Value};

use super::filter::filter;
use super::map::map_column;

/// Shaping steps for one data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapingOptions {
    /// Columns removed from the raw data.
    #[serde(default)]
    pub drop_columns: Vec<String>,
    /// `old name -> new name` renames.
    #[serde(default)]
    pub columns_mapping: BTreeMap<String, String>,
    /// Text columns whose words are capitalized (after renaming).
    #[serde(default)]
    pub capitalize_columns: Vec<String>,
}

/// Runs drop → rename → dedup → title-case.
pub fn apply_shaping(dataset: &DataSet, opts: &ShapingOptions) -> Result<DataSet, ExtractionErrorKind> {
    let dropped = drop_columns(dataset, &opts.drop_columns)?;
    let renamed = rename_columns(&dropped, &opts.columns_mapping)?;
    let deduped = dedup_rows(&renamed);
    title_case_columns(&deduped, &opts.capitalize_columns)
}

/// Removes the named columns. Every name must exist.
pub fn drop_columns(dataset: &DataSet, columns: &[String]) -> Result<DataSet, ExtractionErrorKind> {
    if columns.is_empty() {
        return Ok(dataset.clone());
    }
    for c in columns {
        require_column(&dataset.schema, c)?;
    }

    let keep: Vec<usize> = dataset
        .schema
        .fields
        .iter()
        .enumerate()
        .filter(|(_, f)| !columns.contains(&f.name))
        .map(|(i, _)| i)
        .collect();
    Ok(select_indices(dataset, &keep))
}

/// Keeps only `columns`, in that order. Every name must exist.
pub fn select_columns(dataset: &DataSet, columns: &[&str]) -> Result<DataSet, ExtractionErrorKind> {
    let idxs = columns
        .iter()
        .map(|c| require_column(&dataset.schema, c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(select_indices(dataset, &idxs))
}

/// Renames columns per `mapping`. Every source name must exist and targets must not collide.
pub fn rename_columns(
    dataset: &DataSet,
    mapping: &BTreeMap<String, String>,
) -> Result<DataSet, ExtractionErrorKind> {
    if mapping.is_empty() {
        return Ok(dataset.clone());
    }
    for from in mapping.keys() {
        require_column(&dataset.schema, from)?;
    }

    let fields: Vec<Field> = dataset
        .schema
        .fields
        .iter()
        .map(|f| match mapping.get(&f.name) {
            Some(to) => Field::new(to.clone(), f.data_type),
            None => f.clone(),
        })
        .collect();

    let mut seen = HashSet::new();
    for f in &fields {
        if !seen.insert(f.name.as_str()) {
            return Err(ExtractionErrorKind::Malformed {
                message: format!("rename produces duplicate column '{}'", f.name),
            });
        }
    }

    Ok(DataSet::new(Schema::new(fields), dataset.rows.clone()))
}

/// Removes rows that are exactly equal to an earlier row; first occurrence wins.
pub fn dedup_rows(dataset: &DataSet) -> DataSet {
    let mut seen = HashSet::with_capacity(dataset.row_count());
    filter(dataset, |row| seen.insert(row_key(row)))
}

/// Title-cases the string values of the named columns. Nulls and non-string values are left as-is.
pub fn title_case_columns(dataset: &DataSet, columns: &[String]) -> Result<DataSet, ExtractionErrorKind> {
    let mut out = dataset.clone();
    for c in columns {
        let idx = require_column(&out.schema, c)?;
        out = map_column(&out, idx, |v| match v {
            Value::Utf8(s) => Value::Utf8(title_case(s)),
            other => other.clone(),
        });
    }
    Ok(out)
}

/// Word capitalization: a letter is upper-cased when it follows a non-letter, lower-cased otherwise.
///
/// `"old-fashioned glass"` becomes `"Old-Fashioned Glass"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}

/// Sets column `name` to `value` on every row, appending the column if it does not exist.
pub fn with_constant_column(dataset: &DataSet, name: &str, data_type: DataType, value: Value) -> DataSet {
    match dataset.schema.index_of(name) {
        Some(idx) => {
            let mut out = map_column(dataset, idx, |_| value.clone());
            out.schema.fields[idx].data_type = data_type;
            out
        }
        None => {
            let mut fields = dataset.schema.fields.clone();
            fields.push(Field::new(name, data_type));
            let rows = dataset
                .rows
                .iter()
                .map(|row| {
                    let mut out = row.clone();
                    out.push(value.clone());
                    out
                })
                .collect();
            DataSet::new(Schema::new(fields), rows)
        }
    }
}

/// Stacks datasets that share the same column names (in the same order).
///
/// Parts without columns (an empty read) are skipped. Column types are widened when the parts
/// disagree (`int64` + `float64` → `float64`, anything else → `utf8`).
pub fn concat(parts: Vec<DataSet>) -> Result<DataSet, ExtractionErrorKind> {
    let mut parts = parts.into_iter().filter(|p| !p.schema.fields.is_empty());
    let Some(mut out) = parts.next() else {
        return Ok(DataSet::default());
    };

    for part in parts {
        let names: Vec<&str> = part.schema.field_names().collect();
        let expected: Vec<&str> = out.schema.field_names().collect();
        if names != expected {
            return Err(ExtractionErrorKind::Malformed {
                message: format!("cannot concatenate columns {names:?} onto {expected:?}"),
            });
        }
        for (dst, src) in out.schema.fields.iter_mut().zip(part.schema.fields.iter()) {
            dst.data_type = widen(dst.data_type, src.data_type);
        }
        out.rows.extend(part.rows);
    }

    let types: Vec<DataType> = out.schema.fields.iter().map(|f| f.data_type).collect();
    if types.contains(&DataType::Float64) || types.contains(&DataType::Utf8) {
        out.rows = out
            .rows
            .into_iter()
            .map(|row| row.into_iter().zip(types.iter()).map(|(v, t)| conform(v, *t)).collect())
            .collect();
    }
    Ok(out)
}

fn widen(a: DataType, b: DataType) -> DataType {
    match (a, b) {
        _ if a == b => a,
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => DataType::Float64,
        _ => DataType::Utf8,
    }
}

fn conform(v: Value, t: DataType) -> Value {
    match (v, t) {
        (Value::Int64(i), DataType::Float64) => Value::Float64(i as f64),
        (Value::Null, _) => Value::Null,
        (Value::Utf8(s), DataType::Utf8) => Value::Utf8(s),
        (other, DataType::Utf8) => Value::Utf8(other.to_string()),
        (other, _) => other,
    }
}

fn select_indices(dataset: &DataSet, idxs: &[usize]) -> DataSet {
    let fields = idxs.iter().map(|&i| dataset.schema.fields[i].clone()).collect();
    let rows = dataset
        .rows
        .iter()
        .map(|row| idxs.iter().map(|&i| row[i].clone()).collect())
        .collect();
    DataSet::new(Schema::new(fields), rows)
}

fn require_column(schema: &Schema, name: &str) -> Result<usize, ExtractionErrorKind> {
    schema
        .index_of(name)
        .ok_or_else(|| ExtractionErrorKind::MissingColumn {
            column: name.to_string(),
            available: schema.field_names().map(str::to_string).collect(),
        })
}
