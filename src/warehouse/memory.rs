//! In-process warehouse.

use std::collections::{BTreeMap, HashSet};

use crate::error::{WarehouseError, WarehouseResult};
use crate::types::{DataSet, DataType, KeyValue, Schema, Value};

use super::{check_insert_schema, validate_identifier, TargetTable, Warehouse, MERGE_ORDER};

/// Tables held in memory.
///
/// Target tables behave like the DuckDB DDL: surrogate keys come from a per-table counter
/// starting at 1, natural keys are unique and foreign keys must resolve.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    tables: BTreeMap<String, DataSet>,
    sequences: BTreeMap<TargetTable, i64>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every table, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    fn table(&self, name: &str) -> WarehouseResult<&DataSet> {
        self.tables
            .get(name)
            .ok_or_else(|| WarehouseError::TableNotFound(name.to_string()))
    }

    fn key_set(&self, table: TargetTable, columns: &[&str]) -> WarehouseResult<HashSet<Vec<KeyValue>>> {
        let data = self.table(table.name())?;
        let idx = column_indices(&data.schema, columns, table)?;
        Ok(data
            .rows
            .iter()
            .map(|row| idx.iter().map(|i| KeyValue::from(&row[*i])).collect())
            .collect())
    }
}

fn column_indices(schema: &Schema, columns: &[&str], table: TargetTable) -> WarehouseResult<Vec<usize>> {
    columns
        .iter()
        .map(|c| {
            schema.index_of(c).ok_or_else(|| WarehouseError::SchemaMismatch {
                table: table.name().to_string(),
                message: format!("missing column '{c}'"),
            })
        })
        .collect()
}

/// Conform one incoming value to the column type; integers widen into float columns.
fn conform(table: TargetTable, column: &str, data_type: DataType, value: &Value) -> WarehouseResult<Value> {
    match (value, data_type) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Int64(v), DataType::Float64) => Ok(Value::Float64(*v as f64)),
        (v, t) if v.data_type() == Some(t) => Ok(v.clone()),
        (v, t) => Err(WarehouseError::SchemaMismatch {
            table: table.name().to_string(),
            message: format!("column '{column}' expects {t}, got '{v}'"),
        }),
    }
}

impl Warehouse for MemoryWarehouse {
    fn table_exists(&self, name: &str) -> WarehouseResult<bool> {
        Ok(self.tables.contains_key(name))
    }

    fn read_table(&self, name: &str) -> WarehouseResult<DataSet> {
        self.table(name).cloned()
    }

    fn replace_table(&mut self, name: &str, data: &DataSet) -> WarehouseResult<()> {
        validate_identifier(name)?;
        self.tables.insert(name.to_string(), data.clone());
        Ok(())
    }

    fn append(&mut self, table: TargetTable, data: &DataSet) -> WarehouseResult<usize> {
        check_insert_schema(table, data)?;
        self.table(table.name())?;
        let insert_schema = table.insert_schema();

        let mut rows = Vec::with_capacity(data.rows.len());
        for row in &data.rows {
            let conformed = row
                .iter()
                .zip(&insert_schema.fields)
                .map(|(v, f)| conform(table, &f.name, f.data_type, v))
                .collect::<WarehouseResult<Vec<_>>>()?;
            rows.push(conformed);
        }

        let nk_idx = column_indices(&insert_schema, table.natural_key(), table)?;
        let mut seen = self.key_set(table, table.natural_key())?;
        for row in &rows {
            let key: Vec<KeyValue> = nk_idx.iter().map(|i| KeyValue::from(&row[*i])).collect();
            if key.iter().any(KeyValue::is_null) {
                return Err(WarehouseError::ConstraintViolation {
                    table: table.name().to_string(),
                    message: format!("null in natural key {:?}", table.natural_key()),
                });
            }
            if !seen.insert(key.clone()) {
                return Err(WarehouseError::ConstraintViolation {
                    table: table.name().to_string(),
                    message: format!("duplicate natural key ({})", join_key(&key)),
                });
            }
        }

        for (column, referenced) in table.foreign_keys() {
            let col_idx = column_indices(&insert_schema, &[*column], table)?[0];
            let known = self.key_set(*referenced, &[referenced.key_column()])?;
            for row in &rows {
                let key = vec![KeyValue::from(&row[col_idx])];
                if !known.contains(&key) {
                    return Err(WarehouseError::ConstraintViolation {
                        table: table.name().to_string(),
                        message: format!("{column}={} not present in {referenced}", join_key(&key)),
                    });
                }
            }
        }

        let inserted = rows.len();
        let mut next = self.sequences.get(&table).copied().unwrap_or(0);
        let target = self
            .tables
            .get_mut(table.name())
            .ok_or_else(|| WarehouseError::TableNotFound(table.name().to_string()))?;
        for row in rows {
            let full = match table.surrogate_key() {
                Some(_) => {
                    next += 1;
                    let mut full = Vec::with_capacity(row.len() + 1);
                    full.push(Value::Int64(next));
                    full.extend(row);
                    full
                }
                None => row,
            };
            target.rows.push(full);
        }
        self.sequences.insert(table, next);
        Ok(inserted)
    }

    fn create_target_tables(&mut self) -> WarehouseResult<()> {
        for table in MERGE_ORDER {
            self.tables
                .entry(table.name().to_string())
                .or_insert_with(|| DataSet::empty(table.schema()));
        }
        Ok(())
    }
}

fn join_key(key: &[KeyValue]) -> String {
    key.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
