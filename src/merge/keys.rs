//! Natural key → surrogate key lookups.

use std::collections::HashMap;

use crate::error::{MergeError, MergeResult};
use crate::types::{DataSet, KeyValue, Value};
use crate::warehouse::TargetTable;

/// Maps natural keys of a target table snapshot to the column other tables reference it by.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    entries: HashMap<Vec<KeyValue>, (KeyValue, Value)>,
}

impl KeyIndex {
    /// Index `snapshot` (the current contents of `table`) by `key_columns`.
    ///
    /// When several rows share a key (e.g. cocktails with the same name in different glasses)
    /// the smallest referenced value wins, so lookups are stable across runs.
    pub fn from_table(table: TargetTable, snapshot: &DataSet, key_columns: &[&str]) -> MergeResult<Self> {
        let value_column = table.key_column();
        let idx = column_positions(table, table.name(), snapshot, key_columns)?;
        let value_idx = column_positions(table, table.name(), snapshot, &[value_column])?[0];

        let mut entries: HashMap<Vec<KeyValue>, (KeyValue, Value)> = HashMap::with_capacity(snapshot.row_count());
        for row in &snapshot.rows {
            let key: Vec<KeyValue> = idx.iter().map(|i| KeyValue::from(&row[*i])).collect();
            let value = &row[value_idx];
            let rank = KeyValue::from(value);
            match entries.get(&key) {
                Some((current, _)) if *current <= rank => {}
                _ => {
                    entries.insert(key, (rank, value.clone()));
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &[KeyValue]) -> Option<&Value> {
        self.entries.get(key).map(|(_, v)| v)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Positions of `columns` in `data`, or a [`MergeError::MissingColumn`] naming `dataset`.
pub(crate) fn column_positions(
    table: TargetTable,
    dataset: &str,
    data: &DataSet,
    columns: &[&str],
) -> MergeResult<Vec<usize>> {
    columns
        .iter()
        .map(|c| {
            data.schema.index_of(c).ok_or_else(|| MergeError::MissingColumn {
                table,
                dataset: dataset.to_string(),
                column: (*c).to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cocktails() -> DataSet {
        DataSet::new(
            TargetTable::DimCocktail.schema(),
            vec![
                vec![Value::Int64(4), Value::Int64(2), Value::from("Mojito")],
                vec![Value::Int64(1), Value::Int64(1), Value::from("Mojito")],
                vec![Value::Int64(2), Value::Int64(1), Value::from("Negroni")],
            ],
        )
    }

    #[test]
    fn lowest_surrogate_wins_on_shared_names() {
        let index = KeyIndex::from_table(TargetTable::DimCocktail, &cocktails(), &["name"]).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&[KeyValue::Utf8("Mojito".into())]), Some(&Value::Int64(1)));
        assert!(index.get(&[KeyValue::Utf8("Daiquiri".into())]).is_none());
    }

    #[test]
    fn composite_keys() {
        let index = KeyIndex::from_table(TargetTable::DimCocktail, &cocktails(), &["name", "glass_id"]).unwrap();
        assert_eq!(
            index.get(&[KeyValue::Utf8("Mojito".into()), KeyValue::Int64(2)]),
            Some(&Value::Int64(4))
        );
    }

    #[test]
    fn date_dimension_is_keyed_by_its_natural_key() {
        let snapshot = crate::calendar::generate_date_dimension(
            chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(2, 0, 0).unwrap(),
            crate::calendar::Granularity::Hour,
        );
        let index = KeyIndex::from_table(TargetTable::DimDate, &snapshot, &["date_id"]).unwrap();
        let key = [KeyValue::Utf8("2020-01-01T01:00:00".into())];
        assert_eq!(index.get(&key), Some(&Value::from("2020-01-01T01:00:00")));
    }

    #[test]
    fn missing_column_names_the_table() {
        let err = KeyIndex::from_table(TargetTable::DimBar, &cocktails(), &["bar"]).unwrap_err();
        assert_eq!(err.to_string(), "'dim_bar' has no column 'bar' (needed for 'dim_bar')");
    }
}
