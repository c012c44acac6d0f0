//! Row mapping for [`crate::types::DataSet`].

use crate::types::{DataSet, Value};

/// Returns a new [`DataSet`] by applying `mapper` to every row.
///
/// This is a convenience wrapper around [`DataSet::map_rows`].
///
/// # Panics
///
/// Panics if `mapper` returns rows with a different length than the schema field count.
pub fn map<F>(dataset: &DataSet, mapper: F) -> DataSet
where
    F: FnMut(&[Value]) -> Vec<Value>,
{
    dataset.map_rows(mapper)
}

/// Applies `f` to every value of column `idx`, leaving other columns untouched.
pub fn map_column<F>(dataset: &DataSet, idx: usize, mut f: F) -> DataSet
where
    F: FnMut(&Value) -> Value,
{
    map(dataset, |row| {
        let mut out = row.to_vec();
        out[idx] = f(&row[idx]);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::{map, map_column};
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn transactions() -> DataSet {
        let schema = Schema::new(vec![
            Field::new("drink", DataType::Utf8),
            Field::new("amount", DataType::Float64),
        ]);
        DataSet::new(
            schema,
            vec![
                vec![Value::from("mojito"), Value::Float64(7.5)],
                vec![Value::from("negroni"), Value::Null],
            ],
        )
    }

    #[test]
    fn map_rows_transforms_values_and_preserves_schema() {
        let ds = transactions();
        let out = map(&ds, |row| {
            let amount = match &row[1] {
                Value::Float64(v) => Value::Float64(v * 2.0),
                other => other.clone(),
            };
            vec![row[0].clone(), amount]
        });

        assert_eq!(out.schema, ds.schema);
        assert_eq!(out.rows[0][1], Value::Float64(15.0));
        assert_eq!(out.rows[1][1], Value::Null);
        // Original unchanged
        assert_eq!(ds.rows[0][1], Value::Float64(7.5));
    }

    #[test]
    fn map_column_touches_one_column() {
        let ds = transactions();
        let out = map_column(&ds, 0, |v| match v {
            Value::Utf8(s) => Value::Utf8(s.to_uppercase()),
            other => other.clone(),
        });
        assert_eq!(out.rows[0], vec![Value::from("MOJITO"), Value::Float64(7.5)]);
        assert_eq!(out.rows[1][1], Value::Null);
    }
}
