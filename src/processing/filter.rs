//! Row filtering for [`crate::types::DataSet`].

use crate::types::{DataSet, Value};

/// Returns a new [`DataSet`] containing only rows for which `predicate` returns `true`.
///
/// This is a convenience wrapper around [`DataSet::filter_rows`].
pub fn filter<F>(dataset: &DataSet, predicate: F) -> DataSet
where
    F: FnMut(&[Value]) -> bool,
{
    dataset.filter_rows(predicate)
}

#[cfg(test)]
mod tests {
    use super::filter;
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn stock_dataset() -> DataSet {
        let schema = Schema::new(vec![
            Field::new("bar", DataType::Utf8),
            Field::new("glass_type", DataType::Utf8),
            Field::new("stock", DataType::Int64),
        ]);

        let rows = vec![
            vec![Value::from("London"), Value::from("Coupe Glass"), Value::Int64(4)],
            vec![Value::from("London"), Value::Null, Value::Int64(0)],
            vec![Value::from("Budapest"), Value::from("Highball Glass"), Value::Int64(9)],
        ];

        DataSet::new(schema, rows)
    }

    #[test]
    fn filter_rows_by_numeric_predicate() {
        let ds = stock_dataset();
        let stock_idx = ds.schema.index_of("stock").unwrap();

        let out = filter(&ds, |row| matches!(row.get(stock_idx), Some(Value::Int64(v)) if *v > 0));

        assert_eq!(out.schema, ds.schema);
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.rows[1][0], Value::from("Budapest"));
        // Original unchanged
        assert_eq!(ds.row_count(), 3);
    }

    #[test]
    fn filter_rows_can_return_empty_dataset() {
        let ds = stock_dataset();
        let out = filter(&ds, |_| false);
        assert_eq!(out.schema, ds.schema);
        assert!(out.rows.is_empty());
    }
}
