//! Pure merge planning: reference resolution and insert selection over in-memory snapshots.

use std::collections::HashSet;

use crate::error::MergeResult;
use crate::types::{DataSet, DataType, Field, KeyValue, Schema};
use crate::warehouse::TargetTable;

use super::keys::{column_positions, KeyIndex};

/// Maximum number of unresolved keys kept as samples.
pub const MAX_UNRESOLVED_SAMPLES: usize = 5;

/// One foreign-key join: candidate `columns` looked up in `index`, result stored in `output`.
#[derive(Debug, Clone, Copy)]
pub struct Lookup<'a> {
    pub columns: &'a [&'a str],
    pub output: &'a str,
    pub reference: TargetTable,
    pub index: &'a KeyIndex,
}

/// Candidate rows whose references all resolved, plus what was left out.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Candidate columns followed by one column per lookup.
    pub rows: DataSet,
    pub unresolved: usize,
    /// Up to [`MAX_UNRESOLVED_SAMPLES`] distinct `reference=key` renderings.
    pub samples: Vec<String>,
}

/// Rows to insert into a target table and how the other candidates were classified.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertPlan {
    /// Rows shaped like [`TargetTable::insert_schema`].
    pub rows: DataSet,
    pub candidates: usize,
    /// First occurrences of natural keys that `existing` already holds; one per distinct key.
    pub already_present: usize,
    /// Repeats of a key seen earlier in the batch, counted the same on every run.
    pub duplicates_in_batch: usize,
    /// Candidates with a null in the natural key.
    pub null_keys: usize,
}

/// Join `candidates` to each lookup's index. A row is kept only when every lookup resolves.
pub fn resolve_references(
    table: TargetTable,
    dataset: &str,
    candidates: &DataSet,
    lookups: &[Lookup<'_>],
) -> MergeResult<Resolution> {
    let positions = lookups
        .iter()
        .map(|l| column_positions(table, dataset, candidates, l.columns))
        .collect::<MergeResult<Vec<_>>>()?;

    let mut fields = candidates.schema.fields.clone();
    for lookup in lookups {
        let data_type = lookup.reference.schema().field(lookup.reference.key_column()).map(|f| f.data_type);
        fields.push(Field::new(lookup.output, data_type.unwrap_or(DataType::Int64)));
    }

    let mut rows = Vec::with_capacity(candidates.row_count());
    let mut unresolved = 0;
    let mut samples: Vec<String> = Vec::new();
    'rows: for row in &candidates.rows {
        let mut resolved = Vec::with_capacity(lookups.len());
        for (lookup, idx) in lookups.iter().zip(&positions) {
            let key: Vec<KeyValue> = idx.iter().map(|i| KeyValue::from(&row[*i])).collect();
            let hit = if key.iter().any(KeyValue::is_null) {
                None
            } else {
                lookup.index.get(&key)
            };
            match hit {
                Some(v) => resolved.push(v.clone()),
                None => {
                    unresolved += 1;
                    let sample = format!("{}={}", lookup.reference, render_key(&key));
                    if samples.len() < MAX_UNRESOLVED_SAMPLES && !samples.contains(&sample) {
                        samples.push(sample);
                    }
                    continue 'rows;
                }
            }
        }
        let mut out = row.clone();
        out.extend(resolved);
        rows.push(out);
    }

    Ok(Resolution {
        rows: DataSet::new(Schema::new(fields), rows),
        unresolved,
        samples,
    })
}

/// Select the rows of `resolved` that `table` does not hold yet.
///
/// Rows are projected onto the table's insert columns. A row is skipped when its natural key
/// contains a null, repeats an earlier row of the batch, or is already in `existing`, checked in
/// that order.
pub fn plan_inserts(table: TargetTable, resolved: &DataSet, existing: &DataSet) -> MergeResult<InsertPlan> {
    let insert_schema = table.insert_schema();
    let names: Vec<&str> = insert_schema.field_names().collect();
    let projection = column_positions(table, "resolved rows", resolved, &names)?;
    let key_in_resolved = column_positions(table, "resolved rows", resolved, table.natural_key())?;
    let key_in_existing = column_positions(table, table.name(), existing, table.natural_key())?;

    let present: HashSet<Vec<KeyValue>> = existing
        .rows
        .iter()
        .map(|row| key_in_existing.iter().map(|i| KeyValue::from(&row[*i])).collect())
        .collect();
    let mut seen: HashSet<Vec<KeyValue>> = HashSet::with_capacity(resolved.row_count());

    let mut plan = InsertPlan {
        rows: DataSet::empty(insert_schema),
        candidates: resolved.row_count(),
        already_present: 0,
        duplicates_in_batch: 0,
        null_keys: 0,
    };
    for row in &resolved.rows {
        let key: Vec<KeyValue> = key_in_resolved.iter().map(|i| KeyValue::from(&row[*i])).collect();
        if key.iter().any(KeyValue::is_null) {
            plan.null_keys += 1;
        } else if !seen.insert(key.clone()) {
            plan.duplicates_in_batch += 1;
        } else if present.contains(&key) {
            plan.already_present += 1;
        } else {
            plan.rows.rows.push(projection.iter().map(|i| row[*i].clone()).collect());
        }
    }
    Ok(plan)
}

fn render_key(key: &[KeyValue]) -> String {
    match key {
        [single] => single.to_string(),
        many => format!("({})", many.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")),
    }
}
