//! Dimensional merge: staging rows → dimension and fact rows.
//!
//! Every target table is merged the same way:
//!
//! 1. project the staging table(s) onto candidate rows
//! 2. resolve foreign keys against the already-merged dimensions ([`resolve_references`])
//! 3. drop rows whose natural key is already present or repeats within the batch
//!    ([`plan_inserts`])
//! 4. append the remainder, letting storage assign surrogate keys
//!
//! Nothing is ever updated or deleted, so running a merge twice on the same staging data
//! inserts nothing the second time. Steps 2 and 3 are pure functions over snapshots.

pub mod keys;
pub mod plan;

pub use keys::KeyIndex;
pub use plan::{plan_inserts, resolve_references, InsertPlan, Lookup, Resolution, MAX_UNRESOLVED_SAMPLES};

use crate::calendar::Granularity;
use crate::config::StagingTables;
use crate::error::{MergeError, MergeResult, PartialResolutionWarning};
use crate::observability::{PipelineObserver, Stage, StepContext};
use crate::types::{DataSet, DataType, Field, Schema, Value};
use crate::warehouse::{TargetTable, Warehouse};

/// Counts for one table merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub table: TargetTable,
    /// Candidate rows read from staging.
    pub candidates: usize,
    pub inserted: usize,
    /// Distinct natural keys among the candidates that the table already held.
    pub already_present: usize,
    /// Candidates repeating the natural key of an earlier candidate.
    pub duplicates_in_batch: usize,
    /// Candidates with a null natural key.
    pub null_keys: usize,
    /// Candidates excluded because a reference did not resolve.
    pub unresolved: usize,
    pub unresolved_samples: Vec<String>,
}

impl MergeReport {
    /// The non-fatal warning to surface when rows were excluded.
    pub fn warning(&self) -> Option<PartialResolutionWarning> {
        (self.unresolved > 0).then(|| PartialResolutionWarning {
            table: self.table,
            excluded: self.unresolved,
            samples: self.unresolved_samples.clone(),
        })
    }
}

/// Result of [`merge_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged(MergeReport),
    /// No staging data was ever written for the table.
    Skipped { table: TargetTable, reason: String },
}

impl MergeOutcome {
    pub fn table(&self) -> TargetTable {
        match self {
            MergeOutcome::Merged(r) => r.table,
            MergeOutcome::Skipped { table, .. } => *table,
        }
    }

    pub fn report(&self) -> Option<&MergeReport> {
        match self {
            MergeOutcome::Merged(r) => Some(r),
            MergeOutcome::Skipped { .. } => None,
        }
    }
}

/// Send `outcome` to `observer`: `on_merge` plus `on_partial_resolution` when rows were
/// excluded, or `on_skipped`.
pub fn report_outcome(observer: &dyn PipelineObserver, outcome: &MergeOutcome) {
    match outcome {
        MergeOutcome::Merged(report) => {
            observer.on_merge(report);
            if let Some(warning) = report.warning() {
                observer.on_partial_resolution(&warning);
            }
        }
        MergeOutcome::Skipped { table, reason } => {
            observer.on_skipped(&StepContext::new(table.name(), Stage::Merge), reason);
        }
    }
}

/// How a staging column feeds a candidate column.
struct ColumnMap {
    staging: &'static str,
    candidate: &'static str,
    data_type: DataType,
}

const fn col(staging: &'static str, candidate: &'static str, data_type: DataType) -> ColumnMap {
    ColumnMap {
        staging,
        candidate,
        data_type,
    }
}

/// A foreign-key join from candidate columns to a referenced table's natural key.
struct LookupSpec {
    candidate: &'static [&'static str],
    reference: TargetTable,
    reference_key: &'static [&'static str],
    output: &'static str,
}

/// Candidate column holding the date dimension key derived from a transaction time.
const DATE_KEY: &str = "date_key";

const BAR_COLUMNS: &[ColumnMap] = &[col("bar", "name", DataType::Utf8)];
const GLASS_COLUMNS: &[ColumnMap] = &[col("glass", "name", DataType::Utf8)];
const COCKTAIL_COLUMNS: &[ColumnMap] = &[col("drink", "name", DataType::Utf8), col("glass", "glass", DataType::Utf8)];
const STOCK_COLUMNS: &[ColumnMap] = &[
    col("bar", "bar", DataType::Utf8),
    col("glass_type", "glass", DataType::Utf8),
    col("stock", "stock", DataType::Int64),
];
const TRANSACTION_COLUMNS: &[ColumnMap] = &[
    col("bar", "bar", DataType::Utf8),
    col("drink", "drink", DataType::Utf8),
    col("time", "date", DataType::Timestamp),
    col("amount", "amount", DataType::Float64),
];

const DATE_COLUMNS: &[ColumnMap] = &[
    col("date_id", "date_id", DataType::Utf8),
    col("date", "date", DataType::Timestamp),
    col("day_name", "day_name", DataType::Utf8),
    col("calendar_day", "calendar_day", DataType::Int64),
    col("hour", "hour", DataType::Int64),
    col("calendar_week", "calendar_week", DataType::Int64),
    col("calendar_month", "calendar_month", DataType::Utf8),
    col("quarter", "quarter", DataType::Int64),
    col("year", "year", DataType::Int64),
];

fn lookups_for(table: TargetTable) -> &'static [LookupSpec] {
    const BAR: LookupSpec = LookupSpec {
        candidate: &["bar"],
        reference: TargetTable::DimBar,
        reference_key: &["name"],
        output: "bar_id",
    };
    const GLASS: LookupSpec = LookupSpec {
        candidate: &["glass"],
        reference: TargetTable::DimGlass,
        reference_key: &["name"],
        output: "glass_id",
    };
    const COCKTAIL: LookupSpec = LookupSpec {
        candidate: &["drink"],
        reference: TargetTable::DimCocktail,
        reference_key: &["name"],
        output: "cocktail_id",
    };
    const DATE: LookupSpec = LookupSpec {
        candidate: &[DATE_KEY],
        reference: TargetTable::DimDate,
        reference_key: &["date_id"],
        output: "date_id",
    };
    match table {
        TargetTable::DimCocktail => &[GLASS],
        TargetTable::FactStock => &[BAR, GLASS],
        TargetTable::FactTransaction => &[BAR, COCKTAIL, DATE],
        _ => &[],
    }
}

/// Merge the staging data for `table` into it.
///
/// Fails with [`MergeError::MissingTarget`] / [`MergeError::MissingReference`] when the table or
/// a table it references has not been created. A table whose staging tables were never written
/// is skipped.
pub fn merge_table(
    warehouse: &mut dyn Warehouse,
    table: TargetTable,
    staging: &StagingTables,
    granularity: Granularity,
) -> MergeResult<MergeOutcome> {
    if !warehouse.table_exists(table.name())? {
        return Err(MergeError::MissingTarget { table });
    }
    for reference in table.dependencies() {
        if !warehouse.table_exists(reference.name())? {
            return Err(MergeError::MissingReference { table, reference });
        }
    }

    let Some((label, candidates)) = load_candidates(&*warehouse, table, staging, granularity)? else {
        return Ok(MergeOutcome::Skipped {
            table,
            reason: format!("no staging data for '{table}'"),
        });
    };

    let specs = lookups_for(table);
    let mut indexes = Vec::with_capacity(specs.len());
    for spec in specs {
        let snapshot = warehouse.read_table(spec.reference.name())?;
        indexes.push(KeyIndex::from_table(spec.reference, &snapshot, spec.reference_key)?);
    }
    let lookups: Vec<Lookup<'_>> = specs
        .iter()
        .zip(&indexes)
        .map(|(spec, index)| Lookup {
            columns: spec.candidate,
            output: spec.output,
            reference: spec.reference,
            index,
        })
        .collect();

    let resolution = resolve_references(table, &label, &candidates, &lookups)?;
    let existing = warehouse.read_table(table.name())?;
    let plan = plan_inserts(table, &resolution.rows, &existing)?;
    let inserted = warehouse.append(table, &plan.rows)?;

    tracing::debug!(table = %table, staging = %label, inserted, "merged");
    Ok(MergeOutcome::Merged(MergeReport {
        table,
        candidates: candidates.row_count(),
        inserted,
        already_present: plan.already_present,
        duplicates_in_batch: plan.duplicates_in_batch,
        null_keys: plan.null_keys,
        unresolved: resolution.unresolved,
        unresolved_samples: resolution.samples,
    }))
}

/// Candidate rows for `table` and the staging table name(s) they came from; `None` when no
/// staging table exists.
fn load_candidates(
    warehouse: &dyn Warehouse,
    table: TargetTable,
    staging: &StagingTables,
    granularity: Granularity,
) -> MergeResult<Option<(String, DataSet)>> {
    let (sources, columns): (Vec<&str>, &[ColumnMap]) = match table {
        TargetTable::DimBar => (vec![staging.stock.as_str(), staging.transaction.as_str()], BAR_COLUMNS),
        TargetTable::DimGlass => (vec![staging.glass.as_str()], GLASS_COLUMNS),
        TargetTable::DimCocktail => (vec![staging.cocktail.as_str()], COCKTAIL_COLUMNS),
        TargetTable::DimDate => (vec![staging.date.as_str()], DATE_COLUMNS),
        TargetTable::FactStock => (vec![staging.stock.as_str()], STOCK_COLUMNS),
        TargetTable::FactTransaction => (vec![staging.transaction.as_str()], TRANSACTION_COLUMNS),
    };

    let mut found = Vec::new();
    let mut parts = Vec::new();
    for source in sources {
        if !warehouse.table_exists(source)? {
            continue;
        }
        let data = warehouse.read_table(source)?;
        parts.push(project(table, source, &data, columns)?);
        found.push(source);
    }
    if parts.is_empty() {
        return Ok(None);
    }

    let schema = Schema::new(columns.iter().map(|c| Field::new(c.candidate, c.data_type)).collect());
    let rows = parts.into_iter().flat_map(|p| p.rows).collect();
    let mut candidates = DataSet::new(schema, rows);
    if table == TargetTable::FactTransaction {
        candidates = with_date_key(candidates, granularity);
    }
    Ok(Some((found.join("+"), candidates)))
}

/// Select and type-check the mapped columns of a staging table.
fn project(table: TargetTable, staging: &str, data: &DataSet, columns: &[ColumnMap]) -> MergeResult<DataSet> {
    let names: Vec<&str> = columns.iter().map(|c| c.staging).collect();
    let idx = keys::column_positions(table, staging, data, &names)?;

    let mut rows = Vec::with_capacity(data.row_count());
    for (row_no, row) in data.rows.iter().enumerate() {
        let mut out = Vec::with_capacity(columns.len());
        for (c, i) in columns.iter().zip(&idx) {
            out.push(conform(staging, c, row_no, &row[*i])?);
        }
        rows.push(out);
    }
    let schema = Schema::new(columns.iter().map(|c| Field::new(c.candidate, c.data_type)).collect());
    Ok(DataSet::new(schema, rows))
}

fn conform(staging: &str, column: &ColumnMap, row: usize, value: &Value) -> MergeResult<Value> {
    match (value, column.data_type) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Int64(v), DataType::Float64) => Ok(Value::Float64(*v as f64)),
        (v, t) if v.data_type() == Some(t) => Ok(v.clone()),
        (v, t) => Err(MergeError::InvalidValue {
            staging: staging.to_string(),
            column: column.staging.to_string(),
            row,
            message: format!(
                "expected {t}, found {} '{v}'",
                v.data_type().map(|d| d.to_string()).unwrap_or_default()
            ),
        }),
    }
}

/// Append the date dimension key of each transaction's `date`.
fn with_date_key(candidates: DataSet, granularity: Granularity) -> DataSet {
    let Some(date_idx) = candidates.schema.index_of("date") else {
        return candidates;
    };
    let mut fields = candidates.schema.fields;
    fields.push(Field::new(DATE_KEY, DataType::Utf8));
    let rows = candidates
        .rows
        .into_iter()
        .map(|mut row| {
            let key = row[date_idx]
                .as_timestamp()
                .map(|ts| Value::Utf8(granularity.date_id(ts)))
                .unwrap_or(Value::Null);
            row.push(key);
            row
        })
        .collect();
    DataSet::new(Schema::new(fields), rows)
}
