//! Run orchestration: extract → validate → stage → merge.
//!
//! [`Pipeline::run`] walks the datasets in a fixed order (glass, cocktail, bar stock,
//! transactions), stages each one, optionally creates the target tables and the date dimension
//! (`database.initial_load`), then merges every target table in [`MERGE_ORDER`].
//!
//! Every step reports to the pipeline's [`PipelineObserver`]. A failing dataset either ends the
//! run or is recorded and skipped, per [`FailurePolicy`].

use std::path::Path;
use std::sync::Arc;

use crate::calendar::generate_date_dimension;
use crate::config::{FailurePolicy, PipelineConfig};
use crate::error::{ExtractionError, ExtractionResult, PartialResolutionWarning, PipelineError, PipelineResult};
use crate::extract::{
    extract, fetch_cocktails_by_glass, ApiExtractor, ApiSourceConfig, CsvExtractor, Extractor, HttpTransport,
};
use crate::merge::{merge_table, report_outcome, MergeOutcome};
use crate::observability::{
    report_failure, CompositeObserver, FileObserver, PipelineObserver, Stage, StepContext, StepStats, TracingObserver,
};
use crate::processing::{concat, select_columns, with_constant_column};
use crate::staging::{stage, StageOutcome};
use crate::types::{DataSet, DataType, Value};
use crate::validation::validate_observed;
use crate::warehouse::{TargetTable, Warehouse, MERGE_ORDER};

/// Column stamped onto transaction rows with the configured bar name.
pub const BAR_COLUMN: &str = "bar";

/// Source name used for the combined transaction dataset.
pub const TRANSACTIONS: &str = "transactions";

/// A dataset or table step that failed under [`FailurePolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub dataset: String,
    pub stage: Stage,
    pub error: String,
}

/// The datasets a run extracted and validated; `None` when the dataset failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub glass: Option<DataSet>,
    pub cocktail: Option<DataSet>,
    pub bar_stock: Option<DataSet>,
    pub transactions: Option<DataSet>,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// `(staging table, outcome)` in staging order.
    pub staged: Vec<(String, StageOutcome)>,
    /// Rows generated for the date dimension; `None` unless this was an initial load.
    pub date_rows: Option<usize>,
    pub merges: Vec<MergeOutcome>,
    pub failures: Vec<StepFailure>,
}

impl RunSummary {
    /// True when nothing failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total rows inserted across all target tables.
    pub fn inserted(&self) -> usize {
        self.merges.iter().filter_map(MergeOutcome::report).map(|r| r.inserted).sum()
    }

    pub fn inserted_into(&self, table: TargetTable) -> usize {
        self.merges
            .iter()
            .filter_map(MergeOutcome::report)
            .filter(|r| r.table == table)
            .map(|r| r.inserted)
            .sum()
    }

    pub fn warnings(&self) -> Vec<PartialResolutionWarning> {
        self.merges
            .iter()
            .filter_map(MergeOutcome::report)
            .filter_map(|r| r.warning())
            .collect()
    }
}

/// Observer for a configured run: tracing events, plus a log file when `log_file` is set.
pub fn observer_for(log_file: Option<&Path>) -> Arc<dyn PipelineObserver> {
    match log_file {
        Some(path) => Arc::new(CompositeObserver::new(vec![
            Arc::new(TracingObserver),
            Arc::new(FileObserver::new(path)),
        ])),
        None => Arc::new(TracingObserver),
    }
}

/// One configured pipeline run.
pub struct Pipeline {
    config: PipelineConfig,
    transport: Arc<dyn HttpTransport>,
    observer: Arc<dyn PipelineObserver>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, transport: Arc<dyn HttpTransport>, observer: Arc<dyn PipelineObserver>) -> Self {
        Self {
            config,
            transport,
            observer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every step against `warehouse`.
    pub fn run(&self, warehouse: &mut dyn Warehouse) -> PipelineResult<RunSummary> {
        let mut summary = RunSummary::default();
        let extracted = self.extract_all(&mut summary.failures)?;

        let staging = &self.config.database.staging;
        let datasets = [
            (&staging.glass, &extracted.glass),
            (&staging.cocktail, &extracted.cocktail),
            (&staging.stock, &extracted.bar_stock),
            (&staging.transaction, &extracted.transactions),
        ];
        for (table, dataset) in datasets {
            let Some(dataset) = dataset else {
                continue;
            };
            self.stage_into(warehouse, table, dataset, &mut summary)?;
        }

        if self.config.database.initial_load {
            warehouse.create_target_tables()?;
            let (start, end) = self.config.date_dimension.bounds()?;
            let dates = generate_date_dimension(start, end, self.config.date_dimension.granularity);
            let ctx = StepContext::new(TargetTable::DimDate.name(), Stage::Generate);
            self.observer.on_success(&ctx, StepStats { rows: dates.row_count() });
            summary.date_rows = Some(dates.row_count());
            self.stage_into(warehouse, &staging.date, &dates, &mut summary)?;
        }

        for table in MERGE_ORDER {
            let ctx = StepContext::new(table.name(), Stage::Merge);
            match merge_table(warehouse, table, staging, self.config.date_dimension.granularity) {
                Ok(outcome) => {
                    report_outcome(self.observer.as_ref(), &outcome);
                    summary.merges.push(outcome);
                }
                Err(e) => {
                    let err = PipelineError::from(e);
                    report_failure(self.observer.as_ref(), &ctx, &err, self.config.alert_at_or_above);
                    self.tolerate(&ctx, err, &mut summary.failures)?;
                }
            }
        }

        tracing::info!(
            inserted = summary.inserted(),
            failures = summary.failures.len(),
            "pipeline run finished"
        );
        Ok(summary)
    }

    /// Extract and validate every dataset without touching storage.
    ///
    /// Failures are recorded in `failures` under [`FailurePolicy::Skip`] and returned otherwise.
    pub fn extract_all(&self, failures: &mut Vec<StepFailure>) -> PipelineResult<Extracted> {
        let alert = self.config.alert_at_or_above;
        let observer = self.observer.as_ref();
        let mut out = Extracted::default();

        let glass = ApiExtractor::new(self.config.api.glass.clone(), Arc::clone(&self.transport));
        out.glass = self.step(glass.name(), Stage::Extract, failures, || extract(&glass, observer, alert))?;

        match &out.glass {
            Some(glasses) => {
                let cocktails = CocktailsByGlass {
                    template: &self.config.api.cocktail,
                    glasses: distinct_text(glasses, crate::extract::api::GLASS_COLUMN),
                    transport: Arc::clone(&self.transport),
                };
                out.cocktail = self.step(cocktails.name(), Stage::Extract, failures, || {
                    extract(&cocktails, observer, alert)
                })?;
            }
            None => observer.on_skipped(
                &StepContext::new(&self.config.api.cocktail.name, Stage::Extract),
                "glass list unavailable",
            ),
        }

        let bar_stock = &self.config.csv.bar_stock;
        let contract = self.config.contracts.bar_stock();
        out.bar_stock = self.step(&bar_stock.name, Stage::Extract, failures, || {
            let ds = extract(&CsvExtractor::new(bar_stock.clone()), observer, alert)?;
            validate_observed(&bar_stock.name, ds, &contract, observer, alert)
        })?;

        let contract = self.config.contracts.transaction();
        let columns: Vec<&str> = contract.columns.iter().map(|c| c.name.as_str()).collect();
        let mut batches = Vec::with_capacity(self.config.csv.transactions.len());
        for tx in &self.config.csv.transactions {
            let source = &tx.source;
            let batch = self.step(&source.name, Stage::Extract, failures, || {
                let ds = extract(&CsvExtractor::new(source.clone()), observer, alert)?;
                let ds = validate_observed(&source.name, ds, &contract, observer, alert)?;
                if ds.is_empty() {
                    return Ok(ds);
                }
                let ds = select_columns(&ds, &columns).map_err(|kind| ExtractionError::new(&source.name, source, kind))?;
                Ok(with_constant_column(&ds, BAR_COLUMN, DataType::Utf8, Value::from(tx.bar.as_str())))
            })?;
            // Row-less batches carry no observed column types; leave them out of the stack.
            batches.extend(batch.filter(|b| !b.is_empty()));
        }
        if !self.config.csv.transactions.is_empty() {
            out.transactions = self.step(TRANSACTIONS, Stage::Extract, failures, || {
                concat(batches).map_err(|kind| {
                    PipelineError::from(ExtractionError::new(TRANSACTIONS, &self.config.csv.transactions, kind))
                })
            })?;
        }

        Ok(out)
    }

    fn stage_into(
        &self,
        warehouse: &mut dyn Warehouse,
        table: &str,
        dataset: &DataSet,
        summary: &mut RunSummary,
    ) -> PipelineResult<()> {
        let alert = self.config.alert_at_or_above;
        if let Some(outcome) = self.step(table, Stage::Stage, &mut summary.failures, || {
            stage(warehouse, table, dataset, self.observer.as_ref(), alert)
        })? {
            summary.staged.push((table.to_string(), outcome));
        }
        Ok(())
    }

    /// Run `f`; on error apply the failure policy. Reporting to the observer is `f`'s job.
    fn step<T>(
        &self,
        dataset: &str,
        stage: Stage,
        failures: &mut Vec<StepFailure>,
        f: impl FnOnce() -> PipelineResult<T>,
    ) -> PipelineResult<Option<T>> {
        match f() {
            Ok(v) => Ok(Some(v)),
            Err(err) => {
                let stage = match &err {
                    PipelineError::Validation(_) => Stage::Validate,
                    _ => stage,
                };
                self.tolerate(&StepContext::new(dataset, stage), err, failures)?;
                Ok(None)
            }
        }
    }

    fn tolerate(&self, ctx: &StepContext, err: PipelineError, failures: &mut Vec<StepFailure>) -> PipelineResult<()> {
        match self.config.on_dataset_error {
            FailurePolicy::Abort => Err(err),
            FailurePolicy::Skip => {
                tracing::warn!(dataset = %ctx.dataset, stage = %ctx.stage, "skipping failed step");
                failures.push(StepFailure {
                    dataset: ctx.dataset.clone(),
                    stage: ctx.stage,
                    error: err.to_string(),
                });
                Ok(())
            }
        }
    }
}

/// Cocktail extraction fanned out over the glass list.
struct CocktailsByGlass<'a> {
    template: &'a ApiSourceConfig,
    glasses: Vec<String>,
    transport: Arc<dyn HttpTransport>,
}

impl Extractor for CocktailsByGlass<'_> {
    fn name(&self) -> &str {
        &self.template.name
    }

    fn fetch(&self) -> ExtractionResult<DataSet> {
        fetch_cocktails_by_glass(self.template, &self.glasses, Arc::clone(&self.transport))
    }
}

/// Distinct non-null text values of `column`, in first-seen order.
fn distinct_text(dataset: &DataSet, column: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(values) = dataset.column(column) {
        for v in values.filter_map(Value::as_str) {
            if !out.iter().any(|seen| seen == v) {
                out.push(v.to_string());
            }
        }
    }
    out
}
