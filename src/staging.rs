//! Staging loader: full replacement of one staging table per dataset.

use crate::error::{PipelineError, PipelineResult};
use crate::observability::{report_failure, PipelineObserver, Severity, Stage, StepContext, StepStats};
use crate::types::DataSet;
use crate::warehouse::Warehouse;

/// What [`stage`] did with a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The table now holds exactly the dataset's rows.
    Replaced { rows: usize },
    /// The dataset had no rows; the table was left as it was.
    SkippedEmpty,
}

/// Replace the contents of staging table `table` with `dataset`.
///
/// An empty dataset is a no-op so that a source with nothing new does not wipe out the
/// previous run's staging data.
pub fn stage(
    warehouse: &mut dyn Warehouse,
    table: &str,
    dataset: &DataSet,
    observer: &dyn PipelineObserver,
    alert_at_or_above: Severity,
) -> PipelineResult<StageOutcome> {
    let ctx = StepContext::new(table, Stage::Stage);
    if dataset.is_empty() {
        observer.on_skipped(&ctx, "empty dataset, staging table left unchanged");
        return Ok(StageOutcome::SkippedEmpty);
    }

    match warehouse.replace_table(table, dataset) {
        Ok(()) => {
            let rows = dataset.row_count();
            observer.on_success(&ctx, StepStats { rows });
            Ok(StageOutcome::Replaced { rows })
        }
        Err(source) => {
            let err = PipelineError::Staging {
                table: table.to_string(),
                source,
            };
            report_failure(observer, &ctx, &err, alert_at_or_above);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Field, Schema, Value};
    use crate::warehouse::MemoryWarehouse;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl PipelineObserver for Recorder {
        fn on_success(&self, ctx: &StepContext, stats: StepStats) {
            self.events.lock().unwrap().push(format!("ok:{}:{}", ctx.dataset, stats.rows));
        }
        fn on_skipped(&self, ctx: &StepContext, _reason: &str) {
            self.events.lock().unwrap().push(format!("skip:{}", ctx.dataset));
        }
        fn on_failure(&self, ctx: &StepContext, severity: Severity, _error: &PipelineError) {
            self.events.lock().unwrap().push(format!("fail:{}:{severity:?}", ctx.dataset));
        }
        fn on_alert(&self, ctx: &StepContext, _severity: Severity, _error: &PipelineError) {
            self.events.lock().unwrap().push(format!("alert:{}", ctx.dataset));
        }
    }

    fn glasses(names: &[&str]) -> DataSet {
        DataSet::new(
            Schema::new(vec![Field::new("glass", DataType::Utf8)]),
            names.iter().map(|n| vec![Value::from(*n)]).collect(),
        )
    }

    #[test]
    fn empty_dataset_keeps_prior_contents() {
        let mut wh = MemoryWarehouse::new();
        let obs = Recorder::default();
        let first = glasses(&["Flute", "Coupe Glass"]);
        assert_eq!(
            stage(&mut wh, "stg_glass", &first, &obs, Severity::Critical).unwrap(),
            StageOutcome::Replaced { rows: 2 }
        );
        assert_eq!(
            stage(&mut wh, "stg_glass", &glasses(&[]), &obs, Severity::Critical).unwrap(),
            StageOutcome::SkippedEmpty
        );
        assert_eq!(wh.read_table("stg_glass").unwrap(), first);
        assert_eq!(*obs.events.lock().unwrap(), vec!["ok:stg_glass:2", "skip:stg_glass"]);
    }

    #[test]
    fn invalid_table_name_is_a_staging_error() {
        let mut wh = MemoryWarehouse::new();
        let obs = Recorder::default();
        let err = stage(&mut wh, "stg-glass", &glasses(&["Flute"]), &obs, Severity::Critical).unwrap_err();
        assert!(matches!(err, PipelineError::Staging { .. }));
        assert_eq!(*obs.events.lock().unwrap(), vec!["fail:stg-glass:Critical", "alert:stg-glass"]);
    }
}
