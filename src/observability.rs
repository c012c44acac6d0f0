//! Reporting interface passed explicitly into every pipeline component.
//!
//! Nothing in the library writes to a process-wide logger on its own behalf; components report
//! to the [`PipelineObserver`] they are given. [`TracingObserver`] forwards to `tracing`,
//! [`FileObserver`] appends to a local file and [`CompositeObserver`] fans out to several.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{ExtractionErrorKind, MergeError, PartialResolutionWarning, PipelineError, WarehouseError};
use crate::merge::MergeReport;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (step failed).
    Error,
    /// Critical error (source or warehouse unreachable, I/O).
    Critical,
}

/// Pipeline stage a report refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Validate,
    Stage,
    Generate,
    Merge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Extract => "extract",
            Stage::Validate => "validate",
            Stage::Stage => "stage",
            Stage::Generate => "generate",
            Stage::Merge => "merge",
        };
        f.write_str(s)
    }
}

/// Which dataset and stage a report is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    /// Dataset (source or table) name.
    pub dataset: String,
    pub stage: Stage,
}

impl StepContext {
    pub fn new(dataset: impl Into<String>, stage: Stage) -> Self {
        Self {
            dataset: dataset.into(),
            stage,
        }
    }
}

/// Minimal stats reported on a successful step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepStats {
    /// Rows produced or written by the step.
    pub rows: usize,
}

/// Observer interface for pipeline outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts. All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    /// Called when a step succeeds.
    fn on_success(&self, _ctx: &StepContext, _stats: StepStats) {}

    /// Called when a step deliberately does nothing (e.g. empty dataset, no staging table).
    fn on_skipped(&self, _ctx: &StepContext, _reason: &str) {}

    /// Called when a step fails.
    fn on_failure(&self, _ctx: &StepContext, _severity: Severity, _error: &PipelineError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        self.on_failure(ctx, severity, error)
    }

    /// Called after each table merge with its counts.
    fn on_merge(&self, _report: &MergeReport) {}

    /// Called when a merge excluded rows whose references did not resolve.
    fn on_partial_resolution(&self, _warning: &PartialResolutionWarning) {}
}

/// Classify an error for alerting: infrastructure failures are `Critical`, data problems `Error`.
pub fn severity_for_error(e: &PipelineError) -> Severity {
    match e {
        PipelineError::Extraction(err) => match &err.kind {
            ExtractionErrorKind::Io(_)
            | ExtractionErrorKind::Http(_)
            | ExtractionErrorKind::Unreachable { .. } => Severity::Critical,
            ExtractionErrorKind::Csv(csv_err) => match csv_err.kind() {
                ::csv::ErrorKind::Io(_) => Severity::Critical,
                _ => Severity::Error,
            },
            ExtractionErrorKind::HttpStatus { status, .. } if *status >= 500 => Severity::Critical,
            _ => Severity::Error,
        },
        PipelineError::Validation(_) => Severity::Error,
        PipelineError::Staging { .. } | PipelineError::Warehouse(_) | PipelineError::Config(_) => {
            Severity::Critical
        }
        PipelineError::Merge(MergeError::Warehouse(WarehouseError::ConstraintViolation { .. })) => Severity::Error,
        PipelineError::Merge(MergeError::Warehouse(_)) => Severity::Critical,
        PipelineError::Merge(_) => Severity::Error,
    }
}

/// Send `err` to `on_failure`, and to `on_alert` as well when its severity reaches the threshold.
pub fn report_failure(
    observer: &dyn PipelineObserver,
    ctx: &StepContext,
    err: &PipelineError,
    alert_at_or_above: Severity,
) {
    let sev = severity_for_error(err);
    observer.on_failure(ctx, sev, err);
    if sev >= alert_at_or_above {
        observer.on_alert(ctx, sev, err);
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_success(&self, ctx: &StepContext, stats: StepStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_skipped(&self, ctx: &StepContext, reason: &str) {
        for o in &self.observers {
            o.on_skipped(ctx, reason);
        }
    }

    fn on_failure(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }

    fn on_merge(&self, report: &MergeReport) {
        for o in &self.observers {
            o.on_merge(report);
        }
    }

    fn on_partial_resolution(&self, warning: &PartialResolutionWarning) {
        for o in &self.observers {
            o.on_partial_resolution(warning);
        }
    }
}

/// Emits one `tracing` event per callback.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_success(&self, ctx: &StepContext, stats: StepStats) {
        tracing::info!(dataset = %ctx.dataset, stage = %ctx.stage, rows = stats.rows, "step completed");
    }

    fn on_skipped(&self, ctx: &StepContext, reason: &str) {
        tracing::info!(dataset = %ctx.dataset, stage = %ctx.stage, reason, "step skipped");
    }

    fn on_failure(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        tracing::error!(
            dataset = %ctx.dataset,
            stage = %ctx.stage,
            severity = ?severity,
            "{error}"
        );
    }

    fn on_alert(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        tracing::error!(
            dataset = %ctx.dataset,
            stage = %ctx.stage,
            severity = ?severity,
            alert = true,
            "{error}"
        );
    }

    fn on_merge(&self, report: &MergeReport) {
        tracing::info!(
            table = %report.table,
            candidates = report.candidates,
            inserted = report.inserted,
            already_present = report.already_present,
            duplicates_in_batch = report.duplicates_in_batch,
            unresolved = report.unresolved,
            "merge completed"
        );
    }

    fn on_partial_resolution(&self, warning: &PartialResolutionWarning) {
        tracing::warn!(table = %warning.table, excluded = warning.excluded, "{warning}");
    }
}

/// Appends pipeline events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes never fail the pipeline; a line that cannot be written is reported through
    /// `tracing` instead.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        if let Err(err) = self.write_line(line) {
            tracing::warn!(path = %self.path.display(), error = %err, "dropped pipeline log line: {line}");
        }
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut f = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(f, "{} {line}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"))
    }
}

impl PipelineObserver for FileObserver {
    fn on_success(&self, ctx: &StepContext, stats: StepStats) {
        self.append_line(&format!("ok stage={} dataset={} rows={}", ctx.stage, ctx.dataset, stats.rows));
    }

    fn on_skipped(&self, ctx: &StepContext, reason: &str) {
        self.append_line(&format!("skip stage={} dataset={} reason={reason}", ctx.stage, ctx.dataset));
    }

    fn on_failure(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        self.append_line(&format!(
            "fail severity={severity:?} stage={} dataset={} err={error}",
            ctx.stage, ctx.dataset
        ));
    }

    fn on_alert(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        self.append_line(&format!(
            "ALERT severity={severity:?} stage={} dataset={} err={error}",
            ctx.stage, ctx.dataset
        ));
    }

    fn on_merge(&self, report: &MergeReport) {
        self.append_line(&format!(
            "merge table={} inserted={} already_present={} unresolved={}",
            report.table, report.inserted, report.already_present, report.unresolved
        ));
    }

    fn on_partial_resolution(&self, warning: &PartialResolutionWarning) {
        self.append_line(&format!("warn {warning}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractionError, SchemaValidationError, Violation};

    #[test]
    fn io_and_unreachable_are_critical() {
        let io = PipelineError::from(ExtractionError::new(
            "bar_stock",
            &"cfg",
            ExtractionErrorKind::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
        ));
        assert_eq!(severity_for_error(&io), Severity::Critical);

        let status = PipelineError::from(ExtractionError::new(
            "glass",
            &"cfg",
            ExtractionErrorKind::HttpStatus { status: 404, url: "u".into() },
        ));
        assert_eq!(severity_for_error(&status), Severity::Error);
    }

    #[test]
    fn validation_is_error() {
        let err = PipelineError::from(SchemaValidationError {
            source_name: "bar_stock".into(),
            violations: vec![Violation {
                column: "stock".into(),
                rule: "greater_than_or_equal(0)".into(),
                row: Some(0),
                value: Some("-1".into()),
            }],
        });
        assert_eq!(severity_for_error(&err), Severity::Error);
    }

    #[test]
    fn file_observer_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.log");
        let obs = FileObserver::new(&path);
        obs.on_success(&StepContext::new("glass", Stage::Extract), StepStats { rows: 3 });
        obs.on_skipped(&StepContext::new("stock", Stage::Stage), "empty dataset");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("ok stage=extract dataset=glass rows=3"));
        assert!(lines[1].contains("reason=empty dataset"));
    }

    #[test]
    fn unwritable_log_path_surfaces_the_error() {
        let dir = tempfile::tempdir().unwrap();
        let obs = FileObserver::new(dir.path());
        let err = obs.write_line("ok stage=extract dataset=glass rows=3").unwrap_err();
        assert_ne!(err.kind(), io::ErrorKind::NotFound);
        // Reported through tracing; the pipeline carries on.
        obs.on_success(&StepContext::new("glass", Stage::Extract), StepStats { rows: 3 });
        assert!(dir.path().is_dir());
    }
}
