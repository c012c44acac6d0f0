use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::warehouse::TargetTable;

/// Convenience result type for extraction.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Convenience result type for warehouse operations.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Convenience result type for merge steps.
pub type MergeResult<T> = Result<T, MergeError>;

/// Convenience result type for a whole pipeline run.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// A dataset could not be pulled from its source.
///
/// Carries the source name and a rendering of the source configuration so a failure can be
/// traced back to the config block that produced it.
#[derive(Debug, Error)]
#[error("extraction of '{source_name}' failed: {kind}")]
pub struct ExtractionError {
    /// Name of the data source (from configuration).
    pub source_name: String,
    /// Debug rendering of the source configuration.
    pub config: String,
    /// What went wrong.
    pub kind: ExtractionErrorKind,
}

impl ExtractionError {
    pub fn new(source_name: impl Into<String>, config: &impl fmt::Debug, kind: ExtractionErrorKind) -> Self {
        Self {
            source_name: source_name.into(),
            config: format!("{config:?}"),
            kind,
        }
    }
}

/// Cause of an [`ExtractionError`].
#[derive(Debug, Error)]
pub enum ExtractionErrorKind {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("http status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The response body is not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The source path pattern is invalid.
    #[error("invalid path pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Nothing to read at the configured location.
    #[error("source unreachable: {message}")]
    Unreachable { message: String },

    /// A column referenced by the configuration is not present in the raw data.
    #[error("missing column '{column}'. columns={available:?}")]
    MissingColumn { column: String, available: Vec<String> },

    /// The configured JSON field path does not exist in the response.
    #[error("response has no field '{path}'")]
    MissingField { path: String },

    /// The payload does not have a tabular shape.
    #[error("malformed payload: {message}")]
    Malformed { message: String },

    /// A value could not be parsed into the required [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },
}

/// A single broken rule found by the schema validator.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Offending column.
    pub column: String,
    /// Name of the violated rule, e.g. `not_nullable` or `greater_than(0)`.
    pub rule: String,
    /// 0-based row index, or `None` for column-level failures (missing column, wrong dtype).
    pub row: Option<usize>,
    /// Rendering of the offending value.
    pub value: Option<String>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.row, &self.value) {
            (Some(row), Some(value)) => write!(f, "{}: {} (row {row}, value '{value}')", self.column, self.rule),
            (Some(row), None) => write!(f, "{}: {} (row {row})", self.column, self.rule),
            _ => write!(f, "{}: {}", self.column, self.rule),
        }
    }
}

/// A dataset broke its declared column contract. Holds every violation, not just the first.
#[derive(Debug, Error)]
#[error(
    "schema validation failed for '{source_name}' ({count} violation(s)): {summary}",
    count = .violations.len(),
    summary = summarize_violations(.violations)
)]
pub struct SchemaValidationError {
    /// Name of the validated data source.
    pub source_name: String,
    /// All violations, in row-major order per column.
    pub violations: Vec<Violation>,
}

impl SchemaValidationError {
    /// Distinct `(column, rule)` pairs in first-seen order.
    pub fn failed_checks(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = Vec::new();
        for v in &self.violations {
            let pair = (v.column.as_str(), v.rule.as_str());
            if !out.contains(&pair) {
                out.push(pair);
            }
        }
        out
    }
}

fn summarize_violations(violations: &[Violation]) -> String {
    let err = SchemaValidationError {
        source_name: String::new(),
        violations: violations.to_vec(),
    };
    err.failed_checks()
        .iter()
        .map(|(column, rule)| format!("({column}, {rule})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Storage-layer failure.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// The named table does not exist.
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    /// A table or column name is not a plain SQL identifier.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// Rows handed to the warehouse do not match the table layout.
    #[error("schema mismatch for table '{table}': {message}")]
    SchemaMismatch { table: String, message: String },

    /// A uniqueness or reference constraint would be broken.
    #[error("constraint violation on table '{table}': {message}")]
    ConstraintViolation { table: String, message: String },

    /// A stored value could not be converted into a [`crate::types::Value`].
    #[error("cannot read column '{column}' of table '{table}': {message}")]
    Conversion {
        table: String,
        column: String,
        message: String,
    },

    #[cfg(feature = "duckdb-backend")]
    /// DuckDB error (feature-gated behind `duckdb-backend`).
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
}

/// A merge step could not run at all.
///
/// Partial exclusion of unresolved rows is not an error; see [`PartialResolutionWarning`].
#[derive(Debug, Error)]
pub enum MergeError {
    /// The target table has not been created.
    #[error("target table '{table}' does not exist")]
    MissingTarget { table: TargetTable },

    /// A dimension the target references has not been created.
    #[error("table '{table}' references '{reference}', which does not exist")]
    MissingReference { table: TargetTable, reference: TargetTable },

    /// A staging table (or a dataset derived from one) lacks a column the merge reads.
    #[error("'{dataset}' has no column '{column}' (needed for '{table}')")]
    MissingColumn {
        table: TargetTable,
        dataset: String,
        column: String,
    },

    /// A staging value has the wrong type for the column it feeds.
    #[error("staging table '{staging}' column '{column}' row {row}: {message}")]
    InvalidValue {
        staging: String,
        column: String,
        row: usize,
        message: String,
    },

    /// Reading or writing the warehouse failed.
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// Rows left out of a merge because a foreign key did not resolve.
///
/// Non-fatal: the merge goes ahead with the resolvable rows and this is surfaced to the observer.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResolutionWarning {
    /// Table being merged.
    pub table: TargetTable,
    /// Number of excluded rows.
    pub excluded: usize,
    /// A few of the natural keys that failed to resolve, as `reference=key`.
    pub samples: Vec<String>,
}

impl fmt::Display for PartialResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} row(s) excluded from '{}' due to unresolved references: [{}]",
            self.excluded,
            self.table,
            self.samples.join(", ")
        )
    }
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Any error that can end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Validation(#[from] SchemaValidationError),

    /// Writing a staging table failed.
    #[error("staging into '{table}' failed: {source}")]
    Staging {
        table: String,
        #[source]
        source: WarehouseError,
    },

    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
