//! Extraction: pulling raw tabular data from a source and shaping it.
//!
//! Every source kind implements [`Extractor`]. Callers normally go through
//! [`extractor_for`], which builds the right implementation from a [`SourceConfig`], and
//! [`extract`], which runs it and reports the outcome to a [`PipelineObserver`].
//!
//! - [`csv`]: CSV files (delimiter, header presence, date columns, index column, glob paths)
//! - [`api`]: HTTP GET endpoints returning JSON
//! - [`json`]: JSON payload conversion shared by the API extractor
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cocktail_etl::extract::{extractor_for, CsvSourceConfig, ReqwestTransport, SourceConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SourceConfig::Csv(CsvSourceConfig::new("bar_stock", "data/bar_data.csv"));
//! let extractor = extractor_for(&config, Arc::new(ReqwestTransport::new()?));
//! let ds = extractor.fetch()?;
//! println!("rows={}", ds.row_count());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod csv;
pub mod json;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ExtractionResult, PipelineError, PipelineResult};
use crate::observability::{report_failure, PipelineObserver, Severity, Stage, StepContext, StepStats};
use crate::types::DataSet;

pub use api::{fetch_cocktails_by_glass, ApiExtractor, ApiSourceConfig, HttpRequest, HttpTransport, ReqwestTransport};
pub use csv::{CsvExtractor, CsvSourceConfig};

/// Produces a rectangular dataset from its configuration.
pub trait Extractor {
    /// Name of the data source, used in diagnostics.
    fn name(&self) -> &str;

    /// Read and shape the source. An empty dataset is a valid result.
    fn fetch(&self) -> ExtractionResult<DataSet>;
}

/// Source descriptor, tagged by `kind` in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Csv(CsvSourceConfig),
    Api(ApiSourceConfig),
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            SourceConfig::Csv(c) => &c.name,
            SourceConfig::Api(c) => &c.name,
        }
    }
}

/// Build the extractor for `config`. `transport` is only used by API sources.
pub fn extractor_for(config: &SourceConfig, transport: Arc<dyn HttpTransport>) -> Box<dyn Extractor> {
    match config {
        SourceConfig::Csv(c) => Box::new(CsvExtractor::new(c.clone())),
        SourceConfig::Api(c) => Box::new(ApiExtractor::new(c.clone(), transport)),
    }
}

/// Run `extractor`, reporting the outcome to `observer`.
///
/// - `on_success` with the row count on success
/// - `on_failure` on failure, and `on_alert` too when the severity is `>= alert_at_or_above`
pub fn extract(
    extractor: &dyn Extractor,
    observer: &dyn PipelineObserver,
    alert_at_or_above: Severity,
) -> PipelineResult<DataSet> {
    let ctx = StepContext::new(extractor.name(), Stage::Extract);
    match extractor.fetch() {
        Ok(ds) => {
            observer.on_success(&ctx, StepStats { rows: ds.row_count() });
            Ok(ds)
        }
        Err(e) => {
            let err = PipelineError::from(e);
            report_failure(observer, &ctx, &err, alert_at_or_above);
            Err(err)
        }
    }
}
