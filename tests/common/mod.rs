#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::json;

use cocktail_etl::config::PipelineConfig;
use cocktail_etl::error::{ExtractionErrorKind, PartialResolutionWarning, PipelineError};
use cocktail_etl::extract::{HttpRequest, HttpTransport};
use cocktail_etl::merge::MergeReport;
use cocktail_etl::observability::{PipelineObserver, Severity, StepContext, StepStats};
use cocktail_etl::pipeline::Pipeline;

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

pub fn fixture_config() -> PipelineConfig {
    PipelineConfig::load(fixture("pipeline.yaml")).unwrap()
}

/// Serves the glass list and per-glass cocktail lists from canned JSON.
#[derive(Default)]
pub struct StubTransport {
    pub urls: Mutex<Vec<String>>,
}

impl HttpTransport for StubTransport {
    fn get_json(&self, request: &HttpRequest<'_>) -> Result<serde_json::Value, ExtractionErrorKind> {
        self.urls.lock().unwrap().push(request.url.to_string());
        let url = request.url;
        let body = if url.ends_with("list.php") {
            json!({"drinks": [
                {"strGlass": "Highball glass"},
                {"strGlass": "Coupe Glass"},
                {"strGlass": "Cocktail glass"},
                {"strGlass": "Champagne flute"},
            ]})
        } else if url.ends_with("Highball%20Glass") {
            json!({"drinks": [
                {"strDrink": "Mojito", "strDrinkThumb": "m.jpg", "idDrink": "1"},
                {"strDrink": "Cuba Libre", "strDrinkThumb": "c.jpg", "idDrink": "2"},
            ]})
        } else if url.ends_with("Coupe%20Glass") {
            json!({"drinks": [
                {"strDrink": "Clover Club", "strDrinkThumb": "cc.jpg", "idDrink": "3"},
                {"strDrink": "Mojito", "strDrinkThumb": "m2.jpg", "idDrink": "4"},
            ]})
        } else if url.ends_with("Cocktail%20Glass") {
            json!({"drinks": [{"strDrink": "Negroni", "strDrinkThumb": "n.jpg", "idDrink": "5"}]})
        } else if url.ends_with("Champagne%20Flute") {
            json!({"drinks": null})
        } else {
            return Err(ExtractionErrorKind::HttpStatus {
                status: 404,
                url: url.to_string(),
            });
        };
        Ok(body)
    }
}

/// Records observer callbacks as short strings.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl PipelineObserver for Recorder {
    fn on_success(&self, ctx: &StepContext, stats: StepStats) {
        self.push(format!("ok:{}:{}:{}", ctx.stage, ctx.dataset, stats.rows));
    }

    fn on_skipped(&self, ctx: &StepContext, _reason: &str) {
        self.push(format!("skip:{}:{}", ctx.stage, ctx.dataset));
    }

    fn on_failure(&self, ctx: &StepContext, severity: Severity, _error: &PipelineError) {
        self.push(format!("fail:{}:{}:{severity:?}", ctx.stage, ctx.dataset));
    }

    fn on_alert(&self, ctx: &StepContext, _severity: Severity, _error: &PipelineError) {
        self.push(format!("alert:{}:{}", ctx.stage, ctx.dataset));
    }

    fn on_merge(&self, report: &MergeReport) {
        self.push(format!("merge:{}:{}", report.table, report.inserted));
    }

    fn on_partial_resolution(&self, warning: &PartialResolutionWarning) {
        self.push(format!("partial:{}:{}", warning.table, warning.excluded));
    }
}

pub fn pipeline(config: PipelineConfig) -> (Pipeline, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let pipeline = Pipeline::new(config, Arc::new(StubTransport::default()), recorder.clone());
    (pipeline, recorder)
}
