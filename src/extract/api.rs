//! HTTP/JSON extraction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ExtractionError, ExtractionErrorKind, ExtractionResult};
use crate::processing::{apply_shaping, concat, with_constant_column, ShapingOptions};
use crate::types::{DataSet, DataType, Value};

use super::json::payload_to_dataset;
use super::Extractor;

/// Configuration for an HTTP GET data source returning JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSourceConfig {
    /// Name of the data source, used in diagnostics.
    pub name: String,
    /// Request URL. May contain `{param}` placeholders filled by [`ApiSourceConfig::with_parameter`].
    pub url: String,
    /// Query-string parameters.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Dot path to the array of records in the response body.
    pub data_field: String,
    /// Per-request timeout; unset leaves the transport default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Drop/rename/dedup/title-case steps.
    #[serde(flatten)]
    pub shaping: ShapingOptions,
}

impl ApiSourceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, data_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            query: BTreeMap::new(),
            data_field: data_field.into(),
            timeout_secs: None,
            shaping: ShapingOptions::default(),
        }
    }

    /// Substitute `{key}` with `value`: URL-encoded in the URL, verbatim in query values.
    pub fn with_parameter(&self, key: &str, value: &str) -> Self {
        let placeholder = format!("{{{key}}}");
        let mut out = self.clone();
        out.url = self.url.replace(&placeholder, &urlencoding::encode(value));
        for v in out.query.values_mut() {
            *v = v.replace(&placeholder, value);
        }
        out
    }
}

/// One GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub query: &'a BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

/// Blocking transport that performs a GET and decodes the JSON body.
///
/// Implementations must not retry; a failure is reported as-is.
pub trait HttpTransport: Send + Sync {
    fn get_json(&self, request: &HttpRequest<'_>) -> Result<serde_json::Value, ExtractionErrorKind>;
}

/// [`HttpTransport`] backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ExtractionErrorKind> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("cocktail-etl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get_json(&self, request: &HttpRequest<'_>) -> Result<serde_json::Value, ExtractionErrorKind> {
        let mut builder = self.client.get(request.url).query(request.query);
        if let Some(t) = request.timeout {
            builder = builder.timeout(t);
        }
        let resp = builder.send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ExtractionErrorKind::HttpStatus {
                status: status.as_u16(),
                url: request.url.to_string(),
            });
        }
        let text = resp.text()?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Calls an HTTP endpoint and turns the payload at `data_field` into a shaped dataset.
#[derive(Clone)]
pub struct ApiExtractor {
    config: ApiSourceConfig,
    transport: Arc<dyn HttpTransport>,
}

impl fmt::Debug for ApiExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiExtractor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ApiExtractor {
    pub fn new(config: ApiSourceConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ApiSourceConfig {
        &self.config
    }

    fn fetch_inner(&self) -> Result<DataSet, ExtractionErrorKind> {
        tracing::debug!(source = %self.config.name, url = %self.config.url, "requesting api data");
        let request = HttpRequest {
            url: &self.config.url,
            query: &self.config.query,
            timeout: self.config.timeout_secs.map(Duration::from_secs),
        };
        let body = self.transport.get_json(&request)?;
        let raw = payload_to_dataset(&body, &self.config.data_field)?;
        if raw.schema.fields.is_empty() {
            return Ok(raw);
        }
        apply_shaping(&raw, &self.config.shaping)
    }
}

impl Extractor for ApiExtractor {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn fetch(&self) -> ExtractionResult<DataSet> {
        self.fetch_inner()
            .map_err(|kind| ExtractionError::new(&self.config.name, &self.config, kind))
    }
}

/// Name of the column stamped onto each per-glass cocktail batch.
pub const GLASS_COLUMN: &str = "glass";

/// Fetch cocktails once per glass (filling the `{glass}` placeholder) and stack the batches,
/// stamping each with a [`GLASS_COLUMN`] column.
///
/// Glasses whose batch comes back empty contribute no rows.
pub fn fetch_cocktails_by_glass(
    template: &ApiSourceConfig,
    glasses: &[String],
    transport: Arc<dyn HttpTransport>,
) -> ExtractionResult<DataSet> {
    let mut batches = Vec::with_capacity(glasses.len());
    for glass in glasses {
        let extractor = ApiExtractor::new(template.with_parameter("glass", glass), Arc::clone(&transport));
        let batch = extractor.fetch()?;
        if batch.schema.fields.is_empty() {
            tracing::debug!(source = %template.name, glass = %glass, "no cocktails for glass");
            continue;
        }
        batches.push(with_constant_column(&batch, GLASS_COLUMN, DataType::Utf8, Value::from(glass.as_str())));
    }
    concat(batches).map_err(|kind| ExtractionError::new(&template.name, template, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubTransport {
        urls: Mutex<Vec<String>>,
    }

    impl HttpTransport for StubTransport {
        fn get_json(&self, request: &HttpRequest<'_>) -> Result<serde_json::Value, ExtractionErrorKind> {
            self.urls.lock().unwrap().push(request.url.to_string());
            if request.url.ends_with("Coupe%20Glass") {
                Ok(json!({"drinks": [{"strDrink": "clover club", "idDrink": "1"}]}))
            } else if request.url.ends_with("Flute") {
                Ok(json!({"drinks": null}))
            } else if request.url.ends_with("Broken") {
                Err(ExtractionErrorKind::HttpStatus { status: 500, url: request.url.to_string() })
            } else {
                Ok(json!({"drinks": [{"strDrink": "mojito", "idDrink": "2"}, {"strDrink": "mojito", "idDrink": "2"}]}))
            }
        }
    }

    fn drink_template() -> ApiSourceConfig {
        let mut cfg = ApiSourceConfig::new("cocktail", "https://example.test/filter.php?g={glass}", "drinks");
        cfg.shaping.drop_columns = vec!["idDrink".into()];
        cfg.shaping.columns_mapping.insert("strDrink".into(), "drink".into());
        cfg.shaping.capitalize_columns = vec!["drink".into()];
        cfg
    }

    #[test]
    fn with_parameter_encodes_url_but_not_query() {
        let mut cfg = ApiSourceConfig::new("c", "https://x.test/{glass}", "d");
        cfg.query.insert("g".into(), "{glass}".into());
        let out = cfg.with_parameter("glass", "Coupe Glass");
        assert_eq!(out.url, "https://x.test/Coupe%20Glass");
        assert_eq!(out.query["g"], "Coupe Glass");
    }

    #[test]
    fn cocktails_by_glass_stamps_and_concatenates() {
        let transport = Arc::new(StubTransport::default());
        let glasses = vec!["Coupe Glass".to_string(), "Flute".to_string(), "Highball Glass".to_string()];
        let ds = fetch_cocktails_by_glass(&drink_template(), &glasses, transport.clone()).unwrap();

        assert_eq!(ds.schema.field_names().collect::<Vec<_>>(), vec!["drink", "glass"]);
        assert_eq!(
            ds.rows,
            vec![
                vec![Value::from("Clover Club"), Value::from("Coupe Glass")],
                vec![Value::from("Mojito"), Value::from("Highball Glass")],
            ]
        );
        assert_eq!(transport.urls.lock().unwrap().len(), 3);
    }

    #[test]
    fn transport_failure_carries_source_and_config() {
        let transport = Arc::new(StubTransport::default());
        let err = fetch_cocktails_by_glass(&drink_template(), &["Broken".to_string()], transport).unwrap_err();
        assert_eq!(err.source_name, "cocktail");
        assert!(err.config.contains("filter.php?g=Broken"));
        assert!(matches!(err.kind, ExtractionErrorKind::HttpStatus { status: 500, .. }));
    }
}
