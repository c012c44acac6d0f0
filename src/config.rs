//! Pipeline configuration file support.
//!
//! A run is described by one YAML file (see `demos/pipeline.yaml`) plus environment variable
//! overrides. Relative paths inside the file are resolved against the file's directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::calendar::Granularity;
use crate::error::ConfigError;
use crate::extract::csv::parse_timestamp;
use crate::extract::{ApiSourceConfig, CsvSourceConfig};
use crate::observability::Severity;
use crate::validation::{stock_contract, transaction_contract, DataContract};
use crate::warehouse::{validate_identifier, TargetTable};

/// Environment variable overriding `database.path`.
pub const ENV_DATABASE_PATH: &str = "COCKTAIL_ETL_DATABASE_PATH";

/// Environment variable overriding `database.initial_load` (`true`/`false`/`1`/`0`).
pub const ENV_INITIAL_LOAD: &str = "COCKTAIL_ETL_INITIAL_LOAD";

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "cocktails.duckdb";

/// Whole-run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub database: DatabaseSection,
    pub api: ApiSection,
    pub csv: CsvSection,
    #[serde(default)]
    pub date_dimension: DateDimensionSection,
    /// Replacement contracts for the built-in ones.
    #[serde(default)]
    pub contracts: ContractSection,
    #[serde(default)]
    pub on_dataset_error: FailurePolicy,
    /// Optional file every pipeline event is appended to.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Failures at or above this severity also raise an alert.
    #[serde(default = "default_alert_threshold")]
    pub alert_at_or_above: Severity,
}

fn default_alert_threshold() -> Severity {
    Severity::Critical
}

/// Warehouse location and staging table names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    /// Create target tables and load the date dimension.
    #[serde(default)]
    pub initial_load: bool,
    #[serde(default)]
    pub staging: StagingTables,
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_FILENAME)
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            initial_load: false,
            staging: StagingTables::default(),
        }
    }
}

/// One staging table per dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingTables {
    pub glass: String,
    pub cocktail: String,
    pub stock: String,
    pub transaction: String,
    pub date: String,
}

impl Default for StagingTables {
    fn default() -> Self {
        Self {
            glass: "stg_glass".to_string(),
            cocktail: "stg_cocktail".to_string(),
            stock: "stg_stock".to_string(),
            transaction: "stg_transaction".to_string(),
            date: "stg_date".to_string(),
        }
    }
}

impl StagingTables {
    pub fn all(&self) -> [&str; 5] {
        [&self.glass, &self.cocktail, &self.stock, &self.transaction, &self.date]
    }
}

/// HTTP sources. `cocktail.url` (or a query value) carries a `{glass}` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSection {
    pub glass: ApiSourceConfig,
    pub cocktail: ApiSourceConfig,
}

/// File sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvSection {
    pub bar_stock: CsvSourceConfig,
    #[serde(default)]
    pub transactions: Vec<TransactionSource>,
}

/// A per-bar transaction file; every row is stamped with `bar`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSource {
    pub bar: String,
    #[serde(flatten)]
    pub source: CsvSourceConfig,
}

/// Range and grain of the generated date dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateDimensionSection {
    #[serde(default = "default_date_start")]
    pub start: String,
    #[serde(default = "default_date_end")]
    pub end: String,
    #[serde(default)]
    pub granularity: Granularity,
}

fn default_date_start() -> String {
    "2020-01-01".to_string()
}

fn default_date_end() -> String {
    "2030-12-31".to_string()
}

impl Default for DateDimensionSection {
    fn default() -> Self {
        Self {
            start: default_date_start(),
            end: default_date_end(),
            granularity: Granularity::default(),
        }
    }
}

impl DateDimensionSection {
    /// Parsed `(start, end)`; date-only values mean midnight.
    pub fn bounds(&self) -> Result<(NaiveDateTime, NaiveDateTime), ConfigError> {
        let parse = |field: &str, v: &str| {
            parse_timestamp(v, None)
                .map_err(|e| ConfigError::Invalid(format!("date_dimension.{field} '{v}': {e}")))
        };
        let start = parse("start", &self.start)?;
        let end = parse("end", &self.end)?;
        if start > end {
            return Err(ConfigError::Invalid(format!(
                "date_dimension.start '{}' is after end '{}'",
                self.start, self.end
            )));
        }
        Ok((start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContractSection {
    #[serde(default)]
    pub bar_stock: Option<DataContract>,
    #[serde(default)]
    pub transaction: Option<DataContract>,
}

impl ContractSection {
    pub fn bar_stock(&self) -> DataContract {
        self.bar_stock.clone().unwrap_or_else(stock_contract)
    }

    pub fn transaction(&self) -> DataContract {
        self.transaction.clone().unwrap_or_else(transaction_contract)
    }
}

/// What a run does when one dataset fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failure.
    #[default]
    Abort,
    /// Record the failure and carry on with the other datasets.
    Skip,
}

impl PipelineConfig {
    /// Read, resolve relative paths, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without touching paths, the environment or validation.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Make relative file paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &str| -> String {
            if Path::new(p).is_absolute() {
                p.to_string()
            } else {
                base.join(p).to_string_lossy().into_owned()
            }
        };
        self.csv.bar_stock.path = join(&self.csv.bar_stock.path);
        for tx in &mut self.csv.transactions {
            tx.source.path = join(&tx.source.path);
        }
        if self.database.path.is_relative() {
            self.database.path = base.join(&self.database.path);
        }
        if let Some(log) = self.log_file.take() {
            self.log_file = Some(if log.is_relative() { base.join(log) } else { log });
        }
    }

    /// Apply `COCKTAIL_ETL_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var(ENV_DATABASE_PATH) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(flag) = var(ENV_INITIAL_LOAD)
            && let Some(value) = parse_flag(&flag)
        {
            self.database.initial_load = value;
        }
    }

    /// Check table names, the date range and the transaction sources.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for name in self.database.staging.all() {
            validate_identifier(name).map_err(|e| ConfigError::Invalid(format!("database.staging: {e}")))?;
            if TargetTable::from_name(name).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "database.staging: '{name}' is a target table name"
                )));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "database.staging: '{name}' is used for more than one dataset"
                )));
            }
        }
        self.date_dimension.bounds()?;
        for tx in &self.csv.transactions {
            if tx.bar.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "csv.transactions: source '{}' has an empty bar name",
                    tx.source.name
                )));
            }
        }
        Ok(())
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Sample configuration matching the bundled demo data layout.
pub fn sample_config() -> &'static str {
    r#"database:
  path: cocktails.duckdb
  initial_load: true

api:
  glass:
    name: glass
    url: https://www.thecocktaildb.com/api/json/v1/1/list.php?g=list
    data_field: drinks
    columns_mapping: {strGlass: glass}
  cocktail:
    name: cocktail
    url: https://www.thecocktaildb.com/api/json/v1/1/filter.php?g={glass}
    data_field: drinks
    columns_mapping: {strDrink: drink}
    drop_columns: [strDrinkThumb, idDrink]

csv:
  bar_stock:
    name: bar_stock
    path: data/bar_data.csv
    capitalize_columns: [glass_type]
  transactions:
    - bar: budapest
      name: budapest_transactions
      path: data/budapest.csv
      index_column: ""
      date_columns: [TS]
      date_format: "%Y-%m-%d %H:%M:%S"
      columns_mapping: {TS: time, ital: drink, "költség": amount}
"#
}
