//! `cocktail-etl` loads bar, glassware, cocktail, stock and sales data into a star-schema
//! warehouse.
//!
//! A run pulls datasets from HTTP/JSON endpoints and CSV files into an in-memory
//! [`types::DataSet`], checks them against declarative contracts, replaces one staging table per
//! dataset, and merges the staging rows into dimension and fact tables. Merges only ever insert
//! rows whose natural key is new, so re-running on unchanged sources changes nothing.
//!
//! ## Pipeline stages
//!
//! - [`extract`]: CSV and API extractors plus per-source shaping (drop, rename, dedup, title-case)
//! - [`validation`]: column contracts (type, nullability, value checks), all violations at once
//! - [`staging`]: full replacement of a staging table, skipped for empty datasets
//! - [`merge`]: natural key → surrogate key resolution and insert-only merge per target table
//! - [`calendar`]: date dimension generation at minute, hour or day granularity
//! - [`pipeline`]: orchestration of the above in dependency order
//!
//! Supporting modules: [`types`] (data model), [`processing`] (dataset transformations),
//! [`warehouse`] (storage trait, in-memory and DuckDB backends, target tables), [`config`]
//! (YAML + environment), [`observability`] (observer trait and implementations), [`error`].
//!
//! ## Star schema
//!
//! | table | natural key | references |
//! |---|---|---|
//! | `dim_bar` | `name` | |
//! | `dim_glass` | `name` | |
//! | `dim_cocktail` | `(name, glass_id)` | `dim_glass` |
//! | `dim_date` | `date_id` | |
//! | `fact_stock` | `(bar_id, glass_id)` | `dim_bar`, `dim_glass` |
//! | `fact_transaction` | `(bar_id, cocktail_id, date)` | `dim_bar`, `dim_cocktail`, `dim_date` |
//!
//! ## Example: validate a dataset
//!
//! ```rust
//! use cocktail_etl::types::{DataSet, DataType, Field, Schema, Value};
//! use cocktail_etl::validation::{stock_contract, validate};
//!
//! let ds = DataSet::new(
//!     Schema::new(vec![
//!         Field::new("glass_type", DataType::Utf8),
//!         Field::new("stock", DataType::Int64),
//!         Field::new("bar", DataType::Utf8),
//!     ]),
//!     vec![
//!         vec![Value::from("Coupe Glass"), Value::Int64(4), Value::from("London")],
//!         vec![Value::from("Flute"), Value::Int64(-2), Value::from("London")],
//!     ],
//! );
//!
//! let err = validate("bar_stock", ds, &stock_contract()).unwrap_err();
//! assert_eq!(err.failed_checks(), vec![("stock", "greater_than_or_equal(0)")]);
//! ```
//!
//! ## Example: merge staged data
//!
//! ```rust
//! use cocktail_etl::calendar::Granularity;
//! use cocktail_etl::config::StagingTables;
//! use cocktail_etl::merge::{merge_table, MergeOutcome};
//! use cocktail_etl::types::{DataSet, DataType, Field, Schema, Value};
//! use cocktail_etl::warehouse::{MemoryWarehouse, TargetTable, Warehouse};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let staging = StagingTables::default();
//! let mut wh = MemoryWarehouse::new();
//! wh.create_target_tables()?;
//! wh.replace_table(
//!     &staging.glass,
//!     &DataSet::new(
//!         Schema::new(vec![Field::new("glass", DataType::Utf8)]),
//!         vec![vec![Value::from("Coupe Glass")], vec![Value::from("Highball Glass")]],
//!     ),
//! )?;
//!
//! for _ in 0..2 {
//!     merge_table(&mut wh, TargetTable::DimGlass, &staging, Granularity::Hour)?;
//! }
//! assert_eq!(wh.read_table("dim_glass")?.row_count(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `duckdb-backend` (default): [`warehouse::DuckDbWarehouse`] on an embedded DuckDB file
//! - `cli` (default): the `cocktail-etl` binary

pub mod calendar;
pub mod config;
pub mod error;
pub mod extract;
pub mod merge;
pub mod observability;
pub mod pipeline;
pub mod processing;
pub mod staging;
pub mod types;
pub mod validation;
pub mod warehouse;

pub use error::{
    ConfigError, ExtractionError, ExtractionResult, MergeError, MergeResult, PartialResolutionWarning, PipelineError,
    PipelineResult, SchemaValidationError, WarehouseError, WarehouseResult,
};
