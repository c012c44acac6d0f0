//! In-memory data transformations.
//!
//! The processing layer operates on [`crate::types::DataSet`] values produced by extraction.
//!
//! - [`filter()`]: row filtering by predicate
//! - [`map()`]: row mapping by user function
//! - [`shape`]: the per-source shaping steps (drop, rename, dedup, title-case) plus column
//!   stamping and concatenation
//!
//! ## Example: shape a raw API batch
//!
//! ```rust
//! use std::collections::BTreeMap;
//!
//! use cocktail_etl::processing::{apply_shaping, ShapingOptions};
//! use cocktail_etl::types::{DataSet, DataType, Field, Schema, Value};
//!
//! let raw = DataSet::new(
//!     Schema::new(vec![
//!         Field::new("strGlass", DataType::Utf8),
//!         Field::new("idGlass", DataType::Int64),
//!     ]),
//!     vec![
//!         vec![Value::from("highball glass"), Value::Int64(1)],
//!         vec![Value::from("highball glass"), Value::Int64(1)],
//!     ],
//! );
//!
//! let opts = ShapingOptions {
//!     drop_columns: vec!["idGlass".into()],
//!     columns_mapping: BTreeMap::from([("strGlass".into(), "glass".into())]),
//!     capitalize_columns: vec!["glass".into()],
//! };
//! let out = apply_shaping(&raw, &opts).unwrap();
//! assert_eq!(out.rows, vec![vec![Value::from("Highball Glass")]]);
//! ```

pub mod filter;
pub mod map;
pub mod shape;

pub use filter::filter;
pub use map::{map, map_column};
pub use shape::{apply_shaping, concat, select_columns, title_case, with_constant_column, ShapingOptions};
