//! Declarative column contracts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{DataType, Value};

/// Expected shape of a dataset: the columns it must carry and the rules each must satisfy.
///
/// Columns not named here are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataContract {
    pub columns: Vec<ColumnContract>,
}

/// Expected type, nullability and value predicates for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnContract {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
    /// In YAML each check is a single-key map (`- greater_than: 0`) or a bare name (`- non_empty`).
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub checks: Vec<Check>,
}

impl ColumnContract {
    /// A non-nullable column with no value checks.
    pub fn required(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Whether a column of `actual` type satisfies this contract's type.
    ///
    /// A float column accepts integers.
    pub fn accepts_type(&self, actual: DataType) -> bool {
        actual == self.data_type || (self.data_type == DataType::Float64 && actual == DataType::Int64)
    }
}

/// Value predicate on a non-null cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    GreaterThan(f64),
    GreaterThanOrEqual(f64),
    LessThan(f64),
    LessThanOrEqual(f64),
    InSet(Vec<String>),
    /// Text is not empty after trimming.
    NonEmpty,
}

impl Check {
    /// Whether `value` passes. Numeric checks fail on non-numeric values.
    pub fn passes(&self, value: &Value) -> bool {
        match self {
            Check::GreaterThan(bound) => value.as_f64().is_some_and(|v| v > *bound),
            Check::GreaterThanOrEqual(bound) => value.as_f64().is_some_and(|v| v >= *bound),
            Check::LessThan(bound) => value.as_f64().is_some_and(|v| v < *bound),
            Check::LessThanOrEqual(bound) => value.as_f64().is_some_and(|v| v <= *bound),
            Check::InSet(allowed) => {
                let text = value.to_string();
                allowed.iter().any(|a| *a == text)
            }
            Check::NonEmpty => value.as_str().is_some_and(|s| !s.trim().is_empty()),
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::GreaterThan(b) => write!(f, "greater_than({b})"),
            Check::GreaterThanOrEqual(b) => write!(f, "greater_than_or_equal({b})"),
            Check::LessThan(b) => write!(f, "less_than({b})"),
            Check::LessThanOrEqual(b) => write!(f, "less_than_or_equal({b})"),
            Check::InSet(values) => write!(f, "in_set({})", values.join("|")),
            Check::NonEmpty => f.write_str("non_empty"),
        }
    }
}

/// Contract for bar stock: `glass_type` and `bar` text, `stock` a non-negative integer.
pub fn stock_contract() -> DataContract {
    DataContract {
        columns: vec![
            ColumnContract::required("glass_type", DataType::Utf8),
            ColumnContract::required("stock", DataType::Int64).with_check(Check::GreaterThanOrEqual(0.0)),
            ColumnContract::required("bar", DataType::Utf8),
        ],
    }
}

/// Contract for transactions: `time` timestamp, `drink` text, `amount` strictly positive.
pub fn transaction_contract() -> DataContract {
    DataContract {
        columns: vec![
            ColumnContract::required("time", DataType::Timestamp),
            ColumnContract::required("drink", DataType::Utf8),
            ColumnContract::required("amount", DataType::Float64).with_check(Check::GreaterThan(0.0)),
        ],
    }
}
