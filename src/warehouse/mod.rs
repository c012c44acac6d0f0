//! Warehouse storage: the target star schema and the [`Warehouse`] trait backends implement.
//!
//! Two backends are provided:
//! - [`MemoryWarehouse`]: in-process tables, used by tests and dry runs
//! - [`DuckDbWarehouse`]: embedded DuckDB (feature `duckdb-backend`)
//!
//! Staging tables are free-form (schema-on-write). Target tables are fixed by [`TargetTable`].

use std::fmt;

use crate::error::{WarehouseError, WarehouseResult};
use crate::types::{DataSet, DataType, Field, Schema};

pub mod memory;

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDbWarehouse;
pub use memory::MemoryWarehouse;

/// A dimension or fact table of the star schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetTable {
    DimBar,
    DimGlass,
    DimCocktail,
    DimDate,
    FactStock,
    FactTransaction,
}

/// Order in which target tables are merged; every table comes after the tables it references.
pub const MERGE_ORDER: [TargetTable; 6] = [
    TargetTable::DimBar,
    TargetTable::DimGlass,
    TargetTable::DimCocktail,
    TargetTable::DimDate,
    TargetTable::FactStock,
    TargetTable::FactTransaction,
];

impl TargetTable {
    pub fn name(self) -> &'static str {
        match self {
            TargetTable::DimBar => "dim_bar",
            TargetTable::DimGlass => "dim_glass",
            TargetTable::DimCocktail => "dim_cocktail",
            TargetTable::DimDate => "dim_date",
            TargetTable::FactStock => "fact_stock",
            TargetTable::FactTransaction => "fact_transaction",
        }
    }

    /// Look a table up by its SQL name.
    pub fn from_name(name: &str) -> Option<Self> {
        MERGE_ORDER.into_iter().find(|t| t.name() == name)
    }

    /// Full column layout, surrogate key first where there is one.
    pub fn schema(self) -> Schema {
        use DataType::*;
        let cols: &[(&str, DataType)] = match self {
            TargetTable::DimBar => &[("bar_id", Int64), ("name", Utf8)],
            TargetTable::DimGlass => &[("glass_id", Int64), ("name", Utf8)],
            TargetTable::DimCocktail => &[("cocktail_id", Int64), ("glass_id", Int64), ("name", Utf8)],
            TargetTable::DimDate => &[
                ("date_id", Utf8),
                ("date", Timestamp),
                ("day_name", Utf8),
                ("calendar_day", Int64),
                ("hour", Int64),
                ("calendar_week", Int64),
                ("calendar_month", Utf8),
                ("quarter", Int64),
                ("year", Int64),
            ],
            TargetTable::FactStock => &[("bar_id", Int64), ("glass_id", Int64), ("stock", Int64)],
            TargetTable::FactTransaction => &[
                ("bar_id", Int64),
                ("cocktail_id", Int64),
                ("date_id", Utf8),
                ("amount", Float64),
                ("date", Timestamp),
            ],
        };
        Schema::new(cols.iter().map(|(n, t)| Field::new(*n, *t)).collect())
    }

    /// Column assigned by storage on insert.
    pub fn surrogate_key(self) -> Option<&'static str> {
        match self {
            TargetTable::DimBar => Some("bar_id"),
            TargetTable::DimGlass => Some("glass_id"),
            TargetTable::DimCocktail => Some("cocktail_id"),
            _ => None,
        }
    }

    /// Columns that identify a row; unique per table.
    ///
    /// For facts this is the duplicate-detection key.
    pub fn natural_key(self) -> &'static [&'static str] {
        match self {
            TargetTable::DimBar | TargetTable::DimGlass => &["name"],
            TargetTable::DimCocktail => &["name", "glass_id"],
            TargetTable::DimDate => &["date_id"],
            TargetTable::FactStock => &["bar_id", "glass_id"],
            TargetTable::FactTransaction => &["bar_id", "cocktail_id", "date"],
        }
    }

    /// `(column, referenced table)` pairs. The referenced column is the other table's key.
    pub fn foreign_keys(self) -> &'static [(&'static str, TargetTable)] {
        match self {
            TargetTable::DimCocktail => &[("glass_id", TargetTable::DimGlass)],
            TargetTable::FactStock => &[("bar_id", TargetTable::DimBar), ("glass_id", TargetTable::DimGlass)],
            TargetTable::FactTransaction => &[
                ("bar_id", TargetTable::DimBar),
                ("cocktail_id", TargetTable::DimCocktail),
                ("date_id", TargetTable::DimDate),
            ],
            _ => &[],
        }
    }

    /// Tables that must be merged before this one.
    pub fn dependencies(self) -> Vec<TargetTable> {
        self.foreign_keys().iter().map(|(_, t)| *t).collect()
    }

    /// Column other tables reference this one by: the surrogate key, or the natural key
    /// for tables without one.
    pub fn key_column(self) -> &'static str {
        self.surrogate_key().unwrap_or(self.natural_key()[0])
    }

    /// Columns supplied on insert: the schema without the surrogate key.
    pub fn insert_schema(self) -> Schema {
        let sk = self.surrogate_key();
        Schema::new(
            self.schema()
                .fields
                .into_iter()
                .filter(|f| Some(f.name.as_str()) != sk)
                .collect(),
        )
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage the pipeline stages into and merges into.
///
/// Every call is atomic on its own; there is no transaction spanning calls.
pub trait Warehouse {
    fn table_exists(&self, name: &str) -> WarehouseResult<bool>;

    /// Full contents of a table, in insertion order.
    fn read_table(&self, name: &str) -> WarehouseResult<DataSet>;

    /// Drop `name` if present and recreate it with `data`'s columns and rows.
    fn replace_table(&mut self, name: &str, data: &DataSet) -> WarehouseResult<()>;

    /// Insert rows into a target table, letting storage assign surrogate keys.
    ///
    /// `data` must have exactly [`TargetTable::insert_schema`]'s columns. Returns the number
    /// of rows inserted.
    fn append(&mut self, table: TargetTable, data: &DataSet) -> WarehouseResult<usize>;

    /// Create every target table that does not exist yet.
    fn create_target_tables(&mut self) -> WarehouseResult<()>;
}

/// Accept only plain SQL identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(name: &str) -> WarehouseResult<()> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(WarehouseError::InvalidIdentifier(name.to_string()))
    }
}

/// Check that `data` carries the insert columns of `table`, in order.
pub(crate) fn check_insert_schema(table: TargetTable, data: &DataSet) -> WarehouseResult<()> {
    let expected = table.insert_schema();
    let got: Vec<&str> = data.schema.field_names().collect();
    let want: Vec<&str> = expected.field_names().collect();
    if got != want {
        return Err(WarehouseError::SchemaMismatch {
            table: table.name().to_string(),
            message: format!("expected columns {want:?}, got {got:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_order_respects_dependencies() {
        for (pos, table) in MERGE_ORDER.iter().enumerate() {
            for dep in table.dependencies() {
                let dep_pos = MERGE_ORDER.iter().position(|t| *t == dep).unwrap();
                assert!(dep_pos < pos, "{dep} must precede {table}");
            }
        }
    }

    #[test]
    fn insert_schema_drops_surrogate_key() {
        let cols: Vec<_> = TargetTable::DimCocktail
            .insert_schema()
            .field_names()
            .map(str::to_string)
            .collect();
        assert_eq!(cols, vec!["glass_id", "name"]);
        assert_eq!(TargetTable::DimDate.insert_schema(), TargetTable::DimDate.schema());
        assert_eq!(TargetTable::DimDate.key_column(), "date_id");
    }

    #[test]
    fn natural_keys_are_table_columns() {
        for table in MERGE_ORDER {
            let schema = table.schema();
            for col in table.natural_key() {
                assert!(schema.index_of(col).is_some(), "{table}.{col}");
            }
            for (col, _) in table.foreign_keys() {
                assert!(schema.index_of(col).is_some(), "{table}.{col}");
            }
        }
    }

    #[test]
    fn identifiers() {
        assert!(validate_identifier("stg_transaction").is_ok());
        assert!(validate_identifier("_t1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("x; DROP TABLE y").is_err());
        assert_eq!(TargetTable::from_name("fact_stock"), Some(TargetTable::FactStock));
    }
}
