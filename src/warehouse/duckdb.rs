//! Embedded DuckDB warehouse.
//!
//! Surrogate keys come from sequences, natural keys carry `UNIQUE` constraints and facts
//! reference their dimensions with foreign keys. Each write runs in its own transaction.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use duckdb::types::Value as SqlValue;
use duckdb::{params_from_iter, Connection};

use crate::error::{WarehouseError, WarehouseResult};
use crate::types::{DataSet, DataType, Field, Schema, Value};

use super::{check_insert_schema, validate_identifier, TargetTable, Warehouse};

/// DDL for the star schema. Every statement is idempotent.
pub const TARGET_DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS seq_bar_id START 1;
CREATE SEQUENCE IF NOT EXISTS seq_glass_id START 1;
CREATE SEQUENCE IF NOT EXISTS seq_cocktail_id START 1;

CREATE TABLE IF NOT EXISTS dim_bar (
    "bar_id" BIGINT PRIMARY KEY DEFAULT nextval('seq_bar_id'),
    "name" VARCHAR NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS dim_glass (
    "glass_id" BIGINT PRIMARY KEY DEFAULT nextval('seq_glass_id'),
    "name" VARCHAR NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS dim_cocktail (
    "cocktail_id" BIGINT PRIMARY KEY DEFAULT nextval('seq_cocktail_id'),
    "glass_id" BIGINT NOT NULL REFERENCES dim_glass ("glass_id"),
    "name" VARCHAR NOT NULL,
    UNIQUE ("name", "glass_id")
);

CREATE TABLE IF NOT EXISTS dim_date (
    "date_id" VARCHAR PRIMARY KEY,
    "date" TIMESTAMP NOT NULL,
    "day_name" VARCHAR NOT NULL,
    "calendar_day" BIGINT NOT NULL,
    "hour" BIGINT NOT NULL,
    "calendar_week" BIGINT NOT NULL,
    "calendar_month" VARCHAR NOT NULL,
    "quarter" BIGINT NOT NULL,
    "year" BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS fact_stock (
    "bar_id" BIGINT NOT NULL REFERENCES dim_bar ("bar_id"),
    "glass_id" BIGINT NOT NULL REFERENCES dim_glass ("glass_id"),
    "stock" BIGINT NOT NULL CHECK ("stock" >= 0),
    PRIMARY KEY ("bar_id", "glass_id")
);

CREATE TABLE IF NOT EXISTS fact_transaction (
    "bar_id" BIGINT NOT NULL REFERENCES dim_bar ("bar_id"),
    "cocktail_id" BIGINT NOT NULL REFERENCES dim_cocktail ("cocktail_id"),
    "date_id" VARCHAR NOT NULL REFERENCES dim_date ("date_id"),
    "amount" DOUBLE NOT NULL CHECK ("amount" > 0),
    "date" TIMESTAMP NOT NULL,
    UNIQUE ("bar_id", "cocktail_id", "date")
);
"#;

// DuckDB timestamps carry microseconds; both directions keep them.
const SQL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const SQL_READ_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.%f";
const READ_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Warehouse backed by a DuckDB database file (or an in-memory database).
pub struct DuckDbWarehouse {
    path: Option<PathBuf>,
    conn: Connection,
}

impl std::fmt::Debug for DuckDbWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbWarehouse").field("path", &self.path).finish_non_exhaustive()
    }
}

impl DuckDbWarehouse {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> WarehouseResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        tracing::debug!(path = %path.display(), "opened duckdb warehouse");
        Ok(Self { path: Some(path), conn })
    }

    pub fn open_in_memory() -> WarehouseResult<Self> {
        Ok(Self {
            path: None,
            conn: Connection::open_in_memory()?,
        })
    }

    /// Database file path; `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn columns(&self, name: &str) -> WarehouseResult<Vec<Field>> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = 'main' AND table_name = ? ORDER BY ordinal_position",
        )?;
        let mut rows = stmt.query([name])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let column: String = row.get(0)?;
            let sql_type: String = row.get(1)?;
            out.push(Field::new(column, data_type_from_sql(&sql_type)));
        }
        Ok(out)
    }
}

fn data_type_from_sql(sql_type: &str) -> DataType {
    let t = sql_type.to_ascii_uppercase();
    if ["BIGINT", "INTEGER", "SMALLINT", "TINYINT", "HUGEINT", "UBIGINT", "UINTEGER", "USMALLINT", "UTINYINT"]
        .iter()
        .any(|p| t == *p)
    {
        DataType::Int64
    } else if t == "DOUBLE" || t == "FLOAT" || t == "REAL" || t.starts_with("DECIMAL") {
        DataType::Float64
    } else if t == "BOOLEAN" {
        DataType::Bool
    } else if t.starts_with("TIMESTAMP") || t == "DATE" {
        DataType::Timestamp
    } else {
        DataType::Utf8
    }
}

fn sql_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Int64 => "BIGINT",
        DataType::Float64 => "DOUBLE",
        DataType::Bool => "BOOLEAN",
        DataType::Utf8 => "VARCHAR",
        DataType::Timestamp => "TIMESTAMP",
    }
}

fn quote(name: &str) -> WarehouseResult<String> {
    validate_identifier(name)?;
    Ok(format!("\"{name}\""))
}

fn select_expr(field: &Field) -> WarehouseResult<String> {
    let col = quote(&field.name)?;
    Ok(match field.data_type {
        DataType::Int64 => format!("CAST({col} AS BIGINT)"),
        DataType::Float64 => format!("CAST({col} AS DOUBLE)"),
        DataType::Bool => col,
        DataType::Utf8 => format!("CAST({col} AS VARCHAR)"),
        DataType::Timestamp => format!("strftime(CAST({col} AS TIMESTAMP), '{SQL_READ_FORMAT}')"),
    })
}

fn placeholder(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Timestamp => "CAST(? AS TIMESTAMP)",
        _ => "?",
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int64(v) => SqlValue::BigInt(*v),
        Value::Float64(v) => SqlValue::Double(*v),
        Value::Bool(v) => SqlValue::Boolean(*v),
        Value::Utf8(s) => SqlValue::Text(s.clone()),
        Value::Timestamp(ts) => SqlValue::Text(ts.format(SQL_TIMESTAMP_FORMAT).to_string()),
    }
}

fn read_value(row: &duckdb::Row<'_>, idx: usize, field: &Field, table: &str) -> WarehouseResult<Value> {
    let value = match field.data_type {
        DataType::Int64 => row.get::<_, Option<i64>>(idx)?.map(Value::Int64),
        DataType::Float64 => row.get::<_, Option<f64>>(idx)?.map(Value::Float64),
        DataType::Bool => row.get::<_, Option<bool>>(idx)?.map(Value::Bool),
        DataType::Utf8 => row.get::<_, Option<String>>(idx)?.map(Value::Utf8),
        DataType::Timestamp => match row.get::<_, Option<String>>(idx)? {
            Some(text) => Some(Value::Timestamp(
                NaiveDateTime::parse_from_str(&text, READ_PARSE_FORMAT).map_err(|e| WarehouseError::Conversion {
                    table: table.to_string(),
                    column: field.name.clone(),
                    message: format!("'{text}': {e}"),
                })?,
            )),
            None => None,
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

fn constraint_or_db(table: &str, e: duckdb::Error) -> WarehouseError {
    let message = e.to_string();
    if message.contains("Constraint Error") {
        WarehouseError::ConstraintViolation {
            table: table.to_string(),
            message,
        }
    } else {
        WarehouseError::DuckDb(e)
    }
}

impl Warehouse for DuckDbWarehouse {
    fn table_exists(&self, name: &str) -> WarehouseResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM information_schema.tables WHERE table_schema = 'main' AND table_name = ?",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn read_table(&self, name: &str) -> WarehouseResult<DataSet> {
        let table = quote(name)?;
        let fields = self.columns(name)?;
        if fields.is_empty() {
            return Err(WarehouseError::TableNotFound(name.to_string()));
        }
        let exprs = fields.iter().map(select_expr).collect::<WarehouseResult<Vec<_>>>()?;
        let order = match TargetTable::from_name(name).and_then(TargetTable::surrogate_key) {
            Some(sk) => format!(" ORDER BY {}", quote(sk)?),
            None => String::new(),
        };
        let sql = format!("SELECT {} FROM {table}{order}", exprs.join(", "));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = fields
                .iter()
                .enumerate()
                .map(|(i, f)| read_value(row, i, f, name))
                .collect::<WarehouseResult<Vec<_>>>()?;
            out.push(values);
        }
        Ok(DataSet::new(Schema::new(fields), out))
    }

    fn replace_table(&mut self, name: &str, data: &DataSet) -> WarehouseResult<()> {
        let table = quote(name)?;
        if data.schema.fields.is_empty() {
            return Err(WarehouseError::SchemaMismatch {
                table: name.to_string(),
                message: "cannot create a table without columns".to_string(),
            });
        }
        let column_defs = data
            .schema
            .fields
            .iter()
            .map(|f| Ok(format!("{} {}", quote(&f.name)?, sql_type(f.data_type))))
            .collect::<WarehouseResult<Vec<_>>>()?;
        let placeholders: Vec<&str> = data.schema.fields.iter().map(|f| placeholder(f.data_type)).collect();

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({});",
            column_defs.join(", ")
        ))?;
        {
            let mut stmt = tx.prepare(&format!("INSERT INTO {table} VALUES ({})", placeholders.join(", ")))?;
            for row in &data.rows {
                stmt.execute(params_from_iter(row.iter().map(to_sql_value)))?;
            }
        }
        tx.commit()?;
        tracing::debug!(table = name, rows = data.row_count(), "replaced table");
        Ok(())
    }

    fn append(&mut self, table: TargetTable, data: &DataSet) -> WarehouseResult<usize> {
        check_insert_schema(table, data)?;
        if data.is_empty() {
            return Ok(0);
        }
        let columns = data
            .schema
            .fields
            .iter()
            .map(|f| quote(&f.name))
            .collect::<WarehouseResult<Vec<_>>>()?;
        let placeholders: Vec<&str> = data.schema.fields.iter().map(|f| placeholder(f.data_type)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name(),
            columns.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in &data.rows {
                stmt.execute(params_from_iter(row.iter().map(to_sql_value)))
                    .map_err(|e| constraint_or_db(table.name(), e))?;
            }
        }
        tx.commit()?;
        Ok(data.row_count())
    }

    fn create_target_tables(&mut self) -> WarehouseResult<()> {
        self.conn.execute_batch(TARGET_DDL)?;
        Ok(())
    }
}
