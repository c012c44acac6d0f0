//! CSV extraction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{ExtractionError, ExtractionErrorKind, ExtractionResult};
use crate::processing::{apply_shaping, concat, ShapingOptions};
use crate::types::{DataSet, DataType, Field, Schema, Value};

use super::Extractor;

/// Formats tried, in order, for date columns without an explicit `date_format`.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Configuration for a CSV-file data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvSourceConfig {
    /// Name of the data source, used in diagnostics.
    pub name: String,
    /// File path or glob pattern. Multiple matches are read in sorted order and concatenated.
    pub path: String,
    /// Field delimiter (single ASCII character).
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Whether the first record is a header. Headerless columns are named `"0"`, `"1"`, ...
    #[serde(default = "default_true")]
    pub has_headers: bool,
    /// Columns parsed as timestamps.
    #[serde(default)]
    pub date_columns: Vec<String>,
    /// `chrono` format for `date_columns`; a fixed list of ISO-like formats is tried when unset.
    #[serde(default)]
    pub date_format: Option<String>,
    /// Column holding a row index; it is left out of the dataset.
    #[serde(default)]
    pub index_column: Option<String>,
    /// Explicit column types. Columns not listed here are inferred.
    #[serde(default)]
    pub column_types: BTreeMap<String, DataType>,
    /// Drop/rename/dedup/title-case steps.
    #[serde(flatten)]
    pub shaping: ShapingOptions,
}

fn default_delimiter() -> char {
    ','
}

fn default_true() -> bool {
    true
}

impl CsvSourceConfig {
    /// A config with default parse options for `path`.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            delimiter: default_delimiter(),
            has_headers: true,
            date_columns: Vec::new(),
            date_format: None,
            index_column: None,
            column_types: BTreeMap::new(),
            shaping: ShapingOptions::default(),
        }
    }
}

/// Reads a CSV source and applies its shaping.
#[derive(Debug, Clone)]
pub struct CsvExtractor {
    config: CsvSourceConfig,
}

impl CsvExtractor {
    pub fn new(config: CsvSourceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CsvSourceConfig {
        &self.config
    }

    fn error(&self, kind: ExtractionErrorKind) -> ExtractionError {
        ExtractionError::new(&self.config.name, &self.config, kind)
    }

    fn resolve_paths(&self) -> Result<Vec<PathBuf>, ExtractionErrorKind> {
        let mut paths = Vec::new();
        for entry in glob::glob(&self.config.path)? {
            let path = entry.map_err(|e| ExtractionErrorKind::Io(e.into_error()))?;
            if path.is_file() {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(ExtractionErrorKind::Unreachable {
                message: format!("no file matches '{}'", self.config.path),
            });
        }
        paths.sort();
        Ok(paths)
    }

    fn fetch_inner(&self) -> Result<DataSet, ExtractionErrorKind> {
        let mut parts = Vec::new();
        for path in self.resolve_paths()? {
            tracing::debug!(source = %self.config.name, path = %path.display(), "reading csv");
            parts.push(read_csv_path(&path, &self.config)?);
        }
        let raw = concat(parts)?;
        apply_shaping(&raw, &self.config.shaping)
    }
}

impl Extractor for CsvExtractor {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn fetch(&self) -> ExtractionResult<DataSet> {
        self.fetch_inner().map_err(|kind| self.error(kind))
    }
}

/// Read one CSV file into a [`DataSet`] (no shaping).
pub fn read_csv_path(path: impl AsRef<Path>, opts: &CsvSourceConfig) -> Result<DataSet, ExtractionErrorKind> {
    let mut rdr = reader_builder(opts)?.from_path(path)?;
    read_csv(&mut rdr, opts)
}

/// Read CSV data from an in-memory string (no shaping).
pub fn read_csv_str(input: &str, opts: &CsvSourceConfig) -> Result<DataSet, ExtractionErrorKind> {
    let mut rdr = reader_builder(opts)?.from_reader(input.as_bytes());
    read_csv(&mut rdr, opts)
}

fn reader_builder(opts: &CsvSourceConfig) -> Result<csv::ReaderBuilder, ExtractionErrorKind> {
    if !opts.delimiter.is_ascii() {
        return Err(ExtractionErrorKind::Malformed {
            message: format!("delimiter {:?} is not a single ascii character", opts.delimiter),
        });
    }
    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(opts.delimiter as u8)
        .has_headers(opts.has_headers);
    Ok(builder)
}

/// Read CSV data from an existing CSV reader.
///
/// Rules:
///
/// - Columns named in `date_columns` are parsed as timestamps.
/// - Columns named in `column_types` are parsed as that type.
/// - Any other column is `int64` if every non-empty cell is an integer, `float64` if every
///   non-empty cell is numeric, and `utf8` otherwise.
/// - Empty cells become [`Value::Null`].
pub fn read_csv<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
    opts: &CsvSourceConfig,
) -> Result<DataSet, ExtractionErrorKind> {
    let header: Option<Vec<String>> = if opts.has_headers {
        Some(rdr.headers()?.iter().map(|h| h.trim().to_string()).collect())
    } else {
        None
    };

    let records = rdr.records().collect::<Result<Vec<_>, _>>()?;

    let names: Vec<String> = match header {
        Some(h) => h,
        None => {
            let width = records.first().map(|r| r.len()).unwrap_or(0);
            (0..width).map(|i| i.to_string()).collect()
        }
    };

    let require = |column: &str| -> Result<usize, ExtractionErrorKind> {
        names
            .iter()
            .position(|n| n == column)
            .ok_or_else(|| ExtractionErrorKind::MissingColumn {
                column: column.to_string(),
                available: names.clone(),
            })
    };

    let index_idx = opts.index_column.as_deref().map(require).transpose()?;
    for c in &opts.date_columns {
        require(c)?;
    }
    for c in opts.column_types.keys() {
        require(c)?;
    }

    // Report 1-based row numbers for users; +1 again when a header occupies row 1.
    let first_row = if opts.has_headers { 2 } else { 1 };

    let mut fields = Vec::with_capacity(names.len());
    let mut columns: Vec<Vec<Value>> = Vec::with_capacity(names.len());
    for (col_idx, name) in names.iter().enumerate() {
        if Some(col_idx) == index_idx {
            continue;
        }
        let raw: Vec<&str> = records.iter().map(|r| r.get(col_idx).unwrap_or("")).collect();

        let data_type = if opts.date_columns.contains(name) {
            DataType::Timestamp
        } else if let Some(t) = opts.column_types.get(name) {
            *t
        } else {
            infer_type(&raw)
        };

        let mut values = Vec::with_capacity(raw.len());
        for (i, cell) in raw.iter().enumerate() {
            values.push(parse_typed_value(
                i + first_row,
                name,
                data_type,
                cell,
                opts.date_format.as_deref(),
            )?);
        }
        fields.push(Field::new(name.clone(), data_type));
        columns.push(values);
    }

    let rows = (0..records.len())
        .map(|r| columns.iter().map(|col| col[r].clone()).collect())
        .collect();
    Ok(DataSet::new(Schema::new(fields), rows))
}

fn infer_type(cells: &[&str]) -> DataType {
    let mut any = false;
    let mut all_int = true;
    for cell in cells {
        let t = cell.trim();
        if t.is_empty() {
            continue;
        }
        any = true;
        if all_int && t.parse::<i64>().is_ok() {
            continue;
        }
        all_int = false;
        if t.parse::<f64>().is_err() {
            return DataType::Utf8;
        }
    }
    match (any, all_int) {
        (false, _) => DataType::Utf8,
        (true, true) => DataType::Int64,
        (true, false) => DataType::Float64,
    }
}

fn parse_typed_value(
    row: usize,
    column: &str,
    data_type: DataType,
    raw: &str,
    date_format: Option<&str>,
) -> Result<Value, ExtractionErrorKind> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let parse_error = |message: String| ExtractionErrorKind::ParseError {
        row,
        column: column.to_owned(),
        raw: raw.to_owned(),
        message,
    };

    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
        DataType::Int64 => trimmed
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Float64 => trimmed
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Bool => parse_bool(trimmed).map(Value::Bool).map_err(parse_error),
        DataType::Timestamp => parse_timestamp(trimmed, date_format)
            .map(Value::Timestamp)
            .map_err(parse_error),
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}

/// Parse a timestamp with `format`, or with the fallback formats when `format` is `None`.
///
/// Date-only input (`%Y-%m-%d`, or a date-only `format`) maps to midnight.
pub fn parse_timestamp(s: &str, format: Option<&str>) -> Result<NaiveDateTime, String> {
    let formats: Vec<&str> = match format {
        Some(f) => vec![f],
        None => FALLBACK_DATE_FORMATS.to_vec(),
    };
    for f in &formats {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, f) {
            return Ok(ts);
        }
    }
    let date_format = format.unwrap_or("%Y-%m-%d");
    if let Ok(d) = NaiveDate::parse_from_str(s, date_format) {
        if let Some(ts) = d.and_hms_opt(0, 0, 0) {
            return Ok(ts);
        }
    }
    Err(format!("expected timestamp matching {formats:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_column_types() {
        let opts = CsvSourceConfig::new("stock", "-");
        let ds = read_csv_str("glass_type,stock,bar\ncoupe,3,London\nflute,,Budapest\n", &opts).unwrap();
        let types: Vec<_> = ds.schema.fields.iter().map(|f| f.data_type).collect();
        assert_eq!(types, vec![DataType::Utf8, DataType::Int64, DataType::Utf8]);
        assert_eq!(ds.rows[1][1], Value::Null);
    }

    #[test]
    fn mixed_int_and_float_infers_float() {
        assert_eq!(infer_type(&["1", "2.5", ""]), DataType::Float64);
        assert_eq!(infer_type(&["1", "x"]), DataType::Utf8);
        assert_eq!(infer_type(&["", " "]), DataType::Utf8);
    }

    #[test]
    fn headerless_with_index_and_dates() {
        let mut opts = CsvSourceConfig::new("london", "-");
        opts.delimiter = '\t';
        opts.has_headers = false;
        opts.index_column = Some("0".into());
        opts.date_columns = vec!["1".into()];
        opts.date_format = Some("%Y-%m-%d %H:%M:%S".into());

        let input = "7\t2023-04-01 10:15:00\tmojito\t8.5\n";
        let ds = read_csv_str(input, &opts).unwrap();
        assert_eq!(ds.schema.field_names().collect::<Vec<_>>(), vec!["1", "2", "3"]);
        let ts = NaiveDate::from_ymd_opt(2023, 4, 1).unwrap().and_hms_opt(10, 15, 0).unwrap();
        assert_eq!(ds.rows[0][0], Value::Timestamp(ts));
        assert_eq!(ds.rows[0][2], Value::Float64(8.5));
    }

    #[test]
    fn bad_date_reports_row_and_column() {
        let mut opts = CsvSourceConfig::new("ny", "-");
        opts.date_columns = vec!["time".into()];
        opts.date_format = Some("%m-%d-%Y %H:%M".into());
        let err = read_csv_str("time,drink\n04-01-2023 10:15,mojito\nyesterday,negroni\n", &opts).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("row 3"), "{msg}");
        assert!(msg.contains("column 'time'"), "{msg}");
    }

    #[test]
    fn explicit_column_type_overrides_inference() {
        let mut opts = CsvSourceConfig::new("tx", "-");
        opts.column_types.insert("amount".into(), DataType::Float64);
        let ds = read_csv_str("amount\n3\n", &opts).unwrap();
        assert_eq!(ds.rows[0][0], Value::Float64(3.0));
    }

    #[test]
    fn unknown_configured_column_is_missing_column() {
        let mut opts = CsvSourceConfig::new("tx", "-");
        opts.index_column = Some("id".into());
        let err = read_csv_str("a,b\n1,2\n", &opts).unwrap_err();
        assert!(matches!(err, ExtractionErrorKind::MissingColumn { ref column, .. } if column == "id"));
    }

    #[test]
    fn parse_timestamp_accepts_date_only() {
        let ts = parse_timestamp("2020-01-01", None).unwrap();
        assert_eq!(ts.format("%H:%M").to_string(), "00:00");
        assert!(parse_timestamp("2020-01-01 05:00", Some("%Y-%m-%d")).is_err());
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let mut opts = CsvSourceConfig::new("tx", "-");
        opts.delimiter = '§';
        assert!(read_csv_str("a\n1\n", &opts).is_err());
    }
}
