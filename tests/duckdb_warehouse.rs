#![cfg(feature = "duckdb-backend")]

mod common;

use cocktail_etl::error::WarehouseError;
use cocktail_etl::observability::Severity;
use cocktail_etl::staging::{stage, StageOutcome};
use cocktail_etl::types::{DataSet, Value};
use cocktail_etl::warehouse::{DuckDbWarehouse, TargetTable, Warehouse, MERGE_ORDER};

use common::{fixture_config, pipeline, Recorder};

fn row_counts(wh: &DuckDbWarehouse) -> Vec<usize> {
    MERGE_ORDER
        .iter()
        .map(|t| wh.read_table(t.name()).unwrap().row_count())
        .collect()
}

#[test]
fn pipeline_loads_a_database_file_and_reruns_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warehouse.duckdb");

    let (first, _) = pipeline(fixture_config());
    {
        let mut wh = DuckDbWarehouse::open(&path).unwrap();
        let summary = first.run(&mut wh).unwrap();
        assert!(summary.is_clean(), "{:?}", summary.failures);
        assert_eq!(row_counts(&wh), vec![3, 4, 5, 72, 3, 6]);
    }

    let mut config = fixture_config();
    config.database.initial_load = false;
    let (second, _) = pipeline(config);
    let mut wh = DuckDbWarehouse::open(&path).unwrap();
    assert_eq!(wh.path(), Some(path.as_path()));
    let summary = second.run(&mut wh).unwrap();
    assert_eq!(summary.inserted(), 0);
    assert_eq!(row_counts(&wh), vec![3, 4, 5, 72, 3, 6]);

    let glasses = wh.read_table("dim_glass").unwrap();
    assert_eq!(glasses.rows[0], vec![Value::Int64(1), Value::from("Highball Glass")]);
}

#[test]
fn storage_rejects_dangling_references() {
    let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
    wh.create_target_tables().unwrap();

    let stock = DataSet::new(
        TargetTable::FactStock.insert_schema(),
        vec![vec![Value::Int64(7), Value::Int64(9), Value::Int64(1)]],
    );
    let err = wh.append(TargetTable::FactStock, &stock).unwrap_err();
    assert!(matches!(err, WarehouseError::ConstraintViolation { .. }), "{err}");
    assert_eq!(wh.read_table("fact_stock").unwrap().row_count(), 0);
}

#[test]
fn empty_extraction_keeps_the_previous_staging_rows() {
    let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
    let (run, _) = pipeline(fixture_config());
    run.run(&mut wh).unwrap();
    let before = wh.read_table("stg_stock").unwrap();
    assert_eq!(before.row_count(), 4);

    let recorder = Recorder::default();
    let empty = DataSet::new(before.schema.clone(), Vec::new());
    let outcome = stage(&mut wh, "stg_stock", &empty, &recorder, Severity::Critical).unwrap();
    assert_eq!(outcome, StageOutcome::SkippedEmpty);
    assert_eq!(recorder.events(), vec!["skip:stage:stg_stock"]);
    assert_eq!(wh.read_table("stg_stock").unwrap(), before);
}
