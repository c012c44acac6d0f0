mod common;

use cocktail_etl::config::FailurePolicy;
use cocktail_etl::merge::MergeOutcome;
use cocktail_etl::observability::Stage;
use cocktail_etl::staging::StageOutcome;
use cocktail_etl::types::{KeyValue, Value};
use cocktail_etl::warehouse::{MemoryWarehouse, TargetTable, Warehouse, MERGE_ORDER};
use cocktail_etl::PipelineError;

use common::{fixture, fixture_config, pipeline};

fn report(outcomes: &[MergeOutcome], table: TargetTable) -> &cocktail_etl::merge::MergeReport {
    outcomes
        .iter()
        .find(|o| o.table() == table)
        .and_then(MergeOutcome::report)
        .unwrap_or_else(|| panic!("no merge report for {table}"))
}

#[test]
fn first_run_populates_the_star_schema() {
    let (pipeline, recorder) = pipeline(fixture_config());
    let mut wh = MemoryWarehouse::new();
    let summary = pipeline.run(&mut wh).unwrap();

    assert!(summary.is_clean(), "{:?}", summary.failures);
    assert_eq!(summary.date_rows, Some(72));
    assert_eq!(
        summary.staged,
        vec![
            ("stg_glass".to_string(), StageOutcome::Replaced { rows: 4 }),
            ("stg_cocktail".to_string(), StageOutcome::Replaced { rows: 5 }),
            ("stg_stock".to_string(), StageOutcome::Replaced { rows: 4 }),
            ("stg_transaction".to_string(), StageOutcome::Replaced { rows: 7 }),
            ("stg_date".to_string(), StageOutcome::Replaced { rows: 72 }),
        ]
    );

    assert_eq!(
        wh.table_names(),
        vec![
            "dim_bar", "dim_cocktail", "dim_date", "dim_glass", "fact_stock", "fact_transaction", "stg_cocktail",
            "stg_date", "stg_glass", "stg_stock", "stg_transaction",
        ]
    );

    assert_eq!(summary.inserted_into(TargetTable::DimGlass), 4);
    assert_eq!(summary.inserted_into(TargetTable::DimCocktail), 5);
    assert_eq!(summary.inserted_into(TargetTable::DimDate), 72);

    let bars = report(&summary.merges, TargetTable::DimBar);
    assert_eq!((bars.candidates, bars.inserted, bars.duplicates_in_batch), (11, 3, 8));

    let stock = report(&summary.merges, TargetTable::FactStock);
    assert_eq!(stock.inserted, 3);
    assert_eq!(stock.unresolved_samples, vec!["dim_glass=Paper Cup"]);

    let tx = report(&summary.merges, TargetTable::FactTransaction);
    assert_eq!((tx.candidates, tx.inserted, tx.unresolved), (7, 6, 1));
    assert_eq!(tx.unresolved_samples, vec!["dim_cocktail=Unknown Punch"]);

    let events = recorder.events();
    assert!(events.contains(&"partial:fact_stock:1".to_string()));
    assert!(events.contains(&"partial:fact_transaction:1".to_string()));
    assert!(events.contains(&"ok:generate:dim_date:72".to_string()));
}

#[test]
fn second_run_inserts_nothing() {
    let (pipeline, _) = pipeline(fixture_config());
    let mut wh = MemoryWarehouse::new();
    pipeline.run(&mut wh).unwrap();
    let before: Vec<_> = MERGE_ORDER
        .iter()
        .map(|t| wh.read_table(t.name()).unwrap())
        .collect();

    let summary = pipeline.run(&mut wh).unwrap();
    assert_eq!(summary.inserted(), 0);
    assert_eq!(report(&summary.merges, TargetTable::FactTransaction).already_present, 6);

    let after: Vec<_> = MERGE_ORDER
        .iter()
        .map(|t| wh.read_table(t.name()).unwrap())
        .collect();
    assert_eq!(before, after);
}

#[test]
fn transactions_resolve_to_the_lowest_cocktail_and_hourly_dates() {
    let (pipeline, _) = pipeline(fixture_config());
    let mut wh = MemoryWarehouse::new();
    pipeline.run(&mut wh).unwrap();

    let facts = wh.read_table("fact_transaction").unwrap();
    let cocktails = wh.read_table("dim_cocktail").unwrap();
    let mojito_ids: Vec<_> = cocktails
        .rows
        .iter()
        .filter(|r| r[2] == Value::from("Mojito"))
        .map(|r| r[0].clone())
        .collect();
    assert_eq!(mojito_ids, vec![Value::Int64(1), Value::Int64(4)]);

    let date_idx = facts.schema.index_of("date_id").unwrap();
    let cocktail_idx = facts.schema.index_of("cocktail_id").unwrap();
    let first = &facts.rows[0];
    assert_eq!(first[cocktail_idx], Value::Int64(1));
    assert_eq!(first[date_idx], Value::from("2023-03-01T18:00:00"));

    // Every fact reference points at an existing dimension row.
    for (column, reference) in TargetTable::FactTransaction.foreign_keys() {
        let dim = wh.read_table(reference.name()).unwrap();
        let key_idx = dim.schema.index_of(reference.key_column()).unwrap();
        let known: Vec<KeyValue> = dim.rows.iter().map(|r| KeyValue::from(&r[key_idx])).collect();
        let idx = facts.schema.index_of(column).unwrap();
        for row in &facts.rows {
            assert!(known.contains(&KeyValue::from(&row[idx])), "{column} {:?}", row[idx]);
        }
    }
}

#[test]
fn invalid_stock_aborts_before_staging() {
    let mut config = fixture_config();
    config.csv.bar_stock.path = fixture("bad_stock.csv").to_string_lossy().into_owned();
    let (pipeline, recorder) = pipeline(config);
    let mut wh = MemoryWarehouse::new();

    let err = pipeline.run(&mut wh).unwrap_err();
    let PipelineError::Validation(err) = err else {
        panic!("expected a validation error, got {err}");
    };
    assert_eq!(err.source_name, "bar_stock");
    assert_eq!(
        err.failed_checks(),
        vec![("stock", "greater_than_or_equal(0)"), ("stock", "not_nullable")]
    );
    assert!(!wh.table_exists("stg_stock").unwrap());
    assert!(recorder.events().contains(&"fail:validate:bar_stock:Error".to_string()));
}

#[test]
fn skip_policy_isolates_the_failed_dataset() {
    let mut config = fixture_config();
    config.on_dataset_error = FailurePolicy::Skip;
    config.csv.bar_stock.path = fixture("bad_stock.csv").to_string_lossy().into_owned();
    let (pipeline, _) = pipeline(config);
    let mut wh = MemoryWarehouse::new();

    let summary = pipeline.run(&mut wh).unwrap();
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].dataset, "bar_stock");
    assert_eq!(summary.failures[0].stage, Stage::Validate);

    let stock = summary.merges.iter().find(|o| o.table() == TargetTable::FactStock).unwrap();
    assert!(matches!(stock, MergeOutcome::Skipped { .. }));
    // Bars still arrive through the transaction files.
    assert_eq!(summary.inserted_into(TargetTable::DimBar), 3);
    assert_eq!(summary.inserted_into(TargetTable::FactTransaction), 6);
}

#[test]
fn without_initial_load_target_tables_must_exist() {
    let mut config = fixture_config();
    config.database.initial_load = false;
    let (pipeline, _) = pipeline(config);
    let mut wh = MemoryWarehouse::new();

    let err = pipeline.run(&mut wh).unwrap_err();
    assert!(err.to_string().contains("target table 'dim_bar' does not exist"), "{err}");
}
