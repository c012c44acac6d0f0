use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cocktail_etl::merge::{plan_inserts, resolve_references, KeyIndex, Lookup};
use cocktail_etl::types::{DataSet, DataType, Field, Schema, Value};
use cocktail_etl::warehouse::TargetTable;

fn dimension(table: TargetTable, prefix: &str, n: usize) -> DataSet {
    let rows = (0..n)
        .map(|i| vec![Value::Int64(i as i64 + 1), Value::Utf8(format!("{prefix} {i}"))])
        .collect();
    DataSet::new(table.schema(), rows)
}

/// Stock rows over `bars` x `glasses`, with every tenth glass unknown to the dimension.
fn stock_candidates(bars: usize, glasses: usize) -> DataSet {
    let mut rows = Vec::with_capacity(bars * glasses);
    for b in 0..bars {
        for g in 0..glasses {
            let glass = if g % 10 == 9 { format!("Unknown {g}") } else { format!("Glass {g}") };
            rows.push(vec![
                Value::Utf8(format!("Bar {b}")),
                Value::Utf8(glass),
                Value::Int64((b * g % 40) as i64),
            ]);
        }
    }
    DataSet::new(
        Schema::new(vec![
            Field::new("bar", DataType::Utf8),
            Field::new("glass", DataType::Utf8),
            Field::new("stock", DataType::Int64),
        ]),
        rows,
    )
}

fn bench_fact_stock(c: &mut Criterion) {
    let mut group = c.benchmark_group("fact_stock_merge");
    for bars in [10usize, 100] {
        let glasses = 200;
        let bar_dim = dimension(TargetTable::DimBar, "Bar", bars);
        let glass_dim = dimension(TargetTable::DimGlass, "Glass", glasses);
        let bar_index = KeyIndex::from_table(TargetTable::DimBar, &bar_dim, &["name"]).unwrap();
        let glass_index = KeyIndex::from_table(TargetTable::DimGlass, &glass_dim, &["name"]).unwrap();
        let candidates = stock_candidates(bars, glasses);
        let existing = DataSet::empty(TargetTable::FactStock.schema());

        group.bench_with_input(BenchmarkId::from_parameter(bars * glasses), &candidates, |b, candidates| {
            b.iter(|| {
                let lookups = [
                    Lookup {
                        columns: &["bar"],
                        output: "bar_id",
                        reference: TargetTable::DimBar,
                        index: &bar_index,
                    },
                    Lookup {
                        columns: &["glass"],
                        output: "glass_id",
                        reference: TargetTable::DimGlass,
                        index: &glass_index,
                    },
                ];
                let resolution =
                    resolve_references(TargetTable::FactStock, "stg_stock", candidates, &lookups).unwrap();
                let plan = plan_inserts(TargetTable::FactStock, &resolution.rows, &existing).unwrap();
                black_box(plan.rows.row_count())
            })
        });
    }
    group.finish();
}

fn bench_rerun(c: &mut Criterion) {
    // Second run over the same batch: every candidate is already present.
    let glass_dim = dimension(TargetTable::DimGlass, "Glass", 5_000);
    let candidates = DataSet::new(
        Schema::new(vec![Field::new("name", DataType::Utf8)]),
        glass_dim.rows.iter().map(|r| vec![r[1].clone()]).collect(),
    );
    c.bench_function("dim_glass_rerun_5k", |b| {
        b.iter(|| {
            let plan = plan_inserts(TargetTable::DimGlass, &candidates, &glass_dim).unwrap();
            black_box(plan.already_present)
        })
    });
}

criterion_group!(benches, bench_fact_stock, bench_rerun);
criterion_main!(benches);
