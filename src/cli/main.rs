//! `cocktail-etl` command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cocktail_etl::calendar::{generate_date_dimension, Granularity};
use cocktail_etl::config::PipelineConfig;
use cocktail_etl::extract::csv::parse_timestamp;
use cocktail_etl::extract::ReqwestTransport;
use cocktail_etl::merge::MergeOutcome;
use cocktail_etl::pipeline::{observer_for, Pipeline, RunSummary};
use cocktail_etl::types::DataSet;
use cocktail_etl::warehouse::{MemoryWarehouse, Warehouse};

#[derive(Debug, Parser)]
#[command(name = "cocktail-etl", version, about = "Load bar, cocktail, stock and sales data into a star schema")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract, validate, stage and merge everything described by the config.
    Run {
        #[arg(long, short)]
        config: PathBuf,
        /// Database file; overrides `database.path`.
        #[arg(long)]
        database: Option<PathBuf>,
        /// Create target tables and load the date dimension.
        #[arg(long)]
        initial_load: bool,
        /// Use a throwaway in-memory warehouse.
        #[arg(long)]
        memory: bool,
    },
    /// Print the date dimension for a range as CSV.
    DateDim {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value_t = Granularity::Hour)]
        granularity: Granularity,
    },
    /// Extract and validate every source without writing anything.
    Validate {
        #[arg(long, short)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run {
            config,
            database,
            initial_load,
            memory,
        } => {
            let mut cfg = PipelineConfig::load(&config)?;
            if let Some(path) = database {
                cfg.database.path = path;
            }
            cfg.database.initial_load |= initial_load;
            run(cfg, memory)
        }
        Command::DateDim {
            start,
            end,
            granularity,
        } => {
            let start = parse_timestamp(&start, None).map_err(anyhow::Error::msg).context("--start")?;
            let end = parse_timestamp(&end, None).map_err(anyhow::Error::msg).context("--end")?;
            write_csv(&generate_date_dimension(start, end, granularity))
        }
        Command::Validate { config } => {
            let cfg = PipelineConfig::load(&config)?;
            let observer = observer_for(cfg.log_file.as_deref());
            let pipeline = Pipeline::new(cfg, Arc::new(ReqwestTransport::new()?), observer);
            let mut failures = Vec::new();
            let extracted = pipeline.extract_all(&mut failures)?;
            for (name, ds) in [
                ("glass", &extracted.glass),
                ("cocktail", &extracted.cocktail),
                ("bar_stock", &extracted.bar_stock),
                ("transactions", &extracted.transactions),
            ] {
                if let Some(ds) = ds {
                    println!("{name}: {} row(s)", ds.row_count());
                }
            }
            if !failures.is_empty() {
                for f in &failures {
                    eprintln!("{} ({}): {}", f.dataset, f.stage, f.error);
                }
                bail!("{} dataset(s) failed", failures.len());
            }
            Ok(())
        }
    }
}

fn run(cfg: PipelineConfig, memory: bool) -> Result<()> {
    let mut warehouse = open_warehouse(&cfg, memory)?;
    let observer = observer_for(cfg.log_file.as_deref());
    let pipeline = Pipeline::new(cfg, Arc::new(ReqwestTransport::new()?), observer);
    let summary = pipeline.run(&mut *warehouse)?;
    print_summary(&summary);
    if !summary.is_clean() {
        bail!("{} step(s) failed", summary.failures.len());
    }
    Ok(())
}

#[cfg(feature = "duckdb-backend")]
fn open_warehouse(cfg: &PipelineConfig, memory: bool) -> Result<Box<dyn Warehouse>> {
    if memory {
        return Ok(Box::new(MemoryWarehouse::new()));
    }
    let wh = cocktail_etl::warehouse::DuckDbWarehouse::open(&cfg.database.path)
        .with_context(|| format!("opening {}", cfg.database.path.display()))?;
    Ok(Box::new(wh))
}

#[cfg(not(feature = "duckdb-backend"))]
fn open_warehouse(_cfg: &PipelineConfig, memory: bool) -> Result<Box<dyn Warehouse>> {
    if !memory {
        tracing::warn!("built without duckdb-backend; using an in-memory warehouse");
    }
    Ok(Box::new(MemoryWarehouse::new()))
}

fn print_summary(summary: &RunSummary) {
    for (table, outcome) in &summary.staged {
        println!("staged {table}: {outcome:?}");
    }
    for outcome in &summary.merges {
        match outcome {
            MergeOutcome::Merged(r) => println!(
                "{}: inserted {} of {} (present {}, duplicate {}, null key {}, unresolved {})",
                r.table, r.inserted, r.candidates, r.already_present, r.duplicates_in_batch, r.null_keys, r.unresolved
            ),
            MergeOutcome::Skipped { table, reason } => println!("{table}: skipped ({reason})"),
        }
    }
}

fn write_csv(ds: &DataSet) -> Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout().lock());
    writer.write_record(ds.schema.field_names())?;
    for row in &ds.rows {
        writer.write_record(row.iter().map(ToString::to_string))?;
    }
    writer.flush()?;
    Ok(())
}
