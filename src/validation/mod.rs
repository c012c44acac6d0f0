//! Schema validation against declarative [`DataContract`]s.
//!
//! Validation is lazy: every rule is evaluated on every row and all violations are returned
//! together. A passing dataset is returned unchanged; nothing is coerced or dropped.

pub mod contract;

pub use contract::{stock_contract, transaction_contract, Check, ColumnContract, DataContract};

use crate::error::{PipelineError, SchemaValidationError, Violation};
use crate::observability::{report_failure, PipelineObserver, Severity, Stage, StepContext, StepStats};
use crate::types::DataSet;

/// Validate `dataset` against `contract`, collecting every violation.
pub fn validate(
    source_name: &str,
    dataset: DataSet,
    contract: &DataContract,
) -> Result<DataSet, SchemaValidationError> {
    let violations = find_violations(&dataset, contract);
    if violations.is_empty() {
        Ok(dataset)
    } else {
        Err(SchemaValidationError {
            source_name: source_name.to_string(),
            violations,
        })
    }
}

/// Run [`validate`] and report the outcome to `observer`.
pub fn validate_observed(
    source_name: &str,
    dataset: DataSet,
    contract: &DataContract,
    observer: &dyn PipelineObserver,
    alert_at_or_above: Severity,
) -> Result<DataSet, PipelineError> {
    let ctx = StepContext::new(source_name, Stage::Validate);
    match validate(source_name, dataset, contract) {
        Ok(ds) => {
            observer.on_success(&ctx, StepStats { rows: ds.row_count() });
            Ok(ds)
        }
        Err(e) => {
            let err = PipelineError::from(e);
            report_failure(observer, &ctx, &err, alert_at_or_above);
            Err(err)
        }
    }
}

/// All violations of `contract` in `dataset`, column by column in contract order.
///
/// A dataset without columns (an empty extraction) has nothing to check. A row-less dataset
/// is only checked for column presence since its column types were never observed.
pub fn find_violations(dataset: &DataSet, contract: &DataContract) -> Vec<Violation> {
    let mut out = Vec::new();
    if dataset.schema.fields.is_empty() && dataset.is_empty() {
        return out;
    }
    for column in &contract.columns {
        let Some(idx) = dataset.schema.index_of(&column.name) else {
            out.push(Violation {
                column: column.name.clone(),
                rule: "column_present".to_string(),
                row: None,
                value: None,
            });
            continue;
        };

        let actual = dataset.schema.fields[idx].data_type;
        if dataset.is_empty() {
            continue;
        }
        if !column.accepts_type(actual) {
            out.push(Violation {
                column: column.name.clone(),
                rule: format!("dtype({})", column.data_type),
                row: None,
                value: Some(actual.to_string()),
            });
            continue;
        }

        for (row_idx, row) in dataset.rows.iter().enumerate() {
            let value = &row[idx];
            if value.is_null() {
                if !column.nullable {
                    out.push(Violation {
                        column: column.name.clone(),
                        rule: "not_nullable".to_string(),
                        row: Some(row_idx),
                        value: None,
                    });
                }
                continue;
            }
            for check in &column.checks {
                if !check.passes(value) {
                    out.push(Violation {
                        column: column.name.clone(),
                        rule: check.to_string(),
                        row: Some(row_idx),
                        value: Some(value.to_string()),
                    });
                }
            }
        }
    }
    out
}
