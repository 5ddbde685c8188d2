use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while converting an exchange export.
///
/// `SchemaMismatch` and `AggregationInvariantViolation` are always fatal.
/// `MalformedRow` and `InsufficientLots` are warnings by default and only
/// fatal when running with `--strict`.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("csv header does not match any supported exchange export, closest match is {exchange} (missing columns: {missing:?})")]
    SchemaMismatch {
        exchange: &'static str,
        missing: Vec<String>,
    },

    #[error("line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("disposals of {asset} exceed recorded acquisitions by {missing}")]
    InsufficientLots { asset: String, missing: Decimal },

    #[error(
        "aggregated rows for {asset} sold {sold} / acquired {acquired} disagree on their \
         short/long classification"
    )]
    AggregationInvariantViolation {
        asset: String,
        sold: NaiveDate,
        acquired: NaiveDate,
    },
}
