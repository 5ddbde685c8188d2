//! Importer for the BSDEX transaction history export.
//!
//! The export is raw order data (German locale, one row per order), so
//! this importer filters down to closed buy/sell executions and hands
//! them to the FIFO matcher.

use super::{skip_or_abort, Import, Parsed, ParseOptions};
use crate::error::ConvertError;
use crate::fifo::{Execution, Side};
use crate::money::parse_german_amount;
use chrono::{Datelike, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::io::Read;

pub(super) const REQUIRED_COLUMNS: &[&str] = &[
    "Erstellt",
    "Seite",
    "Bestellstatus",
    "Ausgeführter Gesamtbetrag",
    "Ausgeführte Menge",
    "Gefüllt",
    "Transaktionsentgelt",
];

const DATE_FORMAT: &str = "%d.%m.%Y, %H:%M";

/// Fallback when the export carries no EUR value at all: BSDEX charges a
/// 0.35 % taker fee, so value = fee / 0.0035.
const EUR_VALUE_PER_FEE: Decimal = dec!(285.714285714286);

#[derive(Debug, Deserialize, Clone)]
struct Record {
    #[serde(rename = "Erstellt")]
    created: String,
    #[serde(rename = "Seite")]
    side: String,
    #[serde(rename = "Bestellstatus")]
    order_status: String,
    #[serde(rename = "Ausgeführter Gesamtbetrag")]
    total_executed: String,
    #[serde(rename = "Ausgeführte Menge")]
    executed_value: String,
    #[serde(rename = "Gefüllt")]
    filled: String,
    #[serde(rename = "Transaktionsentgelt")]
    fee: String,
}

pub(super) fn import<R: Read>(
    rdr: &mut csv::Reader<R>,
    options: ParseOptions,
) -> anyhow::Result<Import> {
    let mut executions = Vec::new();
    let mut fees_eur = Decimal::ZERO;
    let mut skipped_rows = 0;

    for (i, row) in rdr.deserialize::<Record>().enumerate() {
        let line = i as u64 + 2;
        let record = match row {
            Ok(record) => record,
            Err(e) => {
                let err = ConvertError::MalformedRow {
                    line,
                    reason: e.to_string(),
                };
                skip_or_abort(err, options.strict, &mut skipped_rows)?;
                continue;
            }
        };

        // Open and cancelled orders never moved funds.
        if record.order_status != "Geschlossen" {
            log::debug!("line {line}: skipping order status {:?}", record.order_status);
            continue;
        }
        let side = match record.side.as_str() {
            "Kaufen" => Side::Buy,
            "Verkaufen" => Side::Sell,
            other => {
                log::debug!("line {line}: skipping non-trade side {other:?}");
                continue;
            }
        };

        match parse_execution(&record, side, line) {
            Ok((execution, fee)) => {
                if options
                    .tax_year
                    .map_or(true, |y| execution.executed_at.year() == y)
                {
                    fees_eur += fee;
                }
                executions.push(execution);
            }
            Err(err) => skip_or_abort(err, options.strict, &mut skipped_rows)?,
        }
    }

    log::info!("parsed {} execution(s) from BSDEX export", executions.len());
    Ok(Import {
        parsed: Parsed::Executions(executions),
        fees_eur,
        skipped_rows,
    })
}

fn parse_execution(
    record: &Record,
    side: Side,
    line: u64,
) -> Result<(Execution, Decimal), ConvertError> {
    let malformed = |reason: String| ConvertError::MalformedRow { line, reason };

    let executed_at = NaiveDateTime::parse_from_str(record.created.trim(), DATE_FORMAT)
        .map_err(|e| malformed(format!("invalid date {:?}: {e}", record.created)))?;

    let (quantity, asset) = parse_german_amount(&record.total_executed).map_err(&malformed)?;
    let asset =
        asset.ok_or_else(|| malformed(format!("no asset in {:?}", record.total_executed)))?;
    let (fee, _) = parse_german_amount(&record.fee).map_err(&malformed)?;

    // Older exports leave "Ausgeführte Menge" empty; fall back to the
    // filled amount, then to the fee heuristic.
    let mut value_eur = parse_german_amount(&record.executed_value).map_err(&malformed)?.0;
    if value_eur.is_zero() {
        value_eur = parse_german_amount(&record.filled).map_err(&malformed)?.0;
        if value_eur.is_zero() {
            value_eur = fee * EUR_VALUE_PER_FEE;
        }
    }

    if quantity.is_zero() || value_eur.is_zero() {
        return Err(malformed(format!(
            "missing amount or value for {asset} at {executed_at}"
        )));
    }

    Ok((
        Execution {
            executed_at,
            side,
            asset,
            quantity,
            value_eur,
        },
        fee,
    ))
}
