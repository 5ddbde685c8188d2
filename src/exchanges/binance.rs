//! Importer for the Binance "Realized Capital Gains" export.
//!
//! The export already contains FIFO-matched gain rows, so this importer
//! maps them straight to [`GainRecord`]s and bypasses the lot matcher.

use super::{skip_or_abort, Import, Parsed, ParseOptions};
use crate::error::ConvertError;
use crate::gains::{GainRecord, GainWarning, Term};
use crate::money::parse_english_number;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::io::Read;

pub(super) const REQUIRED_COLUMNS: &[&str] = &[
    "Currency name",
    "Currency amount",
    "Acquired",
    "Sold",
    "Proceeds (EUR)",
    "Cost basis (EUR)",
    "Gains (EUR)",
    "Transaction type",
];

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Reported gain may deviate from proceeds minus cost basis by rounding.
const GAIN_TOLERANCE_EUR: Decimal = dec!(0.005);

#[derive(Debug, Deserialize, Clone)]
struct Record {
    #[serde(rename = "Currency name")]
    currency: String,
    #[serde(rename = "Currency amount")]
    amount: String,
    #[serde(rename = "Acquired")]
    acquired: String,
    #[serde(rename = "Sold")]
    sold: String,
    #[serde(rename = "Proceeds (EUR)")]
    proceeds: String,
    #[serde(rename = "Cost basis (EUR)")]
    cost_basis: String,
    #[serde(rename = "Gains (EUR)")]
    gains: String,
    #[serde(rename = "Transaction type")]
    transaction_type: String,
}

pub(super) fn import<R: Read>(
    rdr: &mut csv::Reader<R>,
    options: ParseOptions,
) -> anyhow::Result<Import> {
    let mut gains = Vec::new();
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
        match record.transaction_type.as_str() {
            "Sell" | "Trade" => match parse_gain(&record, line, options.tax_year) {
                Ok(gain) => gains.push(gain),
                Err(err) => skip_or_abort(err, options.strict, &mut skipped_rows)?,
            },
            "Fee" => match parse_fee(&record, line) {
                Ok((sold, fee)) => {
                    if options.tax_year.map_or(true, |y| sold.year() == y) {
                        fees_eur += fee;
                    }
                }
                Err(err) => skip_or_abort(err, options.strict, &mut skipped_rows)?,
            },
            other => log::warn!("line {line}: ignoring transaction type {other:?}"),
        }
    }

    log::info!("parsed {} gain row(s) from Binance export", gains.len());
    Ok(Import {
        parsed: Parsed::Gains(gains),
        fees_eur,
        skipped_rows,
    })
}

fn parse_gain(record: &Record, line: u64, tax_year: Option<i32>) -> Result<GainRecord, ConvertError> {
    let malformed = |reason: String| ConvertError::MalformedRow { line, reason };

    let sold = parse_datetime(&record.sold)
        .ok_or_else(|| malformed(format!("invalid sale date {:?}", record.sold)))?
        .date();

    // An "N/A" acquisition predates the export; Binance reports it with
    // no date. Stand in a date well in the past so the row comes out
    // long-term, and flag it.
    let mut warnings = Vec::new();
    let acquired = if record.acquired == "N/A" {
        warnings.push(GainWarning::MissingAcquisition);
        let placeholder = placeholder_acquired(tax_year.unwrap_or_else(|| sold.year()));
        log::warn!(
            "line {line}: no acquisition date for {} sale on {sold}, assuming {placeholder}",
            record.currency
        );
        placeholder
    } else {
        parse_datetime(&record.acquired)
            .ok_or_else(|| malformed(format!("invalid acquisition date {:?}", record.acquired)))?
            .date()
    };

    let amount = parse_english_number(&record.amount).map_err(&malformed)?;
    let proceeds_eur = parse_english_number(&record.proceeds).map_err(&malformed)?;
    let cost_basis_eur = parse_english_number(&record.cost_basis).map_err(&malformed)?;
    let gain_eur = parse_english_number(&record.gains).map_err(&malformed)?;

    if (proceeds_eur - cost_basis_eur - gain_eur).abs() > GAIN_TOLERANCE_EUR {
        log::warn!(
            "line {line}: reported gain {gain_eur} differs from proceeds {proceeds_eur} minus \
             cost basis {cost_basis_eur}"
        );
        warnings.push(GainWarning::InconsistentGain);
    }

    Ok(GainRecord {
        asset: record.currency.clone(),
        amount,
        sold,
        acquired,
        term: Term::classify(acquired, sold),
        buy_platform: "Binance",
        sell_platform: "Binance",
        proceeds_eur,
        cost_basis_eur,
        gain_eur,
        warnings,
    })
}

/// Fee rows carry the fee amount in the "Gains (EUR)" column.
fn parse_fee(record: &Record, line: u64) -> Result<(NaiveDate, Decimal), ConvertError> {
    let malformed = |reason: String| ConvertError::MalformedRow { line, reason };
    let sold = parse_datetime(&record.sold)
        .ok_or_else(|| malformed(format!("invalid fee date {:?}", record.sold)))?
        .date();
    let fee = parse_english_number(&record.gains).map_err(&malformed)?;
    Ok((sold, fee))
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

fn placeholder_acquired(reference_year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(reference_year - 2, 12, 31).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::Parsed;

    const HEADER: &str = "Currency name,Currency amount,Acquired,Sold,Proceeds (EUR),Cost basis (EUR),Gains (EUR),Holding period (Days),Transaction type,Label\n";

    fn import_str(data: &str, options: ParseOptions) -> anyhow::Result<Import> {
        let mut rdr = csv::Reader::from_reader(data.as_bytes());
        import(&mut rdr, options)
    }

    fn gains_of(import: Import) -> Vec<GainRecord> {
        match import.parsed {
            Parsed::Gains(gains) => gains,
            Parsed::Executions(_) => panic!("expected pre-computed gains"),
        }
    }

    #[test]
    fn maps_sell_and_trade_rows_to_gains() {
        let data = format!(
            "{HEADER}\
             BTC,0.05000000,2023-01-15 10:30,2024-02-01 09:00,\"1,500.00\",\"1,200.00\",300.00,382,Sell,\n\
             ETH,1.00000000,2023-06-01 08:00,2024-06-02 10:00,2000.00,1500.00,500.00,367,Trade,\n"
        );
        let import = import_str(&data, ParseOptions::default()).unwrap();
        assert_eq!(import.skipped_rows, 0);
        let gains = gains_of(import);
        assert_eq!(gains.len(), 2);

        let btc = &gains[0];
        assert_eq!(btc.asset, "BTC");
        assert_eq!(btc.amount, dec!(0.05000000));
        assert_eq!(btc.sold, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(btc.acquired, NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
        assert_eq!(btc.term, Term::Long);
        assert_eq!(btc.proceeds_eur, dec!(1500.00));
        assert_eq!(btc.cost_basis_eur, dec!(1200.00));
        assert_eq!(btc.gain_eur, dec!(300.00));
        assert_eq!(btc.buy_platform, "Binance");
        assert!(!btc.has_warnings());
    }

    #[test]
    fn fee_rows_accumulate_within_tax_year() {
        let data = format!(
            "{HEADER}\
             BTC,0.00000000,N/A,2024-03-01 00:00,0.00,0.00,12.34,0,Fee,\n\
             BTC,0.00000000,N/A,2023-03-01 00:00,0.00,0.00,99.00,0,Fee,\n"
        );
        let import = import_str(
            &data,
            ParseOptions {
                tax_year: Some(2024),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(import.fees_eur, dec!(12.34));
        assert!(gains_of(import).is_empty());
    }

    #[test]
    fn missing_acquisition_date_uses_old_placeholder() {
        let data = format!(
            "{HEADER}\
             BTC,0.10000000,N/A,2024-02-01 09:00,1000.00,0.00,1000.00,0,Sell,\n"
        );
        let import = import_str(
            &data,
            ParseOptions {
                tax_year: Some(2024),
                ..Default::default()
            },
        )
        .unwrap();
        let gains = gains_of(import);
        assert_eq!(gains[0].acquired, NaiveDate::from_ymd_opt(2022, 12, 31).unwrap());
        assert_eq!(gains[0].term, Term::Long);
        assert_eq!(gains[0].warnings, vec![GainWarning::MissingAcquisition]);
    }

    #[test]
    fn inconsistent_gain_is_flagged() {
        let data = format!(
            "{HEADER}\
             BTC,0.10000000,2023-01-01 00:00,2024-02-01 09:00,1000.00,900.00,250.00,396,Sell,\n"
        );
        let gains = gains_of(import_str(&data, ParseOptions::default()).unwrap());
        assert!(gains[0].warnings.contains(&GainWarning::InconsistentGain));
    }

    #[test]
    fn malformed_row_is_skipped_and_counted() {
        let data = format!(
            "{HEADER}\
             BTC,not-a-number,2023-01-01 00:00,2024-02-01 09:00,1000.00,900.00,100.00,396,Sell,\n\
             ETH,1.00000000,2023-06-01 08:00,2024-06-02 10:00,2000.00,1500.00,500.00,367,Sell,\n"
        );
        let import = import_str(&data, ParseOptions::default()).unwrap();
        assert_eq!(import.skipped_rows, 1);
        assert_eq!(gains_of(import).len(), 1);
    }

    #[test]
    fn malformed_row_aborts_in_strict_mode() {
        let data = format!(
            "{HEADER}\
             BTC,not-a-number,2023-01-01 00:00,2024-02-01 09:00,1000.00,900.00,100.00,396,Sell,\n"
        );
        let result = import_str(
            &data,
            ParseOptions {
                strict: true,
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_transaction_types_are_ignored() {
        let data = format!(
            "{HEADER}\
             BTC,0.10000000,2023-01-01 00:00,2024-02-01 09:00,0.00,0.00,0.00,0,Deposit,\n"
        );
        let import = import_str(&data, ParseOptions::default()).unwrap();
        assert_eq!(import.skipped_rows, 0);
        assert!(gains_of(import).is_empty());
    }
}
