mod compact;
mod error;
mod exchanges;
mod fifo;
mod gains;
mod money;
mod report;

use crate::error::ConvertError;
use crate::exchanges::{Exchange, Parsed, ParseOptions};
use crate::fifo::Execution;
use chrono::{Datelike, NaiveDate, Utc};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

/// Convert Binance/BSDEX csv exports into the WISO capital gains format.
///
/// The exchange is detected from the input's column header. Binance
/// "Realized Capital Gains" exports are mapped directly; BSDEX
/// transaction exports are run through a FIFO lot matcher first.
#[derive(Parser, Debug)]
#[command(name = "csv2wiso", version)]
struct Cli {
    /// Exchange csv export to convert
    input: PathBuf,

    /// Output csv file, defaults to WiSo_<Exchange>_<year>.csv
    output: Option<PathBuf>,

    /// Tax year to report (e.g. 2024); all years when omitted
    year: Option<i32>,

    /// Merge rows sharing asset, sale date and acquisition date
    #[arg(long)]
    compact: bool,

    /// Abort on malformed rows or disposals exceeding recorded acquisitions
    #[arg(long)]
    strict: bool,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    run(&cli)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let options = ParseOptions {
        tax_year: cli.year,
        strict: cli.strict,
    };
    let (exchange, import) = exchanges::import_file(&cli.input, options)?;

    let records = match import.parsed {
        Parsed::Gains(gains) => gains,
        Parsed::Executions(executions) => {
            let placeholder = placeholder_date(cli.year, &executions);
            let matched = fifo::match_fifo(executions, exchange.name(), placeholder);
            if cli.strict {
                if let Some((asset, missing)) = matched.shortfalls.first() {
                    return Err(ConvertError::InsufficientLots {
                        asset: asset.clone(),
                        missing: *missing,
                    }
                    .into());
                }
            }
            matched.gains
        }
    };

    let records = gains::filter_year(records, cli.year);
    let records = if cli.compact {
        compact::aggregate(records)?
    } else {
        records
    };

    let summary = report::RunSummary::new(&records, import.fees_eur, import.skipped_rows);

    // Build the whole report in memory first so a failed run never
    // leaves a truncated csv behind.
    let mut buf = Vec::new();
    report::write_report(&mut buf, &records, cli.year)?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(exchange, cli.year));
    fs::write(&output, &buf)?;
    log::info!("wrote {} row(s) to {}", records.len(), output.display());

    let text = summary.render(cli.year);
    fs::write(output.with_extension("txt"), &text)?;
    print!("{text}");
    Ok(())
}

fn default_output(exchange: Exchange, year: Option<i32>) -> PathBuf {
    let year = year.map_or_else(|| "All".to_string(), |y| y.to_string());
    PathBuf::from(format!("WiSo_{}_{}.csv", exchange.name(), year))
}

/// Acquisition date assumed for disposals with no recorded acquisition:
/// the last day of the year two years before the reference year, far
/// enough back to classify as long-term.
fn placeholder_date(year: Option<i32>, executions: &[Execution]) -> NaiveDate {
    let reference = year
        .or_else(|| executions.iter().map(|e| e.executed_at.year()).min())
        .unwrap_or_else(|| Utc::now().year() - 1);
    NaiveDate::from_ymd_opt(reference - 2, 12, 31).unwrap()
}
