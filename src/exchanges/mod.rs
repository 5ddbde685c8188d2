pub mod binance;
pub mod bsdex;

use crate::error::ConvertError;
use crate::fifo::Execution;
use crate::gains::GainRecord;
use anyhow::Context;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

/// Supported exchange export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Binance,
    Bsdex,
}

impl Exchange {
    pub fn name(&self) -> &'static str {
        match self {
            Exchange::Binance => "Binance",
            Exchange::Bsdex => "BSDEX",
        }
    }

    /// Identify the exchange from the csv header row. Each format has a
    /// required column set; extra columns (order metadata, IBANs) are
    /// ignored. No full match is a fatal schema mismatch reporting the
    /// closest candidate's missing columns.
    pub fn detect(headers: &csv::StringRecord) -> Result<Exchange, ConvertError> {
        let present: HashSet<&str> = headers.iter().map(|h| h.trim()).collect();

        let missing = |required: &[&str]| -> Vec<String> {
            required
                .iter()
                .filter(|c| !present.contains(**c))
                .map(|c| c.to_string())
                .collect()
        };

        let missing_binance = missing(binance::REQUIRED_COLUMNS);
        if missing_binance.is_empty() {
            return Ok(Exchange::Binance);
        }
        let missing_bsdex = missing(bsdex::REQUIRED_COLUMNS);
        if missing_bsdex.is_empty() {
            return Ok(Exchange::Bsdex);
        }

        if missing_binance.len() <= missing_bsdex.len() {
            Err(ConvertError::SchemaMismatch {
                exchange: Exchange::Binance.name(),
                missing: missing_binance,
            })
        } else {
            Err(ConvertError::SchemaMismatch {
                exchange: Exchange::Bsdex.name(),
                missing: missing_bsdex,
            })
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-run parse configuration passed into each importer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Restrict fee accounting (and later the report) to this year.
    pub tax_year: Option<i32>,
    /// Abort on the first malformed row instead of skipping it.
    pub strict: bool,
}

/// Normalized outcome of parsing one exchange export.
#[derive(Debug)]
pub enum Parsed {
    /// Pre-computed gain rows, FIFO already applied by the exchange.
    Gains(Vec<GainRecord>),
    /// Raw executions still to be run through the FIFO matcher.
    Executions(Vec<Execution>),
}

/// Result of importing one exchange csv file.
#[derive(Debug)]
pub struct Import {
    pub parsed: Parsed,
    /// Sum of fees within the tax-year filter.
    pub fees_eur: Decimal,
    /// Malformed rows skipped with a warning (non-strict mode).
    pub skipped_rows: usize,
}

/// Open `path`, detect the exchange from its header and run the matching
/// importer.
pub fn import_file(path: &Path, options: ParseOptions) -> anyhow::Result<(Exchange, Import)> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);
    let exchange = Exchange::detect(rdr.headers()?)?;
    log::info!("detected {} export", exchange.name());
    let import = match exchange {
        Exchange::Binance => binance::import(&mut rdr, options)?,
        Exchange::Bsdex => bsdex::import(&mut rdr, options)?,
    };
    Ok((exchange, import))
}

/// Apply the row-error policy: abort in strict mode, otherwise log the
/// problem and count the skipped row.
fn skip_or_abort(err: ConvertError, strict: bool, skipped: &mut usize) -> anyhow::Result<()> {
    if strict {
        Err(err.into())
    } else {
        log::warn!("{err}, skipping row");
        *skipped += 1;
        Ok(())
    }
}
