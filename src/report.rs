use crate::gains::{GainRecord, GainWarning, Term};
use crate::money::{format_amount, format_eur};
use rust_decimal::Decimal;
use std::io::Write;

const COLUMNS: [&str; 10] = [
    "Amount",
    "Currency",
    "Date Sold",
    "Date Acquired",
    "Short/Long",
    "Buy/Input at",
    "Sell/Output at",
    "Proceeds",
    "Cost Basis",
    "Gain/Loss",
];

const DATE_FORMAT: &str = "%d.%m.%Y";

/// Write the WISO capital-gains csv: the identifier line, the column
/// line, then one row per record sorted by sale date and acquisition
/// date. Times are truncated to calendar dates.
pub fn write_report<W: Write>(
    writer: W,
    records: &[GainRecord],
    tax_year: Option<i32>,
) -> anyhow::Result<()> {
    let mut rows: Vec<&GainRecord> = records.iter().collect();
    rows.sort_by_key(|r| (r.sold, r.acquired));

    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Never)
        .flexible(true)
        .from_writer(writer);

    let year = tax_year.map_or_else(|| "All".to_string(), |y| y.to_string());
    let tax_year_field = format!("Tax_Year:{year}");
    wtr.write_record([
        "Identifier:Capital_Gains",
        "Method:FIFO",
        tax_year_field.as_str(),
        "Base_Currency:EUR",
    ])?;
    wtr.write_record(COLUMNS)?;

    for row in rows {
        wtr.write_record([
            format_amount(row.amount),
            row.asset.clone(),
            row.sold.format(DATE_FORMAT).to_string(),
            row.acquired.format(DATE_FORMAT).to_string(),
            row.term.display().to_string(),
            row.buy_platform.to_string(),
            row.sell_platform.to_string(),
            format_eur(row.proceeds_eur),
            format_eur(row.cost_basis_eur),
            format_eur(row.gain_eur),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Totals reported alongside the csv output.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total_gain_eur: Decimal,
    pub short_term_gain_eur: Decimal,
    pub fees_eur: Decimal,
    pub skipped_rows: usize,
    /// Distinct assets with disposals lacking a recorded acquisition,
    /// derived from the record warnings so both import paths report it.
    pub missing_acquisition_assets: usize,
}

impl RunSummary {
    pub fn new(records: &[GainRecord], fees_eur: Decimal, skipped_rows: usize) -> Self {
        let total_gain_eur = records.iter().map(|r| r.gain_eur).sum();
        let short_term_gain_eur = records
            .iter()
            .filter(|r| r.term == Term::Short)
            .map(|r| r.gain_eur)
            .sum();
        let mut flagged: Vec<&str> = records
            .iter()
            .filter(|r| r.warnings.contains(&GainWarning::MissingAcquisition))
            .map(|r| r.asset.as_str())
            .collect();
        flagged.sort_unstable();
        flagged.dedup();
        RunSummary {
            total_gain_eur,
            short_term_gain_eur,
            fees_eur,
            skipped_rows,
            missing_acquisition_assets: flagged.len(),
        }
    }

    pub fn render(&self, tax_year: Option<i32>) -> String {
        let year = tax_year.map_or_else(|| "all years".to_string(), |y| y.to_string());
        let mut text = format!(
            "--> Realized gain/loss for {year}: {:.2} EUR\n    \
             Short-term (taxable) portion: {:.2} EUR\n    \
             Total fees paid: {:.2} EUR\n",
            self.total_gain_eur, self.short_term_gain_eur, self.fees_eur
        );
        if self.skipped_rows > 0 {
            text.push_str(&format!(
                "    Skipped {} malformed row(s), see warnings above.\n",
                self.skipped_rows
            ));
        }
        if self.missing_acquisition_assets > 0 {
            text.push_str(&format!(
                "    {} asset(s) have disposals with no recorded acquisition, see warnings \
                 above.\n",
                self.missing_acquisition_assets
            ));
        }
        text
    }
}
