use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;

/// Holding-period classification of a disposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    Short,
    Long,
}

impl Term {
    /// Classify by calendar comparison rather than a raw day count: a
    /// disposal at least twelve calendar months after the acquisition is
    /// long-term. This makes 2023-03-01 -> 2024-03-01 long-term even
    /// though only 365 days elapsed across the leap year, while
    /// 2023-03-01 -> 2024-02-29 stays short-term.
    pub fn classify(acquired: NaiveDate, sold: NaiveDate) -> Term {
        let threshold = acquired
            .checked_add_months(Months::new(12))
            .unwrap_or(NaiveDate::MAX);
        if sold >= threshold {
            Term::Long
        } else {
            Term::Short
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Term::Short => "Short",
            Term::Long => "Long",
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Data-quality warnings attached to a realized gain row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainWarning {
    /// The disposal drew on a synthetic zero-cost lot because no matching
    /// acquisition was on record.
    MissingAcquisition,
    /// The exchange-reported gain differs from proceeds minus cost basis.
    InconsistentGain,
}

/// One normalized realized gain/loss row.
///
/// `buy_platform`/`sell_platform` carry the exchange name, which is what
/// the WISO columns "Buy/Input at" and "Sell/Output at" expect.
#[derive(Debug, Clone, PartialEq)]
pub struct GainRecord {
    pub asset: String,
    pub amount: Decimal,
    pub sold: NaiveDate,
    pub acquired: NaiveDate,
    pub term: Term,
    pub buy_platform: &'static str,
    pub sell_platform: &'static str,
    pub proceeds_eur: Decimal,
    pub cost_basis_eur: Decimal,
    pub gain_eur: Decimal,
    pub warnings: Vec<GainWarning>,
}

impl GainRecord {
    #[cfg(test)]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Keep only gains realized in the given tax year, or everything when no
/// year is given.
pub fn filter_year(records: Vec<GainRecord>, year: Option<i32>) -> Vec<GainRecord> {
    match year {
        Some(y) => records.into_iter().filter(|r| r.sold.year() == y).collect(),
        None => records,
    }
}
