use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a German-locale value like `1.234,56789 BTC` or `12,50 €`.
///
/// Thousands dots are stripped, the decimal comma becomes a dot and an
/// optional trailing unit (currency symbol or asset code) is returned
/// separately. An empty input parses as zero with no unit.
pub fn parse_german_amount(value: &str) -> Result<(Decimal, Option<String>), String> {
    let value = value.replace('\u{a0}', " ");
    let mut parts = value.split_whitespace();
    let number = match parts.next() {
        Some(n) => n,
        None => return Ok((Decimal::ZERO, None)),
    };
    let unit = parts.next().map(|u| u.to_string());
    if parts.next().is_some() {
        return Err(format!("unexpected trailing content in {value:?}"));
    }
    let normalized = number.replace('.', "").replace(',', ".");
    let amount = Decimal::from_str(&normalized)
        .map_err(|e| format!("invalid number {number:?}: {e}"))?;
    Ok((amount, unit))
}

/// Parse an English-locale number like `1,234.56` (comma thousands,
/// dot decimals). An empty input parses as zero.
pub fn parse_english_number(value: &str) -> Result<Decimal, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let normalized = trimmed.replace(',', "");
    Decimal::from_str(&normalized).map_err(|e| format!("invalid number {value:?}: {e}"))
}

/// Asset quantities are written with eight fixed decimals.
pub fn format_amount(amount: Decimal) -> String {
    format!("{amount:.8}")
}

/// EUR values are written with three fixed decimals, never scientific.
pub fn format_eur(value: Decimal) -> String {
    format!("{value:.3}")
}
