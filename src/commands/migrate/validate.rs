use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::config::MigrationConfig;
use crate::model::RejectReason;

use super::source::excel_serial_to_date;
use super::types::{RawRow, ValidRow};

/// Serial-number range treated as a spreadsheet date (1954 through 2119).
const EXCEL_SERIAL_RANGE: std::ops::RangeInclusive<f64> = 20_000.0..=80_000.0;

/// Applies the row rules in precedence order: identifier, client, value,
/// dates. The first failing rule decides the rejection reason.
pub(crate) fn validate_row(row: &RawRow, config: &MigrationConfig) -> Result<ValidRow, RejectReason> {
    if is_blank(&row.po_number) {
        return Err(RejectReason::MissingIdentifier);
    }
    if is_blank(&row.client) {
        return Err(RejectReason::MissingClient);
    }

    let (amount, currency) = resolve_amount(row, config).ok_or(RejectReason::NonPositiveValue)?;
    if amount <= Decimal::ZERO {
        return Err(RejectReason::NonPositiveValue);
    }

    let issue_date =
        parse_date(&row.issue_date, &config.date_formats).ok_or(RejectReason::UnparseableDate)?;
    let expiry_date = if is_blank(&row.expiry_date) {
        None
    } else {
        Some(parse_date(&row.expiry_date, &config.date_formats).ok_or(RejectReason::UnparseableDate)?)
    };

    Ok(ValidRow {
        source: row.source.clone(),
        line: row.line,
        business_unit: row.business_unit.clone(),
        po_number: row.po_number.trim().to_string(),
        client: row.client.clone(),
        amount,
        currency,
        issue_date,
        expiry_date,
        status: row.status.clone(),
        description: row.description.clone(),
    })
}

/// Spreadsheet exports write `nan` for empty cells.
pub(crate) fn is_blank(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("nan")
}

/// The primary value column wins; the secondary-currency column is used only
/// when the primary holds no number.
fn resolve_amount(row: &RawRow, config: &MigrationConfig) -> Option<(Decimal, String)> {
    if let Some(amount) = parse_amount(&row.value) {
        let currency = if is_blank(&row.currency) {
            config.currency.primary.clone()
        } else {
            row.currency.trim().to_ascii_uppercase()
        };
        return Some((amount, currency));
    }

    parse_amount(&row.secondary_value).map(|amount| (amount, config.currency.secondary.clone()))
}

/// Currency markers stripped from either end of a monetary cell.
const CURRENCY_MARKERS: [&str; 7] = ["US$", "USD", "NGN", "$", "\u{20a6}", "\u{20ac}", "\u{a3}"];

/// Parses a monetary cell. Whitespace, thousands separators and currency
/// markers are removed; `(1,500.00)` reads as negative and exponent forms
/// such as `1.5E+06` are accepted. Anything else left over fails the parse.
pub(crate) fn parse_amount(raw: &str) -> Option<Decimal> {
    if is_blank(raw) {
        return None;
    }

    let trimmed = raw.trim();
    let (parenthesized, body) = match trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };
    let body = strip_currency(body);
    let (minus, body) = match body.strip_prefix('-') {
        Some(rest) => (true, strip_currency(rest)),
        None => (false, body),
    };

    let digits: String = body
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if digits.is_empty() || digits.starts_with('-') {
        return None;
    }

    let magnitude = if digits.contains(['e', 'E']) {
        Decimal::from_scientific(&digits).ok()?
    } else {
        Decimal::from_str(&digits).ok()?
    };

    Some(if parenthesized || minus {
        -magnitude
    } else {
        magnitude
    })
}

fn strip_currency(text: &str) -> &str {
    let mut text = text.trim();
    for marker in CURRENCY_MARKERS {
        let len = marker.len();
        if text
            .get(..len)
            .is_some_and(|head| head.eq_ignore_ascii_case(marker))
        {
            text = text[len..].trim();
        }
        let split = text.len().saturating_sub(len);
        if text.len() > len
            && text
                .get(split..)
                .is_some_and(|tail| tail.eq_ignore_ascii_case(marker))
        {
            text = text[..split].trim();
        }
    }
    text
}

pub(crate) fn parse_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if is_blank(trimmed) {
        return None;
    }

    for format in formats {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.date());
        }
    }

    trimmed
        .parse::<f64>()
        .ok()
        .filter(|serial| EXCEL_SERIAL_RANGE.contains(serial))
        .and_then(excel_serial_to_date)
}
