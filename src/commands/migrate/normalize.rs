use chrono::{Months, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::{CurrencyConfig, MigrationConfig};
use crate::model::{PoStatus, RejectReason};

use super::types::{Candidate, ValidRow};
use super::validate::is_blank;

pub(crate) fn normalize_row(row: ValidRow, config: &MigrationConfig) -> Result<Candidate, RejectReason> {
    let value = convert_to_primary(row.amount, &row.currency, &config.currency)?;
    if value <= Decimal::ZERO {
        return Err(RejectReason::NonPositiveValue);
    }

    let expiry_date = row
        .expiry_date
        .unwrap_or_else(|| one_year_after(row.issue_date));
    let description = (!is_blank(&row.description)).then(|| row.description.trim().to_string());

    Ok(Candidate {
        source: row.source,
        line: row.line,
        po_number: row.po_number,
        business_unit_code: config.canonical_business_unit(&row.business_unit),
        client_name: normalize_client_name(&row.client),
        value,
        currency: config.currency.primary.clone(),
        issue_date: row.issue_date,
        expiry_date,
        status: PoStatus::parse(&row.status).unwrap_or(PoStatus::Active),
        description,
    })
}

pub(crate) fn normalize_client_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Same calendar day one year later; 29 February maps to 28 February.
pub(crate) fn one_year_after(date: NaiveDate) -> NaiveDate {
    date.checked_add_months(Months::new(12))
        .unwrap_or(NaiveDate::MAX)
}

/// Converts into the primary currency at the fixed configured rate,
/// rounding half-up to two decimals.
pub(crate) fn convert_to_primary(
    amount: Decimal,
    currency: &str,
    config: &CurrencyConfig,
) -> Result<Decimal, RejectReason> {
    let converted = if currency.eq_ignore_ascii_case(&config.primary) {
        amount
    } else if currency.eq_ignore_ascii_case(&config.secondary) {
        amount
            .checked_div(config.secondary_per_primary)
            .ok_or(RejectReason::NonPositiveValue)?
    } else {
        return Err(RejectReason::UnsupportedCurrency);
    };

    Ok(converted.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}
