use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::model::{MigrationOutcome, RejectReason, SourceStatus};

const RULE: &str =
    "================================================================================";

pub(crate) fn render_report(outcome: &MigrationOutcome) -> Result<String> {
    let mut buffer = Vec::new();
    write_report(&mut buffer, outcome).context("failed to render migration report")?;
    String::from_utf8(buffer).context("migration report is not valid UTF-8")
}

pub(crate) fn write_report<W: Write>(output: &mut W, outcome: &MigrationOutcome) -> io::Result<()> {
    let currency = outcome.primary_currency.as_str();

    writeln!(output, "{RULE}")?;
    writeln!(output, "SBU PURCHASE ORDER MIGRATION REPORT")?;
    writeln!(output, "{RULE}")?;
    writeln!(output, "Run:      {}", outcome.run_id)?;
    writeln!(output, "Started:  {}", outcome.started_at)?;
    writeln!(output, "Finished: {}", outcome.finished_at)?;
    writeln!(output, "Store:    {}", outcome.db_path)?;
    writeln!(output, "Business units seeded: {}", outcome.business_units_seeded)?;

    let totals = &outcome.totals;
    writeln!(output)?;
    writeln!(output, "ROWS")?;
    writeln!(output, "  read:        {}", totals.rows_read)?;
    writeln!(output, "  accepted:    {}", totals.accepted)?;
    writeln!(output, "  duplicates:  {}", totals.duplicates)?;
    writeln!(output, "  rejected:    {}", totals.total_rejected())?;
    for reason in RejectReason::ALL {
        writeln!(
            output,
            "    {:<24}{}",
            reason.as_str(),
            totals.rejected_count(reason)
        )?;
    }
    writeln!(output, "  new clients: {}", totals.clients_created)?;

    writeln!(output)?;
    writeln!(output, "SOURCES")?;
    for source in &outcome.sources {
        match source.status {
            SourceStatus::Loaded => writeln!(
                output,
                "  [{}] {}: read {}, accepted {}, duplicates {}, rejected {}",
                source.business_unit,
                source.path,
                source.tally.rows_read,
                source.tally.accepted,
                source.tally.duplicates,
                source.tally.total_rejected()
            )?,
            SourceStatus::Skipped => writeln!(
                output,
                "  [{}] {}: SKIPPED ({})",
                source.business_unit,
                source.path,
                source.error.as_deref().unwrap_or("unknown error")
            )?,
        }
    }

    writeln!(output)?;
    writeln!(output, "BUSINESS UNITS")?;
    let mut grand_count = 0;
    let mut grand_total = Decimal::ZERO;
    for unit in &outcome.business_units {
        grand_count += unit.po_count;
        grand_total += unit.total_value;
        writeln!(
            output,
            "  {:<6} {:<45} {:>5} POs  {}",
            unit.code,
            unit.name,
            unit.po_count,
            format_money(unit.total_value, currency)
        )?;
    }
    writeln!(
        output,
        "  {:<52} {:>5} POs  {}",
        "TOTAL",
        grand_count,
        format_money(grand_total, currency)
    )?;

    writeln!(output)?;
    writeln!(output, "SNAPSHOTS")?;
    writeln!(output, "  before: {}", display_path(outcome.pre_snapshot.as_deref()))?;
    writeln!(output, "  after:  {}", display_path(outcome.post_snapshot.as_deref()))?;
    writeln!(output, "  pruned: {}", outcome.pruned_snapshots.len())?;
    writeln!(output, "{RULE}")?;

    Ok(())
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|path| path.display().to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Two decimals with thousands separators, e.g. `USD 1,234,567.80`.
pub(crate) fn format_money(value: Decimal, currency: &str) -> String {
    let rounded = value.round_dp(2);
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{currency} {sign}{grouped}.{fraction}")
}
