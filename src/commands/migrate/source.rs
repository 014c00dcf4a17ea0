use std::path::Path;

use anyhow::{Context, Result, bail};
use calamine::{Data, Reader, open_workbook_auto};
use chrono::{Days, NaiveDate};

use crate::config::{BusinessUnitSeed, ColumnMapping, RegisterConfig, SourceConfig};

use super::types::{ColumnIndex, RawRow};

const HEADER_SCAN_ROWS: usize = 10;

/// Reads every row of a CSV file or of one worksheet as trimmed cell text.
pub(crate) fn read_table(path: &Path, sheet: Option<&str>) -> Result<Vec<Vec<String>>> {
    if !path.exists() {
        bail!("source file not found: {}", path.display());
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_csv_table(path),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook_table(path, sheet),
        other => bail!("unsupported source format '{other}': {}", path.display()),
    }
}

fn read_csv_table(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("failed to read line {} of {}", index + 1, path.display()))?;
        rows.push(record.iter().map(str::to_owned).collect());
    }
    Ok(rows)
}

fn read_workbook_table(path: &Path, sheet: Option<&str>) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .with_context(|| format!("workbook has no sheets: {}", path.display()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("failed to read sheet '{sheet_name}' of {}", path.display()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(text) => text.trim().to_string(),
        Data::Float(value) => float_text(*value),
        Data::Int(value) => value.to_string(),
        Data::DateTime(value) => excel_serial_to_date(value.as_f64())
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        other => other.to_string().trim().to_string(),
    }
}

/// Integral floats render without a fractional part so numeric PO numbers
/// read back as `4500012345`, not `4500012345.0`.
fn float_text(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Converts a spreadsheet day serial (1900 date system) to a calendar date.
pub(crate) fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}

pub(crate) fn normalize_header(cell: &str) -> String {
    cell.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn find_column(header: &[String], candidates: &[String]) -> Option<usize> {
    let wanted: Vec<String> = candidates.iter().map(|c| normalize_header(c)).collect();
    header
        .iter()
        .position(|cell| wanted.contains(&normalize_header(cell)))
}

/// Finds the header row among the first rows of the table: the first row
/// holding one of the given header candidates.
pub(crate) fn locate_header(rows: &[Vec<String>], candidates: &[String]) -> Option<usize> {
    rows.iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| find_column(row, candidates).is_some())
}

pub(crate) fn resolve_columns(header: &[String], mapping: &ColumnMapping) -> ColumnIndex {
    ColumnIndex {
        po_number: find_column(header, &mapping.po_number),
        client: find_column(header, &mapping.client),
        value: find_column(header, &mapping.value),
        currency: find_column(header, &mapping.currency),
        secondary_value: find_column(header, &mapping.secondary_value),
        issue_date: find_column(header, &mapping.issue_date),
        expiry_date: find_column(header, &mapping.expiry_date),
        status: find_column(header, &mapping.status),
        description: find_column(header, &mapping.description),
    }
}

/// Reads one configured source file into raw rows. Any failure here skips
/// the whole source.
pub(crate) fn read_source(path: &Path, source: &SourceConfig) -> Result<Vec<RawRow>> {
    let rows = read_table(path, source.sheet.as_deref())?;
    let source_name = path.display().to_string();
    records_from_table(&rows, &source.columns, &source_name, &source.business_unit)
}

pub(crate) fn records_from_table(
    rows: &[Vec<String>],
    mapping: &ColumnMapping,
    source_name: &str,
    business_unit: &str,
) -> Result<Vec<RawRow>> {
    let Some(header_idx) = locate_header(rows, &mapping.po_number) else {
        bail!("no header row with a PO number column in {source_name}");
    };
    let columns = resolve_columns(&rows[header_idx], mapping);

    if columns.po_number.is_none() || columns.client.is_none() {
        bail!("missing PO number or client column in {source_name}");
    }
    if columns.value.is_none() && columns.secondary_value.is_none() {
        bail!("missing value column in {source_name}");
    }

    let cell = |row: &[String], index: Option<usize>| -> String {
        index
            .and_then(|idx| row.get(idx))
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };

    let records = rows
        .iter()
        .enumerate()
        .skip(header_idx + 1)
        .filter(|(_, row)| row.iter().any(|value| !value.trim().is_empty()))
        .map(|(index, row)| RawRow {
            source: source_name.to_string(),
            line: index + 1,
            business_unit: business_unit.to_string(),
            po_number: cell(row, columns.po_number),
            client: cell(row, columns.client),
            value: cell(row, columns.value),
            currency: cell(row, columns.currency),
            secondary_value: cell(row, columns.secondary_value),
            issue_date: cell(row, columns.issue_date),
            expiry_date: cell(row, columns.expiry_date),
            status: cell(row, columns.status),
            description: cell(row, columns.description),
        })
        .collect();

    Ok(records)
}

/// Reads the business-unit register. Rows without a code or name are skipped.
pub(crate) fn read_register(path: &Path, register: &RegisterConfig) -> Result<Vec<BusinessUnitSeed>> {
    let rows = read_table(path, None)?;
    let Some(header_idx) = locate_header(&rows, &register.code) else {
        bail!("no header row with a business-unit code column in {}", path.display());
    };
    let header = &rows[header_idx];
    let code_col = find_column(header, &register.code);
    let name_col = find_column(header, &register.name)
        .with_context(|| format!("missing business-unit name column in {}", path.display()))?;
    let manager_col = find_column(header, &register.manager);
    let location_col = find_column(header, &register.location);

    let text = |row: &[String], index: Option<usize>| -> String {
        index
            .and_then(|idx| row.get(idx))
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };

    let seeds = rows
        .iter()
        .skip(header_idx + 1)
        .filter_map(|row| {
            let code = text(row, code_col);
            let name = text(row, Some(name_col));
            if code.is_empty() || name.is_empty() {
                return None;
            }
            let managers = text(row, manager_col)
                .split(['/', ';'])
                .map(str::trim)
                .filter(|manager| !manager.is_empty())
                .map(str::to_string)
                .collect();
            Some(BusinessUnitSeed {
                code,
                name,
                managers,
                location: text(row, location_col),
            })
        })
        .collect();

    Ok(seeds)
}
