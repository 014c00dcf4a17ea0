use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::model::PoStatus;

/// One data row of a source file, keyed by canonical field. Cells are
/// trimmed text; absent columns are empty strings.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawRow {
    pub source: String,
    pub line: usize,
    pub business_unit: String,
    pub po_number: String,
    pub client: String,
    pub value: String,
    pub currency: String,
    pub secondary_value: String,
    pub issue_date: String,
    pub expiry_date: String,
    pub status: String,
    pub description: String,
}

/// A row that passed validation: required fields present, amount positive,
/// dates parsed.
#[derive(Debug, Clone)]
pub(crate) struct ValidRow {
    pub source: String,
    pub line: usize,
    pub business_unit: String,
    pub po_number: String,
    pub client: String,
    pub amount: Decimal,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub status: String,
    pub description: String,
}

/// A normalized row ready for the duplicate check and the loader.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub source: String,
    pub line: usize,
    pub po_number: String,
    pub business_unit_code: String,
    pub client_name: String,
    pub value: Decimal,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: PoStatus,
    pub description: Option<String>,
}

/// Column positions resolved from a source's header row.
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnIndex {
    pub po_number: Option<usize>,
    pub client: Option<usize>,
    pub value: Option<usize>,
    pub currency: Option<usize>,
    pub secondary_value: Option<usize>,
    pub issue_date: Option<usize>,
    pub expiry_date: Option<usize>,
    pub status: Option<usize>,
    pub description: Option<usize>,
}
