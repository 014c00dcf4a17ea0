use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::ValueEnum;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PoStatus {
    Active,
    Completed,
    Cancelled,
}

impl PoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for PoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a source row did not reach the store.
///
/// The first four are raised by row validation, in that precedence order.
/// The remaining reasons come from normalization and loading.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingIdentifier,
    MissingClient,
    NonPositiveValue,
    UnparseableDate,
    UnsupportedCurrency,
    UnknownBusinessUnit,
    ConstraintViolation,
}

impl RejectReason {
    pub const ALL: [RejectReason; 7] = [
        Self::MissingIdentifier,
        Self::MissingClient,
        Self::NonPositiveValue,
        Self::UnparseableDate,
        Self::UnsupportedCurrency,
        Self::UnknownBusinessUnit,
        Self::ConstraintViolation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingIdentifier => "missing_identifier",
            Self::MissingClient => "missing_client",
            Self::NonPositiveValue => "non_positive_value",
            Self::UnparseableDate => "unparseable_date",
            Self::UnsupportedCurrency => "unsupported_currency",
            Self::UnknownBusinessUnit => "unknown_business_unit",
            Self::ConstraintViolation => "constraint_violation",
        }
    }
}

/// Run-scoped row accounting, threaded through every pipeline stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunTally {
    pub rows_read: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub clients_created: usize,
    pub rejected: BTreeMap<RejectReason, usize>,
}

impl RunTally {
    pub fn record_read(&mut self) {
        self.rows_read += 1;
    }

    pub fn record_accepted(&mut self, client_created: bool) {
        self.accepted += 1;
        if client_created {
            self.clients_created += 1;
        }
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates += 1;
    }

    pub fn record_rejection(&mut self, reason: RejectReason) {
        *self.rejected.entry(reason).or_default() += 1;
    }

    pub fn rejected_count(&self, reason: RejectReason) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn absorb(&mut self, other: &RunTally) {
        self.rows_read += other.rows_read;
        self.accepted += other.accepted;
        self.duplicates += other.duplicates;
        self.clients_created += other.clients_created;
        for (reason, count) in &other.rejected {
            *self.rejected.entry(*reason).or_default() += count;
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Loaded,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub path: String,
    pub business_unit: String,
    pub status: SourceStatus,
    pub error: Option<String>,
    pub tally: RunTally,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusinessUnitTotals {
    pub code: String,
    pub name: String,
    pub po_count: i64,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationOutcome {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub db_path: String,
    pub primary_currency: String,
    pub business_units_seeded: usize,
    pub pre_snapshot: Option<PathBuf>,
    pub post_snapshot: Option<PathBuf>,
    pub pruned_snapshots: Vec<PathBuf>,
    pub sources: Vec<SourceOutcome>,
    pub totals: RunTally,
    pub business_units: Vec<BusinessUnitTotals>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationRunManifest<'a> {
    pub manifest_version: u32,
    pub db_schema_version: &'a str,
    pub report_path: String,
    #[serde(flatten)]
    pub outcome: &'a MigrationOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreTotals {
    pub po_count: i64,
    pub total_value: Decimal,
    pub active: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub client_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub old_status: Option<PoStatus>,
    pub new_status: PoStatus,
    pub changed_at: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiringPurchaseOrder {
    pub po_number: String,
    pub business_unit: String,
    pub client: String,
    pub value: Decimal,
    pub expiry_date: NaiveDate,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub po_number: String,
    pub old_status: PoStatus,
    pub new_status: PoStatus,
}

/// Filters for listing purchase orders; `None` fields match everything.
/// The issue-date bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct PurchaseOrderFilter {
    pub business_unit: Option<String>,
    pub status: Option<PoStatus>,
    pub issued_from: Option<NaiveDate>,
    pub issued_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderSummary {
    pub po_number: String,
    pub business_unit: String,
    pub client: String,
    pub value: Decimal,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: PoStatus,
}

/// `None` when the amount does not fit in `i64` cents.
pub fn decimal_to_cents(value: Decimal) -> Option<i64> {
    value
        .round_dp(2)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
}

pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
