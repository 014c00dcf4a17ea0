use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, TimeZone, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use crate::backup::BackupManager;
use crate::config::{ColumnMapping, MigrationConfig, SourceConfig};
use crate::model::{MigrationOutcome, PoStatus, RejectReason, SourceStatus};
use crate::store;

use super::dedup::Deduplicator;
use super::normalize::{convert_to_primary, normalize_client_name, normalize_row, one_year_after};
use super::report::{format_money, render_report};
use super::run::execute;
use super::source::{excel_serial_to_date, locate_header, records_from_table};
use super::types::{RawRow, ValidRow};
use super::validate::{parse_amount, parse_date, validate_row};

const HEADER: &str = "PO NUMBER,CLIENT,VALUE IN USD,DATE ISSUED,DATE EXPIRED,STATUS";

struct Fixture {
    dir: TempDir,
    db_path: PathBuf,
    config: MigrationConfig,
    backups: BackupManager,
}

impl Fixture {
    fn new(sources: &[(&str, &str, &str)]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = MigrationConfig {
            register: None,
            base_dir: dir.path().to_path_buf(),
            ..MigrationConfig::default()
        };
        config.sources = sources
            .iter()
            .map(|(file, business_unit, contents)| {
                fs::write(dir.path().join(file), contents).expect("write source");
                SourceConfig {
                    path: PathBuf::from(file),
                    business_unit: business_unit.to_string(),
                    sheet: None,
                    columns: ColumnMapping::default(),
                }
            })
            .collect();

        let db_path = dir.path().join("sbu_po_database.db");
        let backups = BackupManager::new(&db_path, &dir.path().join("backups"), 10)
            .expect("backup manager");

        Self {
            dir,
            db_path,
            config,
            backups,
        }
    }

    fn migrate(&self) -> MigrationOutcome {
        let started = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        execute(&self.db_path, &self.config, &self.backups, started).expect("migration runs")
    }

    fn connection(&self) -> Connection {
        Connection::open(&self.db_path).expect("open store")
    }
}

fn csv(rows: &[&str]) -> String {
    let mut text = HEADER.to_string();
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    text
}

fn config() -> MigrationConfig {
    MigrationConfig::default()
}

fn raw(po_number: &str, client: &str, value: &str, issue: &str, expiry: &str) -> RawRow {
    RawRow {
        source: "test.csv".to_string(),
        line: 2,
        business_unit: "GCM".to_string(),
        po_number: po_number.to_string(),
        client: client.to_string(),
        value: value.to_string(),
        issue_date: issue.to_string(),
        expiry_date: expiry.to_string(),
        ..RawRow::default()
    }
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

#[test]
fn blank_identifier_duplicate_and_zero_value_rows_leave_one_order() {
    let source = csv(&[
        ",Acme Ltd,1000,2025-03-01,2026-03-01,active",
        "PO-2,Acme Ltd,2500.50,2025-01-15,2026-01-15,active",
        "PO-3,Beta Corp,0,2025-02-01,2026-02-01,active",
        "PO-2,Acme Ltd,2500.50,2025-01-15,2026-01-15,active",
    ]);
    let fixture = Fixture::new(&[("gcm.csv", "GCM", &source)]);

    let outcome = fixture.migrate();
    let totals = &outcome.totals;
    assert_eq!(totals.rows_read, 4);
    assert_eq!(totals.accepted, 1);
    assert_eq!(totals.duplicates, 1);
    assert_eq!(totals.rejected_count(RejectReason::MissingIdentifier), 1);
    assert_eq!(totals.rejected_count(RejectReason::NonPositiveValue), 1);
    assert_eq!(totals.total_rejected(), 2);
    assert_eq!(totals.clients_created, 1);

    let connection = fixture.connection();
    let (count, value_cents): (i64, i64) = connection
        .query_row(
            "SELECT COUNT(*), SUM(value_cents) FROM purchase_orders WHERE po_number = 'PO-2'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("query order");
    assert_eq!(count, 1);
    assert_eq!(value_cents, 250_050);
    assert_eq!(
        store::count_rows(&connection, "SELECT COUNT(*) FROM purchase_orders").expect("count"),
        1
    );

    let gcm = outcome
        .business_units
        .iter()
        .find(|unit| unit.code == "GCM")
        .expect("GCM totals");
    assert_eq!(gcm.po_count, 1);
    assert_eq!(gcm.total_value, dec!(2500.50));
}

#[test]
fn first_row_wins_even_when_duplicate_fields_differ() {
    let source = csv(&[
        "PO-7,Acme,100,2025-01-01,2025-12-31,active",
        "PO-7,Beta,999,2025-02-01,2026-02-01,completed",
    ]);
    let fixture = Fixture::new(&[("gcm.csv", "GCM", &source)]);

    let outcome = fixture.migrate();
    assert_eq!(outcome.totals.accepted, 1);
    assert_eq!(outcome.totals.duplicates, 1);
    assert_eq!(outcome.totals.clients_created, 1);

    let connection = fixture.connection();
    let (client, value_cents, status, issue_date): (String, i64, PoStatus, NaiveDate) = connection
        .query_row(
            "
            SELECT c.name, po.value_cents, po.status, po.issue_date
            FROM purchase_orders po
            JOIN client_organizations c ON c.id = po.client_id
            WHERE po.po_number = 'PO-7'
            ",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .expect("query order");
    assert_eq!(client, "ACME");
    assert_eq!(value_cents, 10_000);
    assert_eq!(status, PoStatus::Active);
    assert_eq!(issue_date, date(2025, 1, 1));
    assert_eq!(
        store::count_rows(&connection, "SELECT COUNT(*) FROM client_organizations")
            .expect("count"),
        1
    );
}

#[test]
fn first_source_wins_when_a_key_repeats_across_sources() {
    let gcm = csv(&["PO-7,Acme,100,2025-01-01,2025-12-31,active"]);
    let oss = csv(&[
        "PO-7,Beta,999,2025-02-01,2026-02-01,completed",
        "PO-8,Beta,50,2025-02-01,2026-02-01,active",
    ]);
    let fixture = Fixture::new(&[("gcm.csv", "GCM", &gcm), ("oss.csv", "OSS", &oss)]);

    let outcome = fixture.migrate();
    assert_eq!(outcome.sources[0].tally.accepted, 1);
    assert_eq!(outcome.sources[1].tally.accepted, 1);
    assert_eq!(outcome.sources[1].tally.duplicates, 1);

    let connection = fixture.connection();
    let (business_unit, value_cents): (String, i64) = connection
        .query_row(
            "
            SELECT bu.code, po.value_cents
            FROM purchase_orders po
            JOIN business_units bu ON bu.id = po.business_unit_id
            WHERE po.po_number = 'PO-7'
            ",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("query order");
    assert_eq!(business_unit, "GCM");
    assert_eq!(value_cents, 10_000);
}

#[test]
fn oversized_value_is_rejected_without_aborting_the_run() {
    let source = csv(&[
        "PO-1,Acme,79228162514264337593543950335,2025-01-01,2025-12-31,active",
        "PO-2,Acme,100,2025-01-01,2025-12-31,active",
    ]);
    let fixture = Fixture::new(&[("gcm.csv", "GCM", &source)]);

    let outcome = fixture.migrate();
    assert_eq!(outcome.totals.rows_read, 2);
    assert_eq!(outcome.totals.accepted, 1);
    assert_eq!(
        outcome.totals.rejected_count(RejectReason::ConstraintViolation),
        1
    );

    let connection = fixture.connection();
    let numbers = store::existing_po_numbers(&connection).expect("numbers");
    assert_eq!(numbers, ["PO-2"]);
}

#[test]
fn accounting_negative_value_never_reaches_the_store() {
    let source = csv(&["PO-1,Acme,\"(1,500.00)\",2025-01-01,2025-12-31,active"]);
    let fixture = Fixture::new(&[("gcm.csv", "GCM", &source)]);

    let outcome = fixture.migrate();
    assert_eq!(outcome.totals.accepted, 0);
    assert_eq!(outcome.totals.rejected_count(RejectReason::NonPositiveValue), 1);
}

#[test]
fn every_accepted_order_gets_an_initial_history_entry() {
    let source = csv(&["PO-1,Acme,100,2025-01-01,2025-12-31,completed"]);
    let fixture = Fixture::new(&[("gcm.csv", "GCM", &source)]);
    fixture.migrate();

    let connection = fixture.connection();
    let history = store::status_history(&connection, "PO-1")
        .expect("history query")
        .expect("order exists");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status, None);
    assert_eq!(history[0].new_status, PoStatus::Completed);
    assert_eq!(history[0].note.as_deref(), Some("initial load"));
}

#[test]
fn dates_round_trip_and_blank_expiry_defaults_to_one_year() {
    let source = csv(&[
        "PO-1,Acme,100,03/01/2025,15/09/2025,active",
        "PO-2,Acme,100,2024-02-29,,active",
    ]);
    let fixture = Fixture::new(&[("gcm.csv", "GCM", &source)]);
    let outcome = fixture.migrate();
    assert_eq!(outcome.totals.accepted, 2);

    let connection = fixture.connection();
    let dates = |po: &str| -> (NaiveDate, NaiveDate) {
        connection
            .query_row(
                "SELECT issue_date, expiry_date FROM purchase_orders WHERE po_number = ?1",
                [po],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("query dates")
    };
    assert_eq!(dates("PO-1"), (date(2025, 3, 1), date(2025, 9, 15)));
    assert_eq!(dates("PO-2"), (date(2024, 2, 29), date(2025, 2, 28)));
}

#[test]
fn secondary_currency_value_converts_at_fixed_rate() {
    let source = "PO NUMBER,CLIENT,VALUE IN USD,VALUE IN NGN,DATE ISSUED\n\
                  PO-1,Acme,,1650,2025-01-01\n\
                  PO-2,Acme,,\"2,475\",2025-01-01\n";
    let fixture = Fixture::new(&[("gcm.csv", "GCM", source)]);
    let outcome = fixture.migrate();
    assert_eq!(outcome.totals.accepted, 2);

    let connection = fixture.connection();
    let cents = |po: &str| -> i64 {
        connection
            .query_row(
                "SELECT value_cents FROM purchase_orders WHERE po_number = ?1",
                [po],
                |row| row.get(0),
            )
            .expect("query value")
    };
    assert_eq!(cents("PO-1"), 100);
    assert_eq!(cents("PO-2"), 150);
}

#[test]
fn client_names_are_normalized_before_get_or_create() {
    let source = csv(&[
        "PO-1,  acme   ltd ,100,2025-01-01,2025-12-31,active",
        "PO-2,ACME LTD,200,2025-01-01,2025-12-31,active",
    ]);
    let fixture = Fixture::new(&[("gcm.csv", "GCM", &source)]);
    let outcome = fixture.migrate();
    assert_eq!(outcome.totals.accepted, 2);
    assert_eq!(outcome.totals.clients_created, 1);

    let connection = fixture.connection();
    let name: String = connection
        .query_row("SELECT name FROM client_organizations", [], |row| row.get(0))
        .expect("single client");
    assert_eq!(name, "ACME LTD");
}

#[test]
fn aliased_business_unit_lands_on_canonical_code() {
    let source = csv(&["PO-1,Acme,100,2025-01-01,2025-12-31,active"]);
    let fixture = Fixture::new(&[("tss.csv", "TSS", &source)]);
    let outcome = fixture.migrate();
    assert_eq!(outcome.totals.accepted, 1);

    let tcs = outcome
        .business_units
        .iter()
        .find(|unit| unit.code == "TCS")
        .expect("TCS totals");
    assert_eq!(tcs.po_count, 1);
    assert!(outcome.business_units.iter().all(|unit| unit.code != "TSS"));
}

#[test]
fn unknown_business_unit_and_inverted_dates_are_rejected_by_the_loader() {
    let unknown = csv(&["PO-1,Acme,100,2025-01-01,2025-12-31,active"]);
    let inverted = csv(&["PO-2,Acme,100,2025-06-01,2025-01-01,active"]);
    let fixture = Fixture::new(&[("xyz.csv", "XYZ", &unknown), ("gcm.csv", "GCM", &inverted)]);

    let outcome = fixture.migrate();
    assert_eq!(outcome.totals.accepted, 0);
    assert_eq!(
        outcome.totals.rejected_count(RejectReason::UnknownBusinessUnit),
        1
    );
    assert_eq!(
        outcome.totals.rejected_count(RejectReason::ConstraintViolation),
        1
    );

    let connection = fixture.connection();
    assert_eq!(
        store::count_rows(&connection, "SELECT COUNT(*) FROM purchase_orders").expect("count"),
        0
    );
    assert_eq!(
        store::count_rows(&connection, "SELECT COUNT(*) FROM client_organizations")
            .expect("count"),
        0,
        "rolled-back rows must not leave clients behind"
    );
}

#[test]
fn missing_source_is_skipped_and_the_run_continues() {
    let source = csv(&["PO-1,Acme,100,2025-01-01,2025-12-31,active"]);
    let mut fixture = Fixture::new(&[("gcm.csv", "GCM", &source)]);
    fixture.config.sources.insert(
        0,
        SourceConfig {
            path: PathBuf::from("missing.xlsx"),
            business_unit: "OSS".to_string(),
            sheet: None,
            columns: ColumnMapping::default(),
        },
    );

    let outcome = fixture.migrate();
    assert_eq!(outcome.sources.len(), 2);
    assert_eq!(outcome.sources[0].status, SourceStatus::Skipped);
    assert!(
        outcome.sources[0]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("not found"))
    );
    assert_eq!(outcome.sources[1].status, SourceStatus::Loaded);
    assert_eq!(outcome.totals.accepted, 1);
}

#[test]
fn rerun_counts_persisted_orders_as_duplicates() {
    let source = csv(&[
        "PO-1,Acme,100,2025-01-01,2025-12-31,active",
        "PO-2,Beta,200,2025-01-01,2025-12-31,active",
    ]);
    let fixture = Fixture::new(&[("gcm.csv", "GCM", &source)]);

    let first = fixture.migrate();
    assert_eq!(first.totals.accepted, 2);
    assert!(first.pre_snapshot.is_none(), "no store to snapshot yet");
    assert!(first.post_snapshot.is_some());

    let second = fixture.migrate();
    assert_eq!(second.totals.accepted, 0);
    assert_eq!(second.totals.duplicates, 2);
    assert_eq!(second.business_units_seeded, 0);
    assert!(second.pre_snapshot.is_some());

    let connection = fixture.connection();
    assert_eq!(
        store::count_rows(&connection, "SELECT COUNT(*) FROM purchase_orders").expect("count"),
        2
    );
}

#[test]
fn report_lists_every_reason_and_the_grand_total() {
    let source = csv(&["PO-1,Acme,1234567.8,2025-01-01,2025-12-31,active"]);
    let fixture = Fixture::new(&[("gcm.csv", "GCM", &source)]);
    let outcome = fixture.migrate();

    let report = render_report(&outcome).expect("report renders");
    for reason in RejectReason::ALL {
        assert!(report.contains(reason.as_str()), "missing {}", reason.as_str());
    }
    assert!(report.contains("TOTAL"));
    assert!(report.contains("USD 1,234,567.80"));
    assert!(fixture.dir.path().join("backups").is_dir());
}

#[test]
fn header_row_is_found_below_a_title_row() {
    let rows: Vec<Vec<String>> = [
        vec!["2025 PURCHASE ORDERS", "", ""],
        vec!["PO  Number", "Client Name", "Value"],
        vec!["PO-9", "Acme", "10"],
        vec!["", "", ""],
    ]
    .into_iter()
    .map(|row| row.into_iter().map(str::to_string).collect())
    .collect();

    let mapping = ColumnMapping::default();
    assert_eq!(locate_header(&rows, &mapping.po_number), Some(1));

    let records = records_from_table(&rows, &mapping, "gcm.csv", "GCM").expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].po_number, "PO-9");
    assert_eq!(records[0].client, "Acme");
    assert_eq!(records[0].value, "10");
    assert_eq!(records[0].line, 3);
    assert_eq!(records[0].issue_date, "");
}

#[test]
fn table_without_client_column_is_refused() {
    let rows: Vec<Vec<String>> = vec![
        vec!["PO NUMBER".to_string(), "VALUE".to_string()],
        vec!["PO-1".to_string(), "10".to_string()],
    ];
    let err = records_from_table(&rows, &ColumnMapping::default(), "x.csv", "GCM")
        .expect_err("client column is required");
    assert!(err.to_string().contains("client"));
}

#[test]
fn validation_reasons_follow_precedence() {
    let config = config();
    let check = |row: RawRow| validate_row(&row, &config).err();

    assert_eq!(
        check(raw("", "", "0", "bad", "")),
        Some(RejectReason::MissingIdentifier)
    );
    assert_eq!(
        check(raw("nan", "Acme", "10", "2025-01-01", "")),
        Some(RejectReason::MissingIdentifier)
    );
    assert_eq!(
        check(raw("PO-1", " ", "0", "bad", "")),
        Some(RejectReason::MissingClient)
    );
    assert_eq!(
        check(raw("PO-1", "Acme", "-5", "bad", "")),
        Some(RejectReason::NonPositiveValue)
    );
    assert_eq!(
        check(raw("PO-1", "Acme", "n/a", "2025-01-01", "")),
        Some(RejectReason::NonPositiveValue)
    );
    assert_eq!(
        check(raw("PO-1", "Acme", "10", "", "")),
        Some(RejectReason::UnparseableDate)
    );
    assert_eq!(
        check(raw("PO-1", "Acme", "10", "2025-01-01", "someday")),
        Some(RejectReason::UnparseableDate)
    );
    assert_eq!(check(raw("PO-1", "Acme", "10", "2025-01-01", "")), None);
}

#[test]
fn amounts_ignore_symbols_and_separators() {
    assert_eq!(parse_amount("$1,234.50"), Some(dec!(1234.50)));
    assert_eq!(parse_amount("NGN 2,000"), Some(dec!(2000)));
    assert_eq!(parse_amount(" 75 "), Some(dec!(75)));
    assert_eq!(parse_amount(""), None);
    assert_eq!(parse_amount("nan"), None);
    assert_eq!(parse_amount("TBD"), None);
    assert_eq!(parse_amount("USD 1 500"), Some(dec!(1500)));
    assert_eq!(parse_amount("250 NGN"), Some(dec!(250)));
    assert_eq!(parse_amount("\u{20a6}12,000.50"), Some(dec!(12000.50)));
    assert_eq!(parse_amount("-$5"), Some(dec!(-5)));
}

#[test]
fn amounts_keep_sign_and_exponent_instead_of_rewriting_digits() {
    assert_eq!(parse_amount("(1,500.00)"), Some(dec!(-1500.00)));
    assert_eq!(parse_amount("1.5E+06"), Some(dec!(1500000)));
    assert_eq!(parse_amount("2.5e3"), Some(dec!(2500)));
    assert_eq!(parse_amount("12abc"), None);
    assert_eq!(parse_amount("1.2.3"), None);
    assert_eq!(parse_amount("1-500"), None);
    assert_eq!(parse_amount("--5"), None);

    let config = config();
    assert_eq!(
        validate_row(&raw("PO-1", "Acme", "(1,500.00)", "2025-01-01", ""), &config).err(),
        Some(RejectReason::NonPositiveValue)
    );
    assert_eq!(
        validate_row(&raw("PO-1", "Acme", "1,500 approx", "2025-01-01", ""), &config).err(),
        Some(RejectReason::NonPositiveValue)
    );
}

#[test]
fn dates_parse_month_first_then_day_first_and_spreadsheet_serials() {
    let formats = config().date_formats;
    let march_first = Some(date(2025, 3, 1));

    assert_eq!(parse_date("2025-03-01", &formats), march_first);
    assert_eq!(parse_date("03/01/2025", &formats), march_first);
    assert_eq!(parse_date("03/04/2025", &formats), Some(date(2025, 3, 4)));
    assert_eq!(parse_date("15/09/2025", &formats), Some(date(2025, 9, 15)));
    assert_eq!(parse_date("03/01/2025 10:30:00", &formats), march_first);
    assert_eq!(parse_date("1 Mar 2025", &formats), march_first);
    assert_eq!(parse_date("2025-03-01 10:30:00", &formats), march_first);
    assert_eq!(parse_date("45717", &formats), march_first);
    assert_eq!(parse_date("12", &formats), None);
    assert_eq!(parse_date("not a date", &formats), None);
    assert_eq!(excel_serial_to_date(45658.75), Some(date(2025, 1, 1)));
}

#[test]
fn conversion_rounds_half_up_and_refuses_other_currencies() {
    let currency = config().currency;
    assert_eq!(convert_to_primary(dec!(0.005), "USD", &currency), Ok(dec!(0.01)));
    assert_eq!(convert_to_primary(dec!(1650), "ngn", &currency), Ok(dec!(1.00)));
    assert_eq!(
        convert_to_primary(dec!(10), "EUR", &currency),
        Err(RejectReason::UnsupportedCurrency)
    );
}

#[test]
fn value_rounding_to_zero_is_rejected_as_non_positive() {
    let config = config();
    let row = ValidRow {
        source: "test.csv".to_string(),
        line: 2,
        business_unit: "TSS".to_string(),
        po_number: "PO-1".to_string(),
        client: "acme".to_string(),
        amount: dec!(1),
        currency: "NGN".to_string(),
        issue_date: date(2025, 1, 1),
        expiry_date: None,
        status: String::new(),
        description: String::new(),
    };
    assert_eq!(
        normalize_row(row.clone(), &config).err(),
        Some(RejectReason::NonPositiveValue)
    );

    let candidate = normalize_row(
        ValidRow {
            amount: dec!(3300),
            status: "Canceled".to_string(),
            ..row
        },
        &config,
    )
    .expect("normalizes");
    assert_eq!(candidate.value, dec!(2.00));
    assert_eq!(candidate.business_unit_code, "TCS");
    assert_eq!(candidate.client_name, "ACME");
    assert_eq!(candidate.status, PoStatus::Cancelled);
    assert_eq!(candidate.expiry_date, date(2026, 1, 1));
    assert_eq!(candidate.description, None);
}

#[test]
fn unknown_status_defaults_to_active() {
    assert_eq!(PoStatus::parse("ongoing"), None);
    assert_eq!(PoStatus::parse(" COMPLETED "), Some(PoStatus::Completed));
}

#[test]
fn leap_day_expiry_falls_back_to_february_28() {
    assert_eq!(one_year_after(date(2024, 2, 29)), date(2025, 2, 28));
    assert_eq!(one_year_after(date(2025, 7, 31)), date(2026, 7, 31));
}

#[test]
fn client_name_normalization_collapses_whitespace() {
    assert_eq!(normalize_client_name("  shell \t petroleum  "), "SHELL PETROLEUM");
}

#[test]
fn deduplicator_is_first_write_wins() {
    let mut dedup = Deduplicator::seeded(vec!["PO-1".to_string()]);
    assert!(dedup.is_duplicate("PO-1"));
    assert!(!dedup.is_duplicate("PO-2"));
    assert!(dedup.accept("PO-2"));
    assert!(!dedup.accept("PO-2"));
    assert_eq!(dedup.len(), 2);
}

#[test]
fn money_formats_with_thousands_separators() {
    assert_eq!(format_money(dec!(1234567.8), "USD"), "USD 1,234,567.80");
    assert_eq!(format_money(Decimal::ZERO, "USD"), "USD 0.00");
    assert_eq!(format_money(dec!(999.999), "USD"), "USD 1,000.00");
    assert_eq!(format_money(dec!(-1500), "NGN"), "NGN -1,500.00");
}
