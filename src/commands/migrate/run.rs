use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::backup::{BackupManager, SnapshotKind};
use crate::cli::MigrateArgs;
use crate::commands::{backup_manager, load_config};
use crate::config::{MigrationConfig, SourceConfig};
use crate::model::{
    MigrationOutcome, MigrationRunManifest, RunTally, SourceOutcome, SourceStatus,
};
use crate::store::{self, DB_SCHEMA_VERSION};
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty, write_text};

use super::dedup::Deduplicator;
use super::load::{LoadOutcome, load_candidate, seed_business_units};
use super::normalize::normalize_row;
use super::report::{render_report, write_report};
use super::source::{read_register, read_source};
use super::types::RawRow;
use super::validate::validate_row;

pub fn run(args: MigrateArgs) -> Result<()> {
    let config = load_config(&args.store)?;
    let backups = backup_manager(&args.store, &config)?;
    let started_ts = Utc::now();

    let outcome = execute(&args.store.db_path, &config, &backups, started_ts)?;

    let stamp = utc_compact_string(started_ts);
    let report_path = args.report_dir.join(format!("migration_report_{stamp}.txt"));
    let manifest_path = args.report_dir.join(format!("migration_run_{stamp}.json"));

    write_text(&report_path, &render_report(&outcome)?)?;
    write_json_pretty(
        &manifest_path,
        &MigrationRunManifest {
            manifest_version: 1,
            db_schema_version: DB_SCHEMA_VERSION,
            report_path: report_path.display().to_string(),
            outcome: &outcome,
        },
    )?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    write_report(&mut output, &outcome)?;
    output.flush()?;

    info!(path = %report_path.display(), "wrote migration report");
    info!(path = %manifest_path.display(), "wrote migration run manifest");
    info!(
        accepted = outcome.totals.accepted,
        duplicates = outcome.totals.duplicates,
        rejected = outcome.totals.total_rejected(),
        "migration completed"
    );

    Ok(())
}

/// Runs the whole pipeline against the store at `db_path`, wrapped in
/// before/after snapshots. Row and source failures are counted in the
/// outcome; store failures abort with an error.
pub(crate) fn execute(
    db_path: &Path,
    config: &MigrationConfig,
    backups: &BackupManager,
    started_ts: DateTime<Utc>,
) -> Result<MigrationOutcome> {
    let started_at = started_ts.to_rfc3339_opts(SecondsFormat::Secs, true);
    let run_id = format!("migration-{}", utc_compact_string(started_ts));

    info!(run_id = %run_id, db_path = %db_path.display(), "starting migration");

    let pre_snapshot = backups
        .snapshot(SnapshotKind::Automatic)
        .context("pre-migration snapshot failed")?;

    let mut connection = store::open_store(db_path)?;
    let business_units_seeded = seed_reference_data(&mut connection, config, &started_at)?;

    let mut dedup = Deduplicator::seeded(store::existing_po_numbers(&connection)?);
    info!(
        existing_keys = dedup.len(),
        business_units_seeded, "store ready"
    );

    let mut totals = RunTally::default();
    let mut sources = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let outcome = migrate_source(&mut connection, config, source, &mut dedup, &started_at)?;
        totals.absorb(&outcome.tally);
        sources.push(outcome);
    }

    let business_units = store::business_unit_totals(&connection)?;
    drop(connection);

    let post_snapshot = backups
        .snapshot(SnapshotKind::Automatic)
        .context("post-migration snapshot failed")?;
    let pruned_snapshots = backups.prune()?;

    Ok(MigrationOutcome {
        run_id,
        started_at,
        finished_at: now_utc_string(),
        db_path: db_path.display().to_string(),
        primary_currency: config.currency.primary.clone(),
        business_units_seeded,
        pre_snapshot: pre_snapshot.map(|snapshot| snapshot.path),
        post_snapshot: post_snapshot.map(|snapshot| snapshot.path),
        pruned_snapshots,
        sources,
        totals,
        business_units,
    })
}

/// Seeds configured business units, then any register entries, with codes
/// passed through the alias table. Config entries win on shared codes.
fn seed_reference_data(
    connection: &mut Connection,
    config: &MigrationConfig,
    created_at: &str,
) -> Result<usize> {
    let mut seeds = config.business_units.clone();

    if let Some(register) = &config.register {
        let path = config.resolve_path(&register.path);
        match read_register(&path, register) {
            Ok(entries) => {
                info!(
                    path = %path.display(),
                    entries = entries.len(),
                    "loaded business-unit register"
                );
                seeds.extend(entries);
            }
            Err(err) => warn!(
                path = %path.display(),
                error = %format!("{err:#}"),
                "business-unit register skipped"
            ),
        }
    }

    for seed in &mut seeds {
        seed.code = config.canonical_business_unit(&seed.code);
    }

    seed_business_units(connection, &seeds, created_at)
}

fn migrate_source(
    connection: &mut Connection,
    config: &MigrationConfig,
    source: &SourceConfig,
    dedup: &mut Deduplicator,
    loaded_at: &str,
) -> Result<SourceOutcome> {
    let path = config.resolve_path(&source.path);
    let mut outcome = SourceOutcome {
        path: path.display().to_string(),
        business_unit: source.business_unit.clone(),
        status: SourceStatus::Loaded,
        error: None,
        tally: RunTally::default(),
    };

    let rows = match read_source(&path, source) {
        Ok(rows) => rows,
        Err(err) => {
            let message = format!("{err:#}");
            warn!(path = %path.display(), error = %message, "source skipped");
            outcome.status = SourceStatus::Skipped;
            outcome.error = Some(message);
            return Ok(outcome);
        }
    };

    info!(path = %path.display(), rows = rows.len(), "reading source");

    for row in rows {
        process_row(connection, config, row, dedup, &mut outcome.tally, loaded_at)?;
    }

    info!(
        path = %path.display(),
        accepted = outcome.tally.accepted,
        duplicates = outcome.tally.duplicates,
        rejected = outcome.tally.total_rejected(),
        "source loaded"
    );

    Ok(outcome)
}

/// validate -> normalize -> duplicate check -> load, counting the outcome.
fn process_row(
    connection: &mut Connection,
    config: &MigrationConfig,
    row: RawRow,
    dedup: &mut Deduplicator,
    tally: &mut RunTally,
    loaded_at: &str,
) -> Result<()> {
    tally.record_read();

    let candidate = match validate_row(&row, config).and_then(|valid| normalize_row(valid, config))
    {
        Ok(candidate) => candidate,
        Err(reason) => {
            debug!(
                source = %row.source,
                line = row.line,
                reason = reason.as_str(),
                "row rejected"
            );
            tally.record_rejection(reason);
            return Ok(());
        }
    };

    if dedup.is_duplicate(&candidate.po_number) {
        debug!(
            source = %candidate.source,
            line = candidate.line,
            po_number = %candidate.po_number,
            "duplicate purchase order dropped"
        );
        tally.record_duplicate();
        return Ok(());
    }

    match load_candidate(connection, &candidate, loaded_at)? {
        LoadOutcome::Inserted {
            purchase_order_id,
            client_created,
        } => {
            debug!(
                purchase_order_id,
                po_number = %candidate.po_number,
                "purchase order loaded"
            );
            dedup.accept(&candidate.po_number);
            tally.record_accepted(client_created);
        }
        LoadOutcome::Rejected(reason) => tally.record_rejection(reason),
    }

    Ok(())
}
