use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::model::PoStatus;

#[derive(Parser, Debug)]
#[command(
    name = "sbu-po",
    version,
    about = "SBU purchase-order migration and store tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the configured source files into the store.
    Migrate(MigrateArgs),
    /// Summarize the store and list purchase orders nearing expiry.
    Status(StatusArgs),
    #[command(subcommand)]
    Po(PoCommand),
    #[command(subcommand)]
    Backup(BackupCommand),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, default_value = "sbu_po_database.db")]
    pub db_path: PathBuf,

    /// JSON migration config; built-in defaults when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides the snapshot directory from the config.
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value = "migration_reports")]
    pub report_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value_t = 90)]
    pub expiring_within: u64,
}

#[derive(Subcommand, Debug)]
pub enum PoCommand {
    /// Change a purchase order's status and record it in the history.
    SetStatus(SetStatusArgs),
    /// Print a purchase order's status history.
    History(HistoryArgs),
    /// List purchase orders, optionally filtered.
    List(ListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SetStatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub po_number: String,

    #[arg(long, value_enum)]
    pub status: PoStatus,

    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub po_number: String,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Business-unit code; source-file aliases are accepted.
    #[arg(long)]
    pub business_unit: Option<String>,

    #[arg(long, value_enum)]
    pub status: Option<PoStatus>,

    /// Earliest issue date, inclusive (YYYY-MM-DD).
    #[arg(long)]
    pub issued_from: Option<NaiveDate>,

    /// Latest issue date, inclusive (YYYY-MM-DD).
    #[arg(long)]
    pub issued_to: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// Snapshot the store now.
    Create(BackupCreateArgs),
    /// List snapshots of the store, oldest first.
    List(StoreArgs),
    /// Delete automatic snapshots beyond the retention window.
    Prune(StoreArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BackupCreateArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Manual snapshots are exempt from retention pruning.
    #[arg(long, default_value_t = false)]
    pub manual: bool,
}
