use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::backup::SnapshotKind;
use crate::cli::{BackupCommand, BackupCreateArgs, StoreArgs};
use crate::commands::{backup_manager, load_config};
use crate::util::sha256_file;

pub fn run(command: BackupCommand) -> Result<()> {
    match command {
        BackupCommand::Create(args) => create(args),
        BackupCommand::List(store) => list(store),
        BackupCommand::Prune(store) => prune(store),
    }
}

fn create(args: BackupCreateArgs) -> Result<()> {
    let config = load_config(&args.store)?;
    let backups = backup_manager(&args.store, &config)?;

    let kind = if args.manual {
        SnapshotKind::Manual
    } else {
        SnapshotKind::Automatic
    };
    if backups.snapshot(kind)?.is_none() {
        warn!(
            db_path = %args.store.db_path.display(),
            "store does not exist; nothing to snapshot"
        );
        return Ok(());
    }
    if kind == SnapshotKind::Automatic {
        backups.prune()?;
    }

    Ok(())
}

fn list(store: StoreArgs) -> Result<()> {
    let config = load_config(&store)?;
    let backups = backup_manager(&store, &config)?;

    let snapshots = backups.list()?;
    info!(
        backup_dir = %backups.backup_dir().display(),
        count = snapshots.len(),
        "snapshots"
    );
    for snapshot in &snapshots {
        let bytes = fs::metadata(&snapshot.path)
            .with_context(|| format!("failed to stat {}", snapshot.path.display()))?
            .len();
        info!(
            path = %snapshot.path.display(),
            kind = snapshot.kind.as_str(),
            stamp = %snapshot.stamp,
            sha256 = %sha256_file(&snapshot.path)?,
            bytes,
            "snapshot"
        );
    }

    Ok(())
}

fn prune(store: StoreArgs) -> Result<()> {
    let config = load_config(&store)?;
    let removed = backup_manager(&store, &config)?.prune()?;
    info!(removed = removed.len(), "prune complete");
    Ok(())
}
