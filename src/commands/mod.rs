pub mod backup;
pub mod migrate;
pub mod po;
pub mod status;

use std::path::Path;

use anyhow::Result;

use crate::backup::BackupManager;
use crate::cli::StoreArgs;
use crate::config::MigrationConfig;

fn load_config(store: &StoreArgs) -> Result<MigrationConfig> {
    MigrationConfig::load(store.config.as_deref())
}

/// Snapshot directory precedence: `--backup-dir`, then the config, then
/// `backups/` beside the store file.
fn backup_manager(store: &StoreArgs, config: &MigrationConfig) -> Result<BackupManager> {
    let backup_dir = match (&store.backup_dir, &config.backup.dir) {
        (Some(dir), _) => dir.clone(),
        (None, Some(dir)) => config.resolve_path(dir),
        (None, None) => store
            .db_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join("backups"),
    };
    BackupManager::new(&store.db_path, &backup_dir, config.backup.retention)
}
