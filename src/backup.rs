//! Timestamped full-file snapshots of the store with bounded retention of
//! automatic snapshots. Manual snapshots are never pruned.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::util::{ensure_directory, sha256_file, utc_compact_millis_string};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Automatic,
    Manual,
}

impl SnapshotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "auto",
            Self::Manual => "manual",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "auto" => Some(Self::Automatic),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub path: PathBuf,
    pub kind: SnapshotKind,
    pub stamp: String,
    pub seq: u32,
}

#[derive(Debug)]
pub struct BackupManager {
    store_path: PathBuf,
    backup_dir: PathBuf,
    retention: usize,
    name_pattern: Regex,
}

impl BackupManager {
    pub fn new(store_path: &Path, backup_dir: &Path, retention: usize) -> Result<Self> {
        let name_pattern = Regex::new(
            r"^(?P<stem>.+)_(?P<kind>auto|manual)_(?P<stamp>\d{8}T\d{9}Z)(?:-(?P<seq>\d+))?\.db$",
        )
        .context("failed to compile snapshot name regex")?;

        Ok(Self {
            store_path: store_path.to_path_buf(),
            backup_dir: backup_dir.to_path_buf(),
            retention,
            name_pattern,
        })
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn snapshot(&self, kind: SnapshotKind) -> Result<Option<Snapshot>> {
        self.snapshot_at(kind, Utc::now())
    }

    /// Copies the store into the backup directory. Returns `None` when there
    /// is no store file yet.
    pub fn snapshot_at(&self, kind: SnapshotKind, ts: DateTime<Utc>) -> Result<Option<Snapshot>> {
        if !self.store_path.exists() {
            info!(
                path = %self.store_path.display(),
                "no store file yet; snapshot skipped"
            );
            return Ok(None);
        }

        ensure_directory(&self.backup_dir)?;

        let stem = self.store_stem();
        let stamp = utc_compact_millis_string(ts);
        let mut seq = 0_u32;
        let path = loop {
            let candidate = self
                .backup_dir
                .join(snapshot_file_name(&stem, kind, &stamp, seq));
            if !candidate.exists() {
                break candidate;
            }
            seq += 1;
        };

        fs::copy(&self.store_path, &path).with_context(|| {
            format!(
                "failed to copy {} to {}",
                self.store_path.display(),
                path.display()
            )
        })?;

        let sha256 = sha256_file(&path)?;
        let bytes = fs::metadata(&path)
            .with_context(|| format!("failed to inspect {}", path.display()))?
            .len();
        info!(
            path = %path.display(),
            kind = kind.as_str(),
            sha256 = %sha256,
            bytes,
            "store snapshot written"
        );

        Ok(Some(Snapshot {
            path,
            kind,
            stamp,
            seq,
        }))
    }

    /// Snapshots belonging to this store, oldest first.
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let stem = self.store_stem();
        let entries = fs::read_dir(&self.backup_dir)
            .with_context(|| format!("failed to read {}", self.backup_dir.display()))?;

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("failed to read entry in {}", self.backup_dir.display())
            })?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if let Some(snapshot) = self.parse_name(name, &stem, &path) {
                snapshots.push(snapshot);
            }
        }

        snapshots.sort_by(|a, b| a.stamp.cmp(&b.stamp).then(a.seq.cmp(&b.seq)));
        Ok(snapshots)
    }

    /// Deletes the oldest automatic snapshots beyond the retention window.
    pub fn prune(&self) -> Result<Vec<PathBuf>> {
        let automatic: Vec<Snapshot> = self
            .list()?
            .into_iter()
            .filter(|snapshot| snapshot.kind == SnapshotKind::Automatic)
            .collect();
        let excess = automatic.len().saturating_sub(self.retention);

        let mut removed = Vec::with_capacity(excess);
        for snapshot in automatic.into_iter().take(excess) {
            fs::remove_file(&snapshot.path)
                .with_context(|| format!("failed to remove {}", snapshot.path.display()))?;
            removed.push(snapshot.path);
        }

        if !removed.is_empty() {
            info!(
                removed = removed.len(),
                retention = self.retention,
                "pruned automatic snapshots"
            );
        }
        Ok(removed)
    }

    /// Automatic snapshot plus pruning, taken whenever a command starts
    /// against an existing store.
    pub fn startup(&self) -> Result<Option<Snapshot>> {
        let snapshot = self.snapshot(SnapshotKind::Automatic)?;
        if let Err(err) = self.prune() {
            warn!(error = %format!("{err:#}"), "snapshot pruning failed");
        }
        Ok(snapshot)
    }

    fn store_stem(&self) -> String {
        self.store_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("store")
            .to_string()
    }

    fn parse_name(&self, name: &str, stem: &str, path: &Path) -> Option<Snapshot> {
        let captures = self.name_pattern.captures(name)?;
        if captures.name("stem")?.as_str() != stem {
            return None;
        }
        let kind = SnapshotKind::from_label(captures.name("kind")?.as_str())?;
        let seq = match captures.name("seq") {
            Some(seq) => seq.as_str().parse().ok()?,
            None => 0,
        };

        Some(Snapshot {
            path: path.to_path_buf(),
            kind,
            stamp: captures.name("stamp")?.as_str().to_string(),
            seq,
        })
    }
}

fn snapshot_file_name(stem: &str, kind: SnapshotKind, stamp: &str, seq: u32) -> String {
    if seq == 0 {
        format!("{stem}_{}_{stamp}.db", kind.as_str())
    } else {
        format!("{stem}_{}_{stamp}-{seq}.db", kind.as_str())
    }
}
