//! Durable per-device progress checkpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTarget {
    pub index: usize,
    pub error: String,
}

/// Persisted progress of one device's campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub device_address: String,
    pub cursor: usize,
    pub total: usize,
    #[serde(default)]
    pub skip: usize,
    pub sent: Vec<usize>,
    pub failed: Vec<FailedTarget>,
    pub last_updated: DateTime<Utc>,
    pub is_running: bool,
    pub is_paused: bool,
}

impl CheckpointRecord {
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.total
    }

    pub fn info(&self) -> CheckpointInfo {
        CheckpointInfo {
            cursor: self.cursor,
            total: self.total,
            skip: self.skip,
            sent_count: self.sent.len(),
            failed_count: self.failed.len(),
            last_updated: self.last_updated,
        }
    }
}

/// Summary of a saved checkpoint, for resume prompts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointInfo {
    pub cursor: usize,
    pub total: usize,
    pub skip: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub last_updated: DateTime<Utc>,
}

/// Where a new campaign starts, given the saved checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePoint {
    Fresh,
    Resume(CheckpointRecord),
    /// The checkpoint no longer fits the resolved total
    Discard(String),
}

/// Decide how a campaign with `total` targets after `skip` rows relates to `saved`.
pub fn resume_point(saved: Option<CheckpointRecord>, total: usize, skip: usize) -> ResumePoint {
    let Some(record) = saved else {
        return ResumePoint::Fresh;
    };
    if record.is_complete() {
        return ResumePoint::Fresh;
    }
    if record.skip != skip {
        return ResumePoint::Discard(format!(
            "saved progress skipped {} rows, this campaign skips {}",
            record.skip, skip
        ));
    }
    if record.cursor != record.sent.len() + record.failed.len() {
        return ResumePoint::Discard(format!(
            "saved cursor {} does not match {} sent and {} failed",
            record.cursor,
            record.sent.len(),
            record.failed.len()
        ));
    }
    if record.cursor >= total {
        return ResumePoint::Discard(format!(
            "saved cursor {} of {} is past the new total {}",
            record.cursor, record.total, total
        ));
    }
    ResumePoint::Resume(record)
}

/// Replace every character outside `[A-Za-z0-9]` so the address is a safe file stem.
pub fn sanitize_key(address: &str) -> String {
    address
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// JSON checkpoint files, one per device address
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, address: &str) -> PathBuf {
        self.dir.join(format!("state_{}.json", sanitize_key(address)))
    }

    pub async fn load(&self, address: &str) -> Result<Option<CheckpointRecord>> {
        let path = self.path_for(address);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(parse(&path, &content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Write the record atomically: temp file, then rename over the old one.
    pub async fn save(&self, record: &CheckpointRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&record.device_address);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        debug!(
            "Saved checkpoint {} ({}/{})",
            path.display(),
            record.cursor,
            record.total
        );
        Ok(())
    }

    pub async fn delete(&self, address: &str) -> Result<()> {
        match fs::remove_file(self.path_for(address)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

fn parse(path: &Path, content: &str) -> Result<CheckpointRecord> {
    serde_json::from_str(content).map_err(|e| {
        warn!("Unreadable checkpoint {}: {}", path.display(), e);
        Error::Checkpoint(format!("{}: {}", path.display(), e))
    })
}
