//! Append-only failure ledger (`failures.jsonl`) for a download destination.
//!
//! Every failed attempt becomes one JSON object on its own line:
//!
//! ```text
//! {"timestamp":"2025-01-01T00:00:00Z","track":{"id":"t1","title":"…","url":"…","youtubeId":"abc"},"error":"Video unavailable"}
//! ```
//!
//! The file is only ever opened for append. A record is serialised into a
//! single buffer and written in one call, and readers skip lines that do not
//! parse, so a process killed mid-write leaves every earlier record intact.

use std::collections::{HashMap, HashSet};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::Result;
use crate::media::extract_youtube_id;
use crate::model::Track;

/// File name of the ledger inside a destination directory.
pub const LEDGER_FILE: &str = "failures.jsonl";

/// The part of a track kept with each failure record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(
        rename = "youtubeId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub youtube_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl From<&Track> for TrackSnapshot {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            title: track.title.clone(),
            url: track.url.clone(),
            youtube_id: extract_youtube_id(&track.url),
            description: track.description.clone(),
        }
    }
}

/// One persisted failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    pub track: TrackSnapshot,
    pub error: String,
}

/// A failure to be appended.
#[derive(Debug, Clone)]
pub struct Failure {
    pub track: Track,
    pub error: String,
}

impl Failure {
    /// Creates a failure entry for `track`.
    #[must_use]
    pub fn new(track: Track, error: impl Into<String>) -> Self {
        Self {
            track,
            error: error.into(),
        }
    }
}

/// Failure ledger scoped to one destination directory.
#[derive(Debug, Clone)]
pub struct FailureLedger {
    dir: PathBuf,
}

impl FailureLedger {
    /// Creates a ledger handle for `dir`. Nothing is touched on disk.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory this ledger belongs to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the ledger file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    /// Appends one record per failure, in input order.
    ///
    /// Returns `Ok(None)` without any I/O when `failures` is empty, otherwise
    /// the ledger path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub async fn append(&self, failures: &[Failure]) -> Result<Option<PathBuf>> {
        if failures.is_empty() {
            return Ok(None);
        }

        let path = self.path();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        // A previous run killed mid-record leaves a line without its newline.
        // Terminate it so the next record starts on a fresh line.
        if file.metadata().await?.len() > 0 {
            file.seek(SeekFrom::End(-1)).await?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                file.write_all(b"\n").await?;
            }
        }

        let timestamp = Utc::now();
        for failure in failures {
            let record = FailureRecord {
                timestamp,
                track: TrackSnapshot::from(&failure.track),
                error: failure.error.clone(),
            };
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            file.write_all(&line).await?;
        }
        file.flush().await?;
        file.sync_data().await?;

        log::debug!("Appended {} failure(s) to {}", failures.len(), path.display());
        Ok(Some(path))
    }

    /// Reads every parseable record in file order.
    ///
    /// A missing ledger yields an empty list. Lines that fail to parse are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn records(&self) -> Result<Vec<FailureRecord>> {
        let path = self.path();
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // Split on raw bytes: a torn multi-byte character must only cost its own line.
        let records = contents
            .split(|&b| b == b'\n')
            .enumerate()
            .filter(|(_, line)| !line.trim_ascii().is_empty())
            .filter_map(|(idx, line)| match serde_json::from_slice(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Skipping malformed line {} in {}: {e}", idx + 1, path.display());
                    None
                }
            })
            .collect();
        Ok(records)
    }

    /// Returns the ids with at least one failure record.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn read_failed_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .records()
            .await?
            .into_iter()
            .map(|r| r.track.id)
            .collect())
    }

    /// Returns the ids whose most recent failure is newer than `now - window`.
    ///
    /// With no window every recorded id blocks, as in
    /// [`read_failed_ids`](Self::read_failed_ids).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn blocking_ids(
        &self,
        window: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<HashSet<String>> {
        let Some(window) = window else {
            return self.read_failed_ids().await;
        };

        let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();
        for record in self.records().await? {
            latest
                .entry(record.track.id)
                .and_modify(|at| *at = (*at).max(record.timestamp))
                .or_insert(record.timestamp);
        }

        let cutoff = now
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(latest
            .into_iter()
            .filter(|(_, at)| *at > cutoff)
            .map(|(id, _)| id)
            .collect())
    }
}
