//! Per-destination download state, persisted between runs.
//!
//! Records the last attempt of every track (`status`, `attempted_at`,
//! `error`, `path`) in `download-state.toml` next to the failure ledger. The
//! orchestrator copies these fields onto the fetched tracks before a run and
//! uses the store as the status sink of the per-track downloader. Updates stay
//! in memory until [`StateStore::flush`] writes them out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::download::{StatusSink, StatusUpdate};
use crate::error::Result;
use crate::model::{DownloadStatus, Track};

/// File name of the state file inside a destination directory.
pub const STATE_FILE: &str = "download-state.toml";

/// Last recorded attempt for one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackState {
    pub status: DownloadStatus,
    pub attempted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Serialised form of the state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadState {
    #[serde(default)]
    pub tracks: BTreeMap<String, TrackState>,
}

impl DownloadState {
    /// Loads a state file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves the state atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, toml::to_string(self)?)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Number of tracks whose last attempt has the given status.
    #[must_use]
    pub fn count(&self, status: DownloadStatus) -> usize {
        self.tracks.values().filter(|t| t.status == status).count()
    }
}

/// Shared, file-backed [`DownloadState`] usable as a [`StatusSink`].
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: Mutex<DownloadState>,
    dirty: AtomicBool,
}

impl StateStore {
    /// Opens the state of destination `dir`.
    ///
    /// A missing file starts empty. An unreadable file is logged and also
    /// starts empty; it is replaced on the next save.
    #[must_use]
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(STATE_FILE);
        let state = if path.exists() {
            DownloadState::load(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable state file {}: {e}", path.display());
                DownloadState::default()
            })
        } else {
            DownloadState::default()
        };
        Self {
            path,
            state: Mutex::new(state),
            dirty: AtomicBool::new(false),
        }
    }

    /// Returns the state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies the recorded status and attempt time onto matching tracks.
    pub async fn annotate(&self, tracks: &mut [Track]) {
        let state = self.state.lock().await;
        for track in tracks.iter_mut() {
            if let Some(entry) = state.tracks.get(&track.id) {
                track.download_status = Some(entry.status);
                track.download_attempted_at = Some(entry.attempted_at);
            }
        }
    }

    /// Returns a copy of the current state.
    pub async fn snapshot(&self) -> DownloadState {
        self.state.lock().await.clone()
    }

    /// Writes pending updates to the state file. Does nothing when no update
    /// arrived since the last flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written; the updates stay
    /// pending for the next flush.
    pub async fn flush(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let snapshot = self.snapshot().await;
        let path = self.path.clone();
        let saved = match tokio::task::spawn_blocking(move || snapshot.save(&path)).await {
            Ok(saved) => saved,
            Err(e) => Err(std::io::Error::other(e.to_string()).into()),
        };
        if saved.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        saved
    }
}

#[async_trait]
impl StatusSink for StateStore {
    async fn update(&self, track: &Track, update: StatusUpdate) -> Result<()> {
        self.state.lock().await.tracks.insert(
            track.id.clone(),
            TrackState {
                status: update.status,
                attempted_at: Utc::now(),
                error: update.error,
                path: update.path.map(|p| p.to_string_lossy().into_owned()),
            },
        );
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn track(id: &str) -> Track {
        Track {
            id: id.into(),
            title: "Song".into(),
            url: "https://youtu.be/abc".into(),
            ..Track::default()
        }
    }

    #[test]
    fn state_round_trips_through_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(STATE_FILE);
        let mut state = DownloadState::default();
        state.tracks.insert(
            "t1".into(),
            TrackState {
                status: DownloadStatus::Failed,
                attempted_at: "2025-01-01T00:00:00Z".parse().unwrap(),
                error: Some("Private video".into()),
                path: None,
            },
        );
        state.save(&path).unwrap();

        assert_eq!(DownloadState::load(&path).unwrap(), state);
        assert!(!path.with_extension("toml.tmp").exists());
        assert_eq!(state.count(DownloadStatus::Failed), 1);
    }

    #[tokio::test]
    async fn store_persists_updates_and_annotates() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path());

        store
            .update(&track("t1"), StatusUpdate::failed("Video unavailable"))
            .await
            .unwrap();
        store
            .update(
                &track("t2"),
                StatusUpdate::done(DownloadStatus::Success, dir.path().join("Song [abc].m4a")),
            )
            .await
            .unwrap();
        assert!(!store.path().exists());
        store.flush().await.unwrap();

        // Reopen from disk.
        let reopened = StateStore::open(dir.path());
        let mut tracks = vec![track("t1"), track("t2"), track("t3")];
        reopened.annotate(&mut tracks).await;

        assert_eq!(tracks[0].download_status, Some(DownloadStatus::Failed));
        assert!(tracks[0].download_attempted_at.is_some());
        assert_eq!(tracks[1].download_status, Some(DownloadStatus::Success));
        assert_eq!(tracks[2].download_status, None);

        let snapshot = reopened.snapshot().await;
        assert_eq!(
            snapshot.tracks["t1"].error.as_deref(),
            Some("Video unavailable")
        );
    }

    #[tokio::test]
    async fn flush_writes_once_and_only_when_changed() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path());

        store.flush().await.unwrap();
        assert!(!store.path().exists());

        for id in ["t1", "t2", "t3"] {
            store
                .update(&track(id), StatusUpdate::new(DownloadStatus::Downloading))
                .await
                .unwrap();
            store
                .update(&track(id), StatusUpdate::done(DownloadStatus::Success, format!("{id}.m4a")))
                .await
                .unwrap();
        }
        store.flush().await.unwrap();

        let saved = DownloadState::load(store.path()).unwrap();
        assert_eq!(saved.count(DownloadStatus::Success), 3);
        assert_eq!(saved, store.snapshot().await);

        std::fs::remove_file(store.path()).unwrap();
        store.flush().await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn unreadable_state_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), "not = [valid").unwrap();
        let store = StateStore::open(dir.path());
        assert!(store.snapshot().await.tracks.is_empty());
    }
}
