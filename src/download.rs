//! Channel download orchestration.
//!
//! [`Downloader::download_channel`] resolves a channel's tracks, drops the
//! ones that failed recently according to the [`FailureLedger`], downloads
//! the rest with at most `concurrency` external tool processes in flight,
//! records new failures in the ledger and returns a [`DownloadSummary`].
//!
//! Only track-list resolution can fail a run. Everything that goes wrong
//! with a single track becomes an [`Outcome`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::catalog::TrackSource;
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::filter::{FilterOptions, filter_tracks};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::ledger::{Failure, FailureLedger};
use crate::media::track_filename;
use crate::model::{DownloadStatus, Track};
use crate::state::StateStore;
use crate::stats::{DownloadSummary, SummaryBuilder};
use crate::tool::{MediaTool, ToolRequest, looks_outdated};

/// Why a single track failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Missing title or URL.
    InvalidTrackData,
    /// No media id in the URL.
    CannotDeriveFilename,
    /// The media tool could not be run or exited non-zero.
    ExternalTool,
}

/// Result of one per-track attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The tool wrote the file.
    Downloaded { path: PathBuf },
    /// A file already existed at the destination.
    SkippedExisting { path: PathBuf },
    /// Simulation mode: this is where the file would go.
    Simulated { path: PathBuf },
    /// The attempt failed.
    Failed { kind: FailureKind, error: String },
    /// The track failed recently and no retry was requested.
    RecentlyFailed,
    /// The run was cancelled before or during the attempt.
    Cancelled,
}

impl Outcome {
    /// Returns the destination path, if the outcome has one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Downloaded { path } | Self::SkippedExisting { path } | Self::Simulated { path } => {
                Some(path)
            }
            _ => None,
        }
    }

    /// Returns the error text of a failed outcome.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    fn failed(kind: FailureKind, error: &Error) -> Self {
        Self::Failed {
            kind,
            error: error.to_string(),
        }
    }
}

/// An [`Outcome`] together with the track it belongs to.
#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub track: Track,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

impl TrackOutcome {
    fn new(track: &Track, outcome: Outcome) -> Self {
        Self {
            track: track.clone(),
            outcome,
            timestamp: Utc::now(),
        }
    }
}

/// A status change reported to a [`StatusSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: DownloadStatus,
    pub error: Option<String>,
    pub path: Option<PathBuf>,
}

impl StatusUpdate {
    /// A status without error or path.
    #[must_use]
    pub const fn new(status: DownloadStatus) -> Self {
        Self {
            status,
            error: None,
            path: None,
        }
    }

    /// A finished attempt that produced (or found) a file.
    #[must_use]
    pub fn done(status: DownloadStatus, path: impl Into<PathBuf>) -> Self {
        Self {
            status,
            error: None,
            path: Some(path.into()),
        }
    }

    /// A failed attempt.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: DownloadStatus::Failed,
            error: Some(error.into()),
            path: None,
        }
    }
}

/// Receives per-track status changes for persistence.
///
/// Updates are best effort: an error is logged and the download goes on.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Records the new status of `track`.
    async fn update(&self, track: &Track, update: StatusUpdate) -> Result<()>;
}

/// A status sink that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStatus;

#[async_trait]
impl StatusSink for NoStatus {
    async fn update(&self, _track: &Track, _update: StatusUpdate) -> Result<()> {
        Ok(())
    }
}

/// Trait for receiving download progress updates.
///
/// All methods have default no-op implementations for convenience.
pub trait DownloadProgress: Send + Sync {
    /// Called once the track list is known and filtered.
    fn on_tracks_resolved(&self, _total: usize, _to_download: usize, _previously_failed: usize) {}

    /// Called when an attempt for a track starts.
    fn on_track_start(&self, _track: &Track) {}

    /// Called when a track reaches its outcome.
    fn on_track_complete(&self, _outcome: &TrackOutcome) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// Primary and fallback source of a channel's tracks.
#[derive(Clone, Copy)]
pub struct TrackSources<'a> {
    pub primary: &'a dyn TrackSource,
    pub fallback: Option<&'a dyn TrackSource>,
}

/// Returns `<output>/<slug>`, the destination of a channel.
#[must_use]
pub fn channel_dir(output_dir: &Path, slug: &str) -> PathBuf {
    output_dir.join(slug)
}

/// Returns `<output>/<slug>/tracks`, where audio files are written.
#[must_use]
pub fn tracks_dir(output_dir: &Path, slug: &str) -> PathBuf {
    channel_dir(output_dir, slug).join("tracks")
}

/// Fetches the tracks of `slug` from the primary source, then the fallback.
///
/// # Errors
///
/// Returns [`Error::TrackListUnavailable`] when every source failed.
pub async fn resolve_tracks(slug: &str, sources: TrackSources<'_>) -> Result<Vec<Track>> {
    let primary_err = match sources.primary.fetch_channel_tracks(slug).await {
        Ok(tracks) => {
            log::info!("Found {} tracks from {}", tracks.len(), sources.primary.name());
            return Ok(tracks);
        }
        Err(e) => e,
    };

    let Some(fallback) = sources.fallback else {
        return Err(Error::TrackListUnavailable {
            slug: slug.to_string(),
            reason: primary_err.to_string(),
        });
    };

    log::warn!(
        "{} failed: {primary_err}. Trying {}...",
        sources.primary.name(),
        fallback.name()
    );
    match fallback.fetch_channel_tracks(slug).await {
        Ok(tracks) => {
            log::info!("Found {} tracks from {}", tracks.len(), fallback.name());
            Ok(tracks)
        }
        Err(e) => Err(Error::TrackListUnavailable {
            slug: slug.to_string(),
            reason: format!("{primary_err}; {e}"),
        }),
    }
}

/// Title shown in log lines; blank titles read as "Unknown".
fn display_title(title: &str) -> &str {
    if title.trim().is_empty() { "Unknown" } else { title }
}

/// Downloads channel audio through an external [`MediaTool`].
pub struct Downloader<F: FileSystem = TokioFileSystem> {
    tool: Arc<dyn MediaTool>,
    config: DownloadConfig,
    fs: F,
}

impl Downloader<TokioFileSystem> {
    /// Creates a new downloader with the default file system.
    #[must_use]
    pub fn new(tool: Arc<dyn MediaTool>, config: DownloadConfig) -> Self {
        Self {
            tool,
            config,
            fs: TokioFileSystem,
        }
    }
}

impl<F: FileSystem> Downloader<F> {
    /// Creates a new downloader with a custom file system implementation.
    #[must_use]
    pub fn with_fs(tool: Arc<dyn MediaTool>, config: DownloadConfig, fs: F) -> Self {
        Self { tool, config, fs }
    }

    /// Returns a reference to the download configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Reports a status change, logging instead of failing.
    async fn report(&self, status: &dyn StatusSink, track: &Track, update: StatusUpdate) {
        if let Err(e) = status.update(track, update).await {
            log::warn!("Failed to update download status for {}: {e}", track.id);
        }
    }

    /// Attempts one track and classifies the result.
    ///
    /// Never fails: every problem is turned into an [`Outcome`].
    pub async fn download_track(
        &self,
        track: &Track,
        dir: &Path,
        status: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> TrackOutcome {
        if cancel.is_cancelled() {
            return TrackOutcome::new(track, Outcome::Cancelled);
        }

        if track.title.trim().is_empty() || track.url.trim().is_empty() {
            log::error!("Invalid track data: {}", display_title(&track.title));
            let error = Error::InvalidTrackData(format!("missing title or url for track {}", track.id));
            self.report(status, track, StatusUpdate::failed(error.to_string())).await;
            return TrackOutcome::new(track, Outcome::failed(FailureKind::InvalidTrackData, &error));
        }

        if !self.config.retry_failed {
            let since = self
                .config
                .failure_window()
                .and_then(|window| Utc::now().checked_sub_signed(window))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            if track.failed_since(since) {
                log::info!("Skipping recently failed: {}", track.title);
                return TrackOutcome::new(track, Outcome::RecentlyFailed);
            }
        }

        let path = match track_filename(track, dir) {
            Ok(path) => path,
            Err(e) => {
                let kind = match e {
                    Error::InvalidTrackData(_) => FailureKind::InvalidTrackData,
                    _ => FailureKind::CannotDeriveFilename,
                };
                log::error!("Failed to download \"{}\" ({}): {e}", track.title, track.url);
                self.report(status, track, StatusUpdate::failed(e.to_string())).await;
                return TrackOutcome::new(track, Outcome::failed(kind, &e));
            }
        };

        if self.config.simulate {
            log::info!("Would download: \"{}\" to {}", track.title, path.display());
            self.report(status, track, StatusUpdate::new(DownloadStatus::Pending))
                .await;
            return TrackOutcome::new(track, Outcome::Simulated { path });
        }

        if self.fs.file_exists(&path).await {
            log::info!("Skipping existing: {}", track.title);
            self.report(status, track, StatusUpdate::done(DownloadStatus::Skipped, &path))
                .await;
            return TrackOutcome::new(track, Outcome::SkippedExisting { path });
        }

        self.report(status, track, StatusUpdate::new(DownloadStatus::Downloading))
            .await;

        let request = ToolRequest {
            url: &track.url,
            destination: &path,
            comment: &track.description,
            premium_token: self.config.premium_token(),
        };
        match self.tool.fetch(&request, cancel).await {
            Ok(()) => {
                log::info!("Downloaded: {}", track.title);
                self.report(status, track, StatusUpdate::done(DownloadStatus::Success, &path))
                    .await;
                TrackOutcome::new(track, Outcome::Downloaded { path })
            }
            Err(Error::Cancelled) => {
                self.report(status, track, StatusUpdate::new(DownloadStatus::Pending))
                    .await;
                TrackOutcome::new(track, Outcome::Cancelled)
            }
            Err(e) => {
                let error = e.to_string();
                log::error!(
                    "Failed to download \"{}\" ({}) with {}: {error}",
                    track.title,
                    track.url,
                    self.tool.name()
                );
                if looks_outdated(&error) {
                    log::warn!("Try updating {} (e.g. `yt-dlp -U`)", self.tool.name());
                }
                self.report(status, track, StatusUpdate::failed(error.clone())).await;
                TrackOutcome::new(
                    track,
                    Outcome::Failed {
                        kind: FailureKind::ExternalTool,
                        error,
                    },
                )
            }
        }
    }

    /// Attempts every track with bounded concurrency.
    ///
    /// Tracks are dispatched in order; at most `concurrency` attempts run at
    /// once. Outcomes are returned in completion order.
    pub async fn download_all(
        &self,
        tracks: &[Track],
        dir: &Path,
        status: &dyn StatusSink,
        progress: &dyn DownloadProgress,
        cancel: &CancellationToken,
    ) -> Vec<TrackOutcome> {
        if tracks.is_empty() {
            return Vec::new();
        }

        stream::iter(tracks)
            .map(|track| async move {
                if !cancel.is_cancelled() {
                    progress.on_track_start(track);
                }
                let outcome = self.download_track(track, dir, status, cancel).await;
                progress.on_track_complete(&outcome);
                outcome
            })
            .buffer_unordered(self.config.concurrency())
            .collect()
            .await
    }

    /// Downloads every eligible track of a channel into
    /// `<output_dir>/<slug>/tracks`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration, an I/O error if
    /// the destination cannot be created, and
    /// [`Error::TrackListUnavailable`] if no source yields the track list.
    /// Per-track failures never cause an error.
    pub async fn download_channel(
        &self,
        slug: &str,
        output_dir: &Path,
        sources: TrackSources<'_>,
        progress: &dyn DownloadProgress,
        cancel: &CancellationToken,
    ) -> Result<DownloadSummary> {
        self.config.validate()?;

        let mut summary = SummaryBuilder::new();
        let channel_dir = channel_dir(output_dir, slug);
        let tracks_dir = tracks_dir(output_dir, slug);

        if self.config.simulate {
            log::info!("Would create folder: {}", tracks_dir.display());
        } else {
            self.fs.create_dir_all(&tracks_dir).await?;
        }

        log::info!("Fetching tracks for channel: {slug}");
        let mut tracks = resolve_tracks(slug, sources).await?;
        summary.set_total(tracks.len());
        if tracks.is_empty() {
            log::info!("No tracks found for {slug}");
            progress.on_tracks_resolved(0, 0, 0);
            return Ok(summary.build());
        }

        let store = StateStore::open(&channel_dir);
        store.annotate(&mut tracks).await;

        let ledger = FailureLedger::new(&channel_dir);
        let failed_ids = ledger
            .blocking_ids(self.config.failure_window(), Utc::now())
            .await
            .unwrap_or_else(|e| {
                log::warn!("Could not read {}: {e}", ledger.path().display());
                std::collections::HashSet::new()
            });

        let force = self.config.retry_failed;
        let filtered = filter_tracks(
            &tracks,
            FilterOptions {
                failed_ids: &failed_ids,
                force,
            },
        );
        summary.set_excluded(filtered.excluded(force));
        if force && !filtered.previously_failed.is_empty() {
            log::info!(
                "Retrying {} previously failed track(s)",
                filtered.previously_failed.len()
            );
        }
        progress.on_tracks_resolved(
            tracks.len(),
            filtered.to_download.len(),
            filtered.previously_failed.len(),
        );

        let status: &dyn StatusSink = if self.config.simulate {
            &NoStatus
        } else {
            &store
        };
        let outcomes = self
            .download_all(&filtered.to_download, &tracks_dir, status, progress, cancel)
            .await;

        let mut failures = Vec::new();
        for outcome in &outcomes {
            summary.add(&outcome.outcome);
            if let Outcome::Failed { error, .. } = &outcome.outcome {
                failures.push(Failure::new(outcome.track.clone(), error.clone()));
            }
        }

        if !self.config.simulate {
            if let Err(e) = store.flush().await {
                log::warn!("Failed to save {}: {e}", store.path().display());
            }
            match ledger.append(&failures).await {
                Ok(path) => summary.set_ledger_path(path),
                Err(e) => log::warn!(
                    "Failed to record {} failure(s) in {}: {e}",
                    failures.len(),
                    ledger.path().display()
                ),
            }
        }

        Ok(summary.build())
    }
}
