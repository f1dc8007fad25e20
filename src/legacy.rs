//! Read-only archive of the first Radio4000 version.
//!
//! `channels_v1.json` and `tracks_v1.json` are read from a data directory on
//! first use and kept in memory for the lifetime of the dataset.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use crate::error::{Error, Result};
use crate::model::{Channel, RecordSource, Track};

/// File name of the archived channels.
pub const CHANNELS_FILE: &str = "channels_v1.json";
/// File name of the archived tracks.
pub const TRACKS_FILE: &str = "tracks_v1.json";

/// Lazily loaded v1 channels and tracks.
#[derive(Debug)]
pub struct LegacyDataset {
    dir: PathBuf,
    channels: OnceCell<Vec<Channel>>,
    tracks: OnceCell<Vec<Track>>,
}

impl LegacyDataset {
    /// Creates a dataset reading from `dir`. Nothing is read yet.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            channels: OnceCell::new(),
            tracks: OnceCell::new(),
        }
    }

    /// Returns the data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All archived channels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the file is missing or not a JSON array.
    pub async fn channels(&self) -> Result<&[Channel]> {
        let channels = self
            .channels
            .get_or_try_init(|| async {
                let mut channels: Vec<Channel> = load_valid(&self.dir.join(CHANNELS_FILE), |c: &Channel| {
                    c.validate().is_ok()
                })
                .await?;
                for channel in &mut channels {
                    channel.source = RecordSource::V1;
                }
                Ok::<_, Error>(channels)
            })
            .await?;
        Ok(channels)
    }

    /// All archived tracks with a usable title and URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the file is missing or not a JSON array.
    pub async fn tracks(&self) -> Result<&[Track]> {
        let tracks = self
            .tracks
            .get_or_try_init(|| async {
                let mut tracks: Vec<Track> =
                    load_valid(&self.dir.join(TRACKS_FILE), |t: &Track| t.validate().is_ok()).await?;
                for track in &mut tracks {
                    track.source = RecordSource::V1;
                }
                Ok::<_, Error>(tracks)
            })
            .await?;
        Ok(tracks)
    }

    /// Finds a channel by slug.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the archive has no such channel.
    pub async fn channel(&self, slug: &str) -> Result<Channel> {
        self.channels()
            .await?
            .iter()
            .find(|c| c.slug == slug)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Channel not found: {slug}")))
    }

    /// Finds a track by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the archive has no such track.
    pub async fn track(&self, id: &str) -> Result<Track> {
        self.tracks()
            .await?
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Track not found: {id}")))
    }

    /// Tracks of the channels in `slugs`; every track when `slugs` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the tracks file cannot be loaded.
    pub async fn tracks_of(&self, slugs: &[String]) -> Result<Vec<Track>> {
        Ok(self
            .tracks()
            .await?
            .iter()
            .filter(|t| slugs.is_empty() || slugs.contains(&t.slug))
            .cloned()
            .collect())
    }

    /// Tracks of one channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the channel has no archived tracks and
    /// is not an archived channel either.
    pub async fn channel_tracks(&self, slug: &str) -> Result<Vec<Track>> {
        let tracks = self.tracks_of(&[slug.to_string()]).await?;
        if tracks.is_empty() {
            self.channel(slug).await?;
        }
        Ok(tracks)
    }

    /// Channels whose slug or name contains `query` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the channels file cannot be loaded.
    pub async fn search_channels(&self, query: &str, limit: usize) -> Result<Vec<Channel>> {
        let needle = query.to_lowercase();
        Ok(self
            .channels()
            .await?
            .iter()
            .filter(|c| {
                c.slug.to_lowercase().contains(&needle) || c.name.to_lowercase().contains(&needle)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    /// Tracks whose title contains `query` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the tracks file cannot be loaded.
    pub async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let needle = query.to_lowercase();
        Ok(self
            .tracks()
            .await?
            .iter()
            .filter(|t| t.title.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Reads a JSON array, keeping the entries that parse and pass `keep`.
async fn load_valid<T: DeserializeOwned>(path: &Path, keep: impl Fn(&T) -> bool) -> Result<Vec<T>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Unavailable(format!("{}: {e}", path.display())))?;
    let raw: Vec<serde_json::Value> = serde_json::from_str(&contents)
        .map_err(|e| Error::Unavailable(format!("{}: {e}", path.display())))?;

    let total = raw.len();
    let items: Vec<T> = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .filter(|item| keep(item))
        .collect();
    if items.len() < total {
        log::debug!(
            "Skipped {} invalid entries in {}",
            total - items.len(),
            path.display()
        );
    }
    Ok(items)
}
