//! Channel and track operations over the live API and the v1 archive.
//!
//! Reads try the API first and fall back to the archive explicitly. Writes
//! go to the API only, need a session and refuse archived records.

use async_trait::async_trait;
use serde::Serialize;

use crate::api::ApiClient;
use crate::download::TrackSources;
use crate::error::{Error, Result};
use crate::legacy::LegacyDataset;
use crate::model::{Channel, ChannelInput, RecordSource, Track, TrackInput};

/// Default number of search results per category.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Anything that can list the tracks of a channel.
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Returns the tracks of the channel with this slug.
    ///
    /// Fails with [`Error::NotFound`] for an unknown channel and
    /// [`Error::Unavailable`] when the source cannot be reached.
    async fn fetch_channel_tracks(&self, slug: &str) -> Result<Vec<Track>>;

    /// Short name used in log messages.
    fn name(&self) -> &str;
}

#[async_trait]
impl TrackSource for ApiClient {
    async fn fetch_channel_tracks(&self, slug: &str) -> Result<Vec<Track>> {
        self.channel_tracks(slug).await
    }

    fn name(&self) -> &str {
        "API"
    }
}

#[async_trait]
impl TrackSource for LegacyDataset {
    async fn fetch_channel_tracks(&self, slug: &str) -> Result<Vec<Track>> {
        self.channel_tracks(slug).await
    }

    fn name(&self) -> &str {
        "v1 archive"
    }
}

/// What to search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchScope {
    #[default]
    All,
    Channels,
    Tracks,
}

/// Results of [`Catalog::search`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub channels: Vec<Channel>,
    pub tracks: Vec<Track>,
}

impl SearchResults {
    /// Returns true when nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.tracks.is_empty()
    }
}

/// The API (when configured) backed by the v1 archive.
#[derive(Debug)]
pub struct Catalog {
    api: Option<ApiClient>,
    legacy: LegacyDataset,
}

impl Catalog {
    /// Creates a catalog. Without an API client every read uses the archive.
    #[must_use]
    pub const fn new(api: Option<ApiClient>, legacy: LegacyDataset) -> Self {
        Self { api, legacy }
    }

    /// Returns the archive.
    #[must_use]
    pub const fn legacy(&self) -> &LegacyDataset {
        &self.legacy
    }

    /// Track sources for downloads: the API with the archive as fallback.
    #[must_use]
    pub fn track_sources(&self) -> TrackSources<'_> {
        match &self.api {
            Some(api) => TrackSources {
                primary: api,
                fallback: Some(&self.legacy),
            },
            None => TrackSources {
                primary: &self.legacy,
                fallback: None,
            },
        }
    }

    fn api(&self) -> Result<&ApiClient> {
        self.api
            .as_ref()
            .ok_or_else(|| Error::Config("API URL is not set (R4_API_URL)".into()))
    }

    fn writer(&self) -> Result<&ApiClient> {
        let api = self.api()?;
        if !api.has_session() {
            return Err(Error::AuthRequired);
        }
        Ok(api)
    }

    // ===== Channels =====

    /// Lists channels.
    ///
    /// # Errors
    ///
    /// Returns an error only if both the API and the archive fail.
    pub async fn list_channels(&self, limit: Option<usize>) -> Result<Vec<Channel>> {
        if let Some(api) = &self.api {
            match api.list_channels(limit).await {
                Ok(channels) => return Ok(channels),
                Err(e) => log::warn!("API unavailable ({e}), using bundled v1 data"),
            }
        }
        let channels = self.legacy.channels().await?;
        Ok(channels
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    /// Fetches a channel by slug.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if neither source has it.
    pub async fn channel(&self, slug: &str) -> Result<Channel> {
        if let Some(api) = &self.api {
            match api.channel(slug).await {
                Ok(channel) => return Ok(channel),
                Err(e) => log::debug!("API lookup of {slug} failed: {e}"),
            }
        }
        self.legacy.channel(slug).await
    }

    /// Creates a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for bad input and
    /// [`Error::AuthRequired`] without a session.
    pub async fn create_channel(&self, input: &ChannelInput) -> Result<Channel> {
        input.validate(true)?;
        self.writer()?.create_channel(input).await
    }

    /// Updates a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] for an archived channel.
    pub async fn update_channel(&self, slug: &str, input: &ChannelInput) -> Result<Channel> {
        input.validate(false)?;
        let api = self.writer()?;
        let id = self.writable_channel_id(slug).await?;
        api.update_channel(&id, input).await
    }

    /// Deletes a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] for an archived channel.
    pub async fn delete_channel(&self, slug: &str) -> Result<()> {
        let api = self.writer()?;
        let id = self.writable_channel_id(slug).await?;
        api.delete_channel(&id).await
    }

    async fn writable_channel_id(&self, slug: &str) -> Result<String> {
        let channel = self.channel(slug).await?;
        if channel.source == RecordSource::V1 {
            return Err(Error::ReadOnly {
                kind: "channel",
                id: slug.to_string(),
            });
        }
        channel
            .id
            .ok_or_else(|| Error::NotFound(format!("Channel not found: {slug}")))
    }

    // ===== Tracks =====

    /// Lists the tracks of the given channels; all archived tracks when
    /// `slugs` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error only if both the API and the archive fail.
    pub async fn list_tracks(&self, slugs: &[String]) -> Result<Vec<Track>> {
        if slugs.is_empty() {
            log::warn!("Listing all tracks requires a channel filter, using bundled v1 data");
            return self.legacy.tracks_of(&[]).await;
        }
        if let Some(api) = &self.api {
            match Self::api_tracks_of(api, slugs).await {
                Ok(tracks) => return Ok(tracks),
                Err(e) => log::warn!("API unavailable ({e}), using bundled v1 data"),
            }
        }
        self.legacy.tracks_of(slugs).await
    }

    async fn api_tracks_of(api: &ApiClient, slugs: &[String]) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        for slug in slugs {
            tracks.extend(api.channel_tracks(slug).await?);
        }
        Ok(tracks)
    }

    /// Fetches a track by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if neither source has it.
    pub async fn track(&self, id: &str) -> Result<Track> {
        if let Some(api) = &self.api {
            match api.track(id).await {
                Ok(track) => return Ok(track),
                Err(e) => log::debug!("API lookup of track {id} failed: {e}"),
            }
        }
        self.legacy.track(id).await
    }

    /// Adds a track to a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] for an archived channel.
    pub async fn create_track(&self, channel_slug: &str, input: &TrackInput) -> Result<Track> {
        input.validate(true)?;
        let api = self.writer()?;
        let channel = self.channel(channel_slug).await?;
        if channel.source == RecordSource::V1 {
            return Err(Error::ReadOnly {
                kind: "channel",
                id: channel_slug.to_string(),
            });
        }
        api.create_track(&channel, input).await
    }

    /// Updates a track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] for an archived track.
    pub async fn update_track(&self, id: &str, input: &TrackInput) -> Result<Track> {
        input.validate(false)?;
        let api = self.writer()?;
        self.ensure_writable_track(id).await?;
        api.update_track(id, input).await
    }

    /// Deletes a track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] for an archived track.
    pub async fn delete_track(&self, id: &str) -> Result<()> {
        let api = self.writer()?;
        self.ensure_writable_track(id).await?;
        api.delete_track(id).await
    }

    async fn ensure_writable_track(&self, id: &str) -> Result<()> {
        if self.track(id).await?.source == RecordSource::V1 {
            return Err(Error::ReadOnly {
                kind: "track",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ===== Search =====

    /// Searches channels and/or tracks.
    ///
    /// # Errors
    ///
    /// Returns an error only if both the API and the archive fail.
    pub async fn search(&self, query: &str, scope: SearchScope, limit: usize) -> Result<SearchResults> {
        let mut results = SearchResults::default();
        if scope != SearchScope::Tracks {
            results.channels = self.search_channels(query, limit).await?;
        }
        if scope != SearchScope::Channels {
            results.tracks = self.search_tracks(query, limit).await?;
        }
        Ok(results)
    }

    async fn search_channels(&self, query: &str, limit: usize) -> Result<Vec<Channel>> {
        if let Some(api) = &self.api {
            match api.search_channels(query, limit).await {
                Ok(channels) => return Ok(channels),
                Err(e) => log::warn!("API search failed ({e}), searching bundled v1 data"),
            }
        }
        self.legacy.search_channels(query, limit).await
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        if let Some(api) = &self.api {
            match api.search_tracks(query, limit).await {
                Ok(tracks) => return Ok(tracks),
                Err(e) => log::warn!("API search failed ({e}), searching bundled v1 data"),
            }
        }
        self.legacy.search_tracks(query, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::legacy::{CHANNELS_FILE, TRACKS_FILE};
    use tempfile::TempDir;

    fn legacy() -> (TempDir, LegacyDataset) {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CHANNELS_FILE),
            r#"[{"id": "c1", "slug": "oskar", "name": "Oskar"}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(TRACKS_FILE),
            r#"[{"id": "t1", "slug": "oskar", "title": "Song", "url": "https://youtu.be/abc"}]"#,
        )
        .unwrap();
        let legacy = LegacyDataset::new(dir.path());
        (dir, legacy)
    }

    /// Client pointing at a closed local port: every request fails fast.
    fn unreachable_api(token: Option<&str>) -> ApiClient {
        let config = ApiConfig {
            url: "http://127.0.0.1:9".into(),
            key: "anon".into(),
        };
        ApiClient::new(&config, token.map(String::from)).unwrap()
    }

    #[tokio::test]
    async fn reads_without_api_use_archive() {
        let (_dir, legacy) = legacy();
        let catalog = Catalog::new(None, legacy);

        let channels = catalog.list_channels(None).await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].source, RecordSource::V1);
        assert_eq!(catalog.track("t1").await.unwrap().title, "Song");

        let sources = catalog.track_sources();
        assert_eq!(sources.primary.name(), "v1 archive");
        assert!(sources.fallback.is_none());
    }

    #[tokio::test]
    async fn reads_fall_back_when_api_fails() {
        let (_dir, legacy) = legacy();
        let catalog = Catalog::new(Some(unreachable_api(None)), legacy);

        assert_eq!(catalog.channel("oskar").await.unwrap().slug, "oskar");
        let tracks = catalog.list_tracks(&["oskar".to_string()]).await.unwrap();
        assert_eq!(tracks.len(), 1);
        let results = catalog.search("son", SearchScope::All, 10).await.unwrap();
        assert!(results.channels.is_empty());
        assert_eq!(results.tracks.len(), 1);

        let sources = catalog.track_sources();
        assert_eq!(sources.primary.name(), "API");
        assert_eq!(sources.fallback.map(|s| s.name()), Some("v1 archive"));
    }

    #[tokio::test]
    async fn writes_need_session() {
        let (_dir, legacy) = legacy();
        let catalog = Catalog::new(Some(unreachable_api(None)), legacy);
        let input = TrackInput {
            title: Some("New".into()),
            ..TrackInput::default()
        };
        assert!(matches!(
            catalog.update_track("t1", &input).await,
            Err(Error::AuthRequired)
        ));
    }

    #[tokio::test]
    async fn archived_records_are_read_only() {
        let (_dir, legacy) = legacy();
        let catalog = Catalog::new(Some(unreachable_api(Some("token"))), legacy);

        let err = catalog.delete_channel("oskar").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot modify v1 channel: oskar. This is a read-only archived channel."
        );

        let input = TrackInput {
            title: Some("New".into()),
            ..TrackInput::default()
        };
        assert!(matches!(
            catalog.update_track("t1", &input).await,
            Err(Error::ReadOnly { kind: "track", .. })
        ));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_request() {
        let (_dir, legacy) = legacy();
        let catalog = Catalog::new(None, legacy);
        let input = ChannelInput {
            slug: Some(String::new()),
            name: Some("Name".into()),
            ..ChannelInput::default()
        };
        assert!(matches!(
            catalog.create_channel(&input).await,
            Err(Error::Validation { field: "slug", .. })
        ));
    }
}
