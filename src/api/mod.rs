//! HTTP client for the Radio4000 v2 API.
//!
//! The service speaks PostgREST under `rest/v1/` and password sign-in under
//! `auth/v1/`. Every request carries the public API key; writes also carry
//! the session token as a bearer token.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::model::{Channel, ChannelInput, RecordSource, Track, TrackInput};

const USER_AGENT: &str = concat!("r4/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Channel columns requested from the API.
const CHANNEL_COLUMNS: &str =
    "id,slug,name,description,image,url,latitude,longitude,track_count,firebase_id,created_at,updated_at";

/// Result of a password sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct ChannelTrackLink<'a> {
    channel_id: &'a str,
    track_id: &'a str,
}

/// Client for the remote API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    key: String,
    token: Option<String>,
}

impl ApiClient {
    /// Creates a client from the API configuration and an optional session token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no URL is configured or it does not parse,
    /// or if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self> {
        if !config.is_configured() {
            return Err(Error::Config(
                "API URL is not set (R4_API_URL or [api] url in config.toml)".into(),
            ));
        }
        let base = base_url(&config.url)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            key: config.key.clone(),
            token,
        })
    }

    /// Returns true if a session token is attached.
    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.token.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Config(format!("invalid API path {path}: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self.token.as_deref().unwrap_or(&self.key);
        let mut builder = self.http.request(method, url).bearer_auth(bearer);
        if !self.key.is_empty() {
            builder = builder.header("apikey", &self.key);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("{what}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, what, &body));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Unavailable(format!("{what}: invalid response: {e}")))
    }

    async fn send_empty(&self, builder: RequestBuilder, what: &str) -> Result<()> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("{what}: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, what, &body))
    }

    async fn rows<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        self.send(self.request(Method::GET, url).query(query), table)
            .await
    }

    async fn write<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        table: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<Vec<T>> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let builder = self
            .request(method, url)
            .query(query)
            .header("Prefer", "return=representation")
            .json(body);
        self.send(builder, table).await
    }

    fn require_session(&self) -> Result<()> {
        if self.token.is_none() {
            return Err(Error::AuthRequired);
        }
        Ok(())
    }

    // ===== Channels =====

    /// Lists channels, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] on transport or server errors.
    pub async fn list_channels(&self, limit: Option<usize>) -> Result<Vec<Channel>> {
        let mut query = vec![
            ("select", CHANNEL_COLUMNS.to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        self.rows("channels", &query).await
    }

    /// Fetches one channel by slug.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no channel has this slug.
    pub async fn channel(&self, slug: &str) -> Result<Channel> {
        let query = [
            ("select", CHANNEL_COLUMNS.to_string()),
            ("slug", eq(slug)),
        ];
        first(self.rows("channels", &query).await?, || format!("Channel not found: {slug}"))
    }

    /// Searches channel names and slugs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] on transport or server errors.
    pub async fn search_channels(&self, query: &str, limit: usize) -> Result<Vec<Channel>> {
        let pattern = ilike_pattern(query);
        let params = [
            ("select", CHANNEL_COLUMNS.to_string()),
            ("or", format!("(name.ilike.{pattern},slug.ilike.{pattern})")),
            ("limit", limit.to_string()),
        ];
        self.rows("channels", &params).await
    }

    /// Creates a channel owned by the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRequired`] without a session.
    pub async fn create_channel(&self, input: &ChannelInput) -> Result<Channel> {
        self.require_session()?;
        let rows = self.write(Method::POST, "channels", &[], input).await?;
        first(rows, || "channel was not returned after create".to_string())
    }

    /// Updates the channel with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRequired`] without a session and
    /// [`Error::NotFound`] if nothing was updated.
    pub async fn update_channel(&self, id: &str, input: &ChannelInput) -> Result<Channel> {
        self.require_session()?;
        let rows = self
            .write(Method::PATCH, "channels", &[("id", eq(id))], input)
            .await?;
        first(rows, || format!("Channel not found: {id}"))
    }

    /// Deletes the channel with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRequired`] without a session.
    pub async fn delete_channel(&self, id: &str) -> Result<()> {
        self.require_session()?;
        let url = self.endpoint("rest/v1/channels")?;
        self.send_empty(self.request(Method::DELETE, url).query(&[("id", eq(id))]), "channels")
            .await
    }

    // ===== Tracks =====

    /// Fetches the tracks of a channel, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the channel does not exist.
    pub async fn channel_tracks(&self, slug: &str) -> Result<Vec<Track>> {
        let query = [("slug", eq(slug)), ("order", "created_at.desc".to_string())];
        let tracks: Vec<Track> = self.rows("channel_tracks", &query).await?;
        if tracks.is_empty() {
            // An empty view does not tell a quiet channel from a missing one.
            self.channel(slug).await?;
        }
        Ok(tracks)
    }

    /// Fetches one track by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no track has this id.
    pub async fn track(&self, id: &str) -> Result<Track> {
        let rows = self.rows("channel_tracks", &[("id", eq(id))]).await?;
        first(rows, || format!("Track not found: {id}"))
    }

    /// Searches track titles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] on transport or server errors.
    pub async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let params = [
            ("title", format!("ilike.{}", ilike_pattern(query))),
            ("limit", limit.to_string()),
        ];
        self.rows("channel_tracks", &params).await
    }

    /// Creates a track and links it to a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRequired`] without a session.
    pub async fn create_track(&self, channel: &Channel, input: &TrackInput) -> Result<Track> {
        self.require_session()?;
        let channel_id = channel.id.as_deref().ok_or_else(|| Error::Validation {
            field: "channel",
            reason: format!("{} has no id", channel.slug),
        })?;

        let rows = self
            .write(Method::POST, "tracks", &[], input)
            .await?;
        let mut track: Track = first(rows, || "track was not returned after create".to_string())?;

        let link = ChannelTrackLink {
            channel_id,
            track_id: &track.id,
        };
        let url = self.endpoint("rest/v1/channel_track")?;
        self.send_empty(self.request(Method::POST, url).json(&link), "channel_track")
            .await?;

        track.channel_id = Some(channel_id.to_string());
        track.slug.clone_from(&channel.slug);
        track.source = RecordSource::V2;
        Ok(track)
    }

    /// Updates the track with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRequired`] without a session and
    /// [`Error::NotFound`] if nothing was updated.
    pub async fn update_track(&self, id: &str, input: &TrackInput) -> Result<Track> {
        self.require_session()?;
        let rows = self
            .write(Method::PATCH, "tracks", &[("id", eq(id))], input)
            .await?;
        first(rows, || format!("Track not found: {id}"))
    }

    /// Deletes the track with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRequired`] without a session.
    pub async fn delete_track(&self, id: &str) -> Result<()> {
        self.require_session()?;
        let url = self.endpoint("rest/v1/tracks")?;
        self.send_empty(self.request(Method::DELETE, url).query(&[("id", eq(id))]), "tracks")
            .await
    }

    // ===== Auth =====

    /// Exchanges email and password for a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRequired`] for rejected credentials.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let url = self.endpoint("auth/v1/token")?;
        let builder = self
            .request(Method::POST, url)
            .query(&[("grant_type", "password")])
            .json(&Credentials { email, password });
        self.send(builder, "sign in").await
    }

    /// Returns the user owning the session token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRequired`] without a session or if the token was
    /// rejected.
    pub async fn user(&self) -> Result<serde_json::Value> {
        self.require_session()?;
        let url = self.endpoint("auth/v1/user")?;
        self.send(self.request(Method::GET, url), "user").await
    }
}

/// Parses a base URL so that relative joins append to its path.
fn base_url(raw: &str) -> Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| Error::Config(format!("invalid API URL {raw}: {e}")))
}

/// PostgREST equality filter value.
fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// Case-insensitive substring pattern; PostgREST reserved characters are dropped.
fn ilike_pattern(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '%'))
        .collect();
    format!("*{}*", cleaned.trim())
}

fn first<T>(rows: Vec<T>, not_found: impl FnOnce() -> String) -> Result<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(not_found()))
}

/// Maps a non-success HTTP status to an error.
fn status_error(status: StatusCode, what: &str, body: &str) -> Error {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(format!("{what}: {detail}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::AuthRequired,
        _ => Error::Unavailable(format!("{what}: {detail}")),
    }
}
