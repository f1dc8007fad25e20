//! Channel and track records as served by the Radio4000 API and the v1 archive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Maximum channel slug length.
pub const MAX_SLUG_LEN: usize = 100;
/// Maximum channel name length.
pub const MAX_NAME_LEN: usize = 200;
/// Maximum track title length.
pub const MAX_TITLE_LEN: usize = 500;

/// Where a record came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Bundled, read-only archive of the first Radio4000 version.
    V1,
    /// Live API.
    #[default]
    V2,
}

impl RecordSource {
    /// Returns the lowercase label used in output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

/// Last known download state of a track at a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Success,
    Skipped,
    Failed,
}

/// Treats an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A named collection of tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub slug: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub track_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub source: RecordSource,
}

impl Channel {
    /// Checks slug and name lengths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        check_len("slug", &self.slug, MAX_SLUG_LEN)?;
        check_len("name", &self.name, MAX_NAME_LEN)
    }
}

/// A single playable media reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Slug of the owning channel.
    #[serde(default, deserialize_with = "null_as_default")]
    pub slug: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub source: RecordSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_status: Option<DownloadStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_attempted_at: Option<DateTime<Utc>>,
}

impl Track {
    /// Checks title length and that the URL parses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        check_len("title", &self.title, MAX_TITLE_LEN)?;
        check_url(&self.url)
    }

    /// Returns true if the last recorded attempt failed at or after `since`.
    #[must_use]
    pub fn failed_since(&self, since: DateTime<Utc>) -> bool {
        self.download_status == Some(DownloadStatus::Failed)
            && self.download_attempted_at.is_some_and(|at| at > since)
    }
}

/// Fields accepted when creating or updating a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ChannelInput {
    /// Validates the fields that are present.
    ///
    /// With `require_identity`, slug and name must both be set (creation).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a missing or malformed field.
    pub fn validate(&self, require_identity: bool) -> Result<()> {
        match (&self.slug, require_identity) {
            (Some(slug), _) => check_len("slug", slug, MAX_SLUG_LEN)?,
            (None, true) => return Err(missing("slug")),
            (None, false) => {}
        }
        match (&self.name, require_identity) {
            (Some(name), _) => check_len("name", name, MAX_NAME_LEN)?,
            (None, true) => return Err(missing("name")),
            (None, false) => {}
        }
        if !require_identity && self.is_empty() {
            return Err(Error::Validation {
                field: "input",
                reason: "no fields to update".to_string(),
            });
        }
        Ok(())
    }

    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slug.is_none()
            && self.name.is_none()
            && self.description.is_none()
            && self.image.is_none()
            && self.url.is_none()
    }
}

/// Fields accepted when creating or updating a track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TrackInput {
    /// Validates the fields that are present.
    ///
    /// With `require_identity`, title and url must both be set (creation).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a missing or malformed field.
    pub fn validate(&self, require_identity: bool) -> Result<()> {
        match (&self.title, require_identity) {
            (Some(title), _) => check_len("title", title, MAX_TITLE_LEN)?,
            (None, true) => return Err(missing("title")),
            (None, false) => {}
        }
        match (&self.url, require_identity) {
            (Some(url), _) => check_url(url)?,
            (None, true) => return Err(missing("url")),
            (None, false) => {}
        }
        if !require_identity
            && self.title.is_none()
            && self.url.is_none()
            && self.description.is_none()
        {
            return Err(Error::Validation {
                field: "input",
                reason: "no fields to update".to_string(),
            });
        }
        Ok(())
    }
}

fn missing(field: &'static str) -> Error {
    Error::Validation {
        field,
        reason: "is required".to_string(),
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len == 0 {
        return Err(Error::Validation {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if len > max {
        return Err(Error::Validation {
            field,
            reason: format!("must be at most {max} characters (got {len})"),
        });
    }
    Ok(())
}

fn check_url(value: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| Error::Validation {
            field: "url",
            reason: format!("{value:?} is not a valid URL ({e})"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn track(title: &str, url: &str) -> Track {
        Track {
            id: "t1".into(),
            title: title.into(),
            url: url.into(),
            ..Track::default()
        }
    }

    #[test]
    fn track_deserializes_nulls_as_defaults() {
        let json = r#"{"id":"a","slug":"oskar","title":"Song","url":"https://youtu.be/x","description":null}"#;
        let t: Track = serde_json::from_str(json).unwrap();
        assert_eq!(t.description, "");
        assert_eq!(t.source, RecordSource::V2);
        assert!(t.download_status.is_none());
    }

    #[test]
    fn track_validation() {
        assert!(track("Song", "https://www.youtube.com/watch?v=abc").validate().is_ok());
        assert!(matches!(
            track("", "https://example.com").validate(),
            Err(Error::Validation { field: "title", .. })
        ));
        assert!(matches!(
            track("Song", "not a url").validate(),
            Err(Error::Validation { field: "url", .. })
        ));
        let long = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(track(&long, "https://example.com").validate().is_err());
    }

    #[test]
    fn channel_validation() {
        let mut channel = Channel {
            slug: "oskar".into(),
            name: "Oskar".into(),
            ..Channel::default()
        };
        assert!(channel.validate().is_ok());
        channel.slug = "s".repeat(MAX_SLUG_LEN + 1);
        assert!(channel.validate().is_err());
    }

    #[test]
    fn channel_input_requires_identity_on_create() {
        let input = ChannelInput {
            name: Some("Name".into()),
            ..ChannelInput::default()
        };
        assert!(matches!(
            input.validate(true),
            Err(Error::Validation { field: "slug", .. })
        ));
        assert!(input.validate(false).is_ok());
        assert!(ChannelInput::default().validate(false).is_err());
    }

    #[test]
    fn track_input_checks_url() {
        let input = TrackInput {
            url: Some("nope".into()),
            ..TrackInput::default()
        };
        assert!(input.validate(false).is_err());
    }

    #[test]
    fn failed_since_window() {
        let now = Utc::now();
        let mut t = track("Song", "https://example.com");
        t.download_status = Some(DownloadStatus::Failed);
        t.download_attempted_at = Some(now - Duration::hours(2));
        assert!(t.failed_since(now - Duration::hours(24)));
        assert!(!t.failed_since(now - Duration::hours(1)));

        t.download_status = Some(DownloadStatus::Success);
        assert!(!t.failed_since(now - Duration::hours(24)));
    }

    #[test]
    fn record_source_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RecordSource::V1).unwrap(), "\"v1\"");
        assert_eq!(RecordSource::V2.as_str(), "v2");
    }
}
