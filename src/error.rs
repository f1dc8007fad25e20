//! Error types for the r4 library.

use thiserror::Error;

/// Errors that can occur in r4 operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested channel or track does not exist in any source.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A data source could not be reached or answered with a server error.
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Neither the primary nor the fallback source produced a track list.
    #[error("Could not resolve tracks for channel {slug}: {reason}")]
    TrackListUnavailable {
        /// Channel slug that was being resolved.
        slug: String,
        /// Error text from the last source that was tried.
        reason: String,
    },

    /// A write operation was attempted without a session token.
    #[error("Authentication required. Run: r4 auth login\nOr set R4_AUTH_TOKEN environment variable.")]
    AuthRequired,

    /// A write operation targeted an archived (v1) record.
    #[error("Cannot modify v1 {kind}: {id}. This is a read-only archived {kind}.")]
    ReadOnly {
        /// Record kind ("channel" or "track").
        kind: &'static str,
        /// Slug or id of the record.
        id: String,
    },

    /// Input failed schema validation.
    #[error("Invalid {field}: {reason}")]
    Validation {
        /// Field that failed validation.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Track is missing a title or a URL.
    #[error("Invalid track data: {0}")]
    InvalidTrackData(String),

    /// No media id could be extracted from a track URL.
    #[error("Could not extract media id from URL: {0}")]
    CannotDeriveFilename(String),

    /// The external media tool failed to run or exited non-zero.
    #[error("{0}")]
    ExternalTool(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation was cancelled.
    #[error("Cancelled")]
    Cancelled,

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Returns true if this error means the record is absent rather than unreachable.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A specialized `Result` type for r4 operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_message_names_record() {
        let err = Error::ReadOnly {
            kind: "channel",
            id: "oskar".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot modify v1 channel: oskar. This is a read-only archived channel."
        );
    }

    #[test]
    fn not_found_detection() {
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(!Error::Unavailable("x".into()).is_not_found());
    }

    #[test]
    fn external_tool_message_is_verbatim() {
        let err = Error::ExternalTool("ERROR: Video unavailable".into());
        assert_eq!(err.to_string(), "ERROR: Video unavailable");
    }
}
