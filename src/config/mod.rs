//! Configuration types for downloads, paths, the remote API and the session.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Directory name used under the platform config and data directories.
pub const APP_DIR: &str = "radio4000";

/// File name of the persisted configuration.
pub const CONFIG_FILE: &str = "config.toml";

/// Configuration for channel downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum number of concurrent tool processes.
    pub concurrency: usize,
    /// Report what would happen without writing anything.
    #[serde(skip)]
    pub simulate: bool,
    /// Attempt tracks that failed recently.
    #[serde(skip)]
    pub retry_failed: bool,
    /// Download through YouTube Music (requires `po_token`).
    pub premium: bool,
    /// Proof-of-origin token for premium downloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub po_token: Option<String>,
    /// Hours a failure keeps blocking a track. `0` blocks forever.
    pub failure_window_hours: u64,
    /// Explicit path of the media tool; looked up on `PATH` otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_path: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            simulate: false,
            retry_failed: false,
            premium: false,
            po_token: None,
            failure_window_hours: 24,
            tool_path: None,
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of concurrent downloads.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets simulation mode.
    #[must_use]
    pub const fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Sets whether recently failed tracks are attempted.
    #[must_use]
    pub const fn with_retry_failed(mut self, retry: bool) -> Self {
        self.retry_failed = retry;
        self
    }

    /// Enables premium mode with the given token.
    #[must_use]
    pub fn with_premium(mut self, po_token: Option<String>) -> Self {
        self.premium = true;
        if po_token.is_some() {
            self.po_token = po_token;
        }
        self
    }

    /// Sets the failure window in hours (`0` blocks forever).
    #[must_use]
    pub const fn with_failure_window_hours(mut self, hours: u64) -> Self {
        self.failure_window_hours = hours;
        self
    }

    /// Sets an explicit media tool path.
    #[must_use]
    pub fn with_tool_path(mut self, path: Option<PathBuf>) -> Self {
        self.tool_path = path;
        self
    }

    /// Effective concurrency, never below one.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    /// The failure window, or `None` when failures block forever.
    #[must_use]
    pub fn failure_window(&self) -> Option<chrono::Duration> {
        if self.failure_window_hours == 0 {
            return None;
        }
        i64::try_from(self.failure_window_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
    }

    /// The premium token, if premium mode is on.
    #[must_use]
    pub fn premium_token(&self) -> Option<&str> {
        if self.premium {
            self.po_token.as_deref().filter(|t| !t.is_empty())
        } else {
            None
        }
    }

    /// Checks option combinations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when premium mode has no token.
    pub fn validate(&self) -> Result<()> {
        if self.premium && self.premium_token().is_none() {
            return Err(Error::Config(
                "premium downloads require a po token (--po-token)".into(),
            ));
        }
        Ok(())
    }
}

/// Path configuration for downloads, configuration and bundled data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    /// Default output directory of downloads.
    pub download_dir: PathBuf,
    /// Directory holding `config.toml`.
    pub config_dir: PathBuf,
    /// Directory holding the read-only v1 dataset.
    pub data_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            download_dir: PathBuf::from("."),
            config_dir: config_dir.join(APP_DIR),
            data_dir: data_dir.join(APP_DIR),
        }
    }
}

impl PathConfig {
    /// Path of the configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }
}

/// Remote API configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the service, e.g. `https://example.supabase.co`.
    pub url: String,
    /// Public (anon) API key sent with every request.
    pub key: String,
}

impl ApiConfig {
    /// Returns true when a base URL is set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Persisted session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token of the signed-in user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Download defaults.
    pub download: DownloadConfig,
    /// Remote API settings.
    pub api: ApiConfig,
    /// Session.
    pub auth: AuthConfig,
    /// Paths; not persisted.
    #[serde(skip)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the configuration file and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let paths = PathConfig::default();
        let mut config = Self::load_from(&paths.config_file())?;
        config.paths = paths;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads a configuration file; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Applies `R4_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("R4_AUTH_TOKEN").filter(|t| !t.is_empty()) {
            self.auth.session = Some(token);
        }
        if let Some(url) = lookup("R4_API_URL") {
            self.api.url = url;
        }
        if let Some(key) = lookup("R4_API_KEY") {
            self.api.key = key;
        }
        if let Some(dir) = lookup("R4_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(dir);
        }
    }

    /// Saves to the default configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&self.paths.config_file())
    }

    /// Saves atomically (write tmp + rename), readable by the owner only.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string(self)?;
        let tmp_path = path.with_extension("toml.tmp");
        match std::fs::remove_file(&tmp_path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        // The file may hold a session token: owner-only from creation on.
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// The session token, if signed in.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.auth.session.as_deref()
    }
}
