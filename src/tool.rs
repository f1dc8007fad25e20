//! External media-download tool (`yt-dlp`).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Binary name looked up on `PATH`.
pub const YT_DLP: &str = "yt-dlp";

/// Diagnostics that usually mean the installed tool is too old.
const OUTDATED_SIGNATURES: &[&str] = &[
    "HTTP Error 403",
    "fragment 1 not found",
    "Requested format is not available",
];

/// One invocation of the media tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolRequest<'a> {
    /// Source URL of the media.
    pub url: &'a str,
    /// Destination file path.
    pub destination: &'a Path,
    /// Text embedded as the file's comment metadata.
    pub comment: &'a str,
    /// Proof-of-origin token; `Some` enables premium (YouTube Music) mode.
    pub premium_token: Option<&'a str>,
}

/// Downloads one media URL to a file.
///
/// Implementations return `Ok(())` only when the file was written. Any
/// failure carries the tool's diagnostic text in [`Error::ExternalTool`];
/// a fired cancellation token yields [`Error::Cancelled`].
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Runs the tool for one request.
    async fn fetch(&self, request: &ToolRequest<'_>, cancel: &CancellationToken) -> Result<()>;

    /// Short name used in log messages.
    fn name(&self) -> &str;
}

/// `yt-dlp` run as a child process.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary_path: PathBuf,
}

impl YtDlp {
    /// Creates a handler with an explicit binary path.
    #[must_use]
    pub const fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Looks for `yt-dlp` on `PATH`.
    #[must_use]
    pub fn from_path() -> Option<Self> {
        which::which(YT_DLP).ok().map(Self::new)
    }

    /// Returns the binary this handler runs.
    #[must_use]
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Builds the argument list for a request.
    #[must_use]
    pub fn args(request: &ToolRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            "bestaudio/best".into(),
            "--no-playlist".into(),
            "--restrict-filenames".into(),
            "--output".into(),
            request.destination.as_os_str().to_owned(),
            "--parse-metadata".into(),
            format!("{}:%(meta_comment)s", request.comment).into(),
            "--embed-metadata".into(),
            "--quiet".into(),
            "--progress".into(),
        ];
        if let Some(token) = request.premium_token {
            args.extend([
                "--cookies-from-browser".into(),
                "firefox".into(),
                "--extractor-args".into(),
                format!("youtube:player-client=web_music;po_token=web_music.gvs+{token}").into(),
            ]);
        }
        args.push(request.url.into());
        args
    }
}

#[async_trait]
impl MediaTool for YtDlp {
    async fn fetch(&self, request: &ToolRequest<'_>, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let child = Command::new(&self.binary_path)
            .args(Self::args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute {YT_DLP}: {e}")))?;

        // Dropping the wait future on cancellation kills the child.
        let output = tokio::select! {
            output = child.wait_with_output() => output
                .map_err(|e| Error::ExternalTool(format!("Failed to wait for {YT_DLP}: {e}")))?,
            () = cancel.cancelled() => return Err(Error::Cancelled),
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            output.status.code().map_or_else(
                || format!("{YT_DLP} was terminated by a signal"),
                |code| format!("{YT_DLP} exited with code {code}"),
            )
        } else {
            stderr
        };
        Err(Error::ExternalTool(message))
    }

    fn name(&self) -> &str {
        YT_DLP
    }
}

/// Returns true if the diagnostic text suggests updating the tool.
#[must_use]
pub fn looks_outdated(diagnostic: &str) -> bool {
    OUTDATED_SIGNATURES.iter().any(|s| diagnostic.contains(s))
}
