//! r4 - a library and command-line client for Radio4000.
//!
//! Reads channels and tracks from the Radio4000 API (or the bundled v1
//! archive) and downloads a channel's tracks as audio files with `yt-dlp`,
//! remembering what failed so later runs can skip it.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use r4::{Catalog, DownloadConfig, Downloader, LegacyDataset, NoProgress, YtDlp};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> r4::Result<()> {
//! let catalog = Catalog::new(None, LegacyDataset::new("/usr/share/radio4000"));
//! let tool = YtDlp::from_path().ok_or_else(|| r4::Error::ExternalTool("yt-dlp missing".into()))?;
//!
//! let downloader = Downloader::new(Arc::new(tool), DownloadConfig::default().with_concurrency(3));
//! let summary = downloader
//!     .download_channel(
//!         "oskar",
//!         Path::new("music"),
//!         catalog.track_sources(),
//!         &NoProgress,
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("Downloaded {} tracks", summary.downloaded);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod api;
pub mod catalog;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod filter;
pub mod format;
pub mod fs;
pub mod ledger;
pub mod legacy;
pub mod media;
pub mod model;
pub mod state;
pub mod stats;
pub mod tool;

// Re-export main types for convenience
pub use api::ApiClient;
pub use catalog::{Catalog, SearchResults, SearchScope, TrackSource};
pub use config::{AppConfig, DownloadConfig};
pub use download::{
    DownloadProgress, Downloader, NoProgress, NoStatus, Outcome, StatusSink, TrackOutcome,
    TrackSources,
};
pub use error::{Error, Result};
pub use filter::{FilterOptions, FilterResult, filter_tracks};
pub use format::OutputFormat;
pub use fs::{FileSystem, TokioFileSystem};
pub use ledger::{Failure, FailureLedger, FailureRecord};
pub use legacy::LegacyDataset;
pub use model::{Channel, ChannelInput, DownloadStatus, RecordSource, Track, TrackInput};
pub use state::StateStore;
pub use stats::DownloadSummary;
pub use tool::{MediaTool, YtDlp};
