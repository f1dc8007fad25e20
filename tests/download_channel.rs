//! End-to-end runs of `Downloader::download_channel` against a temp directory.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use r4::download::tracks_dir;
use r4::ledger::LEDGER_FILE;
use r4::state::{DownloadState, STATE_FILE};
use r4::tool::ToolRequest;
use r4::{
    DownloadConfig, DownloadStatus, Downloader, Error, FailureLedger, MediaTool, NoProgress, Result,
    Track, TrackSource, TrackSources,
};

/// Source returning a fixed track list, or failing when it has none.
struct StaticSource {
    name: &'static str,
    tracks: Option<Vec<Track>>,
}

#[async_trait]
impl TrackSource for StaticSource {
    async fn fetch_channel_tracks(&self, _slug: &str) -> Result<Vec<Track>> {
        self.tracks
            .clone()
            .ok_or_else(|| Error::Unavailable(format!("{} is down", self.name)))
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Tool that writes a placeholder file, failing for URLs in `failing`.
#[derive(Default)]
struct FakeTool {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeTool {
    fn failing(urls: &[&str]) -> Self {
        Self {
            failing: urls.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaTool for FakeTool {
    async fn fetch(&self, request: &ToolRequest<'_>, _cancel: &CancellationToken) -> Result<()> {
        self.calls.lock().unwrap().push(request.url.to_string());
        if self.failing.contains(request.url) {
            return Err(Error::ExternalTool("ERROR: Video unavailable".into()));
        }
        tokio::fs::write(request.destination, b"audio").await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

fn track(id: &str, title: &str, video: &str) -> Track {
    Track {
        id: id.into(),
        slug: "oskar".into(),
        title: title.into(),
        url: format!("https://youtu.be/{video}"),
        ..Track::default()
    }
}

fn three_tracks() -> Vec<Track> {
    vec![
        track("t1", "First", "aaaaaaaaaaa"),
        track("t2", "Second", "bbbbbbbbbbb"),
        track("t3", "Third", "ccccccccccc"),
    ]
}

fn source(tracks: Vec<Track>) -> StaticSource {
    StaticSource {
        name: "API",
        tracks: Some(tracks),
    }
}

fn only(primary: &StaticSource) -> TrackSources<'_> {
    TrackSources {
        primary,
        fallback: None,
    }
}

async fn run(
    tool: &Arc<FakeTool>,
    config: DownloadConfig,
    output: &Path,
    sources: TrackSources<'_>,
) -> Result<r4::DownloadSummary> {
    Downloader::new(tool.clone(), config)
        .download_channel("oskar", output, sources, &NoProgress, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn downloads_every_track_and_records_state() {
    let out = TempDir::new().unwrap();
    let tool = Arc::new(FakeTool::default());
    let api = source(three_tracks());

    let summary = run(&tool, DownloadConfig::default(), out.path(), only(&api))
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.downloaded, 3);
    assert!(summary.is_clean());
    assert!(summary.ledger_path.is_none());
    assert!(tracks_dir(out.path(), "oskar").join("First [aaaaaaaaaaa].m4a").exists());

    let state = DownloadState::load(&out.path().join("oskar").join(STATE_FILE)).unwrap();
    assert_eq!(state.count(DownloadStatus::Success), 3);
    assert!(!out.path().join("oskar").join(LEDGER_FILE).exists());
}

#[tokio::test]
async fn second_run_skips_existing_files() {
    let out = TempDir::new().unwrap();
    let tool = Arc::new(FakeTool::default());
    let api = source(three_tracks());

    run(&tool, DownloadConfig::default(), out.path(), only(&api))
        .await
        .unwrap();
    let summary = run(&tool, DownloadConfig::default(), out.path(), only(&api))
        .await
        .unwrap();

    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.downloaded, 0);
    assert_eq!(tool.calls().len(), 3);
}

#[tokio::test]
async fn simulation_touches_nothing() {
    let out = TempDir::new().unwrap();
    let tool = Arc::new(FakeTool::default());
    let api = source(three_tracks());

    let config = DownloadConfig::default().with_simulate(true);
    let summary = run(&tool, config, out.path(), only(&api)).await.unwrap();

    assert_eq!(summary.simulated, 3);
    assert_eq!(summary.downloaded, 0);
    assert!(tool.calls().is_empty());
    assert!(!out.path().join("oskar").exists());
}

#[tokio::test]
async fn failures_are_logged_and_skipped_next_time() {
    let out = TempDir::new().unwrap();
    let tool = Arc::new(FakeTool::failing(&["https://youtu.be/bbbbbbbbbbb"]));
    let api = source(three_tracks());

    let first = run(&tool, DownloadConfig::default(), out.path(), only(&api))
        .await
        .unwrap();
    assert_eq!(first.downloaded, 2);
    assert_eq!(first.failed, 1);
    assert_eq!(
        first.ledger_path.as_deref(),
        Some(out.path().join("oskar").join(LEDGER_FILE).as_path())
    );

    let records = FailureLedger::new(out.path().join("oskar"))
        .records()
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].track.id, "t2");
    assert_eq!(records[0].track.youtube_id.as_deref(), Some("bbbbbbbbbbb"));
    assert!(records[0].error.contains("Video unavailable"));

    let second = run(&tool, DownloadConfig::default(), out.path(), only(&api))
        .await
        .unwrap();
    assert_eq!(second.recently_failed, 1);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.failed, 0);
    assert_eq!(tool.calls().len(), 3);
}

#[tokio::test]
async fn retry_failed_attempts_blocked_tracks() {
    let out = TempDir::new().unwrap();
    let tool = Arc::new(FakeTool::failing(&["https://youtu.be/bbbbbbbbbbb"]));
    let api = source(three_tracks());

    run(&tool, DownloadConfig::default(), out.path(), only(&api))
        .await
        .unwrap();
    let retry = DownloadConfig::default().with_retry_failed(true);
    let summary = run(&tool, retry, out.path(), only(&api)).await.unwrap();

    assert_eq!(summary.recently_failed, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(tool.calls().len(), 4);

    let records = FailureLedger::new(out.path().join("oskar"))
        .records()
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn falls_back_when_primary_fails() {
    let out = TempDir::new().unwrap();
    let tool = Arc::new(FakeTool::default());
    let api = StaticSource {
        name: "API",
        tracks: None,
    };
    let archive = StaticSource {
        name: "v1 archive",
        tracks: Some(vec![track("t1", "First", "aaaaaaaaaaa")]),
    };

    let sources = TrackSources {
        primary: &api,
        fallback: Some(&archive),
    };
    let summary = run(&tool, DownloadConfig::default(), out.path(), sources)
        .await
        .unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.downloaded, 1);
}

#[tokio::test]
async fn no_source_is_an_error() {
    let out = TempDir::new().unwrap();
    let tool = Arc::new(FakeTool::default());
    let api = StaticSource {
        name: "API",
        tracks: None,
    };
    let archive = StaticSource {
        name: "v1 archive",
        tracks: None,
    };

    let sources = TrackSources {
        primary: &api,
        fallback: Some(&archive),
    };
    let err = run(&tool, DownloadConfig::default(), out.path(), sources)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TrackListUnavailable { ref slug, .. } if slug == "oskar"));
    assert!(err.to_string().contains("v1 archive is down"));
}

#[tokio::test]
async fn empty_channel_is_a_zero_summary() {
    let out = TempDir::new().unwrap();
    let tool = Arc::new(FakeTool::default());
    let api = source(Vec::new());

    let summary = run(&tool, DownloadConfig::default(), out.path(), only(&api))
        .await
        .unwrap();

    assert_eq!(summary.total, 0);
    assert_eq!(summary.accounted(), 0);
    assert!(tracks_dir(out.path(), "oskar").is_dir());
}

#[tokio::test]
async fn premium_without_token_is_rejected() {
    let out = TempDir::new().unwrap();
    let tool = Arc::new(FakeTool::default());
    let api = source(three_tracks());

    let config = DownloadConfig {
        premium: true,
        ..DownloadConfig::default()
    };
    let err = run(&tool, config, out.path(), only(&api)).await.unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert!(tool.calls().is_empty());
}

#[tokio::test]
async fn unwritable_ledger_does_not_fail_the_batch() {
    let out = TempDir::new().unwrap();
    std::fs::create_dir_all(out.path().join("oskar").join(LEDGER_FILE)).unwrap();
    let tool = Arc::new(FakeTool::failing(&["https://youtu.be/bbbbbbbbbbb"]));
    let api = source(three_tracks());

    let summary = run(&tool, DownloadConfig::default(), out.path(), only(&api))
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.downloaded, 2);
    assert!(summary.ledger_path.is_none());

    let state = DownloadState::load(&out.path().join("oskar").join(STATE_FILE)).unwrap();
    assert_eq!(state.count(DownloadStatus::Failed), 1);
    assert_eq!(state.count(DownloadStatus::Success), 2);
}
