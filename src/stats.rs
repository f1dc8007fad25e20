//! Download run statistics.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::download::Outcome;

/// Counts reported at the end of a channel download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSummary {
    /// Tracks returned by the track source.
    pub total: usize,
    /// Tracks written by the media tool.
    pub downloaded: usize,
    /// Tracks that failed in this run.
    pub failed: usize,
    /// Tracks skipped because the file already existed.
    pub skipped: usize,
    /// Tracks that would have been downloaded in simulation mode.
    pub simulated: usize,
    /// Tracks not attempted because they failed recently.
    pub recently_failed: usize,
    /// Tracks not completed because the run was cancelled.
    pub cancelled: usize,
    /// Ledger file written to, if any failure was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,
    /// Wall time of the run.
    #[serde(skip)]
    pub elapsed: Duration,
}

impl DownloadSummary {
    /// Creates an empty summary.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total: 0,
            downloaded: 0,
            failed: 0,
            skipped: 0,
            simulated: 0,
            recently_failed: 0,
            cancelled: 0,
            ledger_path: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Number of tracks that reached a terminal outcome.
    #[must_use]
    pub const fn accounted(&self) -> usize {
        self.downloaded
            + self.failed
            + self.skipped
            + self.simulated
            + self.recently_failed
            + self.cancelled
    }

    /// Returns true when nothing failed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Builder for accumulating a summary during a run.
pub struct SummaryBuilder {
    summary: DownloadSummary,
    start_time: Instant,
}

impl Default for SummaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryBuilder {
    /// Creates a new builder and starts the clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            summary: DownloadSummary::new(),
            start_time: Instant::now(),
        }
    }

    /// Sets the number of tracks returned by the source.
    pub const fn set_total(&mut self, total: usize) {
        self.summary.total = total;
    }

    /// Adds tracks the filter excluded as recently failed.
    pub const fn set_excluded(&mut self, count: usize) {
        self.summary.recently_failed += count;
    }

    /// Records where failures were appended.
    pub fn set_ledger_path(&mut self, path: Option<PathBuf>) {
        self.summary.ledger_path = path;
    }

    /// Counts one per-track outcome.
    pub const fn add(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Downloaded { .. } => self.summary.downloaded += 1,
            Outcome::SkippedExisting { .. } => self.summary.skipped += 1,
            Outcome::Simulated { .. } => self.summary.simulated += 1,
            Outcome::Failed { .. } => self.summary.failed += 1,
            Outcome::RecentlyFailed => self.summary.recently_failed += 1,
            Outcome::Cancelled => self.summary.cancelled += 1,
        }
    }

    /// Builds the final summary.
    #[must_use]
    pub fn build(self) -> DownloadSummary {
        DownloadSummary {
            elapsed: self.start_time.elapsed(),
            ..self.summary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::FailureKind;

    #[test]
    fn summary_default() {
        let summary = DownloadSummary::default();
        assert_eq!(summary.accounted(), 0);
        assert!(summary.is_clean());
        assert!(summary.ledger_path.is_none());
    }

    #[test]
    fn builder_counts_outcomes() {
        let mut builder = SummaryBuilder::new();
        builder.set_total(8);
        builder.set_excluded(2);
        builder.add(&Outcome::Downloaded {
            path: PathBuf::from("a.m4a"),
        });
        builder.add(&Outcome::SkippedExisting {
            path: PathBuf::from("b.m4a"),
        });
        builder.add(&Outcome::Failed {
            kind: FailureKind::ExternalTool,
            error: "boom".into(),
        });
        builder.add(&Outcome::RecentlyFailed);
        builder.add(&Outcome::Cancelled);
        builder.add(&Outcome::Simulated {
            path: PathBuf::from("c.m4a"),
        });

        let summary = builder.build();
        assert_eq!(summary.total, 8);
        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.simulated, 1);
        assert_eq!(summary.recently_failed, 3);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.accounted(), 8);
        assert!(!summary.is_clean());
    }

    #[test]
    fn summary_serializes_camel_case() {
        let summary = DownloadSummary {
            recently_failed: 2,
            ..DownloadSummary::new()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["recentlyFailed"], 2);
        assert!(json.get("elapsed").is_none());
        assert!(json.get("ledgerPath").is_none());
    }
}
