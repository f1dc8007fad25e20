//! Progress bar and summary reporting for CLI downloads.

use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::download::{DownloadProgress, Outcome, TrackOutcome};
use crate::format::{format_duration, plural};
use crate::model::Track;
use crate::stats::DownloadSummary;

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates the bar counting finished tracks.
fn make_total_progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(template) =
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.green/white}] {pos}/{len} tracks {msg}")
    {
        bar.set_style(template.progress_chars("━━╌"));
    }
    bar
}

/// Renders download events with `indicatif`.
pub struct CliProgress {
    multi: MultiProgress,
    bar: ProgressBar,
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl CliProgress {
    /// Creates a hidden bar; it is sized and shown once tracks are resolved.
    #[must_use]
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let bar = multi.add(make_total_progress_bar(0));
        Self { multi, bar }
    }

    /// Removes the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
        self.multi.clear().ok();
    }

    fn println(&self, line: &str) {
        if self.multi.is_hidden() || self.multi.println(line).is_err() {
            println!("{line}");
        }
    }
}

impl DownloadProgress for CliProgress {
    fn on_tracks_resolved(&self, total: usize, to_download: usize, previously_failed: usize) {
        self.println(&format!(
            "Found {}: {to_download} to process, {previously_failed} failed recently",
            plural(total, "track")
        ));
        self.bar.set_length(to_download as u64);
        if to_download > 0 {
            self.bar.enable_steady_tick(Duration::from_millis(250));
        }
    }

    fn on_track_start(&self, track: &Track) {
        self.bar.set_message(track.title.clone());
    }

    fn on_track_complete(&self, outcome: &TrackOutcome) {
        self.bar.inc(1);
        let title = &outcome.track.title;
        let line = match &outcome.outcome {
            Outcome::Downloaded { .. } => format!("  {} {title}", style("✓").green()),
            Outcome::SkippedExisting { .. } => {
                format!("  {} {title} (exists)", style("-").dim())
            }
            Outcome::Simulated { path } => {
                format!("  {} {title} → {}", style("~").cyan(), path.display())
            }
            Outcome::Failed { error, .. } => {
                let first_line = error.lines().next().unwrap_or_default();
                format!("  {} {title}: {first_line}", style("✗").red())
            }
            Outcome::RecentlyFailed => {
                format!("  {} {title} (failed recently)", style("-").yellow())
            }
            Outcome::Cancelled => return,
        };
        self.println(&line);
    }
}

/// Prints the end-of-run summary.
pub fn print_summary(summary: &DownloadSummary, simulate: bool) {
    println!("\n{SEPARATOR}");
    if simulate {
        println!(
            "Simulation complete: {} would be downloaded",
            plural(summary.simulated, "track")
        );
        if summary.recently_failed > 0 {
            println!("  Recently failed:   {}", summary.recently_failed);
        }
        println!("{SEPARATOR}");
        return;
    }

    println!("Download Summary");
    println!("{SEPARATOR}");
    println!("  Downloaded:        {}", summary.downloaded);
    println!("  Skipped:           {}", summary.skipped);
    println!("  Failed:            {}", summary.failed);
    if summary.recently_failed > 0 {
        println!("  Recently failed:   {}", summary.recently_failed);
        println!("  {}", style("Use --retry-failed to retry failed downloads").dim());
    }
    if summary.cancelled > 0 {
        println!("  Cancelled:         {}", summary.cancelled);
    }
    println!("  Total time:        {}", format_duration(summary.elapsed));
    if let Some(path) = &summary.ledger_path {
        println!("  Failures logged:   {}", path.display());
    }
    println!("{SEPARATOR}");
}
