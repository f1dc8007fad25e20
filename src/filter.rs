//! Decides which tracks of a channel are attempted in a run.

use std::collections::HashSet;

use crate::model::Track;

/// Inputs of [`filter_tracks`] besides the tracks themselves.
#[derive(Debug, Clone, Copy)]
pub struct FilterOptions<'a> {
    /// Ids that failed previously and should not be retried.
    pub failed_ids: &'a HashSet<String>,
    /// Retry previously failed tracks anyway.
    pub force: bool,
}

/// Partition of a channel's tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterResult {
    /// Tracks to attempt, in input order.
    pub to_download: Vec<Track>,
    /// Tracks whose id is in the failed set, in input order.
    ///
    /// With `force` these are also part of `to_download` and listed here
    /// for reporting only.
    pub previously_failed: Vec<Track>,
}

impl FilterResult {
    /// Number of tracks excluded from this run.
    #[must_use]
    pub fn excluded(&self, force: bool) -> usize {
        if force { 0 } else { self.previously_failed.len() }
    }
}

/// Splits `tracks` into the ones to download and the ones that failed before.
#[must_use]
pub fn filter_tracks(tracks: &[Track], options: FilterOptions<'_>) -> FilterResult {
    let (previously_failed, eligible): (Vec<Track>, Vec<Track>) = tracks
        .iter()
        .cloned()
        .partition(|t| options.failed_ids.contains(&t.id));

    let to_download = if options.force {
        tracks.to_vec()
    } else {
        eligible
    };

    FilterResult {
        to_download,
        previously_failed,
    }
}
