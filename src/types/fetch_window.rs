//! Bounded date windows submitted to the API as a single request.

use chrono::{Days, NaiveDate};
use std::fmt;

/// The largest span, in days, the AEMET daily values endpoint accepts per request.
pub const MAX_WINDOW_DAYS: u32 = 15;

/// A closed date interval `[start, end]` fetched with one API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchWindow {
    /// Partitions `[start, end]` into contiguous, non-overlapping windows of at
    /// most `batch_size_days` days, in chronological order.
    ///
    /// Returns an empty vector when `start > end`. A `batch_size_days` of zero
    /// is treated as one day per window; values above [`MAX_WINDOW_DAYS`] are
    /// clamped.
    pub fn partition(start: NaiveDate, end: NaiveDate, batch_size_days: u32) -> Vec<FetchWindow> {
        let span = u64::from(batch_size_days.clamp(1, MAX_WINDOW_DAYS));
        let mut windows = Vec::new();
        let mut current = start;

        while current <= end {
            let window_end = current
                .checked_add_days(Days::new(span - 1))
                .map_or(end, |d| d.min(end));
            windows.push(FetchWindow {
                start: current,
                end: window_end,
            });
            match window_end.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }

        windows
    }

    /// Number of calendar days covered, both ends included.
    pub fn len_days(&self) -> u32 {
        let days = (self.end - self.start).num_days() + 1;
        u32::try_from(days).unwrap_or(0)
    }

    /// Every date in the window, oldest first.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Start timestamp in the format the API expects, e.g. `2024-01-01T00:00:00UTC`.
    pub fn api_start(&self) -> String {
        self.start.format("%Y-%m-%dT00:00:00UTC").to_string()
    }

    /// End timestamp in the format the API expects, e.g. `2024-01-15T23:59:59UTC`.
    pub fn api_end(&self) -> String {
        self.end.format("%Y-%m-%dT23:59:59UTC").to_string()
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}
