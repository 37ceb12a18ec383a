use std::fmt;
use std::ops::AddAssign;

/// Counts from one persistence pass over a fetched payload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PersistStats {
    /// Entries created by this pass.
    pub written: usize,
    /// Entities that were already archived and left untouched.
    pub already_present: usize,
    /// Records without a usable date or station code.
    pub dropped: usize,
    /// Repeated (date, station) or station records within the same payload.
    pub duplicates: usize,
}

impl AddAssign for PersistStats {
    fn add_assign(&mut self, rhs: Self) {
        self.written += rhs.written;
        self.already_present += rhs.already_present;
        self.dropped += rhs.dropped;
        self.duplicates += rhs.duplicates;
    }
}

impl fmt::Display for PersistStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} written, {} already archived, {} dropped, {} duplicates",
            self.written, self.already_present, self.dropped, self.duplicates
        )
    }
}

/// What happened to a single window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// Every date already had at least one entry; no request was made.
    Skipped,
    /// The window was fetched, grouped and persisted.
    Persisted(PersistStats),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RangeSyncReport {
    pub windows_fetched: usize,
    pub windows_skipped: usize,
    pub records: PersistStats,
}

impl RangeSyncReport {
    pub(crate) fn record(&mut self, outcome: WindowOutcome) {
        match outcome {
            WindowOutcome::Skipped => self.windows_skipped += 1,
            WindowOutcome::Persisted(stats) => {
                self.windows_fetched += 1;
                self.records += stats;
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StationSyncReport {
    /// Whether the station inventory was downloaded at all.
    pub fetched: bool,
    pub stations: PersistStats,
}
