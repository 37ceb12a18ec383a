//! Drives the fetch/persist pipeline window by window.
//!
//! A requested date range is cut into windows the API accepts in one call.
//! Windows run strictly in chronological order, one at a time. Before a
//! window is fetched, the archive is asked whether every date in it already
//! has at least one entry; if so the window is skipped without touching the
//! network. Otherwise the whole window is downloaded and persisted day by day.
//! A day not yet on disk is published in one step with all of its stations, so
//! a day directory never looks archived while stations are still missing. A
//! day that already exists only gets its missing stations added, and entries
//! archived by an earlier run are left alone.

use crate::archive::key::ArchiveKey;
use crate::archive::store::ArchiveStore;
use crate::config::AemetConfig;
use crate::error::AemetError;
use crate::fetch::fetcher::TwoStepFetcher;
use crate::fetch::sleeper::{Sleeper, TokioSleeper};
use crate::planner::report::{PersistStats, RangeSyncReport, StationSyncReport, WindowOutcome};
use crate::types::fetch_window::FetchWindow;
use crate::types::indicativo::Indicativo;
use crate::types::station::StationPayload;
use crate::types::weather_record::WeatherRecord;
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

const STATIONS_PATH: &str = "valores/climatologicos/inventarioestaciones/todasestaciones";

/// How station sync treats an archive that already holds stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StationSyncMode {
    /// Skip the download entirely if any station entry exists.
    #[default]
    SkipIfAny,
    /// Always download the inventory and archive the stations that are missing.
    FillMissing,
}

/// Records from one payload, keyed by date then station, ready to persist.
#[derive(Debug, Default)]
pub(crate) struct GroupedRecords {
    pub(crate) by_date: BTreeMap<NaiveDate, BTreeMap<Indicativo, WeatherRecord>>,
    pub(crate) dropped: usize,
    pub(crate) duplicates: usize,
}

impl GroupedRecords {
    pub(crate) fn from_items(items: Vec<Value>) -> Self {
        let mut grouped = GroupedRecords::default();
        for item in items {
            let Some((date, station, record)) = serde_json::from_value::<WeatherRecord>(item)
                .ok()
                .and_then(|record| {
                    let (date, station) = record.routing_key()?;
                    Some((date, station, record))
                })
            else {
                grouped.dropped += 1;
                continue;
            };

            match grouped.by_date.entry(date).or_default().entry(station) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(slot) => {
                    debug!("Duplicate record for {} on {}, keeping the first", slot.key(), date);
                    grouped.duplicates += 1;
                }
            }
        }
        grouped
    }
}

pub struct BatchPlanner<S = TokioSleeper> {
    config: AemetConfig,
    fetcher: TwoStepFetcher<S>,
    store: ArchiveStore,
}

impl<S: Sleeper> BatchPlanner<S> {
    pub fn new(config: AemetConfig, fetcher: TwoStepFetcher<S>, store: ArchiveStore) -> Self {
        Self {
            config,
            fetcher,
            store,
        }
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    /// The windows `[start, end]` is fetched in, oldest first.
    pub fn plan(&self, start: NaiveDate, end: NaiveDate) -> Vec<FetchWindow> {
        FetchWindow::partition(start, end, self.config.batch_size_days)
    }

    /// Whether every date in `window` already has at least one archived record.
    pub async fn is_archived(&self, window: &FetchWindow) -> Result<bool, AemetError> {
        for date in window.days() {
            if !self.store.has_any_record_on(date).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Archives daily values for every station between `start` and `end`, inclusive.
    ///
    /// A failed fetch aborts the remaining windows. Everything persisted so far
    /// stays valid, so calling this again resumes where it stopped.
    pub async fn sync_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RangeSyncReport, AemetError> {
        let windows = self.plan(start, end);
        info!(
            "Syncing climatological values from {} to {} in {} windows",
            start,
            end,
            windows.len()
        );

        let mut report = RangeSyncReport::default();
        for window in &windows {
            let outcome = self.sync_window(window).await?;
            report.record(outcome);
        }

        info!(
            "Range sync done: {} windows fetched, {} skipped, records {}",
            report.windows_fetched, report.windows_skipped, report.records
        );
        Ok(report)
    }

    pub async fn sync_window(&self, window: &FetchWindow) -> Result<WindowOutcome, AemetError> {
        if self.is_archived(window).await? {
            debug!("Window {} already archived, skipping", window);
            return Ok(WindowOutcome::Skipped);
        }

        info!("Fetching {}", window);
        let items = self.fetcher.fetch_list(&self.window_url(window)).await?;
        let grouped = GroupedRecords::from_items(items);
        if grouped.dropped > 0 {
            warn!(
                "Dropped {} records without a valid date or station code in {}",
                grouped.dropped, window
            );
        }

        let mut stats = PersistStats {
            dropped: grouped.dropped,
            duplicates: grouped.duplicates,
            ..PersistStats::default()
        };
        for (date, stations) in grouped.by_date {
            let written = self.store.put_day(date, &stations).await?;
            stats.written += written;
            stats.already_present += stations.len() - written;
        }

        info!("Window {}: {}", window, stats);
        Ok(WindowOutcome::Persisted(stats))
    }

    /// Archives the station inventory, one entry per station code.
    pub async fn sync_stations(
        &self,
        mode: StationSyncMode,
    ) -> Result<StationSyncReport, AemetError> {
        if mode == StationSyncMode::SkipIfAny && self.store.has_any_station().await? {
            info!("Station data already exists, skipping");
            return Ok(StationSyncReport::default());
        }

        info!("Fetching station information...");
        let items = self
            .fetcher
            .fetch_list(&self.config.endpoint(STATIONS_PATH))
            .await?;

        let mut stats = PersistStats::default();
        let mut stations = BTreeMap::new();
        for item in items {
            let Some((code, station)) = serde_json::from_value::<StationPayload>(item)
                .ok()
                .and_then(|station| Some((station.station_code()?, station)))
            else {
                stats.dropped += 1;
                continue;
            };
            match stations.entry(code) {
                Entry::Vacant(slot) => {
                    slot.insert(station);
                }
                Entry::Occupied(_) => stats.duplicates += 1,
            }
        }
        if stats.dropped > 0 {
            warn!("Dropped {} stations without a valid code", stats.dropped);
        }

        self.store.clean_stations_dir().await?;
        for (code, station) in stations {
            if self.store.put(&ArchiveKey::Station(code.clone()), &station).await? {
                debug!("Saved station {} ({})", code, station.name().unwrap_or("unnamed"));
                stats.written += 1;
            } else {
                stats.already_present += 1;
            }
        }

        info!("Saved {} stations", stats.written);
        Ok(StationSyncReport {
            fetched: true,
            stations: stats,
        })
    }

    fn window_url(&self, window: &FetchWindow) -> String {
        self.config.endpoint(&format!(
            "valores/climatologicos/diarios/datos/fechaini/{}/fechafin/{}/todasestaciones",
            window.api_start(),
            window.api_end()
        ))
    }
}
