//! This module provides the main entry point for archiving AEMET OpenData.
//! It wires the fetcher, the archive store and the batch planner together
//! from a single validated [`AemetConfig`].

use crate::archive::store::ArchiveStore;
use crate::config::AemetConfig;
use crate::error::AemetError;
use crate::fetch::fetcher::TwoStepFetcher;
use crate::fetch::sleeper::{Sleeper, TokioSleeper};
use crate::planner::batch_planner::{BatchPlanner, StationSyncMode};
use crate::planner::report::{RangeSyncReport, StationSyncReport};
use crate::utils::resolve_date_range;
use bon::bon;
use chrono::{Local, NaiveDate};
use log::info;
use std::path::PathBuf;

/// The main client for archiving AEMET climatological data.
///
/// Every sync writes into a local archive rooted at the folder given on
/// construction:
///
/// ```text
/// <root>/estaciones/<indicativo>.json
/// <root>/valores-climatologicos/<YYYY>/<MM>/<DD>/<indicativo>.json
/// ```
///
/// Entries are written once and never touched again, so syncs can be
/// repeated or interrupted at any point.
///
/// # Examples
///
/// ```no_run
/// # use aemet::{Aemet, AemetConfig, AemetError};
/// # use chrono::NaiveDate;
/// # #[tokio::main]
/// # async fn main() -> Result<(), AemetError> {
/// let client = Aemet::new(AemetConfig::from_env()?, "data")?;
///
/// client.sync_stations().call().await?;
///
/// let report = client
///     .sync_climate_values()
///     .start(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
///     .end(NaiveDate::from_ymd_opt(2024, 1, 20).unwrap())
///     .call()
///     .await?;
/// println!("{} records written", report.records.written);
/// # Ok(())
/// # }
/// ```
pub struct Aemet<S = TokioSleeper> {
    planner: BatchPlanner<S>,
}

impl Aemet<TokioSleeper> {
    /// Creates a client that archives into `root`.
    ///
    /// # Errors
    ///
    /// Returns [`AemetError::Config`] if the configuration is invalid and
    /// [`AemetError::Fetch`] if the HTTP client cannot be built.
    pub fn new(config: AemetConfig, root: impl Into<PathBuf>) -> Result<Self, AemetError> {
        Self::with_sleeper(config, root, TokioSleeper)
    }
}

#[bon]
impl<S: Sleeper> Aemet<S> {
    /// Like [`Aemet::new`], but with a custom [`Sleeper`] for backoff waits.
    pub fn with_sleeper(
        config: AemetConfig,
        root: impl Into<PathBuf>,
        sleeper: S,
    ) -> Result<Self, AemetError> {
        config.validate()?;
        let fetcher = TwoStepFetcher::with_sleeper(&config, sleeper)?;
        let store = ArchiveStore::new(root);
        Ok(Self {
            planner: BatchPlanner::new(config, fetcher, store),
        })
    }

    pub fn store(&self) -> &ArchiveStore {
        self.planner.store()
    }

    /// Archives the station inventory.
    ///
    /// By default nothing is downloaded if the archive already holds any
    /// station. Pass `.fill_missing(true)` to download the inventory anyway
    /// and add the stations that are not archived yet.
    #[builder]
    pub async fn sync_stations(
        &self,
        fill_missing: Option<bool>,
    ) -> Result<StationSyncReport, AemetError> {
        let mode = if fill_missing.unwrap_or(false) {
            StationSyncMode::FillMissing
        } else {
            StationSyncMode::SkipIfAny
        };
        self.planner.sync_stations(mode).await
    }

    /// Archives daily climatological values for all stations.
    ///
    /// * `.start(NaiveDate)`: Optional. Defaults to 30 days before the end date.
    /// * `.end(NaiveDate)`: Optional. Defaults to yesterday.
    ///
    /// # Errors
    ///
    /// Returns [`AemetError::InvalidDateRange`] if the start is after the end,
    /// and the first fetch or archive error otherwise. Windows completed
    /// before the error stay archived.
    #[builder]
    pub async fn sync_climate_values(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<RangeSyncReport, AemetError> {
        let (start, end) = resolve_date_range(start, end, Local::now().date_naive());
        if start > end {
            return Err(AemetError::InvalidDateRange { start, end });
        }
        info!("Date range: {} to {}", start, end);
        let report = self.planner.sync_range(start, end).await?;
        info!(
            "Data saved to {}",
            self.store().root().join("valores-climatologicos").display()
        );
        Ok(report)
    }
}
