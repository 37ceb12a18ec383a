mod aemet;
mod archive;
mod config;
mod error;
mod fetch;
mod planner;
mod types;
mod utils;

pub use aemet::*;
pub use error::AemetError;

pub use config::error::ConfigError;
pub use config::{AemetConfig, API_TOKEN_ENV, BASE_URL_ENV, DEFAULT_BASE_URL};

pub use archive::error::ArchiveError;
pub use archive::key::ArchiveKey;
pub use archive::store::ArchiveStore;

pub use fetch::backoff::{BackoffDecision, BackoffPolicy, FailureClass, RateLimitMode};
pub use fetch::decode::decode_json;
pub use fetch::error::FetchError;
pub use fetch::fetcher::TwoStepFetcher;
pub use fetch::sleeper::{Sleeper, TokioSleeper};

pub use planner::batch_planner::{BatchPlanner, StationSyncMode};
pub use planner::report::{PersistStats, RangeSyncReport, StationSyncReport, WindowOutcome};

pub use types::fetch_window::{FetchWindow, MAX_WINDOW_DAYS};
pub use types::indicativo::{Indicativo, InvalidIndicativo};
pub use types::station::StationPayload;
pub use types::weather_record::WeatherRecord;

pub use utils::{resolve_date_range, DEFAULT_RANGE_DAYS};
