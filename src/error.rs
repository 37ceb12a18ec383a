use crate::archive::error::ArchiveError;
use crate::config::error::ConfigError;
use crate::fetch::error::FetchError;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AemetError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}
