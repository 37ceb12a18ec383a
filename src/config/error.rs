use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("AEMET_API_TOKEN environment variable not set")]
    MissingApiToken,

    #[error("Batch size must be between 1 and {max} days, got {got}")]
    InvalidBatchSize { got: u32, max: u32 },

    #[error("Base URL '{0}' is not an absolute http(s) URL")]
    InvalidBaseUrl(String),
}
