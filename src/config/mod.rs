//! Immutable configuration for the archiver, validated once before any
//! component is built.

pub mod error;

use crate::fetch::backoff::BackoffPolicy;
use crate::types::fetch_window::MAX_WINDOW_DAYS;
use bon::Builder;
use error::ConfigError;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://opendata.aemet.es/opendata/api";
pub const API_TOKEN_ENV: &str = "AEMET_API_TOKEN";
pub const BASE_URL_ENV: &str = "AEMET_BASE_URL";

/// Settings shared by the fetcher and the batch planner.
///
/// # Examples
///
/// ```
/// use aemet::AemetConfig;
///
/// let config = AemetConfig::builder()
///     .api_key("my-token")
///     .batch_size_days(10)
///     .build();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.base_url, "https://opendata.aemet.es/opendata/api");
/// ```
#[derive(Clone, Builder)]
pub struct AemetConfig {
    /// The OpenData API key, sent as the `api_key` query parameter.
    #[builder(into)]
    pub api_key: String,
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    pub base_url: String,
    /// Days per request window, at most [`MAX_WINDOW_DAYS`].
    #[builder(default = MAX_WINDOW_DAYS)]
    pub batch_size_days: u32,
    #[builder(default = Duration::from_secs(60))]
    pub request_timeout: Duration,
    #[builder(default = Duration::from_secs(30))]
    pub connect_timeout: Duration,
    #[builder(default)]
    pub backoff: BackoffPolicy,
}

impl AemetConfig {
    /// Reads the API token (and an optional base URL override) from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiToken`] if `AEMET_API_TOKEN` is unset or blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup(API_TOKEN_ENV)
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::MissingApiToken)?;
        let config = Self::builder()
            .api_key(api_key)
            .maybe_base_url(lookup(BASE_URL_ENV))
            .build();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiToken);
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.batch_size_days) {
            return Err(ConfigError::InvalidBatchSize {
                got: self.batch_size_days,
                max: MAX_WINDOW_DAYS,
            });
        }
        let has_host = self
            .base_url
            .strip_prefix("https://")
            .or_else(|| self.base_url.strip_prefix("http://"))
            .is_some_and(|rest| !rest.is_empty());
        if !has_host {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }

    /// Joins an API path onto the base URL.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Debug for AemetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AemetConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("batch_size_days", &self.batch_size_days)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("backoff", &self.backoff)
            .finish()
    }
}
