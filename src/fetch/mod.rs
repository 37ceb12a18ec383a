pub mod backoff;
pub mod decode;
pub mod error;
pub mod fetcher;
pub mod sleeper;
