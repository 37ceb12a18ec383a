use reqwest::StatusCode;
use thiserror::Error;

/// Terminal failure of a fetch. Retriable conditions never surface here
/// unless the backoff policy gave up on them.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Network request failed for {url} after {attempts} attempts")]
    Connection {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server fault {status} for {url} persisted after {attempts} attempts")]
    ServerFault {
        url: String,
        status: StatusCode,
        attempts: u32,
    },

    #[error("HTTP request failed for {url} with status {status}")]
    ClientRequest { url: String, status: StatusCode },

    #[error("Failed to decode JSON payload from {url}, also under the Latin-1 fallback")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Response envelope from {url} has a non-string 'datos' pointer")]
    MalformedEnvelope { url: String },

    #[error("Unexpected payload shape from {url}: expected {expected}")]
    UnexpectedPayload { url: String, expected: &'static str },
}

impl FetchError {
    /// The HTTP status that terminated the fetch, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::ServerFault { status, .. } | FetchError::ClientRequest { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}
