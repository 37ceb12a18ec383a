use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to create archive directory '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode archive entry '{0}'")]
    Encode(PathBuf, #[source] serde_json::Error),

    #[error("Failed to write archive entry '{0}'")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Failed to publish archive entry '{0}'")]
    Publish(PathBuf, #[source] std::io::Error),

    #[error("Failed to list archive directory '{0}'")]
    ReadDir(PathBuf, #[source] std::io::Error),

    #[error("Failed to remove stale temporary entry '{0}'")]
    Cleanup(PathBuf, #[source] std::io::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
