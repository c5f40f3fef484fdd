//! Daemon errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no tokio runtime available")]
    RuntimeUnavailable,

    #[error("failed to spawn queue worker: {0}")]
    QueueSpawn(#[source] std::io::Error),
}
