use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("snapshot storage unavailable: {0}")]
    StorageUnavailable(#[source] io::Error),
    #[error("no snapshot at {}", .0.display())]
    NotFound(PathBuf),
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
    #[error("telemetry service stopped")]
    ServiceStopped,
    #[error("ingestion queue full")]
    QueueFull,
    #[error("invalid metric key {0:?}")]
    InvalidKey(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
