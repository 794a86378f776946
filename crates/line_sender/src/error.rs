//! Error types for device transport, text injection and session orchestration

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Command execution failed: {0}")]
    Transport(String),

    #[error("Command timed out: {0}")]
    Timeout(String),

    #[error("Device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("Text injection failed: {0}")]
    Injection(String),

    #[error("Could not detect friend count: {0}")]
    Detection(String),

    #[error("Checkpoint inconsistent with detected total: {0}")]
    StateConsistency(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Session already running on {0}")]
    AlreadyRunning(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error belongs to the transport family (command failure,
    /// timeout, unreachable device). These are recoverable by retry or skip.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::DeviceUnreachable(_)
        )
    }

    /// Human-readable reason suitable for direct display.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
