//! Typed progress events published by sessions and the orchestrator

use serde::{Deserialize, Serialize};

use crate::session::RunState;

/// Per-device lifecycle and progress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    Preparing,
    Restarting,
    DetectingFriends,
    #[serde(rename_all = "camelCase")]
    FriendsDetected { count: usize },
    #[serde(rename_all = "camelCase")]
    Start { total: usize },
    #[serde(rename_all = "camelCase")]
    Resume {
        cursor: usize,
        total: usize,
        sent: usize,
        failed: usize,
    },
    #[serde(rename_all = "camelCase")]
    Sent {
        cursor: usize,
        total: usize,
        target_label: String,
        success: bool,
        error: Option<String>,
        /// Estimated seconds until the remaining targets are done
        eta_secs: u64,
    },
    Paused,
    Resumed,
    Stopping,
    #[serde(rename_all = "camelCase")]
    Stopped { cursor: usize, total: usize },
    #[serde(rename_all = "camelCase")]
    Complete { summary: SessionReport },
    #[serde(rename_all = "camelCase")]
    Error { reason: String },
    Reset,
}

/// How a batch schedules its sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    Concurrent,
    Sequential,
}

/// Final outcome of one session run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub address: String,
    pub state: RunState,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub error: Option<String>,
}

impl SessionReport {
    /// Whether the run ended without a session-fatal error
    pub fn is_ok(&self) -> bool {
        self.state != RunState::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_id: String,
    pub mode: BatchMode,
    pub sessions: Vec<SessionReport>,
    /// Sessions that finished without a fatal error
    pub completed: usize,
    pub errored: usize,
}

impl BatchSummary {
    pub fn new(batch_id: impl Into<String>, mode: BatchMode, sessions: Vec<SessionReport>) -> Self {
        let completed = sessions.iter().filter(|s| s.is_ok()).count();
        let errored = sessions.len() - completed;
        Self {
            batch_id: batch_id.into(),
            mode,
            sessions,
            completed,
            errored,
        }
    }

    pub fn total_sent(&self) -> usize {
        self.sessions.iter().map(|s| s.sent).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.sessions.iter().map(|s| s.failed).sum()
    }
}

/// Everything published on the orchestrator's event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    Device { address: String, event: SessionEvent },
    #[serde(rename_all = "camelCase")]
    BatchStarted {
        batch_id: String,
        devices: Vec<String>,
        mode: BatchMode,
        speed: String,
    },
    #[serde(rename_all = "camelCase")]
    BatchComplete { summary: BatchSummary },
}
