//! Session run states, target counts and status snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::checkpoint::FailedTarget;

/// Declared counts at or above this mean "send to everyone".
pub const UNBOUNDED_SENTINEL: usize = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    #[default]
    Idle,
    Preparing,
    DetectingFriends,
    Running,
    Paused,
    Stopping,
    Stopped,
    Complete,
    Error,
}

impl RunState {
    /// Whether a campaign loop is currently active in this state
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Preparing | Self::DetectingFriends | Self::Running | Self::Paused | Self::Stopping
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::DetectingFriends => "detecting-friends",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many targets a campaign covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetCount {
    Fixed(usize),
    /// Detect the count from the UI before starting
    All,
}

impl TargetCount {
    /// Interpret a user-declared count, mapping the sentinel to `All`.
    pub fn from_declared(count: usize) -> Self {
        if count >= UNBOUNDED_SENTINEL {
            Self::All
        } else {
            Self::Fixed(count)
        }
    }
}

impl std::str::FromStr for TargetCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<usize>()
            .map(Self::from_declared)
            .map_err(|_| format!("Invalid target count: {}", s))
    }
}

/// Control signal observed by the campaign loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Run,
    Pause,
    Stop,
}

/// In-memory progress of the current or last campaign
#[derive(Debug, Clone, Default)]
pub(crate) struct Progress {
    pub state: RunState,
    pub cursor: usize,
    pub total: usize,
    /// Rows skipped before the first target; `sent`/`failed` hold list indices
    pub skip: usize,
    pub sent: Vec<usize>,
    pub failed: Vec<FailedTarget>,
    pub last_updated: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Progress {
    /// Record one processed target and advance the cursor past it.
    pub fn record(&mut self, index: usize, result: std::result::Result<(), String>) {
        match result {
            Ok(()) => self.sent.push(index),
            Err(error) => self.failed.push(FailedTarget { index, error }),
        }
        self.cursor += 1;
        self.last_updated = Some(Utc::now());
        debug_assert_eq!(self.cursor, self.sent.len() + self.failed.len());
    }
}

/// Point-in-time status of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub address: String,
    pub state: RunState,
    pub is_running: bool,
    pub is_paused: bool,
    pub cursor: usize,
    pub total: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
