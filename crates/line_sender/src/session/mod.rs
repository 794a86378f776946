//! Per-device send sessions
//!
//! This module provides:
//! - `runner`: The campaign state machine and its pause/resume/stop controls
//! - `traversal`: The coordinate-driven UI sequence for one target
//! - `checkpoint`: Durable progress records keyed by device address
//! - `friends`: Friend-count scraping from UI dumps
//! - `state`: Run states, target counts and status snapshots

mod checkpoint;
mod friends;
mod runner;
mod state;
mod traversal;

pub use checkpoint::{
    resume_point, sanitize_key, CheckpointInfo, CheckpointRecord, CheckpointStore, FailedTarget,
    ResumePoint,
};
pub use friends::parse_friend_count;
pub use runner::{Campaign, Session};
pub use state::{RunState, SessionStatus, TargetCount, UNBOUNDED_SENTINEL};
