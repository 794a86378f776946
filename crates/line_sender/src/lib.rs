//! line_sender: multi-instance message sending for Android emulators
//!
//! This library drives a messaging app inside several emulator instances
//! over ADB, the way a person would use its UI:
//! - ADB transport, typed shell commands and instance discovery
//! - Text injection through an on-device clipboard bridge
//! - Per-device send sessions with pause/resume/stop and resumable checkpoints
//! - An orchestrator fanning batches out concurrently or one device at a time
//!
//! # Example
//!
//! ```no_run
//! use line_sender::{BatchMode, DeviceSelection, Orchestrator, SendOptions, SenderConfig, Speed, TargetCount};
//!
//! #[tokio::main]
//! async fn main() -> line_sender::Result<()> {
//!     let orchestrator = Orchestrator::new(SenderConfig::new().with_checkpoint_dir("data"));
//!     let devices = orchestrator.discover().await?;
//!
//!     let selection: Vec<_> = devices
//!         .iter()
//!         .map(|d| DeviceSelection::new(&d.address, TargetCount::Fixed(20)))
//!         .collect();
//!     let options = SendOptions { mode: BatchMode::Concurrent, speed: Speed::Fast, skip_first: 0 };
//!
//!     let batch = orchestrator.send_selected("สวัสดีครับ", &selection, options).await?;
//!     let summary = batch.wait().await?;
//!     println!("sent {} / failed {}", summary.total_sent(), summary.total_failed());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod error;
pub mod events;

// Configuration module
pub mod config;

// Device access
pub mod adb;
pub mod input;

// Core functionality
pub mod orchestrator;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types and functions
pub use error::{Error, Result};

// Config re-exports
pub use config::{
    get_package_name, list_supported_apps, DiscoveryConfig, Point, ScreenLayout, SenderConfig,
    Speed, TimingConfig, APP_PACKAGES, DEFAULT_PACKAGE, TIMING_CONFIG,
};

// ADB re-exports
pub use adb::{
    discover, AdbTransport, AppStatus, CommandOutcome, Device, DeviceTransport, DiscoveredDevice,
    KeyCode, ScreenSize, ShellCommand,
};

// Input re-exports
pub use input::{bridge_available, InjectionReport, TextInjector};

// Session re-exports
pub use session::{
    Campaign, CheckpointInfo, CheckpointRecord, CheckpointStore, RunState, Session,
    SessionStatus, TargetCount,
};

// Orchestrator re-exports
pub use events::{BatchMode, BatchSummary, Event, SessionEvent, SessionReport};
pub use orchestrator::{
    BatchHandle, CombinedStatus, DeviceInfo, DeviceSelection, Orchestrator, Rejection, SendOptions,
};
