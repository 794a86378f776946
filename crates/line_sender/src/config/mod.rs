//! Configuration module for line_sender
//!
//! This module contains:
//! - `apps`: Package names of the supported messaging apps
//! - `layout`: Screen coordinates for the UI traversal
//! - `timing`: Wait durations and speed presets

mod apps;
mod layout;
mod timing;

pub use apps::{get_package_name, list_supported_apps, APP_PACKAGES, DEFAULT_PACKAGE};
pub use layout::{Point, ScreenLayout};
pub use timing::{Speed, TimingConfig, TIMING_CONFIG};

use std::path::PathBuf;
use std::time::Duration;

/// Where and how instances are looked for during discovery
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub connect_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            ports: vec![5555, 5565, 5575, 5585, 5595],
            connect_timeout: Duration::from_millis(800),
        }
    }
}

/// Configuration shared by the orchestrator and all sessions
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub adb_path: String,
    pub package: String,
    pub checkpoint_dir: PathBuf,
    pub layout: ScreenLayout,
    pub timing: TimingConfig,
    pub discovery: DiscoveryConfig,
    pub command_timeout: Duration,
    /// Re-verify the app is alive every this many targets
    pub health_check_every: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_string(),
            package: DEFAULT_PACKAGE.to_string(),
            checkpoint_dir: PathBuf::from("data"),
            layout: ScreenLayout::default(),
            timing: TIMING_CONFIG.clone(),
            discovery: DiscoveryConfig::default(),
            command_timeout: Duration::from_secs(30),
            health_check_every: 10,
        }
    }
}

impl SenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adb_path(mut self, adb_path: impl Into<String>) -> Self {
        self.adb_path = adb_path.into();
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    pub fn with_layout(mut self, layout: ScreenLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_health_check_every(mut self, every: usize) -> Self {
        self.health_check_every = every;
        self
    }
}
