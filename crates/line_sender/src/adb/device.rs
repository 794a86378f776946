//! Device control utilities for one addressed emulator instance

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::command::{KeyCode, ShellCommand};
use super::transport::{CommandOutcome, DeviceTransport};
use crate::config::Point;
use crate::error::{Error, Result};

lazy_static! {
    static ref SCREEN_SIZE_RE: Regex = Regex::new(r"(\d+)x(\d+)").expect("valid regex");
}

const UI_DUMP_PATH: &str = "/sdcard/line_sender_ui.xml";

/// Screen resolution of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
        }
    }
}

/// Status of the target app on a device, from most to least engaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    NotInstalled,
    Stopped,
    Background,
    Foreground,
}

impl AppStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotInstalled => "Not Installed",
            Self::Stopped => "Stopped",
            Self::Background => "Background",
            Self::Foreground => "Active (Foreground)",
        }
    }

    pub fn is_installed(&self) -> bool {
        !matches!(self, Self::NotInstalled)
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Handle to one device. All operations compose from `execute`.
#[derive(Clone)]
pub struct Device {
    address: String,
    transport: Arc<dyn DeviceTransport>,
    timeout: Duration,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Device {
    pub fn new(
        address: impl Into<String>,
        transport: Arc<dyn DeviceTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            address: address.into(),
            transport,
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Run one shell command; failures come back as a structured outcome.
    pub async fn execute(&self, command: &ShellCommand) -> CommandOutcome {
        self.transport
            .shell(&self.address, command, self.timeout)
            .await
    }

    async fn run(&self, command: ShellCommand) -> Result<String> {
        let context = command.render();
        self.execute(&command).await.into_result(&context)
    }

    pub async fn tap(&self, point: Point) -> Result<()> {
        self.run(ShellCommand::Tap(point)).await.map(|_| ())
    }

    pub async fn swipe(&self, from: Point, to: Point, duration_ms: u32) -> Result<()> {
        self.run(ShellCommand::Swipe {
            from,
            to,
            duration_ms,
        })
        .await
        .map(|_| ())
    }

    pub async fn key_event(&self, key: KeyCode) -> Result<()> {
        self.run(ShellCommand::KeyEvent(key)).await.map(|_| ())
    }

    pub async fn back(&self) -> Result<()> {
        self.key_event(KeyCode::Back).await
    }

    /// Whether the bridge reports this device in the `device` state
    pub async fn is_reachable(&self) -> bool {
        let outcome = self.transport.get_state(&self.address, self.timeout).await;
        outcome.success && outcome.output.trim() == "device"
    }

    pub async fn ensure_reachable(&self) -> Result<()> {
        if self.is_reachable().await {
            Ok(())
        } else {
            Err(Error::DeviceUnreachable(self.address.clone()))
        }
    }

    pub async fn is_app_installed(&self, package: &str) -> Result<bool> {
        let output = self
            .run(ShellCommand::ListPackages {
                package: package.to_string(),
            })
            .await?;
        Ok(package_listed(&output, package))
    }

    /// Whether a focus or resumed-activity dump names the package
    pub async fn is_app_foreground(&self, package: &str) -> Result<bool> {
        let window = self.run(ShellCommand::DumpWindow).await?;
        if names_package(&window, &["mCurrentFocus", "mFocusedApp"], package) {
            return Ok(true);
        }

        let activities = self.run(ShellCommand::DumpActivities).await?;
        Ok(names_package(
            &activities,
            &["mResumedActivity", "topResumedActivity"],
            package,
        ))
    }

    /// Whether the package has a live process
    pub async fn is_app_running(&self, package: &str) -> Result<bool> {
        let output = self
            .run(ShellCommand::Pidof {
                package: package.to_string(),
            })
            .await?;
        Ok(!output.trim().is_empty())
    }

    /// Classify the app status. Checks short-circuit from installed to
    /// foreground to background, in that order.
    pub async fn app_status(&self, package: &str) -> Result<AppStatus> {
        if !self.is_app_installed(package).await? {
            return Ok(AppStatus::NotInstalled);
        }
        if self.is_app_foreground(package).await? {
            return Ok(AppStatus::Foreground);
        }
        if self.is_app_running(package).await? {
            return Ok(AppStatus::Background);
        }
        Ok(AppStatus::Stopped)
    }

    pub async fn force_stop(&self, package: &str) -> Result<()> {
        self.run(ShellCommand::ForceStop {
            package: package.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn launch(&self, package: &str) -> Result<()> {
        self.run(ShellCommand::Launch {
            package: package.to_string(),
        })
        .await
        .map(|_| ())
    }

    /// Screen resolution, falling back to 1080x1920 when it cannot be read
    pub async fn screen_size(&self) -> ScreenSize {
        match self.run(ShellCommand::ScreenSize).await {
            Ok(output) => parse_screen_size(&output).unwrap_or_default(),
            Err(_) => ScreenSize::default(),
        }
    }

    pub async fn model(&self) -> Option<String> {
        self.run(ShellCommand::GetProp {
            key: "ro.product.model".to_string(),
        })
        .await
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    }

    /// Dump the current UI hierarchy as XML
    pub async fn dump_ui(&self) -> Result<String> {
        self.run(ShellCommand::UiDump {
            path: UI_DUMP_PATH.to_string(),
        })
        .await
    }
}

/// `pm list packages <filter>` matches substrings, so require an exact line.
fn package_listed(output: &str, package: &str) -> bool {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .any(|name| name == package)
}

fn names_package(dump: &str, markers: &[&str], package: &str) -> bool {
    dump.lines()
        .filter(|line| markers.iter().any(|m| line.contains(m)))
        .any(|line| line.contains(package))
}

/// Parse `wm size` output, preferring an override size over the physical one.
pub fn parse_screen_size(output: &str) -> Option<ScreenSize> {
    SCREEN_SIZE_RE
        .captures_iter(output)
        .last()
        .and_then(|caps| {
            Some(ScreenSize {
                width: caps[1].parse().ok()?,
                height: caps[2].parse().ok()?,
            })
        })
}
