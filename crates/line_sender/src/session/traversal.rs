//! Fixed UI traversal driving the app for one target

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::friends::parse_friend_count;
use crate::adb::Device;
use crate::config::{ScreenLayout, Speed, TimingConfig};
use crate::error::{Error, Result};
use crate::input::TextInjector;

/// Coordinate-driven UI sequences for one device and one campaign speed
pub(crate) struct Traversal<'a> {
    device: &'a Device,
    package: &'a str,
    layout: &'a ScreenLayout,
    timing: &'a TimingConfig,
    speed: Speed,
    injector: TextInjector,
}

impl<'a> Traversal<'a> {
    pub fn new(
        device: &'a Device,
        package: &'a str,
        layout: &'a ScreenLayout,
        timing: &'a TimingConfig,
        speed: Speed,
    ) -> Self {
        Self {
            device,
            package,
            layout,
            timing,
            speed,
            injector: TextInjector::new(speed.scale(timing.injection_step)),
        }
    }

    async fn wait(&self, base_ms: u64) {
        sleep(self.speed.scale(base_ms)).await;
    }

    /// Force-stop and relaunch the app, wait for it to reach the foreground,
    /// then go to its home surface.
    pub async fn restart_app(&self) -> Result<()> {
        info!("Restarting {}", self.package);
        self.device.force_stop(self.package).await?;
        self.wait(self.timing.after_tap).await;

        self.device.launch(self.package).await?;
        self.wait(self.timing.app_launch).await;
        self.wait_for_foreground().await?;

        self.device.tap(self.layout.home_button).await?;
        self.wait(self.timing.page_load).await;
        Ok(())
    }

    async fn wait_for_foreground(&self) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(self.timing.foreground_timeout);
        let poll = Duration::from_millis(self.timing.foreground_poll);
        loop {
            if self.device.is_app_foreground(self.package).await? {
                return Ok(());
            }
            if Instant::now() + poll > deadline {
                return Err(Error::Timeout(format!(
                    "{} did not reach the foreground within {}ms",
                    self.package, self.timing.foreground_timeout
                )));
            }
            sleep(poll).await;
        }
    }

    /// Restart the app if its process is gone. Returns whether it restarted.
    pub async fn ensure_running(&self) -> Result<bool> {
        if self.device.is_app_running(self.package).await? {
            return Ok(false);
        }
        warn!("{} is no longer running", self.package);
        self.restart_app().await?;
        Ok(true)
    }

    /// Open the friend list and read the friend count from a UI dump.
    pub async fn detect_friend_count(&self) -> Result<usize> {
        self.device.tap(self.layout.home_button).await?;
        self.wait(self.timing.page_load).await;
        self.device.tap(self.layout.friends_button).await?;
        self.wait(self.timing.page_load).await;

        let dump = self.device.dump_ui().await?;
        let count = parse_friend_count(&dump).ok_or_else(|| {
            Error::Detection(format!(
                "no friend count pattern matched a {} byte UI dump",
                dump.len()
            ))
        });

        self.return_home().await;
        count
    }

    /// Send `message` to the target at `index`. Transport failures abort the
    /// remaining steps and leave the app on its home surface.
    pub async fn send_to(&self, index: usize, message: &str) -> Result<()> {
        let result = self.traverse(index, message).await;
        if let Err(ref e) = result {
            if e.is_transport() {
                warn!("Target {} aborted: {}", index, e);
                self.return_home().await;
            }
        }
        result
    }

    async fn traverse(&self, index: usize, message: &str) -> Result<()> {
        let device = self.device;
        let layout = self.layout;

        device.tap(layout.home_button).await?;
        self.wait(self.timing.after_tap).await;
        device.tap(layout.friends_button).await?;
        self.wait(self.timing.page_load).await;

        let pages = layout.pages_to_scroll(index);
        for _ in 0..pages {
            device
                .swipe(layout.scroll_from, layout.scroll_to, layout.scroll_duration_ms)
                .await?;
            self.wait(self.timing.scroll_wait).await;
        }

        let row = layout.row_position(index);
        debug!("Target {}: page {}, row at {:?}", index, pages, row);
        device.tap(row).await?;
        self.wait(self.timing.after_tap).await;
        device.tap(layout.chat_button).await?;
        self.wait(self.timing.page_load).await;

        self.injector.clear_clipboard(device).await?;

        // The first tap may only scroll the field into view
        device.tap(layout.chat_input).await?;
        self.wait(self.timing.after_tap).await;
        device.tap(layout.chat_input).await?;
        self.wait(self.timing.after_tap).await;

        let mut report = self.injector.inject(device, message).await;
        if !report.success {
            warn!("Target {}: injection failed, retrying once", index);
            device.tap(layout.chat_input).await?;
            self.wait(self.timing.after_tap).await;
            report = self.injector.inject(device, message).await;
        }
        self.wait(self.timing.after_type).await;

        device.tap(layout.send_button).await?;
        self.wait(self.timing.after_send).await;

        device.back().await?;
        self.wait(self.timing.after_tap).await;
        device.tap(layout.home_button).await?;
        self.wait(self.timing.after_tap).await;

        if report.success {
            Ok(())
        } else {
            Err(Error::Injection(
                report
                    .error
                    .unwrap_or_else(|| "clipboard paste failed".to_string()),
            ))
        }
    }

    /// Back out and tap home, ignoring failures.
    pub async fn return_home(&self) {
        let _ = self.device.back().await;
        self.wait(self.timing.after_tap).await;
        let _ = self.device.tap(self.layout.home_button).await;
        self.wait(self.timing.after_tap).await;
    }
}
