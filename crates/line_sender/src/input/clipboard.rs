//! Text injection through the on-device clipboard bridge

use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::adb::{Device, KeyCode, ShellCommand};
use crate::error::{Error, Result};

/// Scratch file holding the decoded message on the device
pub const SCRATCH_PATH: &str = "/data/local/tmp/line_sender_clip.txt";

/// Broadcast result reported when the bridge receiver handled the request.
/// A broadcast nobody receives reports `result=0`.
pub const BRIDGE_ACK: &str = "result=-1";

pub const METHOD_CLIPBOARD_PASTE: &str = "clipboard-paste";

/// Outcome of one injection attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionReport {
    pub success: bool,
    pub method: String,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// Pastes arbitrary text into the focused field: stage it base64-encoded in
/// a scratch file, have the bridge load the decoded file into the clipboard,
/// then send a paste key event.
#[derive(Debug, Clone)]
pub struct TextInjector {
    step_delay: Duration,
}

impl TextInjector {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }

    pub async fn inject(&self, device: &Device, text: &str) -> InjectionReport {
        let started = Instant::now();
        let result = self.try_inject(device, text).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                debug!("[{}] injected {} chars in {}ms", device.address(), text.chars().count(), elapsed_ms);
                InjectionReport {
                    success: true,
                    method: METHOD_CLIPBOARD_PASTE.to_string(),
                    elapsed_ms,
                    error: None,
                }
            }
            Err(e) => {
                warn!("[{}] injection failed: {}", device.address(), e);
                InjectionReport {
                    success: false,
                    method: METHOD_CLIPBOARD_PASTE.to_string(),
                    elapsed_ms,
                    error: Some(e.reason()),
                }
            }
        }
    }

    async fn try_inject(&self, device: &Device, text: &str) -> Result<()> {
        let payload = general_purpose::STANDARD.encode(text.as_bytes());

        device
            .execute(&ShellCommand::WriteBase64File {
                path: SCRATCH_PATH.to_string(),
                payload,
            })
            .await
            .into_result("write scratch file")?;
        sleep(self.step_delay).await;

        let result = self.set_and_paste(device).await;
        self.remove_scratch(device).await;
        result
    }

    async fn set_and_paste(&self, device: &Device) -> Result<()> {
        let output = device
            .execute(&ShellCommand::ClipboardSetFromFile {
                path: SCRATCH_PATH.to_string(),
            })
            .await
            .into_result("clipboard set")?;
        if !output.contains(BRIDGE_ACK) {
            return Err(Error::Injection(
                "clipboard bridge did not acknowledge the request".to_string(),
            ));
        }
        sleep(self.step_delay).await;

        device.key_event(KeyCode::Paste).await?;
        sleep(self.step_delay).await;
        Ok(())
    }

    async fn remove_scratch(&self, device: &Device) {
        let outcome = device
            .execute(&ShellCommand::RemoveFile {
                path: SCRATCH_PATH.to_string(),
            })
            .await;
        if !outcome.success {
            debug!("[{}] scratch cleanup failed: {:?}", device.address(), outcome.error);
        }
    }

    /// Empty the clipboard so a failed injection cannot re-paste old text.
    pub async fn clear_clipboard(&self, device: &Device) -> Result<()> {
        device
            .execute(&ShellCommand::ClipboardClear)
            .await
            .into_result("clipboard clear")
            .map(|_| ())
    }
}

/// Whether the clipboard bridge answers a lightweight get request
pub async fn bridge_available(device: &Device) -> bool {
    let outcome = device.execute(&ShellCommand::ClipboardGet).await;
    outcome.success && outcome.output.contains(BRIDGE_ACK)
}
