//! Shell command transport to addressed devices

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::command::ShellCommand;
use crate::error::{Error, Result};

/// Structured result of one transport call. Failures are values, not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            timed_out: false,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            timed_out: false,
        }
    }

    pub fn timeout(error: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::failed(error)
        }
    }

    /// Convert into a `Result`, keeping the output on success.
    pub fn into_result(self, context: &str) -> Result<String> {
        if self.success {
            return Ok(self.output);
        }
        let detail = self
            .error
            .unwrap_or_else(|| "unknown failure".to_string());
        if self.timed_out {
            Err(Error::Timeout(format!("{}: {}", context, detail)))
        } else {
            Err(Error::Transport(format!("{}: {}", context, detail)))
        }
    }
}

/// Request/response access to devices reachable through the debug bridge
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Run a shell command on the device at `address`
    async fn shell(&self, address: &str, command: &ShellCommand, timeout: Duration)
        -> CommandOutcome;

    /// Attempt a TCP connection to `address`
    async fn connect(&self, address: &str, timeout: Duration) -> CommandOutcome;

    /// Raw device enumeration output (`adb devices` format)
    async fn devices(&self, timeout: Duration) -> CommandOutcome;

    /// Raw connection state of one device (`device`, `offline`, ...)
    async fn get_state(&self, address: &str, timeout: Duration) -> CommandOutcome;
}

/// Transport backed by the `adb` binary
#[derive(Debug, Clone)]
pub struct AdbTransport {
    adb_path: String,
}

impl AdbTransport {
    pub fn new() -> Self {
        Self {
            adb_path: "adb".to_string(),
        }
    }

    pub fn with_path(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> CommandOutcome {
        debug!("{} {}", self.adb_path, args.join(" "));

        let mut cmd = Command::new(&self.adb_path);
        cmd.args(args).kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_) => {
                return CommandOutcome::timeout(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                ))
            }
            Ok(Err(e)) => {
                return CommandOutcome::failed(format!(
                    "failed to run {}: {}",
                    self.adb_path, e
                ))
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            CommandOutcome::ok(stdout)
        } else {
            let error = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout.clone()
            } else {
                format!("exited with {}", output.status)
            };
            CommandOutcome {
                output: stdout,
                ..CommandOutcome::failed(error)
            }
        }
    }
}

impl Default for AdbTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceTransport for AdbTransport {
    async fn shell(
        &self,
        address: &str,
        command: &ShellCommand,
        timeout: Duration,
    ) -> CommandOutcome {
        let line = command.render();
        self.run(&["-s", address, "shell", &line], timeout).await
    }

    async fn connect(&self, address: &str, timeout: Duration) -> CommandOutcome {
        let outcome = self.run(&["connect", address], timeout).await;
        if !outcome.success {
            return outcome;
        }

        // adb exits 0 even when the connection is refused
        let lower = outcome.output.to_lowercase();
        if lower.contains("connected to") && !lower.contains("cannot") && !lower.contains("failed")
        {
            outcome
        } else {
            CommandOutcome::failed(outcome.output)
        }
    }

    async fn devices(&self, timeout: Duration) -> CommandOutcome {
        self.run(&["devices"], timeout).await
    }

    async fn get_state(&self, address: &str, timeout: Duration) -> CommandOutcome {
        self.run(&["-s", address, "get-state"], timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(
            CommandOutcome::ok("done").into_result("tap").unwrap(),
            "done"
        );

        let err = CommandOutcome::failed("device offline")
            .into_result("tap")
            .unwrap_err();
        assert!(matches!(err, Error::Transport(ref m) if m == "tap: device offline"));

        let err = CommandOutcome::timeout("timed out after 30000ms")
            .into_result("swipe")
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported_not_raised() {
        let transport = AdbTransport::with_path("/nonexistent/line-sender-adb");
        let outcome = transport.devices(Duration::from_secs(5)).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("failed to run"));
    }
}
