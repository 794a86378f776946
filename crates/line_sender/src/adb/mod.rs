//! ADB (Android Debug Bridge) module for emulator control
//!
//! This module provides:
//! - `command`: Typed shell commands and argument quoting
//! - `transport`: The request/response transport seam and its `adb` backend
//! - `device`: UI and app primitives for one addressed device
//! - `discovery`: Instance discovery across the candidate ports

mod command;
mod device;
mod discovery;
mod transport;

pub use command::{quote, KeyCode, ShellCommand, CLIPBOARD_GET_ACTION, CLIPBOARD_SET_ACTION};
pub use device::{parse_screen_size, AppStatus, Device, ScreenSize};
pub use discovery::{dedup_by_port, discover, parse_device_list, port_of, DiscoveredDevice};
pub use transport::{AdbTransport, CommandOutcome, DeviceTransport};
