//! Typed shell commands for the remote device
//!
//! Every command sent through `adb shell` is built here from structured
//! arguments. Rendering and quoting happen in one place; callers never
//! format shell text themselves, and message text only travels as base64.

use std::fmt;

use crate::config::Point;

/// Android key codes used by the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Home,
    Back,
    Paste,
}

impl KeyCode {
    pub fn code(&self) -> u32 {
        match self {
            Self::Home => 3,
            Self::Back => 4,
            Self::Paste => 279,
        }
    }
}

/// Broadcast action of the clipboard bridge receiver
pub const CLIPBOARD_SET_ACTION: &str = "clipper.set";
pub const CLIPBOARD_GET_ACTION: &str = "clipper.get";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Tap(Point),
    Swipe {
        from: Point,
        to: Point,
        duration_ms: u32,
    },
    KeyEvent(KeyCode),
    /// Decode a base64 payload into a file on the device
    WriteBase64File { path: String, payload: String },
    RemoveFile { path: String },
    /// Set the clipboard to the content of a device file through the bridge
    /// Set the clipboard from a device file. A sentinel keeps trailing
    /// newlines alive through command substitution.
    ClipboardSetFromFile { path: String },
    ClipboardClear,
    ClipboardGet,
    ForceStop { package: String },
    Launch { package: String },
    ListPackages { package: String },
    Pidof { package: String },
    DumpWindow,
    DumpActivities,
    UiDump { path: String },
    ScreenSize,
    GetProp { key: String },
}

impl ShellCommand {
    /// Render the command as a single shell line for the device's `sh`.
    pub fn render(&self) -> String {
        match self {
            Self::Tap(p) => format!("input tap {} {}", p.x, p.y),
            Self::Swipe {
                from,
                to,
                duration_ms,
            } => format!(
                "input swipe {} {} {} {} {}",
                from.x, from.y, to.x, to.y, duration_ms
            ),
            Self::KeyEvent(key) => format!("input keyevent {}", key.code()),
            Self::WriteBase64File { path, payload } => format!(
                "echo {} | base64 -d > {}",
                quote(payload),
                quote(path)
            ),
            Self::RemoveFile { path } => format!("rm -f {}", quote(path)),
            Self::ClipboardSetFromFile { path } => format!(
                "t=\"$(cat {}; printf x)\"; am broadcast -a {} -e text \"${{t%x}}\"",
                quote(path),
                CLIPBOARD_SET_ACTION
            ),
            Self::ClipboardClear => {
                format!("am broadcast -a {} -e text ''", CLIPBOARD_SET_ACTION)
            }
            Self::ClipboardGet => format!("am broadcast -a {}", CLIPBOARD_GET_ACTION),
            Self::ForceStop { package } => format!("am force-stop {}", quote(package)),
            Self::Launch { package } => format!(
                "monkey -p {} -c android.intent.category.LAUNCHER 1",
                quote(package)
            ),
            Self::ListPackages { package } => format!("pm list packages {}", quote(package)),
            Self::Pidof { package } => format!("pidof {} || true", quote(package)),
            Self::DumpWindow => "dumpsys window".to_string(),
            Self::DumpActivities => "dumpsys activity activities".to_string(),
            Self::UiDump { path } => format!(
                "uiautomator dump {} >/dev/null && cat {}",
                quote(path),
                quote(path)
            ),
            Self::ScreenSize => "wm size".to_string(),
            Self::GetProp { key } => format!("getprop {}", quote(key)),
        }
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Quote an argument for POSIX `sh`. Plain tokens pass through unchanged.
pub fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._/:=@%+,-".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_input_commands() {
        assert_eq!(ShellCommand::Tap(Point::new(143, 399)).render(), "input tap 143 399");
        assert_eq!(
            ShellCommand::Swipe {
                from: Point::new(540, 1200),
                to: Point::new(540, 400),
                duration_ms: 300
            }
            .render(),
            "input swipe 540 1200 540 400 300"
        );
        assert_eq!(
            ShellCommand::KeyEvent(KeyCode::Paste).render(),
            "input keyevent 279"
        );
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("jp.naver.line.android"), "jp.naver.line.android");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("a b"), "'a b'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote("$(reboot)"), "'$(reboot)'");
    }

    #[test]
    fn test_render_clipboard_from_file() {
        let cmd = ShellCommand::ClipboardSetFromFile {
            path: "/data/local/tmp/clip.txt".to_string(),
        };
        assert_eq!(
            cmd.render(),
            r#"t="$(cat /data/local/tmp/clip.txt; printf x)"; am broadcast -a clipper.set -e text "${t%x}""#
        );
    }

    #[test]
    fn test_render_write_base64() {
        let cmd = ShellCommand::WriteBase64File {
            path: "/data/local/tmp/clip.txt".to_string(),
            payload: "4Liq4Lin4Lix4Liq4LiU4Li1IPCfmIA=".to_string(),
        };
        assert_eq!(
            cmd.render(),
            "echo 4Liq4Lin4Lix4Liq4LiU4Li1IPCfmIA= | base64 -d > /data/local/tmp/clip.txt"
        );
    }

    #[test]
    fn test_pidof_never_fails_on_missing_process() {
        let cmd = ShellCommand::Pidof {
            package: "jp.naver.line.android".to_string(),
        };
        assert_eq!(cmd.render(), "pidof jp.naver.line.android || true");
    }
}
