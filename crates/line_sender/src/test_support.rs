//! Scripted transport for unit and scenario tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::adb::{CommandOutcome, DeviceTransport, ShellCommand};
use crate::config::Point;
use crate::input::BRIDGE_ACK;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Timeout,
    Fail,
    Panic,
}

struct TapWatch {
    point: Point,
    nth: usize,
    seen: usize,
    notify: Arc<Notify>,
}

struct State {
    reachable: bool,
    installed: bool,
    foreground: bool,
    running: bool,
    bridge: bool,
    ui_dump: String,
    device_list: String,
    model: String,
    commands: Vec<(String, ShellCommand)>,
    connects: Vec<String>,
    occurrences: HashMap<String, usize>,
    faults: HashMap<String, Vec<(usize, Fault)>>,
    tap_watches: Vec<TapWatch>,
}

/// In-memory device that answers shell commands from toggles.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the code under test owns another.
#[derive(Clone)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<State>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                reachable: true,
                installed: true,
                foreground: true,
                running: true,
                bridge: true,
                ui_dump: String::new(),
                device_list: "List of devices attached\n127.0.0.1:5555\tdevice\n".to_string(),
                model: "SM-G988N".to_string(),
                commands: Vec::new(),
                connects: Vec::new(),
                occurrences: HashMap::new(),
                faults: HashMap::new(),
                tap_watches: Vec::new(),
            })),
        }
    }

    fn update(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_reachable(self, reachable: bool) -> Self {
        self.update(|s| s.reachable = reachable)
    }

    pub fn with_installed(self, installed: bool) -> Self {
        self.update(|s| s.installed = installed)
    }

    pub fn with_foreground(self, foreground: bool) -> Self {
        self.update(|s| s.foreground = foreground)
    }

    pub fn with_running(self, running: bool) -> Self {
        self.update(|s| s.running = running)
    }

    pub fn with_bridge(self, bridge: bool) -> Self {
        self.update(|s| s.bridge = bridge)
    }

    pub fn with_ui_dump(self, dump: &str) -> Self {
        let dump = dump.to_string();
        self.update(|s| s.ui_dump = dump)
    }

    pub fn with_device_list(self, list: &str) -> Self {
        let list = list.to_string();
        self.update(|s| s.device_list = list)
    }

    /// Time out the given 0-based occurrences of `command`
    pub fn with_timeouts(self, command: ShellCommand, occurrences: &[usize]) -> Self {
        self.with_fault(command, occurrences, Fault::Timeout)
    }

    /// Fail the given 0-based occurrences of `command` with a non-zero exit
    pub fn with_failures(self, command: ShellCommand, occurrences: &[usize]) -> Self {
        self.with_fault(command, occurrences, Fault::Fail)
    }

    /// Panic inside the transport on the given 0-based occurrences of `command`
    pub fn with_panics(self, command: ShellCommand, occurrences: &[usize]) -> Self {
        self.with_fault(command, occurrences, Fault::Panic)
    }

    fn with_fault(self, command: ShellCommand, occurrences: &[usize], fault: Fault) -> Self {
        let key = command.render();
        let entries: Vec<_> = occurrences.iter().map(|n| (*n, fault)).collect();
        self.update(|s| s.faults.entry(key).or_default().extend(entries))
    }

    /// Notifier fired when `point` is tapped for the `nth` time (1-based).
    /// The permit is stored, so awaiting after the tap still completes.
    pub fn notify_on_tap(&self, point: Point, nth: usize) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.state.lock().unwrap().tap_watches.push(TapWatch {
            point,
            nth,
            seen: 0,
            notify: notify.clone(),
        });
        notify
    }

    pub fn set_running(&self, running: bool) {
        let mut state = self.state.lock().unwrap();
        state.running = running;
        if !running {
            state.foreground = false;
        }
    }

    pub fn shell_commands(&self) -> Vec<ShellCommand> {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Address of every shell command, in call order
    pub fn shell_addresses(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .map(|(a, _)| a.clone())
            .collect()
    }

    pub fn count(&self, command: &ShellCommand) -> usize {
        self.shell_commands().iter().filter(|c| *c == command).count()
    }

    pub fn taps_at(&self, point: Point) -> usize {
        self.count(&ShellCommand::Tap(point))
    }

    pub fn connect_attempts(&self) -> Vec<String> {
        self.state.lock().unwrap().connects.clone()
    }

    fn respond(state: &mut State, command: &ShellCommand) -> CommandOutcome {
        match command {
            ShellCommand::ClipboardSetFromFile { .. }
            | ShellCommand::ClipboardClear
            | ShellCommand::ClipboardGet => {
                if state.bridge {
                    CommandOutcome::ok(format!("Broadcasting: Intent\nBroadcast completed: {}", BRIDGE_ACK))
                } else {
                    CommandOutcome::ok("Broadcasting: Intent\nBroadcast completed: result=0")
                }
            }
            ShellCommand::ListPackages { package } => {
                if state.installed {
                    CommandOutcome::ok(format!("package:{}", package))
                } else {
                    CommandOutcome::ok("")
                }
            }
            ShellCommand::DumpWindow => {
                if state.foreground {
                    CommandOutcome::ok(
                        "  mCurrentFocus=Window{1a2b u0 jp.naver.line.android/jp.naver.line.android.activity.main.MainActivity}",
                    )
                } else {
                    CommandOutcome::ok(
                        "  mCurrentFocus=Window{3c4d u0 com.bluestacks.launcher/com.android.launcher3.Launcher}",
                    )
                }
            }
            ShellCommand::DumpActivities => {
                CommandOutcome::ok("  mResumedActivity: ActivityRecord{5e6f u0 com.bluestacks.launcher/.Launcher t2}")
            }
            ShellCommand::Pidof { .. } => {
                if state.running {
                    CommandOutcome::ok("4242")
                } else {
                    CommandOutcome::ok("")
                }
            }
            ShellCommand::ForceStop { .. } => {
                state.running = false;
                state.foreground = false;
                CommandOutcome::ok("")
            }
            ShellCommand::Launch { .. } => {
                state.running = true;
                state.foreground = true;
                CommandOutcome::ok("Events injected: 1")
            }
            ShellCommand::UiDump { .. } => CommandOutcome::ok(state.ui_dump.clone()),
            ShellCommand::ScreenSize => CommandOutcome::ok("Physical size: 1080x1920"),
            ShellCommand::GetProp { .. } => CommandOutcome::ok(state.model.clone()),
            _ => CommandOutcome::ok(""),
        }
    }
}

#[async_trait]
impl DeviceTransport for FakeTransport {
    async fn shell(
        &self,
        address: &str,
        command: &ShellCommand,
        _timeout: Duration,
    ) -> CommandOutcome {
        let (outcome, fault) = {
            let mut state = self.state.lock().unwrap();
            state.commands.push((address.to_string(), command.clone()));

            if let ShellCommand::Tap(point) = command {
                for watch in state.tap_watches.iter_mut().filter(|w| w.point == *point) {
                    watch.seen += 1;
                    if watch.seen == watch.nth {
                        watch.notify.notify_one();
                    }
                }
            }

            let key = command.render();
            let occurrence = {
                let counter = state.occurrences.entry(key.clone()).or_insert(0);
                let current = *counter;
                *counter += 1;
                current
            };
            let fault = state
                .faults
                .get(&key)
                .and_then(|f| f.iter().find(|(n, _)| *n == occurrence))
                .map(|(_, fault)| *fault);

            if !state.reachable {
                (CommandOutcome::failed(format!("device '{}' not found", address)), None)
            } else {
                (Self::respond(&mut state, command), fault)
            }
        };

        match fault {
            Some(Fault::Timeout) => CommandOutcome::timeout("timed out after 30000ms"),
            Some(Fault::Fail) => CommandOutcome::failed("exit status 1"),
            Some(Fault::Panic) => panic!("transport blew up on {}", command),
            None => outcome,
        }
    }

    async fn connect(&self, address: &str, _timeout: Duration) -> CommandOutcome {
        self.state.lock().unwrap().connects.push(address.to_string());
        CommandOutcome::ok(format!("connected to {}", address))
    }

    async fn devices(&self, _timeout: Duration) -> CommandOutcome {
        CommandOutcome::ok(self.state.lock().unwrap().device_list.clone())
    }

    async fn get_state(&self, address: &str, _timeout: Duration) -> CommandOutcome {
        if self.state.lock().unwrap().reachable {
            CommandOutcome::ok("device")
        } else {
            CommandOutcome::failed(format!("device '{}' not found", address))
        }
    }
}
