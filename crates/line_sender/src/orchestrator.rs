//! Multi-instance orchestration: discovery, batch sends and global controls

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::adb::{self, AdbTransport, AppStatus, Device, DeviceTransport, DiscoveredDevice, ScreenSize};
use crate::config::{SenderConfig, Speed};
use crate::error::{Error, Result};
use crate::events::{BatchMode, BatchSummary, Event, SessionReport};
use crate::input::bridge_available;
use crate::session::{Campaign, RunState, Session, SessionStatus, TargetCount};

const EVENT_CAPACITY: usize = 1024;

/// What discovery learned about one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub address: String,
    pub port: Option<u16>,
    /// 1-based position in port order
    pub instance_number: usize,
    pub model: Option<String>,
    pub screen_size: ScreenSize,
    /// `None` when the status could not be read
    pub app_status: Option<AppStatus>,
    pub clipboard_available: bool,
}

/// One device entry of a batch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSelection {
    pub address: String,
    pub enabled: bool,
    pub count: TargetCount,
}

impl DeviceSelection {
    pub fn new(address: impl Into<String>, count: TargetCount) -> Self {
        Self {
            address: address.into(),
            enabled: true,
            count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendOptions {
    pub mode: BatchMode,
    pub speed: Speed,
    /// Friend-list rows to pass over on every device before the first target
    pub skip_first: usize,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            mode: BatchMode::Concurrent,
            speed: Speed::default(),
            skip_first: 0,
        }
    }
}

/// A device left out of a batch, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub address: String,
    pub reason: String,
}

/// An accepted batch. Progress arrives on the event stream; `wait` yields
/// the final summary.
#[derive(Debug)]
pub struct BatchHandle {
    pub batch_id: String,
    pub accepted: Vec<String>,
    pub rejected: Vec<Rejection>,
    handle: JoinHandle<BatchSummary>,
}

impl BatchHandle {
    pub async fn wait(self) -> Result<BatchSummary> {
        self.handle
            .await
            .map_err(|e| Error::Task(format!("batch {}: {}", self.batch_id, e)))
    }
}

/// Aggregate of every session's status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedStatus {
    pub sessions: Vec<SessionStatus>,
    pub total_sent: usize,
    pub total_failed: usize,
    pub any_running: bool,
    pub any_paused: bool,
}

/// Owns one session per discovered device and fans batches out across them.
pub struct Orchestrator {
    config: Arc<SenderConfig>,
    transport: Arc<dyn DeviceTransport>,
    sessions: RwLock<BTreeMap<String, Arc<Session>>>,
    devices: RwLock<Vec<DeviceInfo>>,
    events: broadcast::Sender<Event>,
    /// Bumped by `stop_all` so sequential batches skip their remaining devices
    stop_generation: Arc<AtomicU64>,
}

impl Orchestrator {
    /// Create an orchestrator driving devices through the `adb` binary
    pub fn new(config: SenderConfig) -> Self {
        let transport = Arc::new(AdbTransport::with_path(config.adb_path.clone()));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: SenderConfig, transport: Arc<dyn DeviceTransport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config: Arc::new(config),
            transport,
            sessions: RwLock::new(BTreeMap::new()),
            devices: RwLock::new(Vec::new()),
            events,
            stop_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Subscribe to device and batch events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn device(&self, address: &str) -> Device {
        Device::new(address, self.transport.clone(), self.config.command_timeout)
    }

    /// Sweep the candidate ports, inspect every instance found and sync the
    /// session registry. Running sessions survive even if their device
    /// dropped out of the listing.
    pub async fn discover(&self) -> Result<Vec<DeviceInfo>> {
        let found = adb::discover(self.transport.as_ref(), &self.config.discovery).await?;
        let infos = join_all(
            found
                .iter()
                .enumerate()
                .map(|(i, device)| self.inspect(device, i + 1)),
        )
        .await;

        {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            let present: BTreeSet<&str> = infos.iter().map(|d| d.address.as_str()).collect();
            sessions.retain(|address, session| {
                let keep = present.contains(address.as_str()) || session.is_running();
                if !keep {
                    info!("[{}] No longer listed, dropping session", address);
                }
                keep
            });
            for info in &infos {
                sessions.entry(info.address.clone()).or_insert_with(|| {
                    Arc::new(Session::new(
                        self.device(&info.address),
                        self.config.clone(),
                        self.events.clone(),
                    ))
                });
            }
        }
        *self.devices.write().unwrap_or_else(|e| e.into_inner()) = infos.clone();

        Ok(infos)
    }

    async fn inspect(&self, found: &DiscoveredDevice, instance_number: usize) -> DeviceInfo {
        let device = self.device(&found.address);
        let app_status = match device.app_status(&self.config.package).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("[{}] App status unavailable: {}", found.address, e);
                None
            }
        };
        DeviceInfo {
            address: found.address.clone(),
            port: found.port,
            instance_number,
            model: device.model().await,
            screen_size: device.screen_size().await,
            app_status,
            clipboard_available: bridge_available(&device).await,
        }
    }

    /// Device info from the last discovery
    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn session(&self, address: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound(address.to_string()))
    }

    async fn validate(&self, selection: &DeviceSelection) -> std::result::Result<Arc<Session>, String> {
        if selection.count == TargetCount::Fixed(0) {
            return Err("target count must be positive".to_string());
        }
        let session = self.session(&selection.address).map_err(|e| e.reason())?;
        if session.is_running() {
            return Err("session already running".to_string());
        }

        let device = session.device();
        if !device.is_reachable().await {
            return Err("device unreachable".to_string());
        }
        match device.is_app_installed(&self.config.package).await {
            Ok(true) => {}
            Ok(false) => return Err(format!("{} is not installed", self.config.package)),
            Err(e) => return Err(e.reason()),
        }
        if !bridge_available(device).await {
            return Err("clipboard bridge not available".to_string());
        }
        Ok(session)
    }

    /// Validate the selection and start a batch in the background.
    ///
    /// Devices failing readiness checks are reported in `rejected` and left
    /// out; the batch runs with whatever was accepted.
    pub async fn send_selected(
        &self,
        message: &str,
        selection: &[DeviceSelection],
        options: SendOptions,
    ) -> Result<BatchHandle> {
        if message.trim().is_empty() {
            return Err(Error::InvalidRequest("message is empty".to_string()));
        }

        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        let mut rejected = Vec::new();
        for entry in selection.iter().filter(|s| s.enabled) {
            if seen.insert(entry.address.as_str()) {
                candidates.push(entry);
            } else {
                rejected.push(Rejection {
                    address: entry.address.clone(),
                    reason: "selected more than once".to_string(),
                });
            }
        }

        let checks = join_all(candidates.iter().map(|entry| self.validate(entry))).await;
        let mut jobs = Vec::new();
        for (entry, check) in candidates.into_iter().zip(checks) {
            match check {
                Ok(session) => jobs.push((
                    session,
                    Campaign::new(message, entry.count, options.speed)
                        .with_skip(options.skip_first),
                )),
                Err(reason) => {
                    warn!("[{}] Rejected: {}", entry.address, reason);
                    rejected.push(Rejection {
                        address: entry.address.clone(),
                        reason,
                    });
                }
            }
        }

        let batch_id = Uuid::new_v4().to_string();
        let accepted: Vec<String> = jobs.iter().map(|(s, _)| s.address().to_string()).collect();
        info!(
            "Batch {}: {} accepted, {} rejected, {:?} at {}",
            batch_id,
            accepted.len(),
            rejected.len(),
            options.mode,
            options.speed.as_str()
        );
        let _ = self.events.send(Event::BatchStarted {
            batch_id: batch_id.clone(),
            devices: accepted.clone(),
            mode: options.mode,
            speed: options.speed.as_str(),
        });

        // Taken before spawning so a stop_all issued right after this call is seen
        let generation = self.stop_generation.load(Ordering::SeqCst);
        let span = info_span!("batch", id = %batch_id);
        let handle = tokio::spawn(
            run_batch(
                batch_id.clone(),
                options.mode,
                jobs,
                self.events.clone(),
                StopWatch {
                    counter: self.stop_generation.clone(),
                    generation,
                },
            )
            .instrument(span),
        );

        Ok(BatchHandle {
            batch_id,
            accepted,
            rejected,
            handle,
        })
    }

    /// Pause every running session. Returns how many were paused.
    pub fn pause_all(&self) -> usize {
        self.sessions().iter().filter(|s| s.pause()).count()
    }

    pub fn resume_all(&self) -> usize {
        self.sessions().iter().filter(|s| s.resume()).count()
    }

    /// Stop every running session and cancel devices still queued in
    /// sequential batches.
    pub fn stop_all(&self) -> usize {
        self.stop_generation.fetch_add(1, Ordering::SeqCst);
        self.sessions().iter().filter(|s| s.stop()).count()
    }

    pub async fn reset_all(&self) -> Result<()> {
        let sessions = self.sessions();
        let results = join_all(sessions.iter().map(|s| s.reset())).await;
        for (session, result) in sessions.iter().zip(results) {
            if let Err(e) = result {
                warn!("[{}] Reset failed: {}", session.address(), e);
            }
        }
        Ok(())
    }

    /// Launch the app on one device, go to its home surface and report the
    /// resulting status.
    pub async fn open_app(&self, address: &str) -> Result<AppStatus> {
        let session = self.session(address)?;
        let device = session.device();
        let package = &self.config.package;

        device.ensure_reachable().await?;
        device.launch(package).await?;
        sleep(std::time::Duration::from_millis(self.config.timing.app_launch)).await;
        device.tap(self.config.layout.home_button).await?;

        let status = device.app_status(package).await?;
        info!("[{}] {} is {}", address, package, status);
        Ok(status)
    }

    pub async fn open_app_all(&self) -> Vec<(String, Result<AppStatus>)> {
        let addresses: Vec<String> = self.sessions().iter().map(|s| s.address().to_string()).collect();
        let results = join_all(addresses.iter().map(|a| self.open_app(a))).await;
        addresses.into_iter().zip(results).collect()
    }

    /// Send `message` to the first friend on one device, leaving its
    /// campaign progress untouched.
    pub async fn test_send(&self, address: &str, message: &str, speed: Speed) -> Result<()> {
        if message.trim().is_empty() {
            return Err(Error::InvalidRequest("message is empty".to_string()));
        }
        self.session(address)?.test_send(message, speed).await
    }

    /// Test-send on every known device, one after another.
    pub async fn test_send_all(&self, message: &str, speed: Speed) -> Vec<(String, Result<()>)> {
        let mut results = Vec::new();
        for session in self.sessions() {
            let address = session.address().to_string();
            let result = self.test_send(&address, message, speed).await;
            match &result {
                Ok(()) => info!("[{}] Test send ok", address),
                Err(e) => warn!("[{}] Test send failed: {}", address, e),
            }
            results.push((address, result));
        }
        results
    }

    pub fn combined_status(&self) -> CombinedStatus {
        let sessions: Vec<SessionStatus> = self.sessions().iter().map(|s| s.status()).collect();
        CombinedStatus {
            total_sent: sessions.iter().map(|s| s.sent_count).sum(),
            total_failed: sessions.iter().map(|s| s.failed_count).sum(),
            any_running: sessions.iter().any(|s| s.is_running),
            any_paused: sessions.iter().any(|s| s.is_paused),
            sessions,
        }
    }
}

/// Whether `stop_all` has been called since a batch was accepted
#[derive(Debug, Clone)]
struct StopWatch {
    counter: Arc<AtomicU64>,
    generation: u64,
}

impl StopWatch {
    fn stopped(&self) -> bool {
        self.counter.load(Ordering::SeqCst) != self.generation
    }
}

async fn run_batch(
    batch_id: String,
    mode: BatchMode,
    jobs: Vec<(Arc<Session>, Campaign)>,
    events: broadcast::Sender<Event>,
    stop: StopWatch,
) -> BatchSummary {
    let reports: Vec<SessionReport> = match mode {
        BatchMode::Concurrent => {
            let handles = jobs.into_iter().map(|(session, campaign)| {
                let address = session.address().to_string();
                let stop = stop.clone();
                let task = tokio::spawn(
                    async move { session.run_unless(campaign, || stop.stopped()).await }
                        .in_current_span(),
                );
                async move { to_report(address, task.await.map_err(|e| Error::Task(e.to_string()))) }
            });
            join_all(handles).await.into_iter().flatten().collect()
        }
        BatchMode::Sequential => {
            let mut reports = Vec::new();
            for (session, campaign) in jobs {
                let address = session.address().to_string();
                let result = session.run_unless(campaign, || stop.stopped()).await;
                reports.extend(to_report(address, Ok(result)));
            }
            reports
        }
    };

    let summary = BatchSummary::new(batch_id, mode, reports);
    info!(
        "Batch complete: {} ok, {} errored, {} sent, {} failed",
        summary.completed,
        summary.errored,
        summary.total_sent(),
        summary.total_failed()
    );
    let _ = events.send(Event::BatchComplete {
        summary: summary.clone(),
    });
    summary
}

/// Report for one batch job. `None` when the device was skipped because the
/// batch was stopped before its campaign began.
fn to_report(
    address: String,
    result: Result<Result<Option<SessionReport>>>,
) -> Option<SessionReport> {
    match result.and_then(|r| r) {
        Ok(Some(report)) => Some(report),
        Ok(None) => {
            info!("[{}] Skipped, batch stopped", address);
            None
        }
        Err(e) => Some(SessionReport {
            address,
            state: RunState::Error,
            total: 0,
            sent: 0,
            failed: 0,
            error: Some(e.reason()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::ShellCommand;
    use crate::config::{ScreenLayout, TimingConfig};
    use crate::events::SessionEvent;
    use crate::test_support::FakeTransport;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const TWO_DEVICES: &str =
        "List of devices attached\n127.0.0.1:5565\tdevice\n127.0.0.1:5555\tdevice\n";

    fn quick_timing() -> TimingConfig {
        TimingConfig {
            after_tap: 10,
            after_type: 10,
            after_send: 10,
            between_targets: 10,
            page_load: 10,
            scroll_wait: 10,
            injection_step: 10,
            app_launch: 10,
            foreground_poll: 10,
            foreground_timeout: 100,
            pause_poll: 50,
        }
    }

    fn orchestrator(fake: &FakeTransport) -> (Orchestrator, TempDir) {
        let dir = tempdir().unwrap();
        let config = SenderConfig::new()
            .with_checkpoint_dir(dir.path())
            .with_timing(quick_timing());
        (
            Orchestrator::with_transport(config, Arc::new(fake.clone())),
            dir,
        )
    }

    fn select(addresses: &[&str], count: usize) -> Vec<DeviceSelection> {
        addresses
            .iter()
            .map(|a| DeviceSelection::new(*a, TargetCount::Fixed(count)))
            .collect()
    }

    fn options(mode: BatchMode) -> SendOptions {
        SendOptions {
            mode,
            speed: Speed::Normal,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_discover_numbers_instances_by_port() {
        let fake = FakeTransport::new().with_device_list(TWO_DEVICES);
        let (orchestrator, _dir) = orchestrator(&fake);

        let devices = orchestrator.discover().await.unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].address, "127.0.0.1:5555");
        assert_eq!(devices[0].instance_number, 1);
        assert_eq!(devices[1].instance_number, 2);
        assert_eq!(devices[0].app_status, Some(AppStatus::Foreground));
        assert_eq!(devices[0].model.as_deref(), Some("SM-G988N"));
        assert!(devices[0].clipboard_available);
        assert_eq!(orchestrator.sessions().len(), 2);
        assert!(orchestrator.session("127.0.0.1:5565").is_ok());
        assert!(matches!(
            orchestrator.session("127.0.0.1:5599"),
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rediscovery_drops_vanished_idle_sessions() {
        let fake = FakeTransport::new().with_device_list(TWO_DEVICES);
        let (orchestrator, _dir) = orchestrator(&fake);
        orchestrator.discover().await.unwrap();
        let kept = orchestrator.session("127.0.0.1:5555").unwrap();

        let fake = fake.with_device_list("List of devices attached\n127.0.0.1:5555\tdevice\n");
        orchestrator.discover().await.unwrap();

        assert_eq!(orchestrator.sessions().len(), 1);
        assert!(Arc::ptr_eq(&kept, &orchestrator.session("127.0.0.1:5555").unwrap()));
        assert_eq!(fake.connect_attempts().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_batch_runs_every_accepted_device() {
        let fake = FakeTransport::new().with_device_list(TWO_DEVICES);
        let (orchestrator, _dir) = orchestrator(&fake);
        let mut rx = orchestrator.subscribe();
        orchestrator.discover().await.unwrap();

        let handle = orchestrator
            .send_selected(
                "hello",
                &select(&["127.0.0.1:5555", "127.0.0.1:5565"], 2),
                options(BatchMode::Concurrent),
            )
            .await
            .unwrap();
        assert_eq!(handle.accepted.len(), 2);
        assert!(handle.rejected.is_empty());
        let batch_id = handle.batch_id.clone();

        let summary = handle.wait().await.unwrap();

        assert_eq!(summary.batch_id, batch_id);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.errored, 0);
        assert_eq!(summary.total_sent(), 4);
        assert_eq!(fake.taps_at(ScreenLayout::default().send_button), 4);

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event);
        }
        assert!(matches!(kinds.first(), Some(Event::BatchStarted { .. })));
        assert!(matches!(kinds.last(), Some(Event::BatchComplete { .. })));
        assert!(kinds.iter().any(|e| matches!(
            e,
            Event::Device { address, event: SessionEvent::Complete { .. } } if address == "127.0.0.1:5565"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_batch_runs_in_selection_order() {
        let fake = FakeTransport::new().with_device_list(TWO_DEVICES);
        let (orchestrator, _dir) = orchestrator(&fake);
        orchestrator.discover().await.unwrap();

        let summary = orchestrator
            .send_selected(
                "hello",
                &select(&["127.0.0.1:5565", "127.0.0.1:5555"], 2),
                options(BatchMode::Sequential),
            )
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.sessions[0].address, "127.0.0.1:5565");

        // Readiness checks run concurrently; campaigns begin at the first force-stop
        let start = fake
            .shell_commands()
            .iter()
            .position(|c| matches!(c, ShellCommand::ForceStop { .. }))
            .unwrap();
        let order = &fake.shell_addresses()[start..];
        assert_eq!(order[0], "127.0.0.1:5565");
        let last_first = order.iter().rposition(|a| a == "127.0.0.1:5565").unwrap();
        let first_second = order.iter().position(|a| a == "127.0.0.1:5555").unwrap();
        assert!(last_first < first_second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_cancels_queued_sequential_devices() {
        let fake = FakeTransport::new().with_device_list(TWO_DEVICES);
        let first_send = fake.notify_on_tap(ScreenLayout::default().send_button, 1);
        let (orchestrator, _dir) = orchestrator(&fake);
        orchestrator.discover().await.unwrap();

        let handle = orchestrator
            .send_selected(
                "hello",
                &select(&["127.0.0.1:5555", "127.0.0.1:5565"], 3),
                options(BatchMode::Sequential),
            )
            .await
            .unwrap();
        first_send.notified().await;
        assert_eq!(orchestrator.stop_all(), 1);

        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.sessions.len(), 1);
        assert_eq!(summary.sessions[0].state, RunState::Stopped);
        assert_eq!(summary.sessions[0].sent, 1);
        assert_eq!(
            orchestrator.session("127.0.0.1:5565").unwrap().status().state,
            RunState::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_right_after_send_selected_cancels_batch() {
        for mode in [BatchMode::Sequential, BatchMode::Concurrent] {
            let fake = FakeTransport::new().with_device_list(TWO_DEVICES);
            let (orchestrator, _dir) = orchestrator(&fake);
            orchestrator.discover().await.unwrap();

            let handle = orchestrator
                .send_selected(
                    "hello",
                    &select(&["127.0.0.1:5555", "127.0.0.1:5565"], 3),
                    options(mode),
                )
                .await
                .unwrap();
            assert_eq!(handle.accepted.len(), 2);
            orchestrator.stop_all();

            let summary = handle.wait().await.unwrap();
            assert!(summary.sessions.is_empty(), "{:?}", mode);
            assert_eq!(fake.taps_at(ScreenLayout::default().send_button), 0);
            assert!(!fake
                .shell_commands()
                .iter()
                .any(|c| matches!(c, ShellCommand::ForceStop { .. })));
            assert!(!orchestrator.combined_status().any_running);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_first_starts_further_down_the_list() {
        let fake = FakeTransport::new();
        let (orchestrator, _dir) = orchestrator(&fake);
        orchestrator.discover().await.unwrap();
        let layout = ScreenLayout::default();

        let summary = orchestrator
            .send_selected(
                "hello",
                &select(&["127.0.0.1:5555"], 2),
                SendOptions {
                    skip_first: 3,
                    ..options(BatchMode::Concurrent)
                },
            )
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(summary.total_sent(), 2);
        assert_eq!(summary.sessions[0].total, 2);
        assert_eq!(fake.taps_at(layout.row_position(3)), 1);
        assert_eq!(fake.taps_at(layout.row_position(4)), 1);
        assert_eq!(fake.taps_at(layout.row_position(0)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_reaches_first_friend_on_every_device() {
        let fake = FakeTransport::new().with_device_list(TWO_DEVICES);
        let (orchestrator, dir) = orchestrator(&fake);
        orchestrator.discover().await.unwrap();
        let layout = ScreenLayout::default();

        let results = orchestrator.test_send_all("ทดสอบ", Speed::Fast).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(fake.taps_at(layout.send_button), 2);
        assert_eq!(fake.taps_at(layout.friend_list_start), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(
            orchestrator.session("127.0.0.1:5555").unwrap().status().state,
            RunState::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_rejects_bad_requests() {
        let fake = FakeTransport::new().with_bridge(false);
        let (orchestrator, _dir) = orchestrator(&fake);
        orchestrator.discover().await.unwrap();

        assert!(matches!(
            orchestrator.test_send("127.0.0.1:5555", " ", Speed::Fast).await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            orchestrator.test_send("127.0.0.1:5599", "hi", Speed::Fast).await,
            Err(Error::DeviceNotFound(_))
        ));
        assert!(matches!(
            orchestrator.test_send("127.0.0.1:5555", "hi", Speed::Fast).await,
            Err(Error::Injection(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_all_and_resume_all() {
        let fake = FakeTransport::new().with_device_list(TWO_DEVICES);
        let first_send = fake.notify_on_tap(ScreenLayout::default().send_button, 1);
        let (orchestrator, _dir) = orchestrator(&fake);
        orchestrator.discover().await.unwrap();

        let handle = orchestrator
            .send_selected(
                "hello",
                &select(&["127.0.0.1:5555", "127.0.0.1:5565"], 3),
                options(BatchMode::Concurrent),
            )
            .await
            .unwrap();
        first_send.notified().await;
        sleep(Duration::from_millis(1)).await;

        assert_eq!(orchestrator.pause_all(), 2);
        sleep(Duration::from_secs(5)).await;
        let status = orchestrator.combined_status();
        assert!(status.any_paused);
        assert!(status.any_running);

        assert_eq!(orchestrator.resume_all(), 2);
        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.total_sent(), 6);
        assert!(!orchestrator.combined_status().any_running);
        assert_eq!(orchestrator.combined_status().total_sent, 6);
    }

    #[tokio::test]
    async fn test_rejections_are_reported_per_device() {
        let fake = FakeTransport::new().with_installed(false);
        let (orchestrator, _dir) = orchestrator(&fake);
        orchestrator.discover().await.unwrap();

        let mut selection = select(&["127.0.0.1:5555", "127.0.0.1:5599"], 5);
        selection.push(DeviceSelection {
            address: "127.0.0.1:5575".to_string(),
            enabled: false,
            count: TargetCount::Fixed(5),
        });
        let handle = orchestrator
            .send_selected("hello", &selection, options(BatchMode::Concurrent))
            .await
            .unwrap();

        assert!(handle.accepted.is_empty());
        assert_eq!(handle.rejected.len(), 2);
        assert!(handle.rejected[0].reason.contains("not installed"));
        assert!(handle.rejected[1].reason.contains("Device not found"));

        let summary = handle.wait().await.unwrap();
        assert!(summary.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_missing_bridge_and_zero_count_are_rejected() {
        let fake = FakeTransport::new().with_bridge(false);
        let (orchestrator, _dir) = orchestrator(&fake);
        orchestrator.discover().await.unwrap();

        let handle = orchestrator
            .send_selected(
                "hello",
                &select(&["127.0.0.1:5555"], 5),
                options(BatchMode::Concurrent),
            )
            .await
            .unwrap();
        assert_eq!(handle.rejected[0].reason, "clipboard bridge not available");

        let handle = orchestrator
            .send_selected(
                "hello",
                &select(&["127.0.0.1:5555"], 0),
                options(BatchMode::Concurrent),
            )
            .await
            .unwrap();
        assert_eq!(handle.rejected[0].reason, "target count must be positive");
    }

    #[tokio::test]
    async fn test_unreachable_device_is_rejected() {
        let fake = FakeTransport::new();
        let (orchestrator, _dir) = orchestrator(&fake);
        orchestrator.discover().await.unwrap();
        let _ = fake.with_reachable(false);

        let handle = orchestrator
            .send_selected(
                "hello",
                &select(&["127.0.0.1:5555"], 5),
                options(BatchMode::Sequential),
            )
            .await
            .unwrap();
        assert_eq!(handle.rejected[0].reason, "device unreachable");
    }

    #[tokio::test]
    async fn test_empty_message_is_invalid() {
        let (orchestrator, _dir) = orchestrator(&FakeTransport::new());
        assert!(matches!(
            orchestrator
                .send_selected("  ", &[], SendOptions::default())
                .await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_app_launches_and_reports_status() {
        let fake = FakeTransport::new().with_foreground(false).with_running(false);
        let (orchestrator, _dir) = orchestrator(&fake);
        orchestrator.discover().await.unwrap();

        let status = orchestrator.open_app("127.0.0.1:5555").await.unwrap();
        assert_eq!(status, AppStatus::Foreground);
        assert_eq!(
            fake.count(&ShellCommand::Launch {
                package: "jp.naver.line.android".to_string()
            }),
            1
        );

        let all = orchestrator.open_app_all().await;
        assert_eq!(all.len(), 1);
        assert!(all[0].1.is_ok());
    }
}
