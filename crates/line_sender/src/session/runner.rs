//! One device's send campaign

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{error, info, info_span, warn, Instrument};

use super::checkpoint::{resume_point, CheckpointInfo, CheckpointRecord, CheckpointStore, ResumePoint};
use super::state::{Control, Progress, RunState, SessionStatus, TargetCount};
use super::traversal::Traversal;
use crate::adb::Device;
use crate::config::{SenderConfig, Speed};
use crate::error::{Error, Result};
use crate::events::{Event, SessionEvent, SessionReport};

/// What one campaign sends, to how many targets, and how fast
#[derive(Debug, Clone)]
pub struct Campaign {
    pub message: String,
    pub count: TargetCount,
    pub speed: Speed,
    /// Friend-list rows passed over before the first target
    pub skip: usize,
}

impl Campaign {
    pub fn new(message: impl Into<String>, count: TargetCount, speed: Speed) -> Self {
        Self {
            message: message.into(),
            count,
            speed,
            skip: 0,
        }
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }
}

/// Clears the running flag however the campaign ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Send campaign state for one device.
///
/// Controls (`pause`, `resume`, `stop`, `reset`) may be called from any task
/// while `run` drives the campaign; the loop observes them between targets.
pub struct Session {
    device: Device,
    config: Arc<SenderConfig>,
    store: CheckpointStore,
    events: broadcast::Sender<Event>,
    control: watch::Sender<Control>,
    progress: Mutex<Progress>,
    running: AtomicBool,
    reset_pending: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Session {
    pub fn new(device: Device, config: Arc<SenderConfig>, events: broadcast::Sender<Event>) -> Self {
        let (control, _) = watch::channel(Control::Run);
        Self {
            store: CheckpointStore::new(&config.checkpoint_dir),
            device,
            config,
            events,
            control,
            progress: Mutex::new(Progress::default()),
            running: AtomicBool::new(false),
            reset_pending: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &str {
        self.device.address()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(Event::Device {
            address: self.address().to_string(),
            event,
        });
    }

    pub fn status(&self) -> SessionStatus {
        let progress = self.progress();
        SessionStatus {
            address: self.address().to_string(),
            state: progress.state,
            is_running: self.is_running(),
            is_paused: progress.state == RunState::Paused,
            cursor: progress.cursor,
            total: progress.total,
            sent_count: progress.sent.len(),
            failed_count: progress.failed.len(),
            last_updated: progress.last_updated,
            error: progress.error.clone(),
        }
    }

    /// Saved progress, if a checkpoint exists for this device
    pub async fn saved_checkpoint(&self) -> Result<Option<CheckpointInfo>> {
        Ok(self
            .store
            .load(self.address())
            .await?
            .map(|record| record.info()))
    }

    pub async fn clear_checkpoint(&self) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning(self.address().to_string()));
        }
        self.store.delete(self.address()).await
    }

    pub fn pause(&self) -> bool {
        {
            let mut progress = self.progress();
            if !self.is_running() || progress.state != RunState::Running {
                return false;
            }
            progress.state = RunState::Paused;
        }
        self.control.send_replace(Control::Pause);
        info!("[{}] Paused", self.address());
        self.emit(SessionEvent::Paused);
        true
    }

    pub fn resume(&self) -> bool {
        {
            let mut progress = self.progress();
            if progress.state != RunState::Paused {
                return false;
            }
            progress.state = RunState::Running;
        }
        self.control.send_replace(Control::Run);
        info!("[{}] Resumed", self.address());
        self.emit(SessionEvent::Resumed);
        true
    }

    /// Request a stop. The target in flight finishes first.
    pub fn stop(&self) -> bool {
        {
            // Same lock as the start of `run`, so a stop is never overwritten
            let mut progress = self.progress();
            if !self.is_running() || !progress.state.is_active() {
                return false;
            }
            progress.state = RunState::Stopping;
            self.control.send_replace(Control::Stop);
        }
        info!("[{}] Stopping", self.address());
        self.emit(SessionEvent::Stopping);
        true
    }

    /// Clear progress and the checkpoint. A running campaign is stopped first
    /// and reset once its loop exits.
    pub async fn reset(&self) -> Result<()> {
        if self.is_running() {
            self.reset_pending.store(true, Ordering::SeqCst);
            self.stop();
            return Ok(());
        }
        self.apply_reset().await
    }

    async fn apply_reset(&self) -> Result<()> {
        *self.progress() = Progress::default();
        self.store.delete(self.address()).await?;
        info!("[{}] Reset", self.address());
        self.emit(SessionEvent::Reset);
        Ok(())
    }

    /// Drive one campaign to completion, stop or session error.
    ///
    /// Only a concurrent run or an empty request is rejected; everything that
    /// goes wrong on the device ends up in the returned report.
    pub async fn run(&self, campaign: Campaign) -> Result<SessionReport> {
        self.run_unless(campaign, || false)
            .await?
            .ok_or_else(|| Error::Task(format!("{}: campaign cancelled", self.address())))
    }

    /// Like `run`, but gives up without touching the device when `cancelled`
    /// already holds at start. `None` means the campaign never started.
    pub(crate) async fn run_unless(
        &self,
        campaign: Campaign,
        cancelled: impl Fn() -> bool,
    ) -> Result<Option<SessionReport>> {
        if campaign.count == TargetCount::Fixed(0) {
            return Err(Error::InvalidRequest("target count must be positive".to_string()));
        }
        {
            let mut progress = self.progress();
            if cancelled() {
                info!("[{}] Cancelled before start", self.address());
                return Ok(None);
            }
            if self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return Err(Error::AlreadyRunning(self.address().to_string()));
            }
            *progress = Progress {
                state: RunState::Preparing,
                ..Default::default()
            };
            self.control.send_replace(Control::Run);
        }
        let _guard = RunningGuard(&self.running);
        self.reset_pending.store(false, Ordering::SeqCst);

        let span = info_span!("session", device = %self.address());
        let report = self.run_campaign(&campaign).instrument(span).await;

        if self.reset_pending.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.apply_reset().await {
                warn!("[{}] Reset after stop failed: {}", self.address(), e);
            }
        }
        Ok(Some(report))
    }

    /// Send `message` to the first friend only, without touching progress or
    /// the checkpoint.
    pub async fn test_send(&self, message: &str, speed: Speed) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyRunning(self.address().to_string()));
        }
        let _guard = RunningGuard(&self.running);

        let config = &self.config;
        let traversal = Traversal::new(
            &self.device,
            &config.package,
            &config.layout,
            &config.timing,
            speed,
        );
        async {
            self.device.ensure_reachable().await?;
            if traversal.ensure_running().await? {
                info!("App was not running, launched it");
            }
            traversal.send_to(0, message).await?;
            info!("Test send to Friend #1 succeeded");
            Ok::<(), Error>(())
        }
        .instrument(info_span!("test_send", device = %self.address()))
        .await
    }

    async fn run_campaign(&self, campaign: &Campaign) -> SessionReport {
        let config = &self.config;
        info!(
            "Preparing campaign ({:?}, skip {}, speed {})",
            campaign.count,
            campaign.skip,
            campaign.speed.as_str()
        );
        self.emit(SessionEvent::Preparing);

        let traversal = Traversal::new(
            &self.device,
            &config.package,
            &config.layout,
            &config.timing,
            campaign.speed,
        );

        self.emit(SessionEvent::Restarting);
        if let Err(e) = traversal.restart_app().await {
            warn!("App restart failed, continuing: {}", e);
        }

        let total = match campaign.count {
            TargetCount::Fixed(n) => n,
            TargetCount::All => {
                self.set_state_unless_stopping(RunState::DetectingFriends);
                self.emit(SessionEvent::DetectingFriends);
                match traversal.detect_friend_count().await {
                    Ok(count) if count > campaign.skip => {
                        info!("Detected {} friends", count);
                        self.emit(SessionEvent::FriendsDetected { count });
                        count - campaign.skip
                    }
                    Ok(count) => {
                        return self.fail(Error::InvalidRequest(format!(
                            "skipping {} leaves none of the {} friends",
                            campaign.skip, count
                        )))
                    }
                    Err(e) => return self.fail(e),
                }
            }
        };

        self.restore(total, campaign.skip).await;
        {
            let mut progress = self.progress();
            if progress.state != RunState::Stopping {
                progress.state = RunState::Running;
            }
        }

        let stopped = self.send_loop(&traversal, campaign, total).await;

        if stopped {
            let record = {
                let mut progress = self.progress();
                progress.state = RunState::Stopped;
                self.snapshot(&progress, false)
            };
            if record.cursor > 0 {
                if let Err(e) = self.store.save(&record).await {
                    warn!("Checkpoint write failed: {}", e);
                }
            }
            info!("Stopped at {}/{}", record.cursor, total);
            self.emit(SessionEvent::Stopped {
                cursor: record.cursor,
                total,
            });
        } else {
            self.progress().state = RunState::Complete;
            if let Err(e) = self.store.delete(self.address()).await {
                warn!("Could not delete completed checkpoint: {}", e);
            }
            let summary = self.report();
            info!(
                "Campaign complete: {} sent, {} failed of {}",
                summary.sent, summary.failed, summary.total
            );
            self.emit(SessionEvent::Complete { summary });
        }
        self.report()
    }

    /// Load the checkpoint and position the cursor for a campaign of `total`
    /// targets starting `skip` rows down the list.
    async fn restore(&self, total: usize, skip: usize) {
        let saved = match self.store.load(self.address()).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Ignoring unreadable checkpoint: {}", e);
                None
            }
        };

        match resume_point(saved, total, skip) {
            ResumePoint::Resume(record) => {
                let event = {
                    let mut progress = self.progress();
                    progress.cursor = record.cursor;
                    progress.total = total;
                    progress.skip = skip;
                    progress.sent = record.sent;
                    progress.failed = record.failed;
                    progress.last_updated = Some(record.last_updated);
                    SessionEvent::Resume {
                        cursor: progress.cursor,
                        total,
                        sent: progress.sent.len(),
                        failed: progress.failed.len(),
                    }
                };
                info!("Resuming at {}/{}", record.cursor, total);
                self.emit(event);
            }
            point => {
                if let ResumePoint::Discard(reason) = point {
                    let err = Error::StateConsistency(reason);
                    warn!("Discarding checkpoint: {}", err);
                    if let Err(e) = self.store.delete(self.address()).await {
                        warn!("Could not delete checkpoint: {}", e);
                    }
                }
                {
                    let mut progress = self.progress();
                    progress.total = total;
                    progress.skip = skip;
                }
                info!("Starting fresh with {} targets", total);
                self.emit(SessionEvent::Start { total });
            }
        }
    }

    /// Process targets until the cursor reaches `total`. Returns whether the
    /// loop ended on a stop request.
    async fn send_loop(&self, traversal: &Traversal<'_>, campaign: &Campaign, total: usize) -> bool {
        let started = Instant::now();
        let every = self.config.health_check_every;
        let between = campaign.speed.scale(self.config.timing.between_targets);
        let mut processed = 0usize;

        loop {
            let index = self.progress().cursor;
            if index >= total {
                return false;
            }
            if self.wait_while_paused().await == Control::Stop {
                return true;
            }

            if every > 0 && processed > 0 && processed % every == 0 {
                match traversal.ensure_running().await {
                    Ok(true) => info!("App restarted by health check"),
                    Ok(false) => {}
                    Err(e) => warn!("Health check failed: {}", e),
                }
            }

            let target = campaign.skip + index;
            let result = match AssertUnwindSafe(traversal.send_to(target, &campaign.message))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.reason()),
                Err(panic) => Err(format!("unexpected failure: {}", panic_message(&*panic))),
            };
            processed += 1;

            let label = format!("Friend #{}", target + 1);
            match &result {
                Ok(()) => info!("Sent to {} ({}/{})", label, index + 1, total),
                Err(e) => warn!("Failed {} ({}/{}): {}", label, index + 1, total, e),
            }
            let error = result.as_ref().err().cloned();

            let record = {
                let mut progress = self.progress();
                progress.record(target, result);
                self.snapshot(&progress, true)
            };
            if let Err(e) = self.store.save(&record).await {
                warn!("Checkpoint write failed: {}", e);
            }

            let remaining = total - record.cursor;
            let per_target = started.elapsed().as_secs_f64() / processed as f64;
            self.emit(SessionEvent::Sent {
                cursor: record.cursor,
                total,
                target_label: label,
                success: error.is_none(),
                error,
                eta_secs: (per_target * remaining as f64).round() as u64,
            });

            if remaining > 0 && self.wait_or_stop(between).await == Control::Stop {
                return true;
            }
        }
    }

    /// Block while paused. Returns the control that ended the wait.
    async fn wait_while_paused(&self) -> Control {
        let mut rx = self.control.subscribe();
        let poll = Duration::from_millis(self.config.timing.pause_poll);
        loop {
            let control = *rx.borrow_and_update();
            if control != Control::Pause {
                return control;
            }
            tokio::select! {
                _ = rx.changed() => {}
                _ = sleep(poll) => {}
            }
        }
    }

    /// Sleep for `duration`, returning early with `Stop` on a stop request.
    async fn wait_or_stop(&self, duration: Duration) -> Control {
        let deadline = Instant::now() + duration;
        let mut rx = self.control.subscribe();
        loop {
            if *rx.borrow_and_update() == Control::Stop {
                return Control::Stop;
            }
            tokio::select! {
                _ = sleep_until(deadline) => return Control::Run,
                _ = rx.changed() => {}
            }
        }
    }

    fn set_state_unless_stopping(&self, state: RunState) {
        let mut progress = self.progress();
        if progress.state != RunState::Stopping {
            progress.state = state;
        }
    }

    fn fail(&self, e: Error) -> SessionReport {
        let reason = e.reason();
        {
            let mut progress = self.progress();
            progress.state = RunState::Error;
            progress.error = Some(reason.clone());
        }
        error!("Session failed: {}", reason);
        self.emit(SessionEvent::Error { reason });
        self.report()
    }

    fn snapshot(&self, progress: &Progress, is_running: bool) -> CheckpointRecord {
        CheckpointRecord {
            device_address: self.address().to_string(),
            cursor: progress.cursor,
            total: progress.total,
            skip: progress.skip,
            sent: progress.sent.clone(),
            failed: progress.failed.clone(),
            last_updated: progress.last_updated.unwrap_or_else(chrono::Utc::now),
            is_running,
            is_paused: progress.state == RunState::Paused,
        }
    }

    fn report(&self) -> SessionReport {
        let progress = self.progress();
        SessionReport {
            address: self.address().to_string(),
            state: progress.state,
            total: progress.total,
            sent: progress.sent.len(),
            failed: progress.failed.len(),
            error: progress.error.clone(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
