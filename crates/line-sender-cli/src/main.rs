//! line-sender CLI - Send one message to many LINE friends across emulator instances
//!
//! Usage:
//!     line-sender [OPTIONS] [MESSAGE]
//!
//! Environment Variables:
//!     LINE_SENDER_ADB: Path to the adb binary (default: adb)
//!     LINE_SENDER_APP: App name or package to drive (default: LINE)
//!     LINE_SENDER_STATE_DIR: Directory for resume checkpoints (default: data)
//!     LINE_SENDER_LOG: Log filter (default: line_sender=info,line_sender_cli=info,warn)

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use line_sender::{
    get_package_name, list_supported_apps, BatchMode, BatchSummary, DeviceInfo, DeviceSelection,
    Event, Orchestrator, ScreenLayout, SendOptions, SenderConfig, SessionEvent, Speed,
    TargetCount,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// line-sender - Multi-instance LINE message sending
#[derive(Parser, Debug)]
#[command(name = "line-sender")]
#[command(about = "Send a message to LINE friends on every running emulator instance")]
#[command(after_help = r#"Examples:
    # List discovered instances and their app status
    line-sender --list-devices

    # Send to the first 50 friends on every instance at once
    line-sender --count 50 "สวัสดีครับ"

    # Send to every friend, one instance after another, at normal speed
    line-sender --count all --sequential --speed normal "Hello!"

    # Only use two instances
    line-sender --devices 127.0.0.1:5555,127.0.0.1:5565 "Hi"

    # Skip the first 30 friends, then send to the next 50
    line-sender --skip 30 --count 50 "Hi again"

    # Send to the first friend on every instance to check the coordinates
    line-sender --test-send "test"

    # Launch the app on every instance and exit
    line-sender --open-app

    # Show or clear saved progress
    line-sender --saved-state
    line-sender --clear-state 127.0.0.1:5555

While sending, type pause, resume, stop or status and press Enter.
"#)]
struct Cli {
    // Device options
    /// Path to the adb binary
    #[arg(long, env = "LINE_SENDER_ADB", default_value = "adb")]
    adb_path: String,

    /// App name (see --list-apps) or package name
    #[arg(long, alias = "package", env = "LINE_SENDER_APP", default_value = "LINE")]
    app: String,

    /// Comma-separated device addresses to use (default: all discovered)
    #[arg(short = 'd', long, value_delimiter = ',')]
    devices: Vec<String>,

    /// List discovered instances and exit
    #[arg(long)]
    list_devices: bool,

    /// Launch the app on every instance and exit
    #[arg(long)]
    open_app: bool,

    // Sending options
    /// Targets per device: a number or 'all' to detect the friend count
    #[arg(short = 'n', long, default_value = "20")]
    count: TargetCount,

    /// Speed preset: normal, fast, turbo or a multiplier such as x0.75
    #[arg(short = 's', long, default_value = "fast")]
    speed: Speed,

    /// Run devices one after another instead of concurrently
    #[arg(long)]
    sequential: bool,

    /// Skip the first N friends in the list
    #[arg(long, value_name = "N", default_value = "0")]
    skip: usize,

    /// Send only to the first friend on every instance, then exit
    #[arg(long)]
    test_send: bool,

    /// JSON file overriding the screen coordinates
    #[arg(long, value_name = "FILE")]
    layout: Option<PathBuf>,

    // State options
    /// Directory for resume checkpoints
    #[arg(long, env = "LINE_SENDER_STATE_DIR", default_value = "data")]
    state_dir: PathBuf,

    /// Show saved progress per device and exit
    #[arg(long)]
    saved_state: bool,

    /// Delete saved progress for a device (or 'all') and exit
    #[arg(long, value_name = "ADDRESS")]
    clear_state: Option<String>,

    // Other options
    /// Also write daily-rotated logs into this directory
    #[arg(long, env = "LINE_SENDER_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// List supported apps and exit
    #[arg(long)]
    list_apps: bool,

    /// Message to send (prompted for if not provided)
    message: Option<String>,
}

/// Install the stderr subscriber, plus a rolling file layer when asked.
fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_env("LINE_SENDER_LOG")
        .unwrap_or_else(|_| EnvFilter::new("line_sender=info,line_sender_cli=info,warn"));

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "line-sender.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true)
                        .with_timer(fmt::time::ChronoLocal::new(
                            "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                        )),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
            Ok(None)
        }
    }
}

/// Accept either a known app name or a raw package name
fn resolve_package(app: &str) -> Result<String> {
    if let Some(package) = get_package_name(app) {
        return Ok(package.to_string());
    }
    if app.contains('.') {
        return Ok(app.to_string());
    }
    Err(anyhow!(
        "Unknown app '{}'. Supported: {}",
        app,
        list_supported_apps().join(", ")
    ))
}

fn load_layout(path: &Path) -> Result<ScreenLayout> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading layout {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing layout {}", path.display()))
}

fn print_supported_apps() {
    println!("Supported apps:");
    for app in list_supported_apps() {
        if let Some(package) = get_package_name(app) {
            println!("  - {:<12} {}", app, package);
        }
    }
}

fn print_devices(devices: &[DeviceInfo]) {
    if devices.is_empty() {
        println!("No instances found.");
        return;
    }
    println!("Discovered instances:");
    println!("{}", "-".repeat(72));
    for device in devices {
        let status = device
            .app_status
            .map(|s| s.label())
            .unwrap_or("Unknown");
        let bridge = if device.clipboard_available {
            "\u{2713}"
        } else {
            "\u{2717}"
        };
        let model = device
            .model
            .as_ref()
            .map(|m| format!(" ({})", m))
            .unwrap_or_default();
        println!(
            "  #{:<2} {:<22} {}x{:<6} app: {:<20} clipboard: {}{}",
            device.instance_number,
            device.address,
            device.screen_size.width,
            device.screen_size.height,
            status,
            bridge,
            model
        );
    }
}

/// Check system requirements before sending
async fn check_system_requirements(
    orchestrator: &Orchestrator,
    adb_path: &str,
) -> Result<Vec<DeviceInfo>> {
    println!("\u{1F50D} Checking system requirements...");
    println!("{}", "-".repeat(50));

    // Check 1: adb available
    print!("1. Checking adb installation... ");
    io::stdout().flush().ok();
    match which::which(adb_path) {
        Ok(path) => println!("\u{2705} OK ({})", path.display()),
        Err(_) => {
            println!("\u{274C} FAILED");
            println!("   Error: {} is not installed or not in PATH.", adb_path);
            println!("   Solution:");
            println!("     1. Install Android platform-tools, or");
            println!("     2. Point --adb-path at your emulator's bundled adb (e.g. HD-Adb)");
            println!("{}", "-".repeat(50));
            bail!("System check failed");
        }
    }

    // Check 2: instances reachable
    print!("2. Discovering emulator instances... ");
    io::stdout().flush().ok();
    let devices = match orchestrator.discover().await {
        Ok(devices) if devices.is_empty() => {
            println!("\u{274C} FAILED");
            println!("   Error: No instances found.");
            println!("   Solution:");
            println!("     1. Start your emulator instances");
            println!("     2. Enable ADB in each instance's settings");
            println!(
                "     3. Verify: {} connect 127.0.0.1:5555",
                adb_path
            );
            println!("{}", "-".repeat(50));
            bail!("System check failed");
        }
        Ok(devices) => {
            let display: Vec<&str> = devices.iter().take(3).map(|d| d.address.as_str()).collect();
            let suffix = if devices.len() > 3 { "..." } else { "" };
            println!(
                "\u{2705} OK ({} instance(s): {}{})",
                devices.len(),
                display.join(", "),
                suffix
            );
            devices
        }
        Err(e) => {
            println!("\u{274C} FAILED");
            println!("   Error: {}", e);
            println!("{}", "-".repeat(50));
            bail!("System check failed");
        }
    };

    // Check 3: app and clipboard bridge, reported per instance
    print!("3. Checking app and clipboard bridge... ");
    io::stdout().flush().ok();
    let missing: Vec<&DeviceInfo> = devices
        .iter()
        .filter(|d| !d.clipboard_available || !d.app_status.is_some_and(|s| s.is_installed()))
        .collect();
    if missing.is_empty() {
        println!("\u{2705} OK");
    } else {
        println!("\u{26A0}\u{FE0F}  WARNING");
        for device in &missing {
            if !device.app_status.is_some_and(|s| s.is_installed()) {
                println!("   {}: {} is not installed", device.address, orchestrator.config().package);
            }
            if !device.clipboard_available {
                println!("   {}: clipboard bridge (Clipper) not responding", device.address);
            }
        }
        println!("   These instances will be skipped.");
    }

    println!("{}", "-".repeat(50));
    println!("\u{2705} System checks done!\n");
    Ok(devices)
}

fn prompt_message() -> Result<Option<String>> {
    print!("Enter message to send: ");
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    let message = input.trim_end_matches(['\r', '\n']).to_string();
    Ok((!message.trim().is_empty()).then_some(message))
}

fn print_event(event: &Event) {
    match event {
        Event::BatchStarted {
            batch_id,
            devices,
            mode,
            speed,
        } => {
            println!(
                "\u{1F680} Batch {} started on {} device(s) ({:?}, {})",
                batch_id,
                devices.len(),
                mode,
                speed
            );
        }
        Event::BatchComplete { .. } => {}
        Event::Device { address, event } => match event {
            SessionEvent::Preparing => println!("[{}] Preparing...", address),
            SessionEvent::Restarting => println!("[{}] Restarting app...", address),
            SessionEvent::DetectingFriends => println!("[{}] Detecting friend count...", address),
            SessionEvent::FriendsDetected { count } => {
                println!("[{}] Found {} friends", address, count)
            }
            SessionEvent::Start { total } => println!("[{}] Sending to {} friends", address, total),
            SessionEvent::Resume {
                cursor,
                total,
                sent,
                failed,
            } => println!(
                "[{}] Resuming at {}/{} ({} sent, {} failed)",
                address, cursor, total, sent, failed
            ),
            SessionEvent::Sent {
                cursor,
                total,
                target_label,
                success,
                error,
                eta_secs,
            } => {
                let icon = if *success { "\u{2713}" } else { "\u{2717}" };
                let detail = error
                    .as_ref()
                    .map(|e| format!(" - {}", e))
                    .unwrap_or_default();
                println!(
                    "[{}] {} {}/{} {}{} (ETA {}m{:02}s)",
                    address,
                    icon,
                    cursor,
                    total,
                    target_label,
                    detail,
                    eta_secs / 60,
                    eta_secs % 60
                );
            }
            SessionEvent::Paused => println!("[{}] \u{23F8}  Paused", address),
            SessionEvent::Resumed => println!("[{}] \u{25B6}  Resumed", address),
            SessionEvent::Stopping => println!("[{}] Stopping after current friend...", address),
            SessionEvent::Stopped { cursor, total } => {
                println!("[{}] \u{23F9}  Stopped at {}/{} (progress saved)", address, cursor, total)
            }
            SessionEvent::Complete { summary } => println!(
                "[{}] \u{2705} Done: {} sent, {} failed",
                address, summary.sent, summary.failed
            ),
            SessionEvent::Error { reason } => println!("[{}] \u{274C} {}", address, reason),
            SessionEvent::Reset => println!("[{}] Progress cleared", address),
        },
    }
}

fn print_summary(summary: &BatchSummary) {
    println!("\n{}", "=".repeat(50));
    println!("Batch {} ({:?})", summary.batch_id, summary.mode);
    println!("{}", "-".repeat(50));
    for report in &summary.sessions {
        let error = report
            .error
            .as_ref()
            .map(|e| format!(" - {}", e))
            .unwrap_or_default();
        println!(
            "  {:<22} {:<10} {}/{} sent, {} failed{}",
            report.address, report.state, report.sent, report.total, report.failed, error
        );
    }
    println!("{}", "-".repeat(50));
    println!(
        "Devices: {} completed, {} errored | Messages: {} sent, {} failed",
        summary.completed,
        summary.errored,
        summary.total_sent(),
        summary.total_failed()
    );
    println!("{}", "=".repeat(50));
}

/// Map stdin lines to pause/resume/stop while a batch runs
async fn run_controls(orchestrator: Arc<Orchestrator>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim().to_lowercase().as_str() {
            "pause" | "p" => {
                let n = orchestrator.pause_all();
                println!("Pausing {} session(s)", n);
            }
            "resume" | "r" => {
                let n = orchestrator.resume_all();
                println!("Resuming {} session(s)", n);
            }
            "stop" | "s" | "quit" | "q" => {
                let n = orchestrator.stop_all();
                println!("Stopping {} session(s)", n);
            }
            "status" => {
                let status = orchestrator.combined_status();
                for s in &status.sessions {
                    println!(
                        "  {:<22} {:<10} {}/{} ({} sent, {} failed)",
                        s.address, s.state, s.cursor, s.total, s.sent_count, s.failed_count
                    );
                }
            }
            "" => {}
            other => println!("Unknown command '{}'. Use pause, resume, stop or status.", other),
        }
    }
}

async fn handle_state_commands(orchestrator: &Orchestrator, args: &Cli) -> Result<bool> {
    if args.saved_state {
        orchestrator.discover().await?;
        println!("Saved progress:");
        println!("{}", "-".repeat(60));
        for session in orchestrator.sessions() {
            match session.saved_checkpoint().await? {
                Some(info) => println!(
                    "  {:<22} {}/{} ({} sent, {} failed, skip {}) at {}",
                    session.address(),
                    info.cursor,
                    info.total,
                    info.sent_count,
                    info.failed_count,
                    info.skip,
                    info.last_updated.format("%Y-%m-%d %H:%M:%S")
                ),
                None => println!("  {:<22} none", session.address()),
            }
        }
        return Ok(true);
    }

    if let Some(target) = &args.clear_state {
        orchestrator.discover().await?;
        if target.eq_ignore_ascii_case("all") {
            orchestrator.reset_all().await?;
            println!("\u{2713} Cleared saved progress on all devices");
        } else {
            orchestrator.session(target)?.clear_checkpoint().await?;
            println!("\u{2713} Cleared saved progress for {}", target);
        }
        return Ok(true);
    }

    Ok(false)
}

fn print_header(config: &SenderConfig, args: &Cli) {
    println!("{}", "=".repeat(50));
    println!("LINE Sender");
    println!("{}", "=".repeat(50));
    println!("Package: {}", config.package);
    println!("Count: {:?}", args.count);
    println!("Skip first: {}", args.skip);
    println!("Speed: {}", args.speed.as_str());
    println!(
        "Mode: {}",
        if args.sequential { "sequential" } else { "concurrent" }
    );
    println!("State Dir: {}", config.checkpoint_dir.display());
    println!("{}", "=".repeat(50));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let _log_guard = init_logging(args.log_dir.as_deref())?;

    // Handle --list-apps (no system check needed)
    if args.list_apps {
        print_supported_apps();
        return Ok(());
    }

    let mut config = SenderConfig::new()
        .with_adb_path(&args.adb_path)
        .with_package(resolve_package(&args.app)?)
        .with_checkpoint_dir(&args.state_dir);
    if let Some(path) = &args.layout {
        config = config.with_layout(load_layout(path)?);
    }

    let orchestrator = Arc::new(Orchestrator::new(config));

    if handle_state_commands(&orchestrator, &args).await? {
        return Ok(());
    }

    if args.list_devices {
        let devices = orchestrator.discover().await?;
        print_devices(&devices);
        return Ok(());
    }

    if args.open_app {
        orchestrator.discover().await?;
        for (address, result) in orchestrator.open_app_all().await {
            match result {
                Ok(status) => println!("\u{2713} {}: {}", address, status.label()),
                Err(e) => println!("\u{2717} {}: {}", address, e),
            }
        }
        return Ok(());
    }

    let devices = match check_system_requirements(&orchestrator, &args.adb_path).await {
        Ok(devices) => devices,
        Err(_) => {
            println!("\u{274C} System check failed. Please fix the issues above.");
            std::process::exit(1);
        }
    };

    let message = match &args.message {
        Some(message) => message.clone(),
        None => match prompt_message()? {
            Some(message) => message,
            None => {
                println!("No message given. Goodbye!");
                return Ok(());
            }
        },
    };

    if args.test_send {
        println!("\n\u{1F9EA} Test send to the first friend on every instance\n");
        let results = if args.devices.is_empty() {
            orchestrator.test_send_all(&message, args.speed).await
        } else {
            let mut results = Vec::new();
            for address in &args.devices {
                let address = address.trim().to_string();
                let result = orchestrator.test_send(&address, &message, args.speed).await;
                results.push((address, result));
            }
            results
        };
        let mut failed = 0;
        for (address, result) in results {
            match result {
                Ok(()) => println!("\u{2705} {}: sent to Friend #1", address),
                Err(e) => {
                    failed += 1;
                    println!("\u{274C} {}: {}", address, e);
                }
            }
        }
        if failed > 0 {
            std::process::exit(2);
        }
        return Ok(());
    }

    print_header(orchestrator.config(), &args);

    let selection: Vec<DeviceSelection> = if args.devices.is_empty() {
        devices
            .iter()
            .map(|d| DeviceSelection::new(&d.address, args.count))
            .collect()
    } else {
        args.devices
            .iter()
            .map(|a| DeviceSelection::new(a.trim(), args.count))
            .collect()
    };

    let options = SendOptions {
        mode: if args.sequential {
            BatchMode::Sequential
        } else {
            BatchMode::Concurrent
        },
        speed: args.speed,
        skip_first: args.skip,
    };

    let mut events = orchestrator.subscribe();
    let batch = orchestrator
        .send_selected(&message, &selection, options)
        .await?;

    for rejection in &batch.rejected {
        println!("\u{26A0}\u{FE0F}  Skipping {}: {}", rejection.address, rejection.reason);
    }
    if batch.accepted.is_empty() {
        bail!("No device could start sending");
    }

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = matches!(event, Event::BatchComplete { .. });
                    print_event(&event);
                    if done {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event printer lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let controls = tokio::spawn(run_controls(orchestrator.clone()));
    let interrupt = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nInterrupted, stopping after the current friend...");
                orchestrator.stop_all();
            }
        })
    };

    let summary = batch.wait().await?;
    printer.await.ok();
    controls.abort();
    interrupt.abort();

    print_summary(&summary);
    if summary.errored > 0 {
        std::process::exit(2);
    }
    Ok(())
}
