//! remindd - task reminder daemon
//!
//! CLI entry point for scheduling reminders and managing the daemon.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use remindd::cli::{Cli, Command, OutputFormat};
use remindd::config::Config;
use remindd::daemon::{DaemonManager, VERSION};
use remindd::domain::{Priority, Reminder, ReminderUpdate, ScheduleRequest};
use remindd::engine::{self, DispatchEngine, LogNotifier};
use remindd::ipc::{self, DaemonClient, DaemonMessage};
use remindd::store::ReminderStore;
use remindd::timer::TimerRegistry;

fn setup_logging(config: &Config) -> Result<()> {
    let log_path = &config.daemon.log_file;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    // Append so CLI invocations don't truncate the daemon's log
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config determines the log path, so it loads before logging comes up
    let config = Config::load(cli.config.as_ref()).context("Failed to load config")?;

    setup_logging(&config).context("Failed to initialize logging")?;

    debug!(command = ?cli.command, "rd invoked");
    match cli.command {
        Some(Command::Schedule {
            task_id,
            title,
            at,
            due,
            priority,
        }) => cmd_schedule(&config, task_id, title, at, due, priority, cli.output).await,
        Some(Command::Reschedule {
            task_id,
            at,
            title,
            due,
            priority,
        }) => cmd_reschedule(&config, task_id, at, title, due, priority, cli.output).await,
        Some(Command::Cancel { task_id }) => cmd_cancel(&config, task_id, cli.output).await,
        Some(Command::Show { task_id }) => cmd_show(&config, task_id, cli.output).await,
        Some(Command::List) => cmd_list(&config, cli.output).await,
        Some(Command::Start { foreground }) => {
            cmd_start(&config, cli.config.as_ref(), foreground).await
        }
        Some(Command::Stop) => cmd_stop(&config).await,
        Some(Command::Restart) => cmd_restart(&config, cli.config.as_ref()).await,
        Some(Command::Status) => cmd_status(&config, cli.output).await,
        Some(Command::Logs { follow, lines }) => cmd_logs(&config, follow, lines).await,
        Some(Command::Config) => cmd_config(&config, cli.output),
        Some(Command::RunDaemon) => cmd_run_daemon(&config).await,
        // Bare `rd` defaults to status
        None => cmd_status(&config, cli.output).await,
    }
}

/// Build an IPC client, refusing early when the daemon isn't up
fn client_for(config: &Config) -> Result<DaemonClient> {
    let client = DaemonClient::with_socket_path(config.daemon.socket_path.clone());
    if !client.socket_exists() {
        debug!(socket_path = ?config.daemon.socket_path, "client_for: socket does not exist");
        eyre::bail!("Daemon is not running. Start it with: rd start");
    }
    Ok(client)
}

fn print_reminder(reminder: &Reminder) {
    println!("Task:        {}", reminder.task_id);
    println!("Title:       {}", reminder.title);
    println!("Status:      {}", reminder.status);
    println!("Priority:    {}", reminder.priority);
    println!("Due date:    {}", reminder.due_date);
    println!("Notify time: {}", reminder.notify_time.to_rfc3339());
    println!("Version:     {}", reminder.version);
    println!("Created:     {}", reminder.created_at.to_rfc3339());
    println!("Updated:     {}", reminder.updated_at.to_rfc3339());
}

/// Schedule a new reminder via the daemon
async fn cmd_schedule(
    config: &Config,
    task_id: i64,
    title: String,
    at: DateTime<Utc>,
    due: Option<NaiveDate>,
    priority: Priority,
    output: OutputFormat,
) -> Result<()> {
    debug!(task_id, %at, "cmd_schedule: sending to daemon");
    let client = client_for(config)?;

    let request = ScheduleRequest {
        task_id,
        title,
        due_date: due.unwrap_or_else(|| at.date_naive()),
        priority,
        notify_time: at,
    };

    let reminder = client.schedule(request).await?;
    debug!(task_id, version = reminder.version, "cmd_schedule: scheduled");

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reminder)?),
        OutputFormat::Text => {
            println!(
                "{} Scheduled reminder for task {} at {}",
                "✓".green(),
                reminder.task_id,
                reminder.notify_time.to_rfc3339()
            );
        }
    }
    Ok(())
}

/// Move a reminder to a new notify time via the daemon
async fn cmd_reschedule(
    config: &Config,
    task_id: i64,
    at: DateTime<Utc>,
    title: Option<String>,
    due: Option<NaiveDate>,
    priority: Option<Priority>,
    output: OutputFormat,
) -> Result<()> {
    debug!(task_id, %at, "cmd_reschedule: sending to daemon");
    let client = client_for(config)?;

    let update = ReminderUpdate {
        notify_time: at,
        title,
        due_date: due,
        priority,
    };

    let reminder = client.reschedule(task_id, update).await?;
    debug!(task_id, version = reminder.version, "cmd_reschedule: rescheduled");

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reminder)?),
        OutputFormat::Text => {
            println!(
                "{} Rescheduled reminder for task {} to {} (version {})",
                "✓".green(),
                reminder.task_id,
                reminder.notify_time.to_rfc3339(),
                reminder.version
            );
        }
    }
    Ok(())
}

/// Cancel a scheduled reminder via the daemon
async fn cmd_cancel(config: &Config, task_id: i64, output: OutputFormat) -> Result<()> {
    debug!(task_id, "cmd_cancel: sending to daemon");
    let client = client_for(config)?;

    let reminder = client.cancel(task_id).await?;
    debug!(task_id, "cmd_cancel: canceled");

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reminder)?),
        OutputFormat::Text => {
            println!("{} Canceled reminder for task {}", "✓".green(), reminder.task_id);
        }
    }
    Ok(())
}

/// Show a single reminder
async fn cmd_show(config: &Config, task_id: i64, output: OutputFormat) -> Result<()> {
    debug!(task_id, "cmd_show: querying daemon");
    let client = client_for(config)?;

    let reminder = client.get(task_id).await?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reminder)?),
        OutputFormat::Text => print_reminder(&reminder),
    }
    Ok(())
}

/// List scheduled reminders
async fn cmd_list(config: &Config, output: OutputFormat) -> Result<()> {
    debug!("cmd_list: querying daemon");
    let client = client_for(config)?;

    let reminders = client.list().await?;
    debug!(count = reminders.len(), "cmd_list: got reminders");

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reminders)?),
        OutputFormat::Text => {
            if reminders.is_empty() {
                println!("No scheduled reminders");
                return Ok(());
            }

            println!("{:<8} {:<10} {:<26} TITLE", "TASK", "PRIORITY", "NOTIFY AT");
            println!("{}", "-".repeat(70));
            for reminder in &reminders {
                println!(
                    "{:<8} {:<10} {:<26} {}",
                    reminder.task_id,
                    reminder.priority.to_string(),
                    reminder.notify_time.to_rfc3339(),
                    reminder.title
                );
            }
        }
    }
    Ok(())
}

/// Start the daemon unless one is already running
async fn cmd_start(config: &Config, config_path: Option<&PathBuf>, foreground: bool) -> Result<()> {
    debug!(foreground, "cmd_start: checking for a running daemon");
    let manager = DaemonManager::from_config(&config.daemon);

    if manager.is_running() {
        debug!(pid = ?manager.running_pid(), "cmd_start: daemon already up");
        if let Some(pid) = manager.running_pid() {
            println!("remindd is already running (PID: {})", pid);
            if !manager.version_matches() {
                let daemon_version = manager.read_version().unwrap_or_else(|| "unknown".to_string());
                println!(
                    "Daemon version {} differs from CLI version {}. Run `rd restart` to upgrade.",
                    daemon_version, VERSION
                );
            }
        } else {
            println!("remindd is already running");
        }
        return Ok(());
    }

    if foreground {
        debug!("cmd_start: running in the foreground");
        println!("Starting remindd in foreground mode...");
        manager.register_self()?;
        run_daemon(config).await
    } else {
        debug!("cmd_start: spawning background daemon");
        let pid = manager.start(config_path)?;
        println!("remindd started (PID: {})", pid);
        Ok(())
    }
}

/// Stop the daemon, preferring a clean IPC shutdown with SIGTERM as fallback
async fn cmd_stop(config: &Config) -> Result<()> {
    debug!("cmd_stop: stopping daemon");
    let manager = DaemonManager::from_config(&config.daemon);

    if !manager.is_running() {
        debug!("cmd_stop: nothing to stop");
        println!("remindd is not running");
        return Ok(());
    }

    let pid = manager.running_pid();

    // Prefer a clean stop over the socket
    let client = DaemonClient::with_socket_path(config.daemon.socket_path.clone());
    if client.socket_exists() {
        debug!("cmd_stop: asking the daemon to stop over IPC");
        match client.shutdown().await {
            Ok(()) => {
                debug!("cmd_stop: daemon acknowledged the stop request");
                // Give the daemon up to five seconds to exit on its own
                let grace = std::time::Duration::from_millis(100);
                for _ in 0..50 {
                    if !manager.is_running() {
                        break;
                    }
                    tokio::time::sleep(grace).await;
                }
                if !manager.is_running() {
                    if let Some(pid) = pid {
                        println!("remindd stopped gracefully (was PID: {})", pid);
                    } else {
                        println!("remindd stopped gracefully");
                    }
                    return Ok(());
                }
                debug!("cmd_stop: daemon still up after the grace window");
            }
            Err(e) => {
                debug!(error = %e, "cmd_stop: IPC stop failed");
            }
        }
    }

    // Signals as the fallback path
    debug!("cmd_stop: falling back to signals");
    manager.stop()?;
    if let Some(pid) = pid {
        println!("remindd stopped (was PID: {})", pid);
    } else {
        println!("remindd stopped");
    }
    Ok(())
}

/// Restart the daemon
async fn cmd_restart(config: &Config, config_path: Option<&PathBuf>) -> Result<()> {
    debug!("cmd_restart: stop then start");
    cmd_stop(config).await?;
    cmd_start(config, config_path, false).await
}

/// Report whether the daemon is up, its version, and the scheduled count
async fn cmd_status(config: &Config, output: OutputFormat) -> Result<()> {
    debug!(?output, "cmd_status: collecting status");
    let manager = DaemonManager::from_config(&config.daemon);
    let status = manager.status();

    // Prefer the live version over the one recorded at startup
    let client = DaemonClient::with_socket_path(config.daemon.socket_path.clone());
    let mut live_version = None;
    let mut scheduled = None;
    if status.running && client.socket_exists() {
        if let Ok(version) = client.ping().await {
            debug!(%version, "cmd_status: daemon responded to ping");
            live_version = Some(version);
        }
        if let Ok(reminders) = client.list().await {
            scheduled = Some(reminders.len());
        }
    }
    let version = live_version.or_else(|| status.version.clone());

    match output {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": status.running,
                "pid": status.pid,
                "version": version,
                "scheduled": scheduled,
                "pid_file": status.pid_file.to_string_lossy(),
                "socket_path": config.daemon.socket_path.to_string_lossy(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("remindd status");
            println!("--------------");
            if status.running {
                println!("Status: {}", "running".green());
                if let Some(pid) = status.pid {
                    println!("PID: {}", pid);
                }
            } else {
                println!("Status: {}", "stopped".red());
            }
            if let Some(version) = version {
                println!("Version: {}", version);
            }
            if let Some(count) = scheduled {
                println!("Scheduled reminders: {}", count);
            }
            println!("PID file: {}", status.pid_file.display());
            println!("Socket: {}", config.daemon.socket_path.display());
        }
    }

    Ok(())
}

/// Print or follow the daemon log file
async fn cmd_logs(config: &Config, follow: bool, lines: usize) -> Result<()> {
    debug!(follow, lines, "cmd_logs: opening log file");
    let log_path = &config.daemon.log_file;

    if !log_path.exists() {
        debug!(?log_path, "cmd_logs: no log file yet");
        println!("No log file at: {}", log_path.display());
        println!("Start the daemon to begin logging.");
        return Ok(());
    }

    if follow {
        debug!(?log_path, "cmd_logs: tailing");
        println!("Tailing {} (Ctrl+C to stop)", log_path.display());
        println!();

        // Hand follow mode to tail
        let status = std::process::Command::new("tail")
            .arg("-f")
            .args(["-n", &lines.to_string()])
            .arg(log_path)
            .status()
            .context("Failed to run tail")?;
        debug!(?status, "cmd_logs: tail exited");
    } else {
        debug!(?log_path, lines, "cmd_logs: printing tail of log");
        let file = fs::File::open(log_path).context("Failed to open log file")?;
        let tail: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();

        let skip = tail.len().saturating_sub(lines);
        for line in &tail[skip..] {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Print the effective configuration
fn cmd_config(config: &Config, output: OutputFormat) -> Result<()> {
    debug!(?output, "cmd_config: printing effective config");
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", serde_yaml::to_string(config)?),
    }
    Ok(())
}

/// Entry point for the spawned daemon process (hidden command)
async fn cmd_run_daemon(config: &Config) -> Result<()> {
    let manager = DaemonManager::from_config(&config.daemon);
    manager.register_self()?;
    debug!("cmd_run_daemon: state files written");

    run_daemon(config).await
}

/// Daemon main loop: accept IPC requests until told to stop
async fn run_daemon(config: &Config) -> Result<()> {
    info!(version = VERSION, "remindd daemon starting");

    config.validate()?;
    debug!("run_daemon: config validated");

    // ============================================================
    // INITIALIZATION
    // ============================================================

    if let Some(parent) = config.store.db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create store directory")?;
    }

    let store = ReminderStore::spawn(&config.store.db_path)?;
    info!("ReminderStore initialized ({})", config.store.db_path.display());

    let timers = Arc::new(TimerRegistry::new());
    let engine = DispatchEngine::new(
        store.clone(),
        timers.clone(),
        Arc::new(LogNotifier::default()),
        config.dispatch.clone(),
    );
    info!("DispatchEngine initialized");

    // Re-arm persisted reminders before accepting any requests
    engine::recover(&engine).await?;

    let (listener, socket_path) = ipc::create_listener_at(&config.daemon.socket_path)?;
    info!(?socket_path, "listening for IPC requests");

    // Shutdown channel lets IPC handlers stop the daemon
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    info!("Daemon running. Press Ctrl+C to stop.");

    // ============================================================
    // MAIN LOOP
    // ============================================================

    debug!("run_daemon: installing signal handlers");
    use tokio::signal::unix::{SignalKind, signal};

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        debug!("run_daemon: accepted IPC connection");
                        let engine = engine.clone();
                        let shutdown_tx = shutdown_tx.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, engine, shutdown_tx).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "run_daemon: failed to accept IPC connection");
                    }
                }
            }
            _ = sighup.recv() => {
                info!("SIGHUP ignored; config reload is not supported");
            }
            _ = sigint.recv() => {
                warn!("SIGINT received, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                warn!("SIGTERM received, shutting down");
                break;
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested via IPC");
                break;
            }
        }
    }

    info!("remindd daemon shutting down");

    // Pending timers first so no on_expire races the store teardown
    debug!("run_daemon: draining timers");
    timers.drain().await;

    debug!("run_daemon: shutting down store");
    if let Err(e) = store.shutdown().await {
        warn!(error = %e, "run_daemon: store shutdown failed");
    }

    ipc::cleanup_socket(&socket_path);

    let manager = DaemonManager::from_config(&config.daemon);
    if let Err(e) = manager.cleanup_files() {
        warn!(error = %e, "run_daemon: failed to remove PID file");
    }

    debug!("run_daemon: shutdown finished");
    Ok(())
}

/// Handle a single IPC connection: one request, one response
async fn handle_connection(
    mut stream: tokio::net::UnixStream,
    engine: DispatchEngine,
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
) {
    let message = match ipc::read_message(&mut stream).await {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "handle_connection: failed to read message");
            return;
        }
    };

    debug!(?message, "handle_connection: received message");
    let shutdown_requested = matches!(message, DaemonMessage::Shutdown);

    let response = ipc::dispatch_message(message, &engine).await;

    // Respond before signaling shutdown so the client gets its acknowledgment
    if let Err(e) = ipc::send_response(&mut stream, response).await {
        debug!(error = %e, "handle_connection: failed to send response");
    }

    if shutdown_requested {
        debug!("handle_connection: forwarding shutdown request");
        let _ = shutdown_tx.send(()).await;
    }
}
