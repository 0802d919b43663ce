//! Command-line surface for rd

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::Priority;

/// remindd - durable task reminder daemon
#[derive(Parser)]
#[command(
    name = "rd",
    about = "Schedules task reminders and delivers them when they fall due",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/remindd/remindd.log"
)]
pub struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format for read commands
    #[arg(short, long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// What to do; defaults to status
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Top-level subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Schedule a reminder for a task
    Schedule {
        /// Task identifier
        task_id: i64,

        /// Reminder title
        title: String,

        /// When to deliver the notification (RFC 3339, e.g. 2026-09-01T09:00:00Z)
        #[arg(long = "at", value_name = "TIME")]
        at: DateTime<Utc>,

        /// Date the task itself is due (defaults to the notify date)
        #[arg(long, value_name = "DATE")]
        due: Option<NaiveDate>,

        /// Task priority (low, medium, high)
        #[arg(long, default_value = "medium")]
        priority: Priority,
    },

    /// Move a scheduled reminder to a new notify time
    Reschedule {
        /// Task identifier
        task_id: i64,

        /// New notification time (RFC 3339)
        #[arg(long = "at", value_name = "TIME")]
        at: DateTime<Utc>,

        /// Replace the reminder title
        #[arg(long)]
        title: Option<String>,

        /// Replace the task due date
        #[arg(long, value_name = "DATE")]
        due: Option<NaiveDate>,

        /// Replace the task priority
        #[arg(long)]
        priority: Option<Priority>,
    },

    /// Cancel a scheduled reminder
    Cancel {
        /// Task identifier
        task_id: i64,
    },

    /// Show a single reminder
    Show {
        /// Task identifier
        task_id: i64,
    },

    /// List scheduled reminders ordered by notify time
    List,

    /// Launch the daemon in the background
    Start {
        /// Stay in the foreground instead of forking
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Restart the daemon
    Restart,

    /// Show daemon status
    Status,

    /// Print the daemon log
    Logs {
        /// Keep following new log lines
        #[arg(short, long)]
        follow: bool,

        /// How many trailing lines to print
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },

    /// Print the effective configuration
    Config,

    /// Daemon process entry point, spawned by `start`
    #[command(hide = true)]
    RunDaemon,
}

/// Output format for read commands
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}
