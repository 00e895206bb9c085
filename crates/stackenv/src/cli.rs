use crate::commands::init::{execute_init, InitArgs};
use crate::commands::status::{execute_status, StatusArgs};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// stackenv subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize the current environment: provider hooks, category hooks, optional push
    Init {
        /// Reuse the held environment meta instead of rebuilding it from the project files
        #[arg(long)]
        restore: bool,
        /// Push resources without asking
        #[arg(long, conflicts_with = "no_push")]
        push: bool,
        /// Skip the push without asking
        #[arg(long)]
        no_push: bool,
    },
    /// Pull the current environment; pushes only with --push
    Pull {
        /// Reuse the held environment meta instead of rebuilding it from the project files
        #[arg(long)]
        restore: bool,
        /// Push resources after pulling
        #[arg(long)]
        push: bool,
    },
    /// Show which resources a push would change
    Status {
        /// Only report this provider
        #[arg(long, value_name = "NAME")]
        provider: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Multi-category environment orchestrator
#[derive(Debug, Parser)]
#[command(name = "stackenv", version, about)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via STACKENV_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Project root directory (defaults to the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub project_dir: Option<PathBuf>,

    /// Write progress events as JSON lines to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub progress_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// `init` asks unless told; `pull` never pushes unless told
fn push_decision(push: bool, no_push: bool, pulling: bool) -> Option<bool> {
    match (push, no_push) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ if pulling => Some(false),
        _ => None,
    }
}

impl Cli {
    pub async fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None, // Let logging module check environment variable
        };

        // Spinner sessions default to quieter logs unless the user overrode via flag/env
        let spinner_eligible = std::io::stderr().is_terminal() && log_format != Some("json");
        let mut log_level = self.log_level.as_str();
        if std::env::var_os("STACKENV_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            if spinner_eligible && matches!(self.log_level, LogLevel::Info) {
                log_level = "warn";
            }
            std::env::set_var(
                "RUST_LOG",
                format!("stackenv={},stackenv_core={}", log_level, log_level),
            );
        }
        stackenv_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let project_dir = match self.project_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };

        let tracker =
            stackenv_core::progress::create_progress_tracker(self.progress_file.as_deref())?;
        let progress = std::sync::Arc::new(std::sync::Mutex::new(Some(tracker)));

        match self.command {
            Some(Commands::Init {
                restore,
                push,
                no_push,
            }) => {
                let args = InitArgs {
                    project_dir,
                    restore,
                    push: push_decision(push, no_push, false),
                    pulling: false,
                };
                execute_init(args, progress).await
            }
            Some(Commands::Pull { restore, push }) => {
                let args = InitArgs {
                    project_dir,
                    restore,
                    push: push_decision(push, false, true),
                    pulling: true,
                };
                execute_init(args, progress).await
            }
            Some(Commands::Status { provider, json }) => {
                execute_status(StatusArgs {
                    project_dir,
                    provider,
                    json,
                })
                .await
            }
            None => {
                println!("Multi-category environment orchestrator");
                println!("Run 'stackenv --help' to see available commands.");
                Ok(())
            }
        }
    }
}
