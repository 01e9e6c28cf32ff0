use crate::commands::run::{execute_run, RunArgs};
use crate::commands::verify::execute_verify;
use crate::commands::volumes::{execute_volumes, VolumesArgs};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use imagesmith_core::context::Architecture;
use std::path::PathBuf;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

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

/// imagesmith subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify and execute every action of a recipe on this host
    Run {
        /// Recipe file
        recipe: PathBuf,
        /// Root of the target filesystem (created if missing)
        #[arg(long, value_name = "DIR")]
        rootdir: PathBuf,
        /// Target architecture (overrides the recipe)
        #[arg(long, value_name = "ARCH")]
        arch: Option<String>,
        /// Output format for the phase summary
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Check a recipe's action configuration without running anything
    Verify {
        /// Recipe file
        recipe: PathBuf,
    },
    /// List host directories the recipe needs exposed inside a sandbox machine
    Volumes {
        /// Recipe file
        recipe: PathBuf,
        /// Root of the target filesystem
        #[arg(long, value_name = "DIR", default_value = "/")]
        rootdir: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Image build pipeline runner",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via IMAGESMITH_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Initialize logging from the global options, then run the subcommand.
    pub fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };

        let log_level = self.log_level.as_str();
        if std::env::var_os(imagesmith_core::logging::LOG_ENV).is_none()
            && std::env::var_os("RUST_LOG").is_none()
        {
            std::env::set_var(
                "RUST_LOG",
                format!("imagesmith={},imagesmith_core={}", log_level, log_level),
            );
        }
        imagesmith_core::logging::init(log_format)?;
        tracing::debug!(
            "imagesmith-core {} initialized with log level: {}",
            imagesmith_core::version(),
            log_level
        );

        match self.command {
            Commands::Run {
                recipe,
                rootdir,
                arch,
                output,
            } => execute_run(RunArgs {
                recipe,
                rootdir,
                architecture: arch.map(Architecture::new),
                output,
            }),
            Commands::Verify { recipe } => execute_verify(&recipe),
            Commands::Volumes {
                recipe,
                rootdir,
                output,
            } => execute_volumes(VolumesArgs {
                recipe,
                rootdir,
                output,
            }),
        }
    }
}
