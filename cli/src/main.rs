// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # CrevnClaw Agent Host CLI
//!
//! The `crevnclaw` binary boots the kernel and offers a few local tools
//! around it.
//!
//! ## Commands
//!
//! - `crevnclaw serve` - Run the gateway, scheduler and tool host
//! - `crevnclaw pair` - Issue a fresh pairing token
//! - `crevnclaw workflow validate|status` - Inspect workflow files and frozen state

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crevnclaw_kernel::domain::node_config::{KernelConfig, LoggingConfig};

mod commands;

use commands::{PairArgs, ServeArgs, WorkflowCommand};

/// CrevnClaw Agent Host - local control plane for an autonomous agent
#[derive(Parser)]
#[command(name = "crevnclaw")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Agent home directory (config.json, pairing token, frozen workflow state)
    #[arg(long, global = true, env = "CREVNCLAW_HOME", value_name = "DIR")]
    home: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error) [default: observability.logging.level]
    #[arg(long, global = true, env = "CREVNCLAW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format [default: observability.logging.format]
    #[arg(long, global = true, env = "CREVNCLAW_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the kernel: gateway, scheduler, router and tool servers
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Issue a fresh pairing token
    #[command(name = "pair")]
    Pair(PairArgs),

    /// Workflow tooling
    #[command(name = "workflow")]
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let configured = configured_logging(cli.home.as_deref());
    let (level, format) = resolve_logging(cli.log_level, cli.log_format, &configured);
    init_logging(&level, format)?;

    let home = cli.home;
    match cli.command {
        Commands::Serve(args) => commands::serve::handle_command(args, home.as_deref()).await,
        Commands::Pair(args) => commands::pair::handle_command(args, home.as_deref()),
        Commands::Workflow { command } => {
            commands::workflow::handle_command(command, home.as_deref()).await
        }
    }
}

/// Logging section of config.json; defaults when the file is missing or invalid.
fn configured_logging(home: Option<&Path>) -> LoggingConfig {
    KernelConfig::load(&KernelConfig::resolve_home(home))
        .map(|config| config.observability.logging)
        .unwrap_or_default()
}

/// Flags (or their env vars) win over config.json. `RUST_LOG` still overrides the level.
fn resolve_logging(
    level: Option<String>,
    format: Option<LogFormat>,
    configured: &LoggingConfig,
) -> (String, LogFormat) {
    let level = level.unwrap_or_else(|| configured.level.clone());
    let format = format.unwrap_or(if configured.format.eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    });
    (level, format)
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
