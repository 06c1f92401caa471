//! aide CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Configuration error

use std::process::ExitCode;

use aide_chat::{AideConfig, ChatError};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const CONFIG_ERROR: u8 = 2;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries the conversation
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(log_filter(cli.verbose, cli.quiet))
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match AideConfig::resolve(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Chat(args) => commands::chat::execute(args, config).await,
            Commands::Config(args) => commands::config::execute(args, config).await,
        },
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// `RUST_LOG` wins; otherwise `aide=info,warn`, adjusted by the global flags
fn log_filter(verbose: bool, quiet: bool) -> EnvFilter {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("aide={level},warn")))
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<ChatError>() {
        Some(ChatError::Config(_)) | Some(ChatError::LlmNotConfigured) => ExitCodes::CONFIG_ERROR,
        _ if e.to_string().to_lowercase().contains("config") => ExitCodes::CONFIG_ERROR,
        _ => ExitCodes::GENERAL_ERROR,
    }
}
