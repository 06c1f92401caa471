//! CLI command definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod chat;
pub mod config;

/// aide - a personal assistant that keeps short conversations with your contacts
#[derive(Parser)]
#[command(name = "aide")]
#[command(version, about = "aide - conversation sessions for a personal assistant")]
#[command(long_about = r#"
aide answers your contacts on your behalf, one short-lived session per contact.
When a session goes quiet it is summarized into memory and tags for next time.

COMMANDS:
  chat    → Talk to the assistant as a contact, line by line from stdin
  config  → Print the effective configuration

EXIT CODES:
  0 - Success
  1 - General error
  2 - Configuration error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, env = "AIDE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a conversation for one contact from stdin
    Chat(chat::ChatArgs),

    /// Print the effective configuration as TOML
    Config(config::ConfigArgs),
}
