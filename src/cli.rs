//! Command-line interface for voxturn
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Turn-taking client for streaming voice assistants
#[derive(Parser, Debug)]
#[command(
    name = "voxturn",
    version,
    about = "Turn-taking client for streaming voice assistants"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: input meter + info logs, -vv: debug logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a conversation: server events on stdin, commands on stdout
    ///
    /// Synthesized speech is not played aloud: segments are paced silently
    /// by their size, so turn timing and interrupts behave as with a speaker.
    /// Embed the library with your own `AudioOutput` to hear replies.
    Run {
        /// Audio input device name
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Ask the server to switch to this model on startup
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,

        /// Speech language; also selects the stop and interrupt words
        #[arg(long, value_name = "LANG")]
        language: Option<String>,

        /// Do not return to listening after the assistant has spoken
        #[arg(long)]
        no_auto_listen: bool,
    },

    /// Show how a transcript would be classified
    Classify {
        /// Transcript text
        text: String,

        /// Language whose word lists to use (default: configured language)
        #[arg(long, value_name = "LANG")]
        language: Option<String>,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// List available audio input devices
    #[cfg(feature = "cpal-audio")]
    Devices,
}

/// Configuration actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}
