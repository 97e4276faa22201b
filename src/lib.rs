//! voxturn - Turn-taking engine for streaming voice assistants
//!
//! Decides when to listen, when to stop listening, when to speak and when to
//! let the user interrupt, around a server that streams text and audio.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod catalog;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod conversation;
pub mod coordinator;
pub mod defaults;
pub mod error;
pub mod keywords;
pub mod playback;
pub mod presenter;
pub mod response;
pub mod runtime;
pub mod transport;

// Collaborator traits
pub use audio::{CaptureDriver, DeviceStream, Microphone};
pub use catalog::ModelCatalog;
pub use coordinator::Scheduler;
pub use playback::{AudioOutput, Player};
pub use presenter::Presenter;
pub use response::MarkupRenderer;
pub use transport::Transport;

// Engine
pub use coordinator::{Signal, TurnCoordinator, TurnState, UserAction};
pub use runtime::{RuntimeHandle, RuntimeParts, TurnRuntime};

// Error handling
pub use error::{Result, VoxturnError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
