//! Error types for voxturn.

use thiserror::Error;

/// Why a microphone could not be acquired.
///
/// Terminal for the current capture attempt only; the user may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("microphone access denied")]
    Denied,

    #[error("no microphone found")]
    NotFound,

    #[error("microphone busy")]
    Busy,

    #[error("microphone requires a secure context")]
    InsecureContext,

    #[error("microphone error: {0}")]
    Other(String),
}

impl DeviceError {
    /// User-facing message telling the user how to fix the problem.
    pub fn remedy(&self) -> String {
        match self {
            DeviceError::Denied => {
                "Microphone access denied. Allow microphone access in your system or browser settings."
                    .to_string()
            }
            DeviceError::NotFound => "No microphone detected on this device.".to_string(),
            DeviceError::Busy => {
                "Cannot open the microphone. It may be in use by another application.".to_string()
            }
            DeviceError::InsecureContext => {
                "Microphone access blocked. Use HTTPS or localhost to allow microphone access."
                    .to_string()
            }
            DeviceError::Other(message) => format!("Microphone error: {message}"),
        }
    }
}

/// Failure of a single synthesized segment. Never fatal to the queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("segment {seq} could not be decoded: {message}")]
    Decode { seq: u64, message: String },

    #[error("segment {seq} could not be played: {message}")]
    Play { seq: u64, message: String },
}

/// Failure of the bidirectional event channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,

    #[error("server error: {message}")]
    Server { message: String },
}

#[derive(Error, Debug)]
pub enum VoxturnError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Device and playback errors
    #[error("Audio device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Audio encoding failed: {message}")]
    AudioEncode { message: String },

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed stream payload: {message}")]
    StreamParse { message: String },

    #[error("Unknown model: {model}")]
    UnknownModel { model: String },

    #[error("Model catalog unavailable: {message}")]
    Catalog { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VoxturnError>;
