//! Turn state and the session flags the coordinator owns.

use crate::config::Config;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Listening,
    AwaitingResponse,
    Speaking,
    /// Transient, always followed by `Listening`.
    Interrupted,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::AwaitingResponse => "awaiting-response",
            TurnState::Speaking => "speaking",
            TurnState::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-cutting flags of one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFlags {
    /// Return to listening when a turn ends.
    pub auto_listen: bool,
    /// Keep capturing while a response is pending.
    pub listen_while_waiting: bool,
    /// The user stopped the microphone; blocks every automatic restart.
    pub manual_stop: bool,
    pub stop_word_seen: bool,
    /// The server is producing a response.
    pub generating: bool,
    /// We asked the server to cancel and have not seen the acknowledgement.
    pub cancel_pending: bool,
    pub stream_complete: bool,
    pub playback_idle: bool,
    /// The current response carried at least one audio segment.
    pub audio_seen: bool,
    /// One automatic restart after a transport error is available.
    pub restart_available: bool,
    /// Identifies the latest scheduled restart; older ones are ignored.
    pub restart_token: u64,
    pub model: Option<String>,
    pub tts_language: String,
}

impl SessionFlags {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auto_listen: config.listening.auto_listen,
            listen_while_waiting: config.listening.listen_while_waiting,
            tts_language: config.keywords.language.clone(),
            ..Self::default()
        }
    }

    /// Automatic listening is allowed at the end of this turn.
    pub fn may_resume(&self) -> bool {
        self.auto_listen && !self.manual_stop && !self.stop_word_seen
    }

    /// Forget the progress of the current response.
    pub fn reset_response(&mut self) {
        self.generating = false;
        self.stream_complete = false;
        self.audio_seen = false;
    }
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            auto_listen: true,
            listen_while_waiting: false,
            manual_stop: false,
            stop_word_seen: false,
            generating: false,
            cancel_pending: false,
            stream_complete: false,
            playback_idle: true,
            audio_seen: false,
            restart_available: true,
            restart_token: 0,
            model: None,
            tts_language: crate::defaults::DEFAULT_LANGUAGE.to_string(),
        }
    }
}
