//! Everything that can happen to the coordinator, and everything it reports.

use crate::audio::{CaptureSignal, UtteranceAudio};
use crate::conversation::Message;
use crate::coordinator::state::TurnState;
use crate::error::{DeviceError, TransportError};
use crate::playback::PlaybackSignal;
use crate::transport::InboundEvent;

/// One input to the runtime loop.
///
/// Transport readers, capture tasks, players and timers all post these on the
/// same channel, so the coordinator sees them strictly one at a time.
#[derive(Debug, Clone)]
pub enum Signal {
    Inbound(InboundEvent),
    /// The event channel is gone.
    TransportFailed(TransportError),
    Capture(CaptureSignal),
    Playback(PlaybackSignal),
    /// Delayed return to listening after a transport error.
    RestartListening { token: u64 },
    User(UserAction),
    Shutdown,
}

/// Actions taken by the person at the keyboard or microphone button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Start or stop the microphone, bypassing auto-listen.
    ToggleListening,
    SendText(String),
    /// Cut the assistant off.
    Interrupt,
    SetAutoListen(bool),
    ChangeModel(String),
    ChangeLanguage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    Stop,
    Interrupt,
}

/// Turn-level events, each handled by exactly one transition function.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    UtteranceReady(UtteranceAudio),
    FragmentReceived {
        text: String,
        audio: Option<String>,
    },
    StreamComplete {
        cancelled: bool,
    },
    PlaybackEmpty,
    KeywordDetected(KeywordKind),
    TransportError(TransportError),
    UserManualToggle,
}

impl TurnEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TurnEvent::UtteranceReady(_) => "utterance-ready",
            TurnEvent::FragmentReceived { .. } => "fragment-received",
            TurnEvent::StreamComplete { .. } => "stream-complete",
            TurnEvent::PlaybackEmpty => "playback-empty",
            TurnEvent::KeywordDetected(_) => "keyword-detected",
            TurnEvent::TransportError(_) => "transport-error",
            TurnEvent::UserManualToggle => "user-manual-toggle",
        }
    }
}

/// Published to the optional observer channel.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    StateChanged { from: TurnState, to: TurnState },
    MessageFinalized(Message),
    Status(String),
    DeviceError(DeviceError),
}

/// Whether the runtime loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_event_names_are_distinct() {
        let events = [
            TurnEvent::UtteranceReady(UtteranceAudio::new(vec![1], "audio/wav")),
            TurnEvent::FragmentReceived {
                text: String::new(),
                audio: None,
            },
            TurnEvent::StreamComplete { cancelled: false },
            TurnEvent::PlaybackEmpty,
            TurnEvent::KeywordDetected(KeywordKind::Stop),
            TurnEvent::TransportError(TransportError::Disconnected),
            TurnEvent::UserManualToggle,
        ];
        let mut names: Vec<_> = events.iter().map(TurnEvent::name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), events.len());
    }
}
