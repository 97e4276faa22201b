//! Sequential playback of synthesized speech.

pub mod player;
pub mod queue;

pub use player::{AudioOutput, RecordingPlayer, SilentOutput, TaskPlayer};
pub use queue::{
    PlaybackEvent, PlaybackQueue, PlaybackSegment, PlaybackSignal, PlaybackTicket, Player,
    decode_segment,
};
