//! Default configuration constants for voxturn.
//!
//! Shared by the configuration sections and the components that fall back to
//! them when built without a [`Config`](crate::config::Config).

/// Amplitude (0-255 scale) at or above which a frame counts as speech.
///
/// Tuned against byte-scaled analyser levels of typical laptop microphones.
/// Fixed and non-adaptive: a noisy room needs a higher value.
pub const SILENCE_THRESHOLD: u8 = 15;

/// Consecutive sub-threshold frames, after speech, that end an utterance.
///
/// About 1.6 seconds at a 60 Hz frame rate.
pub const REQUIRED_SILENCE_FRAMES: u32 = 100;

/// Frames without any speech before a capture session is abandoned.
///
/// About 15 seconds at a 60 Hz frame rate.
pub const INACTIVITY_FRAMES: u32 = 900;

/// Interval between amplitude samples in milliseconds (one display frame).
pub const FRAME_INTERVAL_MS: u64 = 16;

/// Interval at which the recorder flushes a chunk of captured audio.
pub const CHUNK_INTERVAL_MS: u64 = 100;

/// Pause between two synthesized segments, avoids audible clipping.
pub const INTER_SEGMENT_GAP_MS: u64 = 300;

/// Delay before the single automatic return to listening after a transport error.
pub const ERROR_RESTART_DELAY_MS: u64 = 1000;

/// Capture sample rate in Hz for PCM microphones.
pub const SAMPLE_RATE: u32 = 16000;

/// Default TTS / keyword language.
pub const DEFAULT_LANGUAGE: &str = "fr";

/// Mime tag attached to synthesized segments received from the server.
pub const SEGMENT_MIME: &str = "audio/mpeg";

/// Mime tag of utterances sealed from raw PCM.
pub const WAV_MIME: &str = "audio/wav";

/// Default stop words for French sessions.
pub const STOP_WORDS_FR: &[&str] = &[
    "au revoir",
    "arrête",
    "stop",
    "termine",
    "bye",
    "goodbye",
    "exit",
    "quit",
    "ciao",
];

/// Default stop words for English sessions.
pub const STOP_WORDS_EN: &[&str] = &[
    "goodbye",
    "bye",
    "stop",
    "end",
    "terminate",
    "exit",
    "quit",
    "ciao",
];

/// Default interrupt words for French sessions.
pub const INTERRUPT_WORDS_FR: &[&str] = &["attends", "tais-toi", "silence", "une seconde"];

/// Default interrupt words for English sessions.
pub const INTERRUPT_WORDS_EN: &[&str] = &["wait", "hold on", "be quiet", "one second"];
