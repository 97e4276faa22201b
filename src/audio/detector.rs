//! End-of-utterance detection.
//!
//! Consumes one byte-scaled amplitude sample per frame and decides when the
//! speaker has finished, or when the capture session should be abandoned
//! because nobody spoke.

use crate::config::DetectorConfig;

/// Thresholds for end-of-utterance detection, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorSettings {
    /// Amplitude at or above which a frame counts as speech.
    pub silence_threshold: u8,
    /// Sub-threshold frames after speech that end the utterance.
    pub required_silence_frames: u32,
    /// Frames without any speech before the session is abandoned.
    pub inactivity_frames: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        DetectorConfig::default().into()
    }
}

impl From<DetectorConfig> for DetectorSettings {
    fn from(config: DetectorConfig) -> Self {
        Self {
            silence_threshold: config.silence_threshold,
            required_silence_frames: config.required_silence_frames,
            inactivity_frames: config.inactivity_frames,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// No speech yet in this utterance.
    Armed,
    /// Speech heard; counting trailing silence.
    Speaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorEvent {
    /// The speaker has gone quiet long enough after talking.
    EndOfUtterance,
    /// Nobody spoke for the whole inactivity window.
    Abandoned,
}

/// Frame-counting silence detector.
///
/// Emits [`DetectorEvent::EndOfUtterance`] once per utterance and
/// [`DetectorEvent::Abandoned`] at most once per session.
#[derive(Debug, Clone)]
pub struct EndOfUtteranceDetector {
    settings: DetectorSettings,
    state: DetectorState,
    has_spoken: bool,
    silence_frames: u32,
    idle_frames: u32,
    abandoned: bool,
}

impl EndOfUtteranceDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            state: DetectorState::Armed,
            has_spoken: false,
            silence_frames: 0,
            idle_frames: 0,
            abandoned: false,
        }
    }

    /// Feeds one amplitude sample (0-255).
    pub fn push(&mut self, level: u8) -> Option<DetectorEvent> {
        let is_speech = level >= self.settings.silence_threshold;

        match self.state {
            DetectorState::Armed => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.has_spoken = true;
                    self.silence_frames = 0;
                    self.idle_frames = 0;
                    return None;
                }
                if self.abandoned {
                    return None;
                }
                self.idle_frames = self.idle_frames.saturating_add(1);
                if self.idle_frames >= self.settings.inactivity_frames {
                    self.abandoned = true;
                    return Some(DetectorEvent::Abandoned);
                }
                None
            }
            DetectorState::Speaking => {
                if is_speech {
                    self.silence_frames = 0;
                    return None;
                }
                self.silence_frames += 1;
                if self.has_spoken && self.silence_frames >= self.settings.required_silence_frames
                {
                    self.rearm();
                    return Some(DetectorEvent::EndOfUtterance);
                }
                None
            }
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn has_spoken(&self) -> bool {
        self.has_spoken
    }

    pub fn silence_frames(&self) -> u32 {
        self.silence_frames
    }

    pub fn settings(&self) -> DetectorSettings {
        self.settings
    }

    /// Back to the initial state, including the abandon latch.
    pub fn reset(&mut self) {
        self.rearm();
        self.abandoned = false;
    }

    fn rearm(&mut self) {
        self.state = DetectorState::Armed;
        self.has_spoken = false;
        self.silence_frames = 0;
        self.idle_frames = 0;
    }
}

impl Default for EndOfUtteranceDetector {
    fn default() -> Self {
        Self::new(DetectorSettings::default())
    }
}

/// Byte-scaled RMS level of a block of 16-bit PCM samples.
///
/// 0 for silence or an empty block, 255 for a full-scale signal.
pub fn amplitude_level(samples: &[i16]) -> u8 {
    if samples.is_empty() {
        return 0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = s as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let rms = (sum_squares / samples.len() as f64).sqrt();
    (rms * 255.0).round().clamp(0.0, 255.0) as u8
}
