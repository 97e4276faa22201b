use crate::defaults;
use crate::error::{Result, VoxturnError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub listening: ListeningConfig,
    pub detector: DetectorConfig,
    pub playback: PlaybackConfig,
    pub keywords: KeywordConfig,
    pub audio: AudioConfig,
}

/// Turn-taking policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListeningConfig {
    /// Resume capture automatically once the assistant has finished speaking.
    pub auto_listen: bool,
    /// Keep the microphone open while a response is pending.
    pub listen_while_waiting: bool,
    /// Delay before the automatic return to listening after a transport error.
    pub error_restart_delay_ms: u64,
}

/// End-of-utterance detection and capture cadence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    pub silence_threshold: u8,
    pub required_silence_frames: u32,
    pub inactivity_frames: u32,
    pub frame_interval_ms: u64,
    pub chunk_interval_ms: u64,
}

/// Synthesized audio playback
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub inter_segment_gap_ms: u64,
}

/// Stop and interrupt word lists, per TTS language
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeywordConfig {
    /// Active language; selects the word lists and the initial TTS language.
    pub language: String,
    pub lists: BTreeMap<String, KeywordLists>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct KeywordLists {
    pub stop_words: Vec<String>,
    pub interrupt_words: Vec<String>,
}

/// Microphone configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            auto_listen: true,
            listen_while_waiting: false,
            error_restart_delay_ms: defaults::ERROR_RESTART_DELAY_MS,
        }
    }
}

impl ListeningConfig {
    pub fn error_restart_delay(&self) -> Duration {
        Duration::from_millis(self.error_restart_delay_ms)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            silence_threshold: defaults::SILENCE_THRESHOLD,
            required_silence_frames: defaults::REQUIRED_SILENCE_FRAMES,
            inactivity_frames: defaults::INACTIVITY_FRAMES,
            frame_interval_ms: defaults::FRAME_INTERVAL_MS,
            chunk_interval_ms: defaults::CHUNK_INTERVAL_MS,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            inter_segment_gap_ms: defaults::INTER_SEGMENT_GAP_MS,
        }
    }
}

impl PlaybackConfig {
    pub fn inter_segment_gap(&self) -> Duration {
        Duration::from_millis(self.inter_segment_gap_ms)
    }
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordConfig {
    fn default() -> Self {
        let mut lists = BTreeMap::new();
        lists.insert(
            "fr".to_string(),
            KeywordLists {
                stop_words: owned(defaults::STOP_WORDS_FR),
                interrupt_words: owned(defaults::INTERRUPT_WORDS_FR),
            },
        );
        lists.insert(
            "en".to_string(),
            KeywordLists {
                stop_words: owned(defaults::STOP_WORDS_EN),
                interrupt_words: owned(defaults::INTERRUPT_WORDS_EN),
            },
        );
        Self {
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            lists,
        }
    }
}

impl KeywordConfig {
    /// Word lists for `language`, empty lists if the language is not configured.
    pub fn lists_for(&self, language: &str) -> KeywordLists {
        self.lists.get(language).cloned().unwrap_or_default()
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Only a missing file yields defaults; invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(VoxturnError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXTURN_LANGUAGE → keywords.language
    /// - VOXTURN_AUDIO_DEVICE → audio.device
    /// - VOXTURN_AUTO_LISTEN → listening.auto_listen ("true"/"false"/"1"/"0")
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(language) = std::env::var("VOXTURN_LANGUAGE")
            && !language.is_empty()
        {
            self.keywords.language = language;
        }

        if let Ok(device) = std::env::var("VOXTURN_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(auto_listen) = std::env::var("VOXTURN_AUTO_LISTEN") {
            match auto_listen.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.listening.auto_listen = true,
                "0" | "false" | "no" | "off" => self.listening.auto_listen = false,
                _ => {}
            }
        }

        self
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| VoxturnError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.detector.silence_threshold == 0 {
            return Err(invalid(
                "detector.silence_threshold",
                "must be above zero, every frame would count as speech",
            ));
        }
        if self.detector.required_silence_frames == 0 {
            return Err(invalid("detector.required_silence_frames", "must be positive"));
        }
        if self.detector.inactivity_frames <= self.detector.required_silence_frames {
            return Err(invalid(
                "detector.inactivity_frames",
                "must exceed required_silence_frames",
            ));
        }
        if self.detector.frame_interval_ms == 0 {
            return Err(invalid("detector.frame_interval_ms", "must be positive"));
        }
        if self.detector.chunk_interval_ms == 0 {
            return Err(invalid("detector.chunk_interval_ms", "must be positive"));
        }
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.keywords.language.trim().is_empty() {
            return Err(invalid("keywords.language", "must not be empty"));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxturn/config.toml on Linux, `None` when the platform
    /// has no configuration directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxturn").join("config.toml"))
    }
}
