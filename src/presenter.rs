//! Presentation of the conversation: status line, messages, turn state and
//! input level.

use crate::conversation::{Message, Sender};
use crate::coordinator::state::TurnState;
use crate::error::DeviceError;
use crate::response::MessageUpdate;
use std::sync::{Arc, Mutex, MutexGuard};

/// Pluggable output for the turn coordinator.
///
/// Every method has a no-op default so implementations only pick what they show.
pub trait Presenter: Send + 'static {
    /// One-line status text.
    fn status(&mut self, _message: &str) {}

    /// The assistant message being streamed changed.
    fn message_updated(&mut self, _update: &MessageUpdate) {}

    /// A message was appended to the conversation log.
    fn message_finalized(&mut self, _message: &Message) {}

    fn state_changed(&mut self, _from: TurnState, _to: TurnState) {}

    /// Microphone level (0-255), once per frame while listening.
    fn input_level(&mut self, _level: u8) {}

    /// Microphone could not be opened. Defaults to showing the remedy as status.
    fn device_error(&mut self, error: &DeviceError) {
        self.status(&error.remedy());
    }

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "presenter"
    }
}

/// Presenter that shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn name(&self) -> &'static str {
        "null"
    }
}

/// Everything a [`CollectorPresenter`] was shown.
#[derive(Debug, Default, Clone)]
pub struct Collected {
    pub statuses: Vec<String>,
    pub updates: Vec<MessageUpdate>,
    pub messages: Vec<Message>,
    pub states: Vec<(TurnState, TurnState)>,
    pub levels: Vec<u8>,
}

/// Presenter that collects everything, for tests and embedding.
///
/// Clones share the same record.
#[derive(Debug, Default, Clone)]
pub struct CollectorPresenter {
    collected: Arc<Mutex<Collected>>,
}

impl CollectorPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collected> {
        self.collected.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> Collected {
        self.lock().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.lock().statuses.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }
}

impl Presenter for CollectorPresenter {
    fn status(&mut self, message: &str) {
        self.lock().statuses.push(message.to_string());
    }

    fn message_updated(&mut self, update: &MessageUpdate) {
        self.lock().updates.push(update.clone());
    }

    fn message_finalized(&mut self, message: &Message) {
        self.lock().messages.push(message.clone());
    }

    fn state_changed(&mut self, from: TurnState, to: TurnState) {
        self.lock().states.push((from, to));
    }

    fn input_level(&mut self, level: u8) {
        self.lock().levels.push(level);
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Level meter of `width` cells for a 0-255 level.
pub fn format_level_bar(level: u8, width: usize) -> String {
    let filled = (level as usize * width).div_ceil(255).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Terminal presenter writing to stderr.
#[cfg(feature = "cli")]
pub struct ConsolePresenter {
    show_levels: bool,
}

#[cfg(feature = "cli")]
impl ConsolePresenter {
    pub fn new(show_levels: bool) -> Self {
        Self { show_levels }
    }
}

#[cfg(feature = "cli")]
impl Presenter for ConsolePresenter {
    fn status(&mut self, message: &str) {
        use owo_colors::OwoColorize;
        eprintln!("\r\x1b[2K{}", message.dimmed());
    }

    fn message_finalized(&mut self, message: &Message) {
        use owo_colors::OwoColorize;
        let interrupted = if message.interrupted { " …" } else { "" };
        match message.sender {
            Sender::User => eprintln!("\r\x1b[2K{} {}", "you>".cyan().bold(), message.text),
            Sender::Assistant => eprintln!(
                "\r\x1b[2K{} {}{}",
                "assistant>".green().bold(),
                message.text,
                interrupted.yellow()
            ),
        }
    }

    fn state_changed(&mut self, _from: TurnState, to: TurnState) {
        use owo_colors::OwoColorize;
        eprintln!("\r\x1b[2K{}", format!("[{}]", to).blue());
    }

    fn input_level(&mut self, level: u8) {
        if self.show_levels {
            eprint!("\r\x1b[2K{}", format_level_bar(level, 30));
        }
    }

    fn device_error(&mut self, error: &DeviceError) {
        use owo_colors::OwoColorize;
        eprintln!("\r\x1b[2K{}", error.remedy().red());
    }

    fn name(&self) -> &'static str {
        "console"
    }
}
