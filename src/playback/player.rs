use crate::coordinator::Signal;
use crate::error::PlaybackError;
use crate::playback::queue::{PlaybackSegment, PlaybackSignal, PlaybackTicket, Player};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Something that can actually make a segment audible.
///
/// `play` resolves when the segment has finished. Dropping the future must
/// stop the sound.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(&self, segment: &PlaybackSegment) -> std::result::Result<(), PlaybackError>;
}

/// Output that stays silent for as long as the segment would have played.
///
/// Duration is estimated from the payload size at a fixed byte rate.
#[derive(Debug, Clone)]
pub struct SilentOutput {
    bytes_per_second: u64,
}

impl SilentOutput {
    pub fn new(bytes_per_second: u64) -> Self {
        Self {
            bytes_per_second: bytes_per_second.max(1),
        }
    }

    pub fn duration_of(&self, segment: &PlaybackSegment) -> Duration {
        Duration::from_millis(segment.payload.len() as u64 * 1000 / self.bytes_per_second)
    }
}

impl Default for SilentOutput {
    fn default() -> Self {
        // 128 kbit/s mp3
        Self::new(16_000)
    }
}

#[async_trait]
impl AudioOutput for SilentOutput {
    async fn play(&self, segment: &PlaybackSegment) -> std::result::Result<(), PlaybackError> {
        if segment.payload.is_empty() {
            return Err(PlaybackError::Decode {
                seq: segment.seq,
                message: "empty payload".to_string(),
            });
        }
        tokio::time::sleep(self.duration_of(segment)).await;
        Ok(())
    }
}

/// Plays each segment in its own tokio task and reports completion as a signal.
pub struct TaskPlayer {
    output: Arc<dyn AudioOutput>,
    signals: mpsc::UnboundedSender<Signal>,
    current: Option<AbortHandle>,
}

impl TaskPlayer {
    pub fn new(output: Arc<dyn AudioOutput>, signals: mpsc::UnboundedSender<Signal>) -> Self {
        Self {
            output,
            signals,
            current: None,
        }
    }
}

impl Player for TaskPlayer {
    fn start(&mut self, ticket: PlaybackTicket, segment: PlaybackSegment) {
        if let Some(previous) = self.current.take() {
            previous.abort();
        }

        let output = Arc::clone(&self.output);
        let signals = self.signals.clone();
        let handle = tokio::spawn(async move {
            let result = output.play(&segment).await;
            let signal = Signal::Playback(PlaybackSignal::Finished { ticket, result });
            if signals.send(signal).is_err() {
                tracing::debug!("Playback completion dropped, runtime has shut down");
            }
        });
        self.current = Some(handle.abort_handle());
    }

    fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.abort();
            tracing::debug!("Playback stopped");
        }
    }
}

impl Drop for TaskPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Default)]
struct Recorded {
    started: Vec<(PlaybackTicket, PlaybackSegment)>,
    stops: usize,
}

/// Player that only records what it was asked to do.
///
/// Clones share the same record, so a test can keep one handle while the
/// coordinator owns another.
#[derive(Debug, Default, Clone)]
pub struct RecordingPlayer {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn started(&self) -> Vec<(PlaybackTicket, PlaybackSegment)> {
        self.recorded().started.clone()
    }

    pub fn started_seqs(&self) -> Vec<u64> {
        self.recorded().started.iter().map(|(_, s)| s.seq).collect()
    }

    pub fn last_ticket(&self) -> Option<PlaybackTicket> {
        self.recorded().started.last().map(|(t, _)| *t)
    }

    pub fn stop_count(&self) -> usize {
        self.recorded().stops
    }
}

impl Player for RecordingPlayer {
    fn start(&mut self, ticket: PlaybackTicket, segment: PlaybackSegment) {
        self.recorded().started.push((ticket, segment));
    }

    fn stop(&mut self) {
        self.recorded().stops += 1;
    }
}
