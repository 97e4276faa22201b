//! Ordered playback of synthesized audio segments.
//!
//! The queue holds no timers and performs no I/O. It drives a [`Player`]
//! and tells its caller, through [`PlaybackEvent`]s, when a gap timer must
//! be armed. Every start carries a [`PlaybackTicket`]; completions for any
//! ticket other than the current one are stale and ignored, which is what
//! keeps an interrupted queue from resuming.

use crate::error::PlaybackError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// One synthesized audio segment.
#[derive(Clone, PartialEq, Eq)]
pub struct PlaybackSegment {
    pub seq: u64,
    pub payload: Vec<u8>,
    pub mime: String,
}

impl PlaybackSegment {
    pub fn new(seq: u64, payload: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            seq,
            payload,
            mime: mime.into(),
        }
    }
}

impl fmt::Debug for PlaybackSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSegment")
            .field("seq", &self.seq)
            .field("mime", &self.mime)
            .field("bytes", &self.payload.len())
            .finish()
    }
}

/// Decode a segment's audio field: bare base64, or a `data:` URL.
pub fn decode_segment(
    seq: u64,
    audio: &str,
    default_mime: &str,
) -> std::result::Result<PlaybackSegment, PlaybackError> {
    let (mime, payload) = match audio.strip_prefix("data:") {
        Some(rest) => match rest.split_once(";base64,") {
            Some((mime, payload)) => (mime, payload),
            None => {
                return Err(PlaybackError::Decode {
                    seq,
                    message: "data URL is not base64".to_string(),
                });
            }
        },
        None => (default_mime, audio),
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| PlaybackError::Decode {
            seq,
            message: e.to_string(),
        })?;
    Ok(PlaybackSegment::new(seq, bytes, mime))
}

/// Identifies one playback start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackTicket {
    pub generation: u64,
    pub seq: u64,
}

/// Completion and timer reports addressed to the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackSignal {
    Finished {
        ticket: PlaybackTicket,
        result: std::result::Result<(), PlaybackError>,
    },
    GapElapsed {
        generation: u64,
    },
}

/// Plays one segment at a time.
pub trait Player: Send {
    /// Begin playing `segment`; completion is reported later with `ticket`.
    fn start(&mut self, ticket: PlaybackTicket, segment: PlaybackSegment);

    /// Stop whatever is playing, synchronously.
    fn stop(&mut self);
}

/// What the queue did in response to a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started(PlaybackTicket),
    /// Appended behind the playing segment or the pending gap.
    Queued { pending: usize },
    /// Arm a timer and report [`PlaybackSignal::GapElapsed`] after `after`.
    GapScheduled { generation: u64, after: Duration },
    /// Nothing left to play.
    Drained,
    /// A failed segment was dropped; `next` is what happened after it.
    Skipped { seq: u64, next: Box<PlaybackEvent> },
    /// The signal belonged to an older ticket or generation.
    Stale,
}

#[derive(Debug)]
pub struct PlaybackQueue {
    pending: VecDeque<PlaybackSegment>,
    current: Option<PlaybackTicket>,
    gap_pending: bool,
    generation: u64,
    gap: Duration,
}

impl PlaybackQueue {
    pub fn new(gap: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            gap_pending: false,
            generation: 0,
            gap,
        }
    }

    /// Append a segment, playing it at once when the queue is idle.
    pub fn enqueue(&mut self, segment: PlaybackSegment, player: &mut dyn Player) -> PlaybackEvent {
        self.pending.push_back(segment);
        if self.current.is_some() || self.gap_pending {
            return PlaybackEvent::Queued {
                pending: self.pending.len(),
            };
        }
        self.play_next(player)
    }

    /// Handle the end of a segment.
    pub fn on_finished(
        &mut self,
        ticket: PlaybackTicket,
        result: std::result::Result<(), PlaybackError>,
        player: &mut dyn Player,
    ) -> PlaybackEvent {
        if self.current != Some(ticket) {
            tracing::debug!("Stale playback completion {:?}", ticket);
            return PlaybackEvent::Stale;
        }
        self.current = None;

        match result {
            Ok(()) => {
                self.gap_pending = true;
                PlaybackEvent::GapScheduled {
                    generation: self.generation,
                    after: self.gap,
                }
            }
            Err(e) => {
                tracing::warn!("Skipping segment: {}", e);
                let next = self.play_next(player);
                PlaybackEvent::Skipped {
                    seq: ticket.seq,
                    next: Box::new(next),
                }
            }
        }
    }

    /// Handle the end of the inter-segment gap.
    pub fn on_gap_elapsed(&mut self, generation: u64, player: &mut dyn Player) -> PlaybackEvent {
        if generation != self.generation || !self.gap_pending {
            tracing::debug!("Stale playback gap (generation {})", generation);
            return PlaybackEvent::Stale;
        }
        self.gap_pending = false;
        self.play_next(player)
    }

    /// Dispatch a [`PlaybackSignal`].
    pub fn handle(&mut self, signal: PlaybackSignal, player: &mut dyn Player) -> PlaybackEvent {
        match signal {
            PlaybackSignal::Finished { ticket, result } => self.on_finished(ticket, result, player),
            PlaybackSignal::GapElapsed { generation } => self.on_gap_elapsed(generation, player),
        }
    }

    /// Empty the queue and stop playback; returns how many segments were dropped.
    ///
    /// Bumps the generation so every outstanding completion or gap goes stale.
    pub fn interrupt(&mut self, player: &mut dyn Player) -> usize {
        let dropped = self.pending.len();
        if self.current.take().is_some() {
            player.stop();
        }
        self.pending.clear();
        self.gap_pending = false;
        self.generation += 1;
        dropped
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && !self.gap_pending && self.pending.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current(&self) -> Option<PlaybackTicket> {
        self.current
    }

    fn play_next(&mut self, player: &mut dyn Player) -> PlaybackEvent {
        match self.pending.pop_front() {
            Some(segment) => {
                let ticket = PlaybackTicket {
                    generation: self.generation,
                    seq: segment.seq,
                };
                self.current = Some(ticket);
                tracing::debug!("Playing segment {}", segment.seq);
                player.start(ticket, segment);
                PlaybackEvent::Started(ticket)
            }
            None => {
                tracing::debug!("Playback queue drained");
                PlaybackEvent::Drained
            }
        }
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::defaults::INTER_SEGMENT_GAP_MS))
    }
}
