//! Capture sessions: one microphone acquisition, chunked recording and
//! per-frame amplitude sampling, finalized into a single utterance.
//!
//! The coordinator keeps a [`CaptureSession`] record and talks to a
//! [`CaptureDriver`]. [`TaskCapture`] runs each session as a tokio task that
//! reports back through [`CaptureSignal`]s tagged with the session id, so
//! signals from a superseded session can be recognised and dropped.

use crate::audio::detector::{DetectorEvent, DetectorSettings, EndOfUtteranceDetector};
use crate::audio::device::{Microphone, StreamGuard};
use crate::config::DetectorConfig;
use crate::coordinator::Signal;
use crate::error::DeviceError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Monotonic capture session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Acquiring,
    Recording,
    Finalizing,
}

/// Coordinator-side record of the live capture session.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub id: SessionId,
    pub phase: CapturePhase,
    pub started_at: Instant,
    /// `start_listening` went out and no `stop_listening` has followed yet.
    pub announced: bool,
}

impl CaptureSession {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            phase: CapturePhase::Acquiring,
            started_at: Instant::now(),
            announced: false,
        }
    }
}

/// The finished recording of one utterance.
#[derive(Clone, PartialEq, Eq)]
pub struct UtteranceAudio {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl UtteranceAudio {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    /// `data:<mime>;base64,<payload>`, the form sent to the server.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for UtteranceAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtteranceAudio")
            .field("mime", &self.mime)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Report from a capture session.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureSignal {
    Started { session: SessionId },
    Failed { session: SessionId, error: DeviceError },
    Amplitude { session: SessionId, level: u8 },
    Utterance { session: SessionId, audio: UtteranceAudio },
    Abandoned { session: SessionId },
}

impl CaptureSignal {
    pub fn session(&self) -> SessionId {
        match self {
            CaptureSignal::Started { session }
            | CaptureSignal::Failed { session, .. }
            | CaptureSignal::Amplitude { session, .. }
            | CaptureSignal::Utterance { session, .. }
            | CaptureSignal::Abandoned { session } => *session,
        }
    }
}

/// Starts, finalizes and discards capture sessions.
pub trait CaptureDriver: Send {
    /// Begin a new session, superseding any live one.
    fn start(&mut self, session: SessionId);

    /// Stop recording and emit the utterance.
    fn finalize(&mut self, session: SessionId);

    /// Stop recording and drop the audio.
    fn discard(&mut self, session: SessionId);
}

/// Frame and chunk cadence of a capture task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTiming {
    pub frame_interval: Duration,
    pub chunk_interval: Duration,
}

impl From<DetectorConfig> for CaptureTiming {
    fn from(config: DetectorConfig) -> Self {
        Self {
            frame_interval: Duration::from_millis(config.frame_interval_ms),
            chunk_interval: Duration::from_millis(config.chunk_interval_ms),
        }
    }
}

impl Default for CaptureTiming {
    fn default() -> Self {
        DetectorConfig::default().into()
    }
}

struct ActiveCapture {
    id: SessionId,
    cancel: CancellationToken,
    finish: CancellationToken,
}

/// Runs each capture session as a tokio task.
pub struct TaskCapture {
    microphone: Arc<dyn Microphone>,
    settings: DetectorSettings,
    timing: CaptureTiming,
    signals: mpsc::UnboundedSender<Signal>,
    root: CancellationToken,
    active: Option<ActiveCapture>,
}

impl TaskCapture {
    pub fn new(
        microphone: Arc<dyn Microphone>,
        config: DetectorConfig,
        signals: mpsc::UnboundedSender<Signal>,
        root: CancellationToken,
    ) -> Self {
        Self {
            microphone,
            settings: config.into(),
            timing: config.into(),
            signals,
            root,
            active: None,
        }
    }

    fn take_active(&mut self, session: SessionId) -> Option<ActiveCapture> {
        match &self.active {
            Some(active) if active.id == session => self.active.take(),
            _ => None,
        }
    }
}

impl CaptureDriver for TaskCapture {
    fn start(&mut self, session: SessionId) {
        if let Some(previous) = self.active.take() {
            tracing::debug!("Capture {} superseded by {}", previous.id, session);
            previous.cancel.cancel();
        }

        let cancel = self.root.child_token();
        let finish = CancellationToken::new();
        self.active = Some(ActiveCapture {
            id: session,
            cancel: cancel.clone(),
            finish: finish.clone(),
        });

        tokio::spawn(run_capture(
            session,
            Arc::clone(&self.microphone),
            self.settings,
            self.timing,
            cancel,
            finish,
            self.signals.clone(),
        ));
    }

    fn finalize(&mut self, session: SessionId) {
        if let Some(active) = self.take_active(session) {
            active.finish.cancel();
        }
    }

    fn discard(&mut self, session: SessionId) {
        if let Some(active) = self.take_active(session) {
            active.cancel.cancel();
        }
    }
}

/// A call made on a [`RecordingCapture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCall {
    Start(SessionId),
    Finalize(SessionId),
    Discard(SessionId),
}

/// Capture driver that only records calls, for tests.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingCapture {
    calls: Arc<Mutex<Vec<CaptureCall>>>,
}

impl RecordingCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<CaptureCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Id of the most recently started session
    pub fn last_started(&self) -> Option<SessionId> {
        self.calls().iter().rev().find_map(|call| match call {
            CaptureCall::Start(id) => Some(*id),
            _ => None,
        })
    }

    fn record(&self, call: CaptureCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl CaptureDriver for RecordingCapture {
    fn start(&mut self, session: SessionId) {
        self.record(CaptureCall::Start(session));
    }

    fn finalize(&mut self, session: SessionId) {
        self.record(CaptureCall::Finalize(session));
    }

    fn discard(&mut self, session: SessionId) {
        self.record(CaptureCall::Discard(session));
    }
}

fn post(signals: &mpsc::UnboundedSender<Signal>, signal: CaptureSignal) {
    if signals.send(Signal::Capture(signal)).is_err() {
        tracing::debug!("Capture signal dropped, runtime has shut down");
    }
}

/// Body of one capture session.
///
/// The device stream is owned by a [`StreamGuard`], so it is released on
/// every return path, cancellation included.
pub async fn run_capture(
    session: SessionId,
    microphone: Arc<dyn Microphone>,
    settings: DetectorSettings,
    timing: CaptureTiming,
    cancel: CancellationToken,
    finish: CancellationToken,
    signals: mpsc::UnboundedSender<Signal>,
) {
    let acquired = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!("Capture {} cancelled while acquiring", session);
            return;
        }
        result = microphone.acquire() => result,
    };

    let mut guard = match acquired {
        Ok(stream) => StreamGuard::new(stream),
        Err(error) => {
            tracing::warn!("Capture {} failed: {}", session, error);
            post(&signals, CaptureSignal::Failed { session, error });
            return;
        }
    };

    // Supersession may have raced the acquisition
    if cancel.is_cancelled() {
        return;
    }

    post(&signals, CaptureSignal::Started { session });
    tracing::debug!("Capture {} recording", session);

    let mut detector = EndOfUtteranceDetector::new(settings);
    let mut frames = tokio::time::interval(timing.frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut chunk_ticks = tokio::time::interval(timing.chunk_interval);
    chunk_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut chunks: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Capture {} discarded", session);
                return;
            }
            _ = finish.cancelled() => break,
            _ = chunk_ticks.tick() => {
                chunks.extend(guard.stream().take_chunk());
            }
            _ = frames.tick() => {
                let level = guard.stream().amplitude();
                post(&signals, CaptureSignal::Amplitude { session, level });
                match detector.push(level) {
                    Some(DetectorEvent::EndOfUtterance) => {
                        tracing::debug!("Capture {} end of utterance", session);
                        break;
                    }
                    Some(DetectorEvent::Abandoned) => {
                        tracing::info!("Capture {} abandoned, nobody spoke", session);
                        guard.release();
                        post(&signals, CaptureSignal::Abandoned { session });
                        return;
                    }
                    None => {}
                }
            }
        }
    }

    chunks.extend(guard.stream().take_chunk());
    let mime = guard.stream().mime().to_string();
    let sealed = guard.stream().seal(chunks);
    guard.release();

    match sealed {
        Ok(bytes) => {
            tracing::info!("Capture {} finalized ({} bytes)", session, bytes.len());
            post(
                &signals,
                CaptureSignal::Utterance {
                    session,
                    audio: UtteranceAudio::new(bytes, mime),
                },
            );
        }
        Err(e) => {
            tracing::warn!("Capture {} could not be sealed: {}", session, e);
            post(
                &signals,
                CaptureSignal::Failed {
                    session,
                    error: DeviceError::Other(e.to_string()),
                },
            );
        }
    }
}
