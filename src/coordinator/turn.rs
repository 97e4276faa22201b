//! The turn-taking state machine.
//!
//! [`TurnCoordinator`] is sans-IO: it reacts to one [`Signal`] at a time and
//! drives its collaborators (transport, capture driver, player, scheduler,
//! presenter) through traits. Everything asynchronous happens elsewhere and
//! comes back as another signal.

use crate::audio::{
    CaptureDriver, CapturePhase, CaptureSession, CaptureSignal, SessionId, UtteranceAudio,
};
use crate::config::{Config, KeywordConfig};
use crate::conversation::{ConversationLog, Message};
use crate::coordinator::scheduler::Scheduler;
use crate::coordinator::signal::{
    CoordinatorEvent, Flow, KeywordKind, Signal, TurnEvent, UserAction,
};
use crate::coordinator::state::{SessionFlags, TurnState};
use crate::defaults;
use crate::error::{DeviceError, TransportError};
use crate::keywords::{KeywordClassifier, KeywordVerdict};
use crate::playback::{PlaybackEvent, PlaybackQueue, PlaybackSignal, Player, decode_segment};
use crate::presenter::Presenter;
use crate::response::{HtmlRenderer, MarkupRenderer, ResponseAssembler, decode_fragment_text};
use crate::transport::{InboundEvent, OutboundCommand, Transport};
use std::time::Duration;

/// The collaborators a coordinator drives.
pub struct Collaborators {
    pub transport: Box<dyn Transport>,
    pub capture: Box<dyn CaptureDriver>,
    pub player: Box<dyn Player>,
    pub scheduler: Box<dyn Scheduler>,
    pub presenter: Box<dyn Presenter>,
}

pub struct TurnCoordinator {
    transport: Box<dyn Transport>,
    driver: Box<dyn CaptureDriver>,
    player: Box<dyn Player>,
    scheduler: Box<dyn Scheduler>,
    presenter: Box<dyn Presenter>,
    assembler: ResponseAssembler,
    queue: PlaybackQueue,
    classifier: KeywordClassifier,
    keywords: KeywordConfig,
    log: ConversationLog,
    flags: SessionFlags,
    state: TurnState,
    capture: Option<CaptureSession>,
    next_session: u64,
    next_segment: u64,
    restart_delay: Duration,
    observer: Option<crossbeam_channel::Sender<CoordinatorEvent>>,
    /// First send failure seen while handling the current signal.
    deferred_error: Option<TransportError>,
    in_error_path: bool,
}

impl TurnCoordinator {
    pub fn new(config: &Config, parts: Collaborators) -> Self {
        let flags = SessionFlags::from_config(config);
        let classifier =
            KeywordClassifier::from_lists(&config.keywords.lists_for(&flags.tts_language));
        Self {
            transport: parts.transport,
            driver: parts.capture,
            player: parts.player,
            scheduler: parts.scheduler,
            presenter: parts.presenter,
            assembler: ResponseAssembler::new(Box::new(HtmlRenderer)),
            queue: PlaybackQueue::new(config.playback.inter_segment_gap()),
            classifier,
            keywords: config.keywords.clone(),
            log: ConversationLog::new(),
            flags,
            state: TurnState::Idle,
            capture: None,
            next_session: 0,
            next_segment: 0,
            restart_delay: config.listening.error_restart_delay(),
            observer: None,
            deferred_error: None,
            in_error_path: false,
        }
    }

    /// Replace the markdown renderer used for rich responses.
    pub fn with_renderer(mut self, renderer: Box<dyn MarkupRenderer>) -> Self {
        self.assembler = ResponseAssembler::new(renderer);
        self
    }

    /// Publish state changes and finalized messages on `tx`.
    pub fn with_event_sender(mut self, tx: crossbeam_channel::Sender<CoordinatorEvent>) -> Self {
        self.observer = Some(tx);
        self
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn flags(&self) -> &SessionFlags {
        &self.flags
    }

    pub fn conversation(&self) -> &ConversationLog {
        &self.log
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn capture_session(&self) -> Option<&CaptureSession> {
        self.capture.as_ref()
    }

    /// Enter `Listening` if auto-listen allows it; used once at startup.
    pub fn begin(&mut self) {
        if self.flags.may_resume() {
            self.listen();
        }
        self.flush_deferred_error();
    }

    /// Process one signal.
    pub fn handle(&mut self, signal: Signal) -> Flow {
        let flow = match signal {
            Signal::Inbound(event) => {
                self.on_inbound(event);
                Flow::Continue
            }
            Signal::TransportFailed(error) => {
                self.dispatch(TurnEvent::TransportError(error));
                Flow::Continue
            }
            Signal::Capture(signal) => {
                self.on_capture(signal);
                Flow::Continue
            }
            Signal::Playback(signal) => {
                let event = self.queue.handle(signal, self.player.as_mut());
                self.on_playback_event(event);
                Flow::Continue
            }
            Signal::RestartListening { token } => {
                self.on_restart(token);
                Flow::Continue
            }
            Signal::User(action) => {
                self.on_user(action);
                Flow::Continue
            }
            Signal::Shutdown => {
                self.shutdown();
                return Flow::Shutdown;
            }
        };
        self.flush_deferred_error();
        flow
    }

    /// Route a turn event to its transition function.
    pub fn dispatch(&mut self, event: TurnEvent) {
        tracing::debug!("{} in {}", event.name(), self.state);
        match event {
            TurnEvent::UtteranceReady(audio) => self.on_utterance_ready(audio),
            TurnEvent::FragmentReceived { text, audio } => self.on_fragment(&text, audio),
            TurnEvent::StreamComplete { cancelled } => self.on_stream_complete(cancelled),
            TurnEvent::PlaybackEmpty => self.on_playback_empty(),
            TurnEvent::KeywordDetected(kind) => self.on_keyword(kind),
            TurnEvent::TransportError(error) => self.on_transport_error(error),
            TurnEvent::UserManualToggle => self.on_manual_toggle(),
        }
    }

    // ── transitions ────────────────────────────────────────────────────

    fn on_utterance_ready(&mut self, audio: UtteranceAudio) {
        tracing::info!("Utterance ready ({} bytes, {})", audio.bytes.len(), audio.mime);
        self.send(OutboundCommand::AudioData {
            audio: audio.to_data_url(),
        });
        self.flags.stream_complete = false;
        self.flags.audio_seen = false;
        self.set_state(TurnState::AwaitingResponse);

        if self.flags.listen_while_waiting && self.flags.may_resume() {
            self.start_capture();
        }
    }

    fn on_fragment(&mut self, text: &str, audio: Option<String>) {
        if self.flags.cancel_pending {
            tracing::debug!("Dropping fragment of a cancelled response");
            return;
        }
        if self.state == TurnState::Listening {
            self.stop_capture(false);
            self.set_state(TurnState::AwaitingResponse);
        }

        self.flags.generating = true;
        self.flags.stream_complete = false;
        let update = if self.assembler.is_open() {
            self.assembler.append_fragment(text)
        } else {
            self.assembler.start_stream(text)
        };
        self.presenter.message_updated(&update);

        let Some(audio) = audio else {
            return;
        };
        let seq = self.next_segment;
        self.next_segment += 1;
        match decode_segment(seq, &audio, defaults::SEGMENT_MIME) {
            Ok(segment) => {
                self.flags.audio_seen = true;
                let event = self.queue.enqueue(segment, self.player.as_mut());
                self.on_playback_event(event);
                if self.capture.is_some() && !self.flags.listen_while_waiting {
                    self.stop_capture(false);
                }
                self.set_state(TurnState::Speaking);
            }
            Err(e) => tracing::warn!("Dropping audio of fragment: {}", e),
        }
    }

    fn on_stream_complete(&mut self, cancelled: bool) {
        if self.flags.cancel_pending {
            // Acknowledgement of our own cancel, whatever its flag says
            tracing::debug!("Response cancellation acknowledged");
            self.flags.cancel_pending = false;
            return;
        }

        if cancelled {
            tracing::info!("Response cancelled by the server");
            self.queue.interrupt(self.player.as_mut());
            self.flags.playback_idle = true;
            self.close_stream(true);
            self.flags.generating = false;
            self.flags.stream_complete = true;
            self.show_status("Response generation stopped");
            self.resolve_turn();
            return;
        }

        self.close_stream(false);
        self.flags.generating = false;
        self.flags.stream_complete = true;
        self.flags.restart_available = true;

        if !self.flags.audio_seen || self.queue.is_idle() {
            self.resolve_turn();
        } else {
            tracing::debug!("Stream complete, waiting for playback");
        }
    }

    fn on_playback_empty(&mut self) {
        self.flags.playback_idle = true;
        if self.flags.stream_complete && self.state == TurnState::Speaking {
            self.resolve_turn();
        }
    }

    fn on_keyword(&mut self, kind: KeywordKind) {
        match kind {
            KeywordKind::Stop => {
                tracing::info!("Stop word heard, auto-listen disabled");
                self.flags.stop_word_seen = true;
                self.flags.auto_listen = false;
                self.stop_capture(false);
                self.set_state(TurnState::Idle);
            }
            KeywordKind::Interrupt => self.interrupt(true),
        }
    }

    fn on_transport_error(&mut self, error: TransportError) {
        tracing::warn!("Transport error: {}", error);
        self.in_error_path = true;
        let status = match &error {
            TransportError::Server { message } => message.clone(),
            TransportError::Disconnected => "Disconnected from server".to_string(),
        };
        self.show_status(&status);
        self.close_stream(true);
        self.queue.interrupt(self.player.as_mut());
        self.flags.playback_idle = true;
        self.stop_capture(false);
        self.flags.reset_response();
        self.flags.cancel_pending = false;
        self.set_state(TurnState::Idle);

        if self.flags.restart_available && !self.flags.manual_stop && self.flags.auto_listen {
            self.flags.restart_available = false;
            self.flags.restart_token += 1;
            tracing::info!("Listening again in {:?}", self.restart_delay);
            self.scheduler.schedule(
                self.restart_delay,
                Signal::RestartListening {
                    token: self.flags.restart_token,
                },
            );
        }
        self.in_error_path = false;
    }

    fn on_manual_toggle(&mut self) {
        if let Some(session) = &self.capture {
            if session.phase == CapturePhase::Finalizing {
                tracing::debug!("Toggle ignored, capture {} still finalizing", session.id);
                return;
            }
            tracing::info!("Microphone stopped by the user");
            self.flags.manual_stop = true;
            self.stop_capture(true);
            return;
        }

        self.flags.manual_stop = false;
        if self.is_assistant_active() {
            self.interrupt(true);
        } else {
            self.listen();
        }
    }

    // ── signal handlers ────────────────────────────────────────────────

    fn on_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Status { message } => self.show_status(&message),
            InboundEvent::Transcript { text } => {
                if self.log.push_user_if_new(&text)
                    && let Some(message) = self.log.last().cloned()
                {
                    self.finalized(message);
                }
                self.classify_transcript(&text);
            }
            InboundEvent::Response {
                text,
                audio,
                last_user_message,
            } => {
                self.record_user_message(last_user_message.as_deref());
                if self.assembler.is_open() {
                    self.close_stream(false);
                }
                self.dispatch(TurnEvent::FragmentReceived {
                    text: decode_fragment_text(&text),
                    audio,
                });
                self.dispatch(TurnEvent::StreamComplete { cancelled: false });
            }
            InboundEvent::ResponseChunk { text, audio } => {
                self.dispatch(TurnEvent::FragmentReceived {
                    text: decode_fragment_text(&text),
                    audio,
                });
            }
            InboundEvent::ResponseComplete {
                cancelled,
                last_user_message,
            } => {
                self.record_user_message(last_user_message.as_deref());
                self.dispatch(TurnEvent::StreamComplete { cancelled });
            }
            InboundEvent::Error { message } => {
                self.dispatch(TurnEvent::TransportError(TransportError::Server { message }));
            }
            InboundEvent::ListeningStarted => tracing::debug!("Server is listening"),
            InboundEvent::ListeningStopped => tracing::debug!("Server stopped listening"),
            InboundEvent::Interrupt => {
                if self.is_assistant_active() || self.state == TurnState::AwaitingResponse {
                    self.interrupt(false);
                }
            }
        }
    }

    fn on_capture(&mut self, signal: CaptureSignal) {
        let live = self.capture.as_ref().map(|session| session.id);
        if live != Some(signal.session()) {
            tracing::debug!("Stale capture signal from {}", signal.session());
            return;
        }

        match signal {
            CaptureSignal::Started { session } => {
                if let Some(capture) = self.capture.as_mut() {
                    if capture.phase == CapturePhase::Acquiring {
                        capture.phase = CapturePhase::Recording;
                    }
                    capture.announced = true;
                }
                tracing::debug!("Capture {} started", session);
                self.send(OutboundCommand::StartListening);
            }
            CaptureSignal::Failed { error, .. } => self.on_device_error(error),
            CaptureSignal::Amplitude { level, .. } => self.presenter.input_level(level),
            CaptureSignal::Utterance { audio, .. } => {
                // Detector-ended sessions and stops made while acquiring
                // have not announced the stop yet
                if let Some(session) = self.capture.take()
                    && session.announced
                {
                    self.send(OutboundCommand::StopListening);
                }
                if audio.is_empty() {
                    tracing::info!("Empty utterance dropped");
                    if self.state == TurnState::Listening {
                        self.set_state(TurnState::Idle);
                    }
                    return;
                }
                self.dispatch(TurnEvent::UtteranceReady(audio));
            }
            CaptureSignal::Abandoned { session } => {
                tracing::info!("Capture {} abandoned, nobody spoke", session);
                if self.capture.take().is_some_and(|capture| capture.announced) {
                    self.send(OutboundCommand::StopListening);
                }
                self.flags.manual_stop = true;
                if self.state == TurnState::Listening {
                    self.set_state(TurnState::Idle);
                }
            }
        }
    }

    fn on_device_error(&mut self, error: DeviceError) {
        tracing::warn!("Microphone unavailable: {}", error);
        self.capture = None;
        self.flags.manual_stop = true;
        self.presenter.device_error(&error);
        self.notify(CoordinatorEvent::DeviceError(error));
        if self.state == TurnState::Listening {
            self.set_state(TurnState::Idle);
        }
    }

    fn on_playback_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Started(_) | PlaybackEvent::Queued { .. } => {
                self.flags.playback_idle = false;
            }
            PlaybackEvent::GapScheduled { generation, after } => {
                self.scheduler
                    .schedule(after, Signal::Playback(PlaybackSignal::GapElapsed { generation }));
            }
            PlaybackEvent::Drained => self.dispatch(TurnEvent::PlaybackEmpty),
            PlaybackEvent::Skipped { seq, next } => {
                tracing::debug!("Segment {} skipped", seq);
                self.on_playback_event(*next);
            }
            PlaybackEvent::Stale => {}
        }
    }

    fn on_restart(&mut self, token: u64) {
        if token != self.flags.restart_token {
            tracing::debug!("Ignoring superseded restart {}", token);
            return;
        }
        if self.state != TurnState::Idle || !self.flags.may_resume() {
            tracing::debug!("Restart no longer wanted in {}", self.state);
            return;
        }
        tracing::info!("Listening again after transport error");
        self.listen();
    }

    fn on_user(&mut self, action: UserAction) {
        match action {
            UserAction::ToggleListening => self.dispatch(TurnEvent::UserManualToggle),
            UserAction::SendText(text) => self.send_text(&text),
            UserAction::Interrupt => self.interrupt(true),
            UserAction::SetAutoListen(on) => {
                self.flags.auto_listen = on;
                if on {
                    self.flags.stop_word_seen = false;
                    self.flags.manual_stop = false;
                    if self.state == TurnState::Idle {
                        self.listen();
                    }
                }
            }
            UserAction::ChangeModel(model) => {
                tracing::info!("Switching model to {}", model);
                self.flags.model = Some(model.clone());
                self.send(OutboundCommand::ChangeModel { model });
            }
            UserAction::ChangeLanguage(lang) => {
                tracing::info!("Switching speech language to {}", lang);
                self.classifier = KeywordClassifier::from_lists(&self.keywords.lists_for(&lang));
                self.flags.tts_language = lang.clone();
                self.send(OutboundCommand::ChangeTtsLang { lang });
            }
        }
    }

    fn send_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let verdict = self.classifier.classify(text).verdict();

        if self.is_assistant_active() {
            self.cut_off(true);
        }
        self.stop_capture(false);

        self.log.push(Message::user(text));
        if let Some(message) = self.log.last().cloned() {
            self.finalized(message);
        }
        self.send(OutboundCommand::TextInput {
            text: text.to_string(),
        });

        if verdict == KeywordVerdict::Stop {
            self.flags.stop_word_seen = true;
            self.flags.auto_listen = false;
        }
        self.flags.stream_complete = false;
        self.flags.audio_seen = false;
        self.set_state(TurnState::AwaitingResponse);
    }

    fn shutdown(&mut self) {
        tracing::info!("Coordinator shutting down");
        self.stop_capture(false);
        self.queue.interrupt(self.player.as_mut());
        self.close_stream(true);
    }

    // ── helpers ────────────────────────────────────────────────────────

    fn classify_transcript(&mut self, text: &str) {
        match self.classifier.classify(text).verdict() {
            KeywordVerdict::Stop => self.dispatch(TurnEvent::KeywordDetected(KeywordKind::Stop)),
            KeywordVerdict::Interrupt => {
                self.dispatch(TurnEvent::KeywordDetected(KeywordKind::Interrupt))
            }
            KeywordVerdict::None => {}
        }
    }

    fn record_user_message(&mut self, text: Option<&str>) {
        if let Some(text) = text
            && self.log.push_user_if_new(text)
            && let Some(message) = self.log.last().cloned()
        {
            self.finalized(message);
        }
    }

    /// The assistant is generating, speaking, or has audio left to play.
    fn is_assistant_active(&self) -> bool {
        self.flags.generating || self.state == TurnState::Speaking || !self.queue.is_idle()
    }

    /// Silence the assistant and keep the partial message.
    fn cut_off(&mut self, send_cancels: bool) {
        if send_cancels {
            // A sent utterance counts as in flight before its first fragment
            if self.flags.generating || self.state == TurnState::AwaitingResponse {
                self.flags.cancel_pending = true;
                self.send(OutboundCommand::CancelResponse);
            }
            self.send(OutboundCommand::CancelSpeech);
        }
        let dropped = self.queue.interrupt(self.player.as_mut());
        tracing::info!("Assistant interrupted ({} queued segments dropped)", dropped);
        self.flags.playback_idle = true;
        self.close_stream(true);
        self.flags.reset_response();
    }

    /// Interrupt path: cut the assistant off and hand the turn to the user.
    fn interrupt(&mut self, send_cancels: bool) {
        self.cut_off(send_cancels);
        self.show_status("Response interrupted");
        self.set_state(TurnState::Interrupted);
        self.listen();
    }

    /// Decide what follows a finished turn.
    fn resolve_turn(&mut self) {
        if self.flags.may_resume() {
            tracing::info!("Turn over, listening");
            self.listen();
        } else {
            tracing::info!("Turn over, staying idle");
            if self.capture.is_some() {
                self.stop_capture(false);
            }
            self.set_state(TurnState::Idle);
        }
        self.flags.stop_word_seen = false;
        self.flags.audio_seen = false;
    }

    fn listen(&mut self) {
        if self.capture.is_none() {
            self.start_capture();
        }
        self.set_state(TurnState::Listening);
    }

    fn start_capture(&mut self) {
        self.next_session += 1;
        let id = SessionId(self.next_session);
        if let Some(previous) = self.capture.replace(CaptureSession::new(id)) {
            tracing::debug!("Capture {} superseded by {}", previous.id, id);
        }
        self.driver.start(id);
    }

    /// End the live capture; `finalize` keeps its audio, otherwise it is dropped.
    fn stop_capture(&mut self, finalize: bool) {
        let Some(session) = self.capture.as_mut() else {
            return;
        };
        let id = session.id;
        let announced = std::mem::take(&mut session.announced);

        if finalize {
            session.phase = CapturePhase::Finalizing;
            self.driver.finalize(id);
        } else {
            self.capture = None;
            self.driver.discard(id);
        }
        if announced {
            self.send(OutboundCommand::StopListening);
        }
    }

    /// Close the open assistant message, if any, and log it.
    fn close_stream(&mut self, interrupted: bool) {
        let message = if interrupted {
            self.assembler.interrupt_stream()
        } else {
            self.assembler.complete_stream()
        };
        if let Some(message) = message {
            self.log.push(message.clone());
            self.finalized(message);
        }
    }

    fn finalized(&mut self, message: Message) {
        self.presenter.message_finalized(&message);
        self.notify(CoordinatorEvent::MessageFinalized(message));
    }

    fn show_status(&mut self, message: &str) {
        self.presenter.status(message);
        self.notify(CoordinatorEvent::Status(message.to_string()));
    }

    fn set_state(&mut self, to: TurnState) {
        let from = self.state;
        if from == to {
            return;
        }
        tracing::debug!("Turn state {} -> {}", from, to);
        self.state = to;
        self.presenter.state_changed(from, to);
        self.notify(CoordinatorEvent::StateChanged { from, to });
    }

    fn notify(&self, event: CoordinatorEvent) {
        if let Some(ref tx) = self.observer
            && tx.try_send(event).is_err()
        {
            // Observer full or gone; events are best effort
        }
    }

    fn send(&mut self, command: OutboundCommand) {
        if let Err(e) = self.transport.send(command) {
            if self.in_error_path {
                tracing::debug!("Send failed during error handling: {}", e);
            } else if self.deferred_error.is_none() {
                self.deferred_error = Some(e);
            }
        }
    }

    fn flush_deferred_error(&mut self) {
        if let Some(error) = self.deferred_error.take() {
            self.dispatch(TurnEvent::TransportError(error));
        }
    }
}
