//! The event loop that owns a [`TurnCoordinator`].
//!
//! All collaborators post [`Signal`]s on one unbounded channel; the loop
//! hands them to the coordinator one at a time. Cancelling the root token
//! stops the loop and every capture, playback and timer task with it.

use crate::audio::{Microphone, TaskCapture};
use crate::config::Config;
use crate::coordinator::{
    Collaborators, CoordinatorEvent, Flow, Signal, TokioScheduler, TurnCoordinator, UserAction,
};
use crate::playback::{AudioOutput, TaskPlayer};
use crate::presenter::Presenter;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Device and I/O adapters for a runtime.
pub struct RuntimeParts {
    pub transport: Box<dyn Transport>,
    pub microphone: Arc<dyn Microphone>,
    pub output: Arc<dyn AudioOutput>,
    pub presenter: Box<dyn Presenter>,
}

/// Cloneable way to talk to a running [`TurnRuntime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    signals: mpsc::UnboundedSender<Signal>,
    root: CancellationToken,
}

impl RuntimeHandle {
    /// Post any signal; returns false once the runtime is gone.
    pub fn post(&self, signal: Signal) -> bool {
        self.signals.send(signal).is_ok()
    }

    pub fn user(&self, action: UserAction) -> bool {
        self.post(Signal::User(action))
    }

    /// Ask the loop to stop after the signals already queued.
    pub fn shutdown(&self) -> bool {
        self.post(Signal::Shutdown)
    }

    /// Sender for transport readers.
    pub fn signals(&self) -> mpsc::UnboundedSender<Signal> {
        self.signals.clone()
    }

    /// Token cancelled when the runtime stops.
    pub fn cancellation(&self) -> CancellationToken {
        self.root.clone()
    }
}

pub struct TurnRuntime {
    coordinator: TurnCoordinator,
    signals: mpsc::UnboundedReceiver<Signal>,
    sender: mpsc::UnboundedSender<Signal>,
    root: CancellationToken,
}

impl TurnRuntime {
    /// Wire tokio-backed capture, playback and timers around the adapters.
    pub fn new(config: &Config, parts: RuntimeParts) -> Self {
        let (sender, signals) = mpsc::unbounded_channel();
        let root = CancellationToken::new();

        let capture = TaskCapture::new(
            parts.microphone,
            config.detector,
            sender.clone(),
            root.clone(),
        );
        let player = TaskPlayer::new(parts.output, sender.clone());
        let scheduler = TokioScheduler::new(sender.clone(), root.clone());

        let coordinator = TurnCoordinator::new(
            config,
            Collaborators {
                transport: parts.transport,
                capture: Box::new(capture),
                player: Box::new(player),
                scheduler: Box::new(scheduler),
                presenter: parts.presenter,
            },
        );

        Self {
            coordinator,
            signals,
            sender,
            root,
        }
    }

    pub fn with_event_sender(mut self, tx: crossbeam_channel::Sender<CoordinatorEvent>) -> Self {
        self.coordinator = self.coordinator.with_event_sender(tx);
        self
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            signals: self.sender.clone(),
            root: self.root.clone(),
        }
    }

    /// Run until a shutdown signal or cancellation; returns the coordinator
    /// so its final state can be inspected.
    pub async fn run(mut self) -> TurnCoordinator {
        tracing::info!("Turn runtime started");
        self.coordinator.begin();

        loop {
            let signal = tokio::select! {
                biased;
                _ = self.root.cancelled() => Signal::Shutdown,
                signal = self.signals.recv() => signal.unwrap_or(Signal::Shutdown),
            };
            if self.coordinator.handle(signal) == Flow::Shutdown {
                break;
            }
        }

        self.root.cancel();
        tracing::info!("Turn runtime stopped");
        self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ScriptedMicrophone;
    use crate::coordinator::TurnState;
    use crate::playback::SilentOutput;
    use crate::presenter::NullPresenter;
    use crate::transport::RecordingTransport;

    fn parts(transport: RecordingTransport, microphone: ScriptedMicrophone) -> RuntimeParts {
        RuntimeParts {
            transport: Box::new(transport),
            microphone: Arc::new(microphone),
            output: Arc::new(SilentOutput::default()),
            presenter: Box::new(NullPresenter),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop_and_cancels_root() {
        let mut config = Config::default();
        config.listening.auto_listen = false;
        let runtime = TurnRuntime::new(
            &config,
            parts(RecordingTransport::new(), ScriptedMicrophone::silent()),
        );
        let handle = runtime.handle();
        let task = tokio::spawn(runtime.run());

        assert!(handle.shutdown());
        let coordinator = task.await.unwrap();
        assert_eq!(coordinator.state(), TurnState::Idle);
        assert!(handle.cancellation().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancellation_stops_loop() {
        let microphone = ScriptedMicrophone::silent().with_levels(vec![40; 10_000]);
        let runtime = TurnRuntime::new(
            &Config::default(),
            parts(RecordingTransport::new(), microphone.clone()),
        );
        let handle = runtime.handle();
        let task = tokio::spawn(runtime.run());

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.cancellation().cancel();
        let coordinator = task.await.unwrap();
        assert!(coordinator.capture_session().is_none());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(microphone.released_count(), microphone.acquired_count());
    }
}
