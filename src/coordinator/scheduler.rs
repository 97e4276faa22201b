//! Delayed signals: inter-segment gaps and the error restart.

use crate::coordinator::signal::Signal;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Posts a signal back to the coordinator after a delay.
pub trait Scheduler: Send {
    fn schedule(&mut self, after: Duration, signal: Signal);
}

/// Sleeps in a tokio task, abandoned when the runtime shuts down.
pub struct TokioScheduler {
    signals: mpsc::UnboundedSender<Signal>,
    root: CancellationToken,
}

impl TokioScheduler {
    pub fn new(signals: mpsc::UnboundedSender<Signal>, root: CancellationToken) -> Self {
        Self { signals, root }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, after: Duration, signal: Signal) {
        let signals = self.signals.clone();
        let cancel = self.root.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    if signals.send(signal).is_err() {
                        tracing::debug!("Timer fired after runtime shut down");
                    }
                }
            }
        });
    }
}

/// Scheduler that only records requests; tests fire them by hand.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    pending: Arc<Mutex<Vec<(Duration, Signal)>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<(Duration, Signal)> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Drain every recorded request, oldest first.
    pub fn take(&self) -> Vec<(Duration, Signal)> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, after: Duration, signal: Signal) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((after, signal));
    }
}
