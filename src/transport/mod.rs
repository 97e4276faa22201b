//! The bidirectional event channel to the assistant server.

pub mod protocol;
pub mod stdio;

pub use protocol::{InboundEvent, OutboundCommand};

use crate::error::TransportError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Outbound half of the event channel.
///
/// Sending never blocks; a failed send is reported so the caller can run
/// its transport-error path.
pub trait Transport: Send {
    fn send(&mut self, command: OutboundCommand) -> std::result::Result<(), TransportError>;
}

/// Forwards commands to a writer task over a tokio channel.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutboundCommand>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<OutboundCommand>) -> Self {
        Self { tx }
    }

    /// Transport plus the receiver its writer task should drain.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, command: OutboundCommand) -> std::result::Result<(), TransportError> {
        self.tx
            .send(command)
            .map_err(|_| TransportError::Disconnected)
    }
}

/// Transport that records what was sent, for tests.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundCommand>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail with `Disconnected`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drain the record
    pub fn take(&self) -> Vec<OutboundCommand> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, command: OutboundCommand) -> std::result::Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_transport_forwards() {
        let (mut transport, mut rx) = ChannelTransport::channel();
        transport.send(OutboundCommand::CancelSpeech).unwrap();
        assert_eq!(rx.try_recv().unwrap(), OutboundCommand::CancelSpeech);
    }

    #[test]
    fn test_channel_transport_reports_closed_receiver() {
        let (mut transport, rx) = ChannelTransport::channel();
        drop(rx);
        assert_eq!(
            transport.send(OutboundCommand::StopListening),
            Err(TransportError::Disconnected)
        );
    }

    #[test]
    fn test_recording_transport_shares_record_and_fails_on_demand() {
        let handle = RecordingTransport::new();
        let mut transport = handle.clone();
        transport.send(OutboundCommand::StartListening).unwrap();
        assert_eq!(handle.sent(), vec![OutboundCommand::StartListening]);

        handle.set_failing(true);
        assert!(transport.send(OutboundCommand::StopListening).is_err());
        assert_eq!(handle.take().len(), 1);
        assert!(handle.sent().is_empty());
    }
}
