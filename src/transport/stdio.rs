//! JSON-lines framing: inbound events on a reader, outbound commands on a writer.
//!
//! Used by the CLI over stdin/stdout; generic so tests can use in-memory I/O.

use crate::coordinator::Signal;
use crate::error::{Result, TransportError, VoxturnError};
use crate::transport::protocol::{InboundEvent, OutboundCommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Read inbound events until EOF or cancellation, posting each as a signal.
///
/// Malformed lines are logged and skipped. EOF and read errors are reported
/// as [`Signal::TransportFailed`]. Returns the number of events forwarded.
pub async fn pump_inbound<R>(
    reader: R,
    signals: mpsc::UnboundedSender<Signal>,
    cancel: CancellationToken,
) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return forwarded,
            line = lines.next_line() => line,
        };

        let failure = match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match InboundEvent::parse_line(&line) {
                    Ok(event) => {
                        tracing::debug!("Inbound {}", event.kind());
                        if signals.send(Signal::Inbound(event)).is_err() {
                            return forwarded;
                        }
                        forwarded += 1;
                    }
                    Err(e) => tracing::warn!("Skipping inbound line: {}", e),
                }
                continue;
            }
            Ok(None) => {
                tracing::info!("Inbound stream closed");
                TransportError::Disconnected
            }
            Err(e) => {
                tracing::warn!("Inbound read failed: {}", e);
                TransportError::Disconnected
            }
        };

        if signals.send(Signal::TransportFailed(failure)).is_err() {
            tracing::debug!("Runtime gone before transport failure was reported");
        }
        return forwarded;
    }
}

/// Write outbound commands, one JSON object per line, until the channel closes.
pub async fn pump_outbound<W>(
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<OutboundCommand>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = commands.recv().await {
        let mut line = command
            .to_json()
            .map_err(|e| VoxturnError::Other(format!("Failed to encode {:?}: {}", command, e)))?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
