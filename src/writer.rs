//! The socket writer: a single mutex-guarded sink, best-effort, fire-and-forget.

use futures::{Sink, SinkExt};
use tokio::sync::Mutex;

use crate::envelope::OutboundEnvelope;

/// An error a transport's [`Sink`] can raise that should be treated as an already-closed
/// connection rather than a fault worth logging and tearing down for. Transports that wrap a
/// WebSocket implement this for their error type to distinguish "peer sent a close frame" or "we
/// already closed" from a genuine I/O failure.
pub trait WriteError: std::error::Error + Send + Sync + 'static {
    /// Whether this error represents a normal, already-in-progress close rather than a fault.
    fn is_normal_close(&self) -> bool {
        false
    }
}

/// Serializes all outbound frames through a single mutex, so concurrent writers never interleave
/// partial frames on the wire.
pub struct SocketWriter<W> {
    sink: Mutex<W>,
}

impl<W> SocketWriter<W>
where
    W: Sink<OutboundEnvelope> + Unpin + Send,
    W::Error: WriteError,
{
    /// Wraps a transport sink.
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    /// Writes `envelope`, closing the socket on any error that isn't already a normal close.
    /// Returns `true` if the socket is now closed (the caller should treat the connection as
    /// done once its read loop also observes this).
    pub async fn write_or_close(&self, envelope: OutboundEnvelope) -> bool {
        let mut sink = self.sink.lock().await;
        match sink.send(envelope).await {
            Ok(()) => false,
            Err(e) if e.is_normal_close() => true,
            Err(e) => {
                tracing::warn!(error = %e, "closing socket after write failure");
                let _ = sink.close().await;
                true
            }
        }
    }
}
