//! The transport contract.
//!
//! A transport owns its I/O threads and delivers every inbound payload to a
//! [`MessageHandler`]. What the handler returns is written back to the same
//! peer, framed the way the transport frames everything else.

use std::fmt::Debug;
use std::time::Duration;

use relaymcp_core::McpError;

use crate::error::{TransportError, TransportResult};
use crate::types::{MessageContext, TransportKind, TransportRole, TransportState};
use std::sync::Arc;

/// Receiver of inbound payloads and transport failures
pub trait MessageHandler: Send + Sync {
    /// Handle one complete inbound payload (length prefix already removed)
    ///
    /// `Ok(Some(text))` is sent back to the originating peer; `Ok(None)`
    /// sends nothing.
    ///
    /// # Errors
    ///
    /// An error is logged by the transport; the connection stays open.
    fn on_message(&self, data: &[u8], ctx: &MessageContext) -> Result<Option<String>, McpError>;

    /// Called once per failure, and with [`TransportError::Stopping`] when
    /// the transport is stopped
    fn on_error(&self, error: &TransportError) {
        let _ = error;
    }
}

/// A bidirectional message transport
pub trait Transport: Send + Sync + Debug {
    /// Wire discipline
    fn kind(&self) -> TransportKind;

    /// Which end this transport serves
    fn role(&self) -> TransportRole;

    /// Current connection state
    fn state(&self) -> TransportState;

    /// Begin delivering inbound payloads to `handler`
    ///
    /// # Errors
    ///
    /// Fails when the transport is already running or cannot connect.
    fn start(&self, handler: Arc<dyn MessageHandler>) -> TransportResult<()>;

    /// Stop I/O and release resources
    ///
    /// Before returning, the handler receives [`TransportError::Stopping`]
    /// so that blocked waiters can give up.
    fn stop(&self);

    /// Write bytes to the peer as-is
    ///
    /// Framed transports expect the caller to include the length prefix.
    ///
    /// # Errors
    ///
    /// Fails when not connected or the write fails.
    fn send(&self, data: &[u8]) -> TransportResult<()>;

    /// Write several buffers as one contiguous message
    ///
    /// # Errors
    ///
    /// Same as [`Transport::send`].
    fn sendv(&self, buffers: &[&[u8]]) -> TransportResult<()> {
        self.send(&buffers.concat())
    }

    /// Block until a response arrives or the timeout elapses
    ///
    /// Only request/response transports support this.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotSupported`] for framed transports,
    /// [`TransportError::Timeout`] when nothing arrives in time.
    fn receive(&self, timeout: Option<Duration>) -> TransportResult<Vec<u8>> {
        let _ = timeout;
        Err(TransportError::NotSupported(format!(
            "receive on {} transport",
            self.kind()
        )))
    }

    /// Whether callers should read responses back with `receive`
    fn is_synchronous(&self) -> bool {
        self.kind().is_synchronous()
    }

    /// Whether messages can flow
    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }
}
