//! In-process request/response transport.
//!
//! Models HTTP and WebSocket clients: each `send` is handed straight to a
//! server-side [`MessageHandler`] and its reply is queued for the next
//! [`Transport::receive`]. Length prefixes are accepted and stripped, so the
//! same bytes a framed client would write work here too.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, never, select, unbounded};
use parking_lot::Mutex;
use tracing::{debug, trace};

use relaymcp_core::framing;

use crate::error::{TransportError, TransportResult};
use crate::metrics::{AtomicMetrics, TransportMetrics};
use crate::traits::{MessageHandler, Transport};
use crate::types::{MessageContext, TransportKind, TransportRole, TransportState};

/// Synchronous client transport wired to an in-process handler
pub struct LoopbackTransport {
    kind: TransportKind,
    server: Arc<dyn MessageHandler>,
    context: MessageContext,
    responses_tx: Sender<Vec<u8>>,
    responses_rx: Receiver<Vec<u8>>,
    // `Some` while started; dropping it wakes blocked receivers
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Mutex<Receiver<()>>,
    client: Mutex<Option<Arc<dyn MessageHandler>>>,
    state: Mutex<TransportState>,
    metrics: AtomicMetrics,
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("kind", &self.kind)
            .field("state", &*self.state.lock())
            .field("queued", &self.responses_rx.len())
            .finish()
    }
}

impl LoopbackTransport {
    /// Create a loopback of the given request/response kind
    ///
    /// # Errors
    ///
    /// [`TransportError::ConfigurationError`] for [`TransportKind::Framed`].
    pub fn new(kind: TransportKind, server: Arc<dyn MessageHandler>) -> TransportResult<Self> {
        if !kind.is_synchronous() {
            return Err(TransportError::ConfigurationError(format!(
                "loopback transport requires HTTP or WebSocket, got {kind}"
            )));
        }
        let (responses_tx, responses_rx) = unbounded();
        Ok(Self {
            kind,
            server,
            context: MessageContext::default(),
            responses_tx,
            responses_rx,
            stop_tx: Mutex::new(None),
            stop_rx: Mutex::new(never()),
            client: Mutex::new(None),
            state: Mutex::new(TransportState::Disconnected),
            metrics: AtomicMetrics::new(),
        })
    }

    /// Context passed to the server handler
    #[must_use]
    pub fn with_context(mut self, context: MessageContext) -> Self {
        self.context = context;
        self
    }

    /// Queue a raw reply, as if the server had pushed it
    pub fn inject_response(&self, bytes: impl Into<Vec<u8>>) {
        self.responses_tx.send(bytes.into()).ok();
    }

    /// Traffic counters
    pub fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }
}

impl Transport for LoopbackTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn role(&self) -> TransportRole {
        TransportRole::Client
    }

    fn state(&self) -> TransportState {
        self.state.lock().clone()
    }

    fn start(&self, handler: Arc<dyn MessageHandler>) -> TransportResult<()> {
        let mut client = self.client.lock();
        if client.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        let (stop_tx, stop_rx) = unbounded();
        *self.stop_tx.lock() = Some(stop_tx);
        *self.stop_rx.lock() = stop_rx;
        *client = Some(handler);
        *self.state.lock() = TransportState::Connected;
        debug!("{} loopback transport started", self.kind);
        Ok(())
    }

    fn stop(&self) {
        let Some(handler) = self.client.lock().take() else {
            return;
        };
        *self.state.lock() = TransportState::Disconnecting;
        self.stop_tx.lock().take();
        *self.state.lock() = TransportState::Disconnected;
        handler.on_error(&TransportError::Stopping);
        debug!("{} loopback transport stopped", self.kind);
    }

    fn send(&self, data: &[u8]) -> TransportResult<()> {
        if !self.state.lock().is_connected() {
            return Err(TransportError::NotStarted);
        }
        let payload = framing::strip_frame(data);
        self.metrics.record_sent(payload.len());
        trace!("{} loopback sending {} bytes", self.kind, payload.len());

        match self.server.on_message(payload, &self.context) {
            Ok(Some(response)) => {
                self.responses_tx
                    .send(response.into_bytes())
                    .map_err(|_| TransportError::SendFailed("response queue closed".to_string()))?;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(e.message)),
        }
    }

    fn receive(&self, timeout: Option<Duration>) -> TransportResult<Vec<u8>> {
        let stop = self.stop_rx.lock().clone();
        if !self.state.lock().is_connected() {
            return Err(TransportError::NotStarted);
        }

        let received = match timeout {
            Some(timeout) => select! {
                recv(self.responses_rx) -> msg => msg.map_err(|_| RecvTimeoutError::Disconnected),
                recv(stop) -> _ => return Err(TransportError::Stopping),
                default(timeout) => Err(RecvTimeoutError::Timeout),
            },
            None => select! {
                recv(self.responses_rx) -> msg => msg.map_err(|_| RecvTimeoutError::Disconnected),
                recv(stop) -> _ => return Err(TransportError::Stopping),
            },
        };

        match received {
            Ok(bytes) => {
                self.metrics.record_received(bytes.len());
                Ok(bytes)
            }
            Err(RecvTimeoutError::Timeout) => {
                Err(TransportError::Timeout(timeout.unwrap_or_default()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(TransportError::ReceiveFailed("response queue closed".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymcp_core::McpError;

    struct Upper;

    impl MessageHandler for Upper {
        fn on_message(&self, data: &[u8], _ctx: &MessageContext) -> Result<Option<String>, McpError> {
            Ok(Some(String::from_utf8_lossy(data).to_uppercase()))
        }
    }

    #[test]
    fn test_framed_kind_rejected() {
        assert!(matches!(
            LoopbackTransport::new(TransportKind::Framed, Arc::new(Upper)),
            Err(TransportError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_send_strips_prefix_and_queues_reply() {
        let transport = LoopbackTransport::new(TransportKind::Http, Arc::new(Upper)).unwrap();
        transport.start(Arc::new(Upper)).unwrap();

        let frame = framing::encode_frame(b"abc").unwrap();
        transport.send(&frame).unwrap();
        let reply = transport.receive(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(reply, b"ABC");
    }

    #[test]
    fn test_receive_times_out() {
        let transport = LoopbackTransport::new(TransportKind::WebSocket, Arc::new(Upper)).unwrap();
        transport.start(Arc::new(Upper)).unwrap();
        assert!(matches!(
            transport.receive(Some(Duration::from_millis(20))),
            Err(TransportError::Timeout(_))
        ));
    }

    #[test]
    fn test_stop_wakes_blocked_receiver() {
        let transport =
            Arc::new(LoopbackTransport::new(TransportKind::Http, Arc::new(Upper)).unwrap());
        transport.start(Arc::new(Upper)).unwrap();

        let receiver = {
            let transport = Arc::clone(&transport);
            std::thread::spawn(move || transport.receive(None))
        };
        std::thread::sleep(Duration::from_millis(50));
        transport.stop();

        assert_eq!(receiver.join().unwrap(), Err(TransportError::Stopping));
    }
}
