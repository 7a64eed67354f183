//! In-process framed transport.
//!
//! [`ChannelTransport::pair`] returns two connected ends that exchange raw
//! bytes over crossbeam channels. Each end decodes the 4-byte length prefix
//! incrementally, exactly as a socket reader would, so partial and coalesced
//! writes behave like they do on a real stream.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use relaymcp_core::framing::{self, FrameDecoder};

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult, validate_message_size};
use crate::metrics::{AtomicMetrics, TransportMetrics};
use crate::traits::{MessageHandler, Transport};
use crate::types::{MessageContext, TransportKind, TransportRole, TransportState};

struct Running {
    // Dropping the sender wakes the reader
    shutdown: Sender<()>,
    reader: JoinHandle<()>,
    handler: Arc<dyn MessageHandler>,
}

/// One end of an in-memory framed connection
pub struct ChannelTransport {
    role: TransportRole,
    config: TransportConfig,
    outbound: Sender<Vec<u8>>,
    inbound: Receiver<Vec<u8>>,
    state: Arc<Mutex<TransportState>>,
    running: Mutex<Option<Running>>,
    metrics: Arc<AtomicMetrics>,
}

impl fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("role", &self.role)
            .field("state", &*self.state.lock())
            .field("max_message_size", &self.config.max_message_size)
            .finish()
    }
}

impl ChannelTransport {
    /// Create a connected `(client, server)` pair
    pub fn pair(config: TransportConfig) -> (Self, Self) {
        let (to_server, from_client) = unbounded();
        let (to_client, from_server) = unbounded();
        (
            Self::new(TransportRole::Client, config.clone(), to_server, from_server),
            Self::new(TransportRole::Server, config, to_client, from_client),
        )
    }

    fn new(
        role: TransportRole,
        config: TransportConfig,
        outbound: Sender<Vec<u8>>,
        inbound: Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            role,
            config,
            outbound,
            inbound,
            state: Arc::new(Mutex::new(TransportState::Disconnected)),
            running: Mutex::new(None),
            metrics: Arc::new(AtomicMetrics::new()),
        }
    }

    /// Traffic counters
    pub fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }
}

impl Transport for ChannelTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Framed
    }

    fn role(&self) -> TransportRole {
        self.role
    }

    fn state(&self) -> TransportState {
        self.state.lock().clone()
    }

    fn start(&self, handler: Arc<dyn MessageHandler>) -> TransportResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let (shutdown, shutdown_rx) = unbounded::<()>();
        let reader = ReaderLoop {
            inbound: self.inbound.clone(),
            outbound: self.outbound.clone(),
            shutdown: shutdown_rx,
            handler: Arc::clone(&handler),
            state: Arc::clone(&self.state),
            metrics: Arc::clone(&self.metrics),
            max_message_size: self.config.max_message_size,
        };
        let reader = thread::Builder::new()
            .name(format!("relaymcp-channel-{}", self.role))
            .spawn(move || reader.run())?;

        *self.state.lock() = TransportState::Connected;
        *running = Some(Running {
            shutdown,
            reader,
            handler,
        });
        debug!("Channel transport ({}) started", self.role);
        Ok(())
    }

    fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        *self.state.lock() = TransportState::Disconnecting;

        drop(running.shutdown);
        if running.reader.join().is_err() {
            warn!("Channel reader thread panicked");
        }

        *self.state.lock() = TransportState::Disconnected;
        running.handler.on_error(&TransportError::Stopping);
        debug!("Channel transport ({}) stopped", self.role);
    }

    fn send(&self, data: &[u8]) -> TransportResult<()> {
        if !self.state.lock().is_connected() {
            return Err(TransportError::NotStarted);
        }
        validate_message_size(
            data.len(),
            self.config.max_message_size + framing::FRAME_HEADER_LEN,
        )?;
        self.outbound
            .send(data.to_vec())
            .map_err(|_| TransportError::ConnectionLost("peer dropped".to_string()))?;
        self.metrics.record_sent(data.len());
        trace!("Channel sent {} bytes", data.len());
        Ok(())
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ReaderLoop {
    inbound: Receiver<Vec<u8>>,
    outbound: Sender<Vec<u8>>,
    shutdown: Receiver<()>,
    handler: Arc<dyn MessageHandler>,
    state: Arc<Mutex<TransportState>>,
    metrics: Arc<AtomicMetrics>,
    max_message_size: usize,
}

impl ReaderLoop {
    fn run(self) {
        let ctx = MessageContext::default();
        let mut decoder = FrameDecoder::new(self.max_message_size);

        loop {
            select! {
                recv(self.inbound) -> chunk => match chunk {
                    Ok(chunk) => {
                        decoder.extend(&chunk);
                        if let Err(e) = self.drain(&mut decoder, &ctx) {
                            warn!("Dropping out-of-sync channel stream: {}", e);
                            self.handler.on_error(&e);
                            decoder = FrameDecoder::new(self.max_message_size);
                        }
                    }
                    Err(_) => {
                        debug!("Channel peer closed");
                        *self.state.lock() = TransportState::Failed {
                            reason: "peer closed".to_string(),
                        };
                        self.handler
                            .on_error(&TransportError::ConnectionLost("peer closed".to_string()));
                        break;
                    }
                },
                recv(self.shutdown) -> _ => break,
            }
        }
    }

    fn drain(&self, decoder: &mut FrameDecoder, ctx: &MessageContext) -> TransportResult<()> {
        while let Some(frame) = decoder.next_frame()? {
            self.metrics.record_received(frame.len() + framing::FRAME_HEADER_LEN);
            match self.handler.on_message(&frame, ctx) {
                Ok(Some(response)) => {
                    let encoded = framing::encode_frame(response.as_bytes())?;
                    if self.outbound.send(encoded.to_vec()).is_ok() {
                        self.metrics.record_sent(encoded.len());
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Message handler failed: {}", e),
            }
        }
        Ok(())
    }
}
