//! Framed TCP transports on blocking sockets.
//!
//! Every connection gets one reader thread. Inbound frames go to the
//! [`MessageHandler`]; its reply is framed and written back on the same
//! socket. Stopping shuts the sockets down, which unblocks the readers.

use std::fmt;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use relaymcp_core::IntMap;
use relaymcp_core::framing::{self, FramingError};

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult, validate_message_size};
use crate::metrics::{AtomicMetrics, TransportMetrics};
use crate::traits::{MessageHandler, Transport};
use crate::types::{MessageContext, TransportKind, TransportRole, TransportState};

/// Read frames from `stream` until it closes, answering each one
///
/// Returns `Ok(())` on a clean close.
fn serve_connection(
    stream: &TcpStream,
    ctx: &MessageContext,
    handler: &dyn MessageHandler,
    metrics: &AtomicMetrics,
    max_message_size: usize,
) -> TransportResult<()> {
    let mut reader = stream;
    loop {
        let payload = match framing::read_frame(&mut reader, max_message_size) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(()),
            Err(FramingError::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                return Err(TransportError::ConnectionLost("read timed out".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        metrics.record_received(payload.len() + framing::FRAME_HEADER_LEN);
        trace!("Received {} bytes on connection {}", payload.len(), ctx.connection_id);

        match handler.on_message(&payload, ctx) {
            Ok(Some(response)) => {
                let mut writer = stream;
                framing::write_frame(&mut writer, response.as_bytes())?;
                metrics.record_sent(response.len() + framing::FRAME_HEADER_LEN);
            }
            Ok(None) => {}
            Err(e) => warn!("Message handler failed on connection {}: {}", ctx.connection_id, e),
        }
    }
}

struct ClientConnection {
    stream: TcpStream,
    reader: JoinHandle<()>,
    handler: Arc<dyn MessageHandler>,
}

/// Framed TCP client
pub struct TcpClientTransport {
    remote: String,
    config: TransportConfig,
    connection: Mutex<Option<ClientConnection>>,
    writer: Mutex<Option<TcpStream>>,
    state: Arc<Mutex<TransportState>>,
    stopping: Arc<AtomicBool>,
    metrics: Arc<AtomicMetrics>,
}

impl fmt::Debug for TcpClientTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpClientTransport")
            .field("remote", &self.remote)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl TcpClientTransport {
    /// Create a client for `host:port`; nothing connects until `start`
    pub fn new(remote: impl Into<String>, config: TransportConfig) -> Self {
        Self {
            remote: remote.into(),
            config,
            connection: Mutex::new(None),
            writer: Mutex::new(None),
            state: Arc::new(Mutex::new(TransportState::Disconnected)),
            stopping: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(AtomicMetrics::new()),
        }
    }

    /// Traffic counters
    pub fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }

    fn connect(&self) -> TransportResult<TcpStream> {
        let addrs = self
            .remote
            .to_socket_addrs()
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {e}", self.remote)))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(TransportError::ConnectionFailed(match last_error {
            Some(e) => format!("{}: {e}", self.remote),
            None => format!("{}: no addresses resolved", self.remote),
        }))
    }
}

impl Transport for TcpClientTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Framed
    }

    fn role(&self) -> TransportRole {
        TransportRole::Client
    }

    fn state(&self) -> TransportState {
        self.state.lock().clone()
    }

    fn start(&self, handler: Arc<dyn MessageHandler>) -> TransportResult<()> {
        let mut connection = self.connection.lock();
        if connection.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        *self.state.lock() = TransportState::Connecting;
        info!("Connecting to TCP server at {}", self.remote);
        let stream = match self.connect() {
            Ok(stream) => stream,
            Err(e) => {
                *self.state.lock() = TransportState::Failed {
                    reason: e.to_string(),
                };
                return Err(e);
            }
        };
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.config.read_timeout)?;
        let peer = stream.peer_addr()?;
        let reader_stream = stream.try_clone()?;
        *self.writer.lock() = Some(stream.try_clone()?);
        self.stopping.store(false, Ordering::SeqCst);
        self.metrics.connection_opened();

        let reader = {
            let handler = Arc::clone(&handler);
            let state = Arc::clone(&self.state);
            let stopping = Arc::clone(&self.stopping);
            let metrics = Arc::clone(&self.metrics);
            let max = self.config.max_message_size;
            thread::Builder::new()
                .name("relaymcp-tcp-client".to_string())
                .spawn(move || {
                    let ctx = MessageContext::from_peer(peer, 0);
                    let outcome =
                        serve_connection(&reader_stream, &ctx, handler.as_ref(), &metrics, max);
                    metrics.connection_closed();
                    if stopping.load(Ordering::SeqCst) {
                        return;
                    }
                    let error = match outcome {
                        Ok(()) => TransportError::ConnectionLost("server closed connection".to_string()),
                        Err(e) => e,
                    };
                    warn!("TCP client connection to {} ended: {}", peer, error);
                    *state.lock() = TransportState::Failed {
                        reason: error.to_string(),
                    };
                    handler.on_error(&error);
                })?
        };

        *self.state.lock() = TransportState::Connected;
        *connection = Some(ClientConnection {
            stream,
            reader,
            handler,
        });
        info!("Connected to TCP server at {}", peer);
        Ok(())
    }

    fn stop(&self) {
        let Some(connection) = self.connection.lock().take() else {
            return;
        };
        *self.state.lock() = TransportState::Disconnecting;
        self.stopping.store(true, Ordering::SeqCst);
        self.writer.lock().take();

        if let Err(e) = connection.stream.shutdown(Shutdown::Both) {
            debug!("Socket shutdown: {}", e);
        }
        if connection.reader.join().is_err() {
            error!("TCP client reader thread panicked");
        }

        *self.state.lock() = TransportState::Disconnected;
        connection.handler.on_error(&TransportError::Stopping);
        info!("TCP client transport stopped");
    }

    fn send(&self, data: &[u8]) -> TransportResult<()> {
        validate_message_size(
            data.len(),
            self.config.max_message_size + framing::FRAME_HEADER_LEN,
        )?;
        let mut writer = self.writer.lock();
        let stream = writer.as_mut().ok_or(TransportError::NotStarted)?;
        stream
            .write_all(data)
            .and_then(|()| stream.flush())
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.metrics.record_sent(data.len());
        Ok(())
    }

    fn sendv(&self, buffers: &[&[u8]]) -> TransportResult<()> {
        let total = buffers.iter().map(|b| b.len()).sum();
        validate_message_size(total, self.config.max_message_size + framing::FRAME_HEADER_LEN)?;
        let mut writer = self.writer.lock();
        let stream = writer.as_mut().ok_or(TransportError::NotStarted)?;
        // Holding the writer lock keeps the parts contiguous on the wire
        for buffer in buffers {
            stream
                .write_all(buffer)
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        stream
            .flush()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.metrics.record_sent(total);
        Ok(())
    }
}

impl Drop for TcpClientTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ServerShared {
    connections: Mutex<IntMap<u64, TcpStream>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    next_connection_id: AtomicU64,
    metrics: AtomicMetrics,
    config: TransportConfig,
}

struct Acceptor {
    thread: JoinHandle<()>,
    handler: Arc<dyn MessageHandler>,
}

/// Framed TCP listener serving one thread per connection
pub struct TcpServerTransport {
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    acceptor: Mutex<Option<Acceptor>>,
    shared: Arc<ServerShared>,
    state: Mutex<TransportState>,
}

impl fmt::Debug for TcpServerTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpServerTransport")
            .field("local_addr", &self.local_addr)
            .field("state", &*self.state.lock())
            .field("connections", &self.shared.connections.lock().len())
            .finish()
    }
}

impl TcpServerTransport {
    /// Bind a listener; connections are accepted after `start`
    ///
    /// # Errors
    ///
    /// Fails when the address cannot be bound.
    pub fn bind(addr: impl ToSocketAddrs, config: TransportConfig) -> TransportResult<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| TransportError::ConnectionFailed(format!("bind failed: {e}")))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            local_addr,
            listener: Mutex::new(Some(listener)),
            acceptor: Mutex::new(None),
            shared: Arc::new(ServerShared {
                connections: Mutex::new(IntMap::new()),
                workers: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                next_connection_id: AtomicU64::new(1),
                metrics: AtomicMetrics::new(),
                config,
            }),
            state: Mutex::new(TransportState::Disconnected),
        })
    }

    /// Bound address (useful after binding port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.shared.connections.lock().len()
    }

    /// Traffic counters
    pub fn metrics(&self) -> TransportMetrics {
        self.shared.metrics.snapshot()
    }
}

impl ServerShared {
    fn accept_loop(self: Arc<Self>, listener: TcpListener, handler: Arc<dyn MessageHandler>) {
        while self.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = Arc::clone(&self).spawn_connection(stream, peer, &handler) {
                        error!("Failed to set up connection from {}: {}", peer, e);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(self.config.poll_interval);
                }
                Err(e) => {
                    error!("Failed to accept TCP connection: {}", e);
                    thread::sleep(self.config.poll_interval);
                }
            }
            self.workers.lock().retain(|worker| !worker.is_finished());
        }
        debug!("TCP accept loop finished");
    }

    fn spawn_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        handler: &Arc<dyn MessageHandler>,
    ) -> TransportResult<()> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.config.read_timeout)?;

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .lock()
            .put(connection_id, stream.try_clone()?)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.metrics.connection_opened();
        info!("Accepted TCP connection {} from {}", connection_id, peer);

        let handler = Arc::clone(handler);
        let shared = Arc::clone(&self);
        let worker = thread::Builder::new()
            .name(format!("relaymcp-tcp-conn-{connection_id}"))
            .spawn(move || {
                let ctx = MessageContext::from_peer(peer, connection_id);
                let max = shared.config.max_message_size;
                match serve_connection(&stream, &ctx, handler.as_ref(), &shared.metrics, max) {
                    Ok(()) => debug!("Connection {} closed by peer", connection_id),
                    Err(e) if shared.running.load(Ordering::SeqCst) => {
                        warn!("Connection {} ended: {}", connection_id, e);
                    }
                    Err(_) => {}
                }
                shared.connections.lock().remove(&connection_id);
                shared.metrics.connection_closed();
            })?;
        self.workers.lock().push(worker);
        Ok(())
    }
}

impl Transport for TcpServerTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Framed
    }

    fn role(&self) -> TransportRole {
        TransportRole::Server
    }

    fn state(&self) -> TransportState {
        self.state.lock().clone()
    }

    fn start(&self, handler: Arc<dyn MessageHandler>) -> TransportResult<()> {
        let mut acceptor = self.acceptor.lock();
        if acceptor.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| TransportError::ConfigurationError("listener already consumed".to_string()))?;

        self.shared.running.store(true, Ordering::SeqCst);
        let thread = {
            let shared = Arc::clone(&self.shared);
            let handler = Arc::clone(&handler);
            thread::Builder::new()
                .name("relaymcp-tcp-accept".to_string())
                .spawn(move || shared.accept_loop(listener, handler))?
        };

        *self.state.lock() = TransportState::Connected;
        *acceptor = Some(Acceptor { thread, handler });
        info!("TCP server listening on {}", self.local_addr);
        Ok(())
    }

    fn stop(&self) {
        let Some(acceptor) = self.acceptor.lock().take() else {
            return;
        };
        *self.state.lock() = TransportState::Disconnecting;
        self.shared.running.store(false, Ordering::SeqCst);
        if acceptor.thread.join().is_err() {
            error!("TCP accept thread panicked");
        }

        self.shared.connections.lock().for_each(|_, stream| {
            stream.shutdown(Shutdown::Both).ok();
        });
        let workers = std::mem::take(&mut *self.shared.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                error!("TCP connection thread panicked");
            }
        }

        *self.state.lock() = TransportState::Disconnected;
        acceptor.handler.on_error(&TransportError::Stopping);
        info!("TCP server on {} stopped", self.local_addr);
    }

    /// Write the bytes to every open connection
    fn send(&self, data: &[u8]) -> TransportResult<()> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        let connections = self.shared.connections.lock();
        let mut delivered = 0usize;
        connections.for_each(|id, stream| {
            let mut writer = stream;
            match writer.write_all(data).and_then(|()| writer.flush()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Broadcast to connection {} failed: {}", id, e),
            }
        });
        self.shared.metrics.record_sent(data.len() * delivered);
        if delivered == 0 && !connections.is_empty() {
            return Err(TransportError::SendFailed("no connection accepted the message".to_string()));
        }
        Ok(())
    }
}

impl Drop for TcpServerTransport {
    fn drop(&mut self) {
        self.stop();
    }
}
