//! Reconnecting SSE event loop
//!
//! One dedicated thread connects, issues `GET /events`, validates the
//! response head and then parses the stream, handing each event to the
//! message callback in arrival order. Any failure or drop closes the
//! stream and reconnects after the configured delay, resuming with
//! `Last-Event-ID` once an event with an id has been delivered.

use std::fmt;
use std::io::{self, ErrorKind, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use relaymcp_core::McpResult;

use crate::config::SseConfig;
use crate::connector::{Connector, SseStream, TcpConnector};
use crate::error::{SseError, SseResult};
use crate::parser::{SseEvent, SseParser};

/// Receives each event
pub type MessageCallback = Arc<dyn Fn(&SseEvent) -> McpResult<()> + Send + Sync>;

/// Receives loop failures
pub type ErrorCallback = Arc<dyn Fn(&SseError) + Send + Sync>;

/// Longest response head accepted before the event stream starts
const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Build the `GET /events` request text
pub fn build_request(config: &SseConfig, last_event_id: Option<&str>) -> String {
    let mut request = format!(
        "GET /events HTTP/1.1\r\n\
         Host: {}:{}\r\n\
         Accept: text/event-stream\r\n\
         Cache-Control: no-cache\r\n",
        config.host, config.port
    );
    if let Some(id) = last_event_id {
        request.push_str(&format!("Last-Event-ID: {id}\r\n"));
    }
    if let Some(key) = &config.api_key {
        request.push_str(&format!("Authorization: Bearer {key}\r\n"));
    }
    request.push_str("\r\n");
    request
}

/// Split a response head from any stream bytes after it
///
/// Returns the status code and the remaining body bytes.
fn parse_response_head(bytes: &[u8]) -> SseResult<Option<(u16, Vec<u8>)>> {
    let Some(end) = bytes.windows(4).position(|w| w == b"\r\n\r\n") else {
        return Ok(None);
    };
    let head = String::from_utf8_lossy(&bytes[..end]);
    let status_line = head.lines().next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    let status = match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse::<u16>()
            .map_err(|_| SseError::Http(status_line.to_string()))?,
        _ => return Err(SseError::Http(status_line.to_string())),
    };
    if !(200..300).contains(&status) {
        return Err(SseError::Http(status_line.to_string()));
    }
    Ok(Some((status, bytes[end + 4..].to_vec())))
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

struct Shared {
    config: SseConfig,
    connector: Arc<dyn Connector>,
    running: AtomicBool,
    last_event_id: Mutex<Option<String>>,
    on_message: MessageCallback,
    on_error: RwLock<Option<ErrorCallback>>,
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn report(&self, error: &SseError) {
        let callback = self.on_error.read().clone();
        if let Some(callback) = callback {
            callback(error);
        }
    }

    /// Sleep for `delay`, waking every poll interval to check the flag
    fn pause(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        let step = self.config.poll_interval.max(Duration::from_millis(1));
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(step.min(deadline - now));
        }
    }

    fn run(&self) {
        info!("SSE event loop started for {}", self.config.url());
        while self.is_running() {
            match self.connect() {
                Ok(mut stream) => {
                    let outcome = self.stream_events(stream.as_mut());
                    stream.close();
                    match outcome {
                        Ok(()) => break,
                        Err(e) => {
                            warn!("SSE stream ended: {}", e);
                            self.report(&e);
                        }
                    }
                }
                Err(e) => {
                    error!("SSE connection failed: {}", e);
                    self.report(&e);
                }
            }
            if self.is_running() {
                debug!(
                    "Reconnecting to SSE endpoint in {:?}",
                    self.config.reconnect_delay
                );
                self.pause(self.config.reconnect_delay);
            }
        }
        info!("SSE event loop stopped");
    }

    fn connect(&self) -> SseResult<Box<dyn SseStream>> {
        info!("Connecting to SSE endpoint: {}", self.config.url());
        let mut stream = self.connector.connect(&self.config)?;
        let last_event_id = self.last_event_id.lock().clone();
        let request = build_request(&self.config, last_event_id.as_deref());
        stream.write_all(request.as_bytes())?;
        stream.flush()?;
        stream.set_read_timeout(Some(self.config.read_timeout()))?;
        debug!("Successfully connected to SSE endpoint: {}", self.config.url());
        Ok(stream)
    }

    /// Read until stopped (`Ok`) or the stream fails (`Err`)
    fn stream_events(&self, stream: &mut dyn SseStream) -> SseResult<()> {
        let mut parser = SseParser::with_max_event_size(self.config.max_event_size);
        let mut buffer = vec![0u8; self.config.read_buffer_size.max(1)];
        let mut head = Vec::new();
        let mut streaming = false;
        let mut last_data = Instant::now();

        while self.is_running() {
            let read = match stream.read(&mut buffer) {
                Ok(0) => return Err(SseError::Closed),
                Ok(n) => n,
                Err(e) if is_timeout(&e) => {
                    let idle = last_data.elapsed();
                    if idle > self.config.max_idle {
                        return Err(SseError::Idle(idle.as_secs()));
                    }
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SseError::Io(e)),
            };
            last_data = Instant::now();

            let body = if streaming {
                buffer[..read].to_vec()
            } else {
                head.extend_from_slice(&buffer[..read]);
                match parse_response_head(&head)? {
                    Some((status, rest)) => {
                        debug!("SSE endpoint answered {}", status);
                        streaming = true;
                        head.clear();
                        rest
                    }
                    None if head.len() > MAX_HEAD_SIZE => {
                        return Err(SseError::Http("response head too large".into()));
                    }
                    None => continue,
                }
            };

            for event in parser.feed(&body)? {
                self.deliver(&event);
            }
        }
        Ok(())
    }

    fn deliver(&self, event: &SseEvent) {
        debug!(
            "Received SSE event: type={}, id={}, data_length={}",
            event.event_type(),
            event.id.as_deref().unwrap_or("(none)"),
            event.data.len()
        );
        if let Err(e) = (self.on_message)(event) {
            error!("Message callback returned error: {}", e);
            self.report(&SseError::Callback(e));
        }
        if let Some(id) = &event.id {
            *self.last_event_id.lock() = Some(id.clone());
            debug!("Updated last event ID: {}", id);
        }
    }
}

/// Client for a server's `/events` stream
pub struct SseClient {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for SseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseClient")
            .field("url", &self.shared.config.url())
            .field("connector", &self.shared.connector)
            .field("running", &self.shared.is_running())
            .field("last_event_id", &*self.shared.last_event_id.lock())
            .finish()
    }
}

impl SseClient {
    /// Client over plain TCP
    ///
    /// # Errors
    ///
    /// [`SseError::Config`] when `use_tls` is set, since plain TCP cannot
    /// satisfy it.
    pub fn new<F>(config: SseConfig, on_message: F) -> SseResult<Self>
    where
        F: Fn(&SseEvent) -> McpResult<()> + Send + Sync + 'static,
    {
        Self::with_connector(config, Arc::new(TcpConnector), on_message)
    }

    /// Client using `connector` for its streams
    ///
    /// # Errors
    ///
    /// [`SseError::Config`] for TLS without a TLS connector, an empty host
    /// or a zero port.
    pub fn with_connector<F>(
        config: SseConfig,
        connector: Arc<dyn Connector>,
        on_message: F,
    ) -> SseResult<Self>
    where
        F: Fn(&SseEvent) -> McpResult<()> + Send + Sync + 'static,
    {
        if config.host.is_empty() || config.port == 0 {
            return Err(SseError::Config("host and port are required".into()));
        }
        if config.use_tls && !connector.is_tls() {
            return Err(SseError::Config(
                "TLS requested but the connector does not provide TLS".into(),
            ));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                connector,
                running: AtomicBool::new(false),
                last_event_id: Mutex::new(None),
                on_message: Arc::new(on_message),
                on_error: RwLock::new(None),
            }),
            thread: Mutex::new(None),
        })
    }

    /// Install the error callback
    pub fn set_error_callback(&self, callback: impl Fn(&SseError) + Send + Sync + 'static) {
        *self.shared.on_error.write() = Some(Arc::new(callback));
    }

    /// Resume from `id` on the next connection
    pub fn set_last_event_id(&self, id: Option<String>) {
        *self.shared.last_event_id.lock() = id;
    }

    /// Id of the last event delivered
    pub fn last_event_id(&self) -> Option<String> {
        self.shared.last_event_id.lock().clone()
    }

    /// Whether the event thread is running
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Configuration in use
    pub fn config(&self) -> &SseConfig {
        &self.shared.config
    }

    /// Spawn the event thread
    ///
    /// # Errors
    ///
    /// [`SseError::AlreadyRunning`] if started twice, [`SseError::Io`] if
    /// the thread cannot be spawned.
    pub fn start(&self) -> SseResult<()> {
        let mut slot = self.thread.lock();
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(SseError::AlreadyRunning);
        }
        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("relaymcp-sse".into())
            .spawn(move || shared.run())
        {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(SseError::Io(e))
            }
        }
    }

    /// Clear the running flag and join the event thread
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("SSE event thread panicked");
            }
        }
    }
}

impl Drop for SseClient {
    fn drop(&mut self) {
        self.stop();
    }
}
