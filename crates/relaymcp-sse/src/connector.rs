//! Byte-stream connectors
//!
//! The event loop only needs a readable, writable stream with a read
//! timeout. TLS is layered by supplying a [`Connector`] whose streams
//! encrypt; the bundled [`TcpConnector`] is plain TCP.

use std::fmt::Debug;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::config::SseConfig;
use crate::error::{SseError, SseResult};

/// Stream the SSE loop reads events from
pub trait SseStream: Read + Write + Send {
    /// Bound each blocking read
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Close both directions
    fn close(&self) {}
}

impl SseStream for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn close(&self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// Opens streams to the SSE endpoint
pub trait Connector: Send + Sync + Debug {
    /// Connect to `config.host:config.port`
    ///
    /// # Errors
    ///
    /// [`SseError::Connect`] when resolution or connection fails.
    fn connect(&self, config: &SseConfig) -> SseResult<Box<dyn SseStream>>;

    /// Whether streams from this connector are encrypted
    fn is_tls(&self) -> bool {
        false
    }
}

/// Plain TCP connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, config: &SseConfig) -> SseResult<Box<dyn SseStream>> {
        let address = config.address();
        let connect_error = |source: io::Error| SseError::Connect {
            address: address.clone(),
            source,
        };

        let addrs = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(connect_error)?;

        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, config.connect_timeout) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    debug!("Connected to SSE endpoint at {}", addr);
                    return Ok(Box::new(stream));
                }
                Err(e) => last_error = e,
            }
        }
        Err(connect_error(last_error))
    }
}
