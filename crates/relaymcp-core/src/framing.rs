//! Length-prefixed framing.
//!
//! A frame is a 4-byte big-endian payload length followed by that many bytes
//! of UTF-8 JSON. No terminator is counted in the length.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{self, Read, Write};

/// Size of the length prefix
pub const FRAME_HEADER_LEN: usize = 4;

/// Result type alias for framing operations
pub type FramingResult<T> = std::result::Result<T, FramingError>;

/// Framing failures
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FramingError {
    /// Declared or actual payload exceeds the configured maximum.
    #[error("Frame payload ({size} bytes) exceeds maximum allowed ({max} bytes)")]
    TooLarge {
        /// Payload size in bytes
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// A zero-length frame was received.
    #[error("Empty frame")]
    Empty,

    /// The stream ended in the middle of a frame.
    #[error("Stream closed mid-frame after {received} of {expected} bytes")]
    Truncated {
        /// Bytes still expected
        expected: usize,
        /// Bytes received
        received: usize,
    },

    /// Underlying I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Big-endian length prefix for a payload
///
/// # Errors
///
/// Returns [`FramingError::TooLarge`] if the payload does not fit in 32 bits.
pub fn length_prefix(len: usize) -> FramingResult<[u8; FRAME_HEADER_LEN]> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| FramingError::TooLarge {
            size: len,
            max: u32::MAX as usize,
        })
}

/// Prefix a payload with its length
///
/// # Errors
///
/// Returns [`FramingError::TooLarge`] if the payload does not fit in 32 bits.
pub fn encode_frame(payload: &[u8]) -> FramingResult<Bytes> {
    let header = length_prefix(payload.len())?;
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.put_slice(&header);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Remove a length prefix if the bytes carry one that matches exactly
///
/// Transports that do their own message delimiting (HTTP, WebSocket) accept
/// both framed and bare payloads.
pub fn strip_frame(bytes: &[u8]) -> &[u8] {
    if bytes.len() < FRAME_HEADER_LEN {
        return bytes;
    }
    let declared = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if declared == bytes.len() - FRAME_HEADER_LEN {
        &bytes[FRAME_HEADER_LEN..]
    } else {
        bytes
    }
}

/// Write one frame
///
/// # Errors
///
/// Propagates I/O failures and oversized payloads.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> FramingResult<()> {
    writer.write_all(&encode_frame(payload)?)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame, returning `None` on a clean end of stream
///
/// # Errors
///
/// Returns an error for oversized or empty frames, truncation, or I/O
/// failure.
pub fn read_frame<R: Read>(reader: &mut R, max_payload: usize) -> FramingResult<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(FramingError::Truncated {
                    expected: FRAME_HEADER_LEN,
                    received: filled,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len == 0 {
        return Err(FramingError::Empty);
    }
    if len > max_payload {
        return Err(FramingError::TooLarge {
            size: len,
            max: max_payload,
        });
    }

    let mut payload = vec![0u8; len];
    let mut received = 0;
    while received < len {
        match reader.read(&mut payload[received..]) {
            Ok(0) => {
                return Err(FramingError::Truncated {
                    expected: len,
                    received,
                });
            }
            Ok(n) => received += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(payload))
}

/// Incremental decoder for frames arriving in arbitrary chunks
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_payload: usize,
}

impl FrameDecoder {
    /// Create a decoder rejecting payloads above `max_payload`
    pub fn new(max_payload: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_payload,
        }
    }

    /// Append received bytes
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete frame
    ///
    /// # Errors
    ///
    /// Returns an error for empty or oversized frames. The decoder should be
    /// discarded afterwards since the stream is out of sync.
    pub fn next_frame(&mut self) -> FramingResult<Option<Bytes>> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]])
            as usize;
        if len == 0 {
            return Err(FramingError::Empty);
        }
        if len > self.max_payload {
            return Err(FramingError::TooLarge {
                size: len,
                max: self.max_payload,
            });
        }
        if self.buffer.len() < FRAME_HEADER_LEN + len {
            self.buffer.reserve(FRAME_HEADER_LEN + len - self.buffer.len());
            return Ok(None);
        }

        self.buffer.advance(FRAME_HEADER_LEN);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const PING: &[u8] = br#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#;

    #[test]
    fn test_encode_prefixes_big_endian_length() {
        let frame = encode_frame(PING).unwrap();
        assert_eq!(&frame[..4], &(PING.len() as u32).to_be_bytes());
        assert_eq!(&frame[4..], PING);
    }

    #[test]
    fn test_strip_frame_only_when_length_matches() {
        let frame = encode_frame(PING).unwrap();
        assert_eq!(strip_frame(&frame), PING);
        assert_eq!(strip_frame(PING), PING);
        assert_eq!(strip_frame(b"{}"), b"{}");
    }

    #[test]
    fn test_read_frame_round_trip() {
        let mut wire = Vec::new();
        write_frame(&mut wire, PING).unwrap();
        write_frame(&mut wire, b"{}").unwrap();

        let mut cursor = Cursor::new(wire);
        assert_eq!(read_frame(&mut cursor, 1024).unwrap().as_deref(), Some(PING));
        assert_eq!(read_frame(&mut cursor, 1024).unwrap().as_deref(), Some(&b"{}"[..]));
        assert!(read_frame(&mut cursor, 1024).unwrap().is_none());
    }

    #[test]
    fn test_read_frame_rejects_oversized() {
        let mut cursor = Cursor::new(encode_frame(PING).unwrap().to_vec());
        assert!(matches!(
            read_frame(&mut cursor, 8),
            Err(FramingError::TooLarge { max: 8, .. })
        ));
    }

    #[test]
    fn test_read_frame_truncated() {
        let frame = encode_frame(PING).unwrap();
        let mut cursor = Cursor::new(frame[..10].to_vec());
        assert!(matches!(read_frame(&mut cursor, 1024), Err(FramingError::Truncated { .. })));
    }

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut wire = encode_frame(PING).unwrap().to_vec();
        wire.extend_from_slice(&encode_frame(b"[1]").unwrap());

        let mut decoder = FrameDecoder::new(1024);
        decoder.extend(&wire[..3]);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.extend(&wire[3..20]);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.extend(&wire[20..]);
        assert_eq!(decoder.next_frame().unwrap().as_deref(), Some(PING));
        assert_eq!(decoder.next_frame().unwrap().as_deref(), Some(&b"[1]"[..]));
        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_rejects_empty_frame() {
        let mut decoder = FrameDecoder::new(1024);
        decoder.extend(&[0, 0, 0, 0]);
        assert!(matches!(decoder.next_frame(), Err(FramingError::Empty)));
    }
}
