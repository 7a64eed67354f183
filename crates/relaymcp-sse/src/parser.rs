//! Incremental `text/event-stream` parser
//!
//! Bytes are fed as they arrive from the socket; complete events are
//! returned once their terminating blank line has been seen. Lines may end
//! in `\n` or `\r\n`, and a line split across reads is held until its end
//! arrives. A pending line or event larger than the parser's limit is an
//! error; the caller is expected to drop the stream.
//!
//! ```text
//! id: 42
//! event: message
//! data: {"jsonrpc":"2.0", ...}
//!
//! ```

use chrono::{DateTime, Utc};

use crate::config::DEFAULT_MAX_EVENT_SIZE;
use crate::error::{SseError, SseResult};

/// One dispatched Server-Sent Event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// `id:` field, used for `Last-Event-ID` on reconnect
    pub id: Option<String>,
    /// `event:` field; absent means `message`
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// When the event was parsed
    pub timestamp: DateTime<Utc>,
}

impl SseEvent {
    /// Event with only data
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: None,
            data: data.into(),
            timestamp: Utc::now(),
        }
    }

    /// Event with id and data
    pub fn with_id(id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::message(data)
        }
    }

    /// Event type, defaulting to `message`
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Line-oriented SSE decoder
#[derive(Debug)]
pub struct SseParser {
    max_event_size: usize,
    buffer: Vec<u8>,
    current_id: Option<String>,
    current_event: Option<String>,
    current_data: Option<String>,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::with_max_event_size(DEFAULT_MAX_EVENT_SIZE)
    }
}

impl SseParser {
    /// Empty parser with the default size limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty parser rejecting lines or event data over `max_event_size` bytes
    pub fn with_max_event_size(max_event_size: usize) -> Self {
        Self {
            max_event_size,
            buffer: Vec::new(),
            current_id: None,
            current_event: None,
            current_data: None,
        }
    }

    /// Feed bytes and collect every event they complete
    ///
    /// # Errors
    ///
    /// [`SseError::EventTooLarge`] when an unterminated line or the data of
    /// the current event passes the limit. Parser state is cleared.
    pub fn feed(&mut self, data: &[u8]) -> SseResult<Vec<SseEvent>> {
        self.buffer.extend_from_slice(data);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let mut line = &self.buffer[consumed..end];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            let line = String::from_utf8_lossy(line).into_owned();
            consumed = end + 1;

            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
            if self.current_data.as_ref().is_some_and(|d| d.len() > self.max_event_size) {
                self.reset();
                return Err(SseError::EventTooLarge(self.max_event_size));
            }
        }
        self.buffer.drain(..consumed);
        if self.buffer.len() > self.max_event_size {
            self.reset();
            return Err(SseError::EventTooLarge(self.max_event_size));
        }
        Ok(events)
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.current_event = Some(value.to_string()),
            "id" => self.current_id = Some(value.to_string()),
            "data" => match &mut self.current_data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.current_data = Some(value.to_string()),
            },
            // retry and unknown fields
            _ => {}
        }
        None
    }

    /// Finish the current event; only events with data are emitted
    fn dispatch(&mut self) -> Option<SseEvent> {
        let id = self.current_id.take();
        let event = self.current_event.take();
        let data = self.current_data.take().filter(|data| !data.is_empty())?;
        Some(SseEvent {
            id,
            event,
            data,
            timestamp: Utc::now(),
        })
    }

    /// Drop buffered bytes and partial event state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.current_id = None;
        self.current_event = None;
        self.current_data = None;
    }

    /// Bytes of an incomplete trailing line
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}
