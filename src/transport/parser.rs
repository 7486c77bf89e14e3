//! Incremental parser for the code-generation event stream
//!
//! The body is a sequence of newline-delimited records. Only records with
//! the `data: ` prefix matter; the rest of such a line is a JSON document:
//!
//! ```text
//! data: {"type":"code_chunk","data":"from manim import *","message_id":"m1"}
//! data: {"type":"completed","data":"","message_id":"m1"}
//! ```
//!
//! Bytes are buffered until a full line is available and only then decoded,
//! so a multi-byte character split across network chunks is reassembled
//! before decoding.

use bytes::BytesMut;
use serde::Deserialize;
use thiserror::Error;

const DATA_PREFIX: &str = "data: ";

/// A typed event from the generation backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental generated code
    CodeChunk { data: String, message_id: String },
    /// Generation finished successfully
    Completed { message_id: String },
    /// Backend reported an application error
    Error { data: String, message_id: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }

    /// The message id echoed by the backend
    pub fn message_id(&self) -> &str {
        match self {
            Self::CodeChunk { message_id, .. }
            | Self::Completed { message_id }
            | Self::Error { message_id, .. } => message_id,
        }
    }
}

/// Why a single record was dropped
#[derive(Debug, Error)]
enum RecordError {
    #[error("record is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("record payload is not a recognized event: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireRecord {
    CodeChunk {
        #[serde(default)]
        data: String,
        #[serde(default)]
        message_id: Option<WireId>,
    },
    Completed {
        #[serde(default)]
        #[allow(dead_code)] // Always empty on the wire
        data: Option<String>,
        #[serde(default)]
        message_id: Option<WireId>,
    },
    Error {
        #[serde(default)]
        data: String,
        #[serde(default)]
        message_id: Option<WireId>,
    },
}

/// Backends echo the message id either as a string or as a number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(serde_json::Number),
}

impl WireId {
    fn into_string(id: Option<Self>) -> String {
        match id {
            Some(WireId::Text(s)) => s,
            Some(WireId::Number(n)) => n.to_string(),
            None => String::new(),
        }
    }
}

impl From<WireRecord> for StreamEvent {
    fn from(record: WireRecord) -> Self {
        match record {
            WireRecord::CodeChunk { data, message_id } => StreamEvent::CodeChunk {
                data,
                message_id: WireId::into_string(message_id),
            },
            WireRecord::Completed { message_id, .. } => StreamEvent::Completed {
                message_id: WireId::into_string(message_id),
            },
            WireRecord::Error { data, message_id } => StreamEvent::Error {
                data,
                message_id: WireId::into_string(message_id),
            },
        }
    }
}

/// Stateful, pull-based event parser
///
/// Feed bytes with [`push`](Self::push) and pull events with
/// [`next_event`](Self::next_event). Events are parsed lazily, so a caller
/// that stops after a terminal event leaves the rest of the buffer untouched.
#[derive(Debug, Default)]
pub struct EventParser {
    buffer: BytesMut,
    /// Bytes of `buffer` already known to contain no newline
    scanned: usize,
    eof: bool,
    skipped: usize,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the transport
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Mark the end of input so a final unterminated line is still parsed
    pub fn finish(&mut self) {
        self.eof = true;
    }

    /// Number of malformed records dropped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Next complete event, or `None` until more bytes arrive
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            let line = self.take_line()?;
            match parse_record(&line) {
                Ok(Some(event)) => return Some(event),
                Ok(None) => {}
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!(error = %e, "Skipping malformed stream record");
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<BytesMut> {
        let newline = self.buffer[self.scanned..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.scanned + offset);

        match newline {
            Some(pos) => {
                let mut line = self.buffer.split_to(pos + 1);
                line.truncate(pos);
                self.scanned = 0;
                Some(line)
            }
            None if self.eof && !self.buffer.is_empty() => {
                self.scanned = 0;
                Some(self.buffer.split())
            }
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }
}

/// Parse one line (without its `\n`). `Ok(None)` means "not a data record".
fn parse_record(line: &[u8]) -> Result<Option<StreamEvent>, RecordError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = std::str::from_utf8(line)?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    let Some(payload) = text.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let record: WireRecord = serde_json::from_str(payload)?;
    Ok(Some(record.into()))
}
