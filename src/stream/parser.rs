//! Incremental parser for chat-completion event streams.
//!
//! Upstream bytes arrive in arbitrary chunks: a chunk may end in the middle
//! of a line, a JSON document or a multi-byte UTF-8 sequence. The parser
//! carries the unfinished tail across calls so that the concatenation of all
//! returned fragments does not depend on where the chunk boundaries fall.

use crate::defaults::{EVENT_DATA_PREFIX, EVENT_STREAM_DONE, MAX_EVENT_LINE_BYTES};
use crate::error::{RelayError, Result};
use serde::Deserialize;

/// Classification of one complete event-stream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventLine {
    /// A data event carrying a non-empty content delta.
    Content(String),
    /// The `data: [DONE]` terminator.
    Done,
    /// Blank lines, comments, other fields, and events without content.
    Ignored,
    /// A data line whose payload is not a chat-completion chunk.
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionChunk {
    fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
    }
}

/// Classify a single line. Surrounding whitespace is ignored.
pub fn parse_line(line: &str) -> EventLine {
    let line = line.trim();
    if line.is_empty() {
        return EventLine::Ignored;
    }
    if line == EVENT_STREAM_DONE {
        return EventLine::Done;
    }
    let Some(payload) = line.strip_prefix(EVENT_DATA_PREFIX) else {
        return EventLine::Ignored;
    };
    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => chunk
            .into_content()
            .map_or(EventLine::Ignored, EventLine::Content),
        Err(e) => EventLine::Malformed(e.to_string()),
    }
}

/// Stateful line splitter and decoder for one upstream stream.
#[derive(Debug)]
pub struct EventParser {
    /// Decoded text after the last complete line.
    carry: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    max_line_bytes: usize,
    /// Set once an unterminated line outgrew `max_line_bytes`.
    overflowed: bool,
    done: bool,
    malformed: usize,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventParser {
    pub fn new() -> Self {
        Self::with_max_line_bytes(MAX_EVENT_LINE_BYTES)
    }

    /// Create a parser that fails once an unterminated line exceeds
    /// `max_line_bytes`.
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            carry: String::new(),
            pending: Vec::new(),
            max_line_bytes,
            overflowed: false,
            done: false,
            malformed: 0,
        }
    }

    /// Whether the `[DONE]` terminator has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of malformed data lines dropped so far.
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    /// Consume one chunk of upstream bytes and return the content fragments
    /// of every line it completed, in order.
    ///
    /// An unterminated line longer than the limit fails the parser. Fragments
    /// completed by the same chunk are still returned; the error is then
    /// reported by the next call to `feed` or `finish`.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        if self.overflowed {
            return Err(self.overflow_error());
        }
        self.decode(chunk);

        let mut fragments = Vec::new();
        if let Some(last_newline) = self.carry.rfind('\n') {
            let rest = self.carry.split_off(last_newline + 1);
            let complete = std::mem::replace(&mut self.carry, rest);
            for line in complete.split('\n') {
                self.handle_line(line, &mut fragments);
            }
        }

        if self.carry.len() > self.max_line_bytes {
            self.overflowed = true;
            self.carry.clear();
            self.pending.clear();
            if fragments.is_empty() {
                return Err(self.overflow_error());
            }
        }
        Ok(fragments)
    }

    fn overflow_error(&self) -> RelayError {
        RelayError::Stream {
            message: format!(
                "event line exceeds {} bytes without a line break",
                self.max_line_bytes
            ),
        }
    }

    /// Flush state at end of stream: a trailing incomplete UTF-8 sequence
    /// becomes U+FFFD and an unterminated final line is parsed.
    pub fn finish(&mut self) -> Result<Vec<String>> {
        if self.overflowed {
            return Err(self.overflow_error());
        }
        if !self.pending.is_empty() {
            self.pending.clear();
            self.carry.push(char::REPLACEMENT_CHARACTER);
        }
        let mut fragments = Vec::new();
        let tail = std::mem::take(&mut self.carry);
        self.handle_line(&tail, &mut fragments);
        Ok(fragments)
    }

    fn handle_line(&mut self, line: &str, fragments: &mut Vec<String>) {
        match parse_line(line) {
            EventLine::Content(content) => fragments.push(content),
            EventLine::Done => self.done = true,
            EventLine::Ignored => {}
            EventLine::Malformed(reason) => {
                self.malformed += 1;
                tracing::warn!(line = line.trim(), %reason, "Dropping malformed event line");
            }
        }
    }

    /// Append `chunk` to the carry, holding back an incomplete trailing
    /// sequence and replacing invalid bytes with U+FFFD.
    fn decode(&mut self, chunk: &[u8]) {
        let joined;
        let mut bytes = if self.pending.is_empty() {
            chunk
        } else {
            let mut buffer = std::mem::take(&mut self.pending);
            buffer.extend_from_slice(chunk);
            joined = buffer;
            joined.as_slice()
        };

        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.carry.push_str(text);
                    return;
                }
                Err(error) => {
                    let (valid, rest) = bytes.split_at(error.valid_up_to());
                    self.carry.push_str(&String::from_utf8_lossy(valid));
                    match error.error_len() {
                        Some(invalid) => {
                            self.carry.push(char::REPLACEMENT_CHARACTER);
                            bytes = &rest[invalid..];
                        }
                        None => {
                            self.pending.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }
}
