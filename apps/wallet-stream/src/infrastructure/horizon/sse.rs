//! Server-Sent Events Decoder
//!
//! Incremental decoder for `text/event-stream` bodies. Bytes are pushed as
//! they arrive; complete frames come out once their terminating blank line
//! has been seen.
//!
//! # Wire Format
//!
//! ```text
//! retry: 1000
//! event: open
//! data: "hello"
//!
//! id: 12884905985
//! data: {"id":"12884905985","type":"payment",...}
//!
//! ```
//!
//! Lines starting with `:` are comments. Lines may end in `\n` or `\r\n`.
//! A trailing frame without its blank line is never emitted.

use std::time::Duration;

/// One dispatched event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name, `None` for the default `message` event.
    pub event: Option<String>,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Event id, used as the resume cursor.
    pub id: Option<String>,
    /// Reconnection delay requested by the server.
    pub retry: Option<Duration>,
}

/// Longest line accepted before the stream is considered broken.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Decoding failure. The session cannot continue past it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SseError {
    /// A line grew past the limit without a terminating newline.
    #[error("event stream line exceeds {limit} bytes")]
    LineTooLong {
        /// Configured limit.
        limit: usize,
    },
}

/// Incremental frame decoder.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    max_line: usize,
    pending: SseFrame,
    has_data: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_LENGTH)
    }
}

impl SseDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder that rejects lines longer than `max_line` bytes.
    #[must_use]
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line,
            pending: SseFrame::default(),
            has_data: false,
        }
    }

    /// Feed a body chunk and collect every frame it completes.
    ///
    /// # Errors
    ///
    /// Returns [`SseError::LineTooLong`] once an unterminated line exceeds
    /// the limit. The decoder should be discarded afterwards.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, SseError> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut line_start = 0;
        let mut cursor = self.scanned;

        while let Some(offset) = self.buffer[cursor..].iter().position(|&b| b == b'\n') {
            let newline = cursor + offset;
            let mut line = &self.buffer[line_start..newline];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }

            let line = String::from_utf8_lossy(line).into_owned();
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }

            line_start = newline + 1;
            cursor = line_start;
        }

        self.buffer.drain(..line_start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line {
            return Err(SseError::LineTooLong {
                limit: self.max_line,
            });
        }
        Ok(frames)
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
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
            "event" => self.pending.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            "id" if !value.contains('\0') => self.pending.id = Some(value.to_string()),
            "retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.pending.retry = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let frame = std::mem::take(&mut self.pending);
        let has_data = std::mem::replace(&mut self.has_data, false);

        if has_data || frame.retry.is_some() {
            Some(frame)
        } else {
            None
        }
    }
}
