//! Incremental `text/event-stream` decoder
//!
//! Bytes arrive in arbitrary chunks; only complete lines are interpreted,
//! so a UTF-8 sequence or a line split across chunks is reassembled first.

use super::transport::PushFrame;
use tracing::warn;

/// Event name used when a frame carries no `event:` field
pub const DEFAULT_EVENT: &str = "message";

/// Longest line held while waiting for its terminator
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// SSE decoder state
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
    /// Dropping the rest of an oversized line
    discarding: bool,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<PushFrame> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut cursor = self.scanned;
        while let Some(offset) = buffer[cursor..].iter().position(|b| *b == b'\n') {
            let end = cursor + offset;
            let line = &buffer[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if self.discarding {
                self.discarding = false;
            } else if let Some(frame) = self.process_line(&String::from_utf8_lossy(line)) {
                frames.push(frame);
            }

            start = end + 1;
            cursor = start;
        }
        buffer.drain(..start);

        if buffer.len() > MAX_LINE_BYTES {
            warn!(pending = buffer.len(), "Event stream line too long, discarding");
            buffer.clear();
            self.discarding = true;
        }

        self.scanned = buffer.len();
        self.buffer = buffer;
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<PushFrame> {
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
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id / retry are not used: alerts carry no id and reconnection
            // follows the channel's own policy
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<PushFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(PushFrame {
            event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
        })
    }
}
