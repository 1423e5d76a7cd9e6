use bytes::Bytes;
use serde::Serialize;

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Longest pending line kept in memory. Anything longer is dropped up to its
/// newline, which leaves the enclosing block incomplete.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// One blank-line delimited block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    /// Both an event name and a payload were seen before the block boundary.
    pub fn is_complete(&self) -> bool {
        self.event.as_deref().is_some_and(|name| !name.is_empty()) && !self.data.is_empty()
    }
}

/// Incremental parser for `event:` / `data:` blocks.
///
/// Input is buffered as raw bytes and only split on `\n`, so a read boundary
/// that cuts through a line (or through a multi-byte character) is harmless.
/// Fields may appear in any order inside a block; nothing is emitted until
/// the blank line that closes it.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no `\n`.
    scanned: usize,
    /// Inside an over-long line; skip until the next `\n`.
    discarding: bool,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        let mut start = 0;
        while let Some(offset) = buffer[self.scanned..].iter().position(|byte| *byte == b'\n') {
            let end = self.scanned + offset;
            self.scanned = end + 1;
            let raw = &buffer[start..end];
            start = end + 1;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            self.take_line(raw, &mut events);
        }

        buffer.drain(..start);
        if buffer.len() > MAX_LINE_BYTES {
            buffer.clear();
            self.discarding = true;
        }
        self.scanned = buffer.len();
        self.buffer = buffer;
        events
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.push_bytes(chunk.as_bytes())
    }

    /// Flush a trailing line and block that were never closed by a blank line.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        let raw = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if !std::mem::take(&mut self.discarding) && !raw.is_empty() {
            self.take_line(&raw, &mut events);
        }
        self.finish_event(&mut events);
        events
    }

    fn take_line(&mut self, raw: &[u8], events: &mut Vec<SseEvent>) {
        let line = String::from_utf8_lossy(raw);
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if line.is_empty() {
            self.finish_event(events);
        } else {
            self.apply_line(line);
        }
    }

    fn apply_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        if let Some(value) = line.strip_prefix("event:") {
            let value = value.trim();
            self.event = (!value.is_empty()).then(|| value.to_string());
            return;
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data_lines.push(value.trim().to_string());
        }
    }

    fn finish_event(&mut self, events: &mut Vec<SseEvent>) {
        if self.event.is_none() && self.data_lines.is_empty() {
            return;
        }
        let data = self.data_lines.join("\n");
        events.push(SseEvent {
            event: self.event.take(),
            data,
        });
        self.data_lines.clear();
    }
}

/// Encode one canonical record: `data: <json>\n\n`.
pub fn json_frame<T: Serialize>(value: &T) -> Result<Bytes, serde_json::Error> {
    let payload = serde_json::to_vec(value)?;
    let mut data = Vec::with_capacity(payload.len() + 8);
    data.extend_from_slice(b"data: ");
    data.extend_from_slice(&payload);
    data.extend_from_slice(b"\n\n");
    Ok(Bytes::from(data))
}

pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME)
}
