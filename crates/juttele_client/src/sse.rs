//! `data: ` line framing for the unidirectional stream.
//!
//! Chunks from the HTTP body arrive at arbitrary boundaries, including in the
//! middle of a multi-byte character, so bytes are buffered until a full line
//! is available.

use tracing::debug;

const DATA_PREFIX: &str = "data: ";

/// Accumulates body chunks and yields complete `data: ` payloads.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    partial: Vec<u8>,
    /// Prefix of `partial` already known to hold no newline.
    scanned: usize,
    lines_seen: usize,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the payloads of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);
        let mut out = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.partial[self.scanned..]
            .iter()
            .position(|b| *b == b'\n')
        {
            let end = self.scanned + offset;
            self.lines_seen += 1;
            if let Some(data) = data_payload(&self.partial[start..end]) {
                out.push(data);
            }
            start = end + 1;
            self.scanned = start;
        }
        self.partial.drain(..start);
        self.scanned = self.partial.len();
        out
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.partial);
        self.scanned = 0;
        self.lines_seen += 1;
        data_payload(&line)
    }

    pub fn lines_seen(&self) -> usize {
        self.lines_seen
    }
}

fn data_payload(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }
    match line.strip_prefix(DATA_PREFIX) {
        Some(data) => Some(data.to_string()),
        None => {
            debug!(line = %line, "ignoring non-data stream line");
            None
        }
    }
}
