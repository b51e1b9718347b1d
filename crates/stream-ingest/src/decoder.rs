use std::time::Instant;

use tracing::warn;

const REPLACEMENT: char = '\u{FFFD}';
const BOM: char = '\u{FEFF}';

/// Stateful UTF-8 decoder for a byte stream that arrives in arbitrary pieces.
///
/// Incomplete multi-byte sequences at the end of one piece are carried over
/// and completed by the next. Invalid sequences decode to U+FFFD and a single
/// leading byte-order mark is dropped.
#[derive(Debug, Default)]
pub struct IncrementalUtf8Decoder {
    pending: Vec<u8>,
    saw_text: bool,
}

impl IncrementalUtf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `input`, keeping a trailing partial sequence for the next call.
    pub fn decode(&mut self, input: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(input);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        self.strip_leading_bom(out)
    }

    /// Flushes a dangling partial sequence as one replacement character.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        self.strip_leading_bom(REPLACEMENT.to_string())
    }

    /// Returns `true` when bytes of an incomplete sequence are buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn strip_leading_bom(&mut self, text: String) -> String {
        if self.saw_text || text.is_empty() {
            return text;
        }
        self.saw_text = true;
        match text.strip_prefix(BOM) {
            Some(stripped) => stripped.to_string(),
            None => text,
        }
    }
}

/// Accumulates decoded text and yields newline-terminated records.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    /// Appends `text` and returns every complete record in arrival order.
    ///
    /// The final segment after the last `\n` stays buffered. Records keep any
    /// `\r` or surrounding whitespace; callers trim.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buf.push_str(text);
        let Some(last_newline) = self.buf.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.buf.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buf, rest);
        complete[..last_newline]
            .split('\n')
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Returns the buffered partial record and clears it.
    pub fn take_remainder(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Per-call decoding state, owned by one in-flight `send`.
#[derive(Debug)]
pub struct StreamState {
    decoder: IncrementalUtf8Decoder,
    lines: LineBuffer,
    received_valid_data: bool,
    started_at: Instant,
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamState {
    pub fn new() -> Self {
        Self {
            decoder: IncrementalUtf8Decoder::new(),
            lines: LineBuffer::default(),
            received_valid_data: false,
            started_at: Instant::now(),
        }
    }

    /// Decodes one body segment and returns the records it completed.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(bytes);
        self.lines.push(&text)
    }

    /// Flushes the decoder and returns the unterminated trailing record.
    pub fn finish(&mut self) -> String {
        if self.lines.is_empty() && !self.decoder.has_pending() {
            return String::new();
        }
        if self.decoder.has_pending() {
            warn!("stream ended inside a multi-byte character");
        }
        let tail = self.decoder.finish();
        let mut remainder = self.lines.take_remainder();
        remainder.push_str(&tail);
        remainder
    }

    pub fn mark_valid_data(&mut self) {
        self.received_valid_data = true;
    }

    pub fn received_valid_data(&self) -> bool {
        self.received_valid_data
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}
