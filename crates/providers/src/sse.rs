//! Server-sent-event line decoder.
//!
//! Turns arbitrarily split byte chunks into `data:` payloads. Bytes are
//! buffered until a full line is available, so a multi-byte UTF-8 character
//! split across two chunks is decoded only once both halves have arrived.

/// One complete line of interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// The trimmed payload of a `data:` line.
    Data(String),
    /// The `[DONE]` sentinel. Nothing after it is consumed.
    Done,
}

/// Incremental line decoder for a chat-completion event stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Non-empty lines seen before the first `data:` line, kept for the
    /// non-streamed fallback.
    unframed: String,
    saw_data: bool,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every complete line it finished.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        let mut lines = Vec::new();
        if self.finished {
            return lines;
        }

        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let trimmed = text.trim();

            let Some(payload) = trimmed.strip_prefix("data:") else {
                if !self.saw_data && !trimmed.is_empty() {
                    self.unframed.push_str(trimmed);
                    self.unframed.push('\n');
                }
                continue;
            };

            self.saw_data = true;
            let payload = payload.trim();

            if payload == "[DONE]" {
                self.finished = true;
                self.buffer.clear();
                lines.push(SseLine::Done);
                break;
            }

            if !payload.is_empty() {
                lines.push(SseLine::Data(payload.to_string()));
            }
        }

        lines
    }

    /// Whether the terminal sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume the decoder and return whatever text never formed an event:
    /// unframed lines plus the unterminated tail.
    pub fn finish(self) -> String {
        let mut rest = self.unframed;
        rest.push_str(&String::from_utf8_lossy(&self.buffer));
        rest.trim().to_string()
    }
}
