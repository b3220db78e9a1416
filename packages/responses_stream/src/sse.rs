//! Incremental `text/event-stream` decoding.
//!
//! Bytes are buffered until a blank line closes a frame, so multi-byte UTF-8
//! sequences split across network chunks are never decoded half-way. CRLF and
//! bare CR line endings are folded to LF as bytes arrive.

/// Decoder that turns raw body chunks into SSE `data` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Last byte seen was a CR, so a leading LF in the next chunk is dropped
    after_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the body and return the payload of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Everything already buffered was searched on the previous push; only
        // a boundary straddling its last byte can be new.
        let mut scan_from = self.buffer.len().saturating_sub(1);
        self.append_normalized(chunk);

        let mut payloads = Vec::new();
        while let Some(offset) = find_blank_line(&self.buffer[scan_from..]) {
            let end = scan_from + offset;
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(data) = frame_data(&frame[..end]) {
                payloads.push(data);
            }
            scan_from = 0;
        }
        payloads
    }

    /// Flush a trailing frame that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        self.after_cr = false;
        let rest = std::mem::take(&mut self.buffer);
        frame_data(&rest)
    }

    fn append_normalized(&mut self, chunk: &[u8]) {
        self.buffer.reserve(chunk.len());
        for &byte in chunk {
            match byte {
                b'\n' if self.after_cr => self.after_cr = false,
                b'\r' => {
                    self.buffer.push(b'\n');
                    self.after_cr = true;
                }
                _ => {
                    self.buffer.push(byte);
                    self.after_cr = false;
                }
            }
        }
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == b"\n\n")
}

/// Join the `data:` lines of one frame. Comments, `event:`/`id:` fields and the
/// `[DONE]` terminator produce nothing.
fn frame_data(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let mut data: Option<String> = None;

    for line in text.split('\n') {
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    data.filter(|d| {
        let trimmed = d.trim();
        !trimmed.is_empty() && trimmed != "[DONE]"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_frames_on_blank_lines() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"event: a\ndata: {\"x\":1}\n\ndata: {\"x\":2}\n\n");
        assert_eq!(out, vec!["{\"x\":1}", "{\"x\":2}"]);
    }

    #[test]
    fn holds_partial_frames_until_complete() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"x\"").is_empty());
        assert!(decoder.push(b":1}\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec!["{\"x\":1}"]);
    }

    #[test]
    fn crlf_frames() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(out, vec!["one", "two"]);
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let split = bytes.len() - 3;
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["caf\u{e9}"]);
    }

    #[test]
    fn done_and_comments_are_skipped() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b": keep-alive\n\ndata: [DONE]\n\n");
        assert!(out.is_empty());
    }

    #[test]
    fn multi_line_data_is_joined() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: a\ndata: b\n\n");
        assert_eq!(out, vec!["a\nb"]);
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn bare_cr_line_endings() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"event: x\rdata: one\r\rdata: two\r\r");
        assert_eq!(out, vec!["one", "two"]);
    }

    #[test]
    fn crlf_split_between_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: a\r").is_empty());
        assert_eq!(decoder.push(b"\n\r"), vec!["a"]);
        assert_eq!(decoder.push(b"\ndata: b\n\n"), vec!["b"]);
    }

    #[test]
    fn blank_line_straddling_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: a\n").is_empty());
        assert_eq!(decoder.push(b"\ndata: b"), vec!["a"]);
        assert_eq!(decoder.finish().as_deref(), Some("b"));
    }

    #[test]
    fn large_frame_fed_byte_by_byte() {
        let payload = "y".repeat(64 * 1024);
        let body = format!("data: {}\n\ndata: tail\n\n", payload);
        let mut decoder = SseDecoder::new();

        let mut out = Vec::new();
        for byte in body.as_bytes() {
            out.extend(decoder.push(std::slice::from_ref(byte)));
        }
        assert_eq!(out, vec![payload, "tail".to_string()]);
    }
}
