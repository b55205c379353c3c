//! Incremental decoder for the `text/event-stream` wire format.
//!
//! Transport chunks do not respect frame boundaries, so the decoder buffers a
//! partial trailing line across chunks and only yields frames once their
//! terminating blank line has arrived.

use tracing::trace;

/// One complete frame from the stream: the channel name plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Channel name from the `event:` field; `"message"` when absent.
    pub event: String,
    /// Payload; multi-line `data:` fields joined with `\n`.
    pub data: String,
    /// Event id for replay/ordering, if the server sent one.
    pub id: Option<String>,
    /// Retry timing hint from the server, in milliseconds.
    pub retry: Option<u64>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: String,
    id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the stream; returns every frame it completed.
    ///
    /// Takes raw bytes because transport chunks can split a multi-byte UTF-8
    /// sequence; the buffer holds the partial line and text decoding happens
    /// only once a line is complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(newline_idx) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=newline_idx).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.is_empty() {
                if let Some(frame) = self.finish_frame() {
                    frames.push(frame);
                }
            } else {
                let line = String::from_utf8_lossy(&line);
                self.field_line(&line);
            }
        }

        frames
    }

    fn field_line(&mut self, line: &str) {
        // Lines starting with a colon are comments (keep-alives).
        if line.starts_with(':') {
            return;
        }

        let (key, value) = match line.split_once(':') {
            Some((key, value)) => (key, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match key {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value);
            }
            "id" => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(ms);
                }
            }
            other => trace!("ignoring unknown SSE field: {other}"),
        }
    }

    fn finish_frame(&mut self) -> Option<SseFrame> {
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        let data = std::mem::take(&mut self.data);
        let id = self.id.take();
        let retry = self.retry.take();

        // Frames without data are keep-alives, not messages.
        if data.is_empty() {
            return None;
        }

        Some(SseFrame {
            event,
            data,
            id,
            retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_complete_frame() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: llm.stream\nid: 7\ndata: {\"x\":1}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "llm.stream");
        assert_eq!(frames[0].data, "{\"x\":1}");
        assert_eq!(frames[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn reassembles_frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: tool.ca").is_empty());
        assert!(decoder.feed(b"ll\ndata: {}").is_empty());
        let frames = decoder.feed(b"\n\nevent: error\ndata: {}\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "tool.call");
        assert_eq!(frames[1].event, "error");
    }

    #[test]
    fn reassembles_multi_byte_characters_split_across_chunks() {
        let wire = "data: {\"content\":\"反馈循环\"}\n\n".as_bytes();
        // Split inside one of the three-byte CJK sequences.
        let split_at = wire
            .iter()
            .position(|&b| b >= 0x80)
            .map(|idx| idx + 1)
            .unwrap();

        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&wire[..split_at]).is_empty());
        let frames = decoder.feed(&wire[split_at..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"content\":\"反馈循环\"}");
    }

    #[test]
    fn joins_multi_line_data() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: line one\ndata: line two\n\n");
        assert_eq!(frames[0].data, "line one\nline two");
        assert_eq!(frames[0].event, "message");
    }

    #[test]
    fn tolerates_crlf_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": keep-alive\r\nevent: connected\r\ndata: ok\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "connected");
        assert_eq!(frames[0].data, "ok");
    }

    #[test]
    fn drops_frames_without_data() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: agent.start\n\n").is_empty());
        assert!(decoder.feed(b": ping\n\n").is_empty());
    }

    #[test]
    fn parses_retry_hint() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"retry: 5000\ndata: x\n\n");
        assert_eq!(frames[0].retry, Some(5000));
    }
}
