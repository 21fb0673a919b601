pub mod event;

pub use event::{AnalysisStep, EventParseError, SseEvent, StepStatus};

use tracing::{debug, warn};

const DATA_MARKER: &str = "data:";

/// Incremental parser for an SSE-framed byte stream.
///
/// Feed arbitrary network chunks with `push`; complete `data:` lines come
/// back as typed events in arrival order. A line split across chunk
/// boundaries is retained in the buffer until its trailing newline arrives,
/// so framing is chunk-boundary independent. Malformed payloads are logged
/// and dropped; the stream continues.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    dropped: u64,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one network chunk and drain every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(event) = self.parse_line(line.trim()) {
                events.push(event);
            }
        }
        events
    }

    /// End of stream: a well-formed server terminates with a complete line,
    /// so any buffered partial tail is discarded.
    pub fn finish(self) {
        if !self.buffer.is_empty() {
            warn!(
                "SSE stream ended mid-line; discarding {} buffered bytes",
                self.buffer.len()
            );
        }
        if self.dropped > 0 {
            debug!("SSE stream dropped {} malformed events", self.dropped);
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped
    }

    fn parse_line(&mut self, line: &str) -> Option<SseEvent> {
        // Blank lines separate events; comment/other fields are ignored.
        let payload = line.strip_prefix(DATA_MARKER)?.trim();
        if payload.is_empty() {
            return None;
        }

        match event::parse_event_payload(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                self.dropped += 1;
                warn!("Dropping malformed SSE event: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::event::{AnalysisStep, StepStatus};

    const STREAM: &str = concat!(
        "data: {\"type\":\"uploading\",\"status\":\"start\"}\n\n",
        "data: {\"type\":\"uploading\",\"status\":\"completed\"}\n\n",
        "data: {\"type\":\"transcribing\",\"status\":\"start\"}\n\n",
        "data: {\"type\":\"completed\",\"report\":{\"chunks\":[]}}\n\n",
    );

    fn parse_in_chunks(bytes: &[u8], chunk_size: usize) -> Vec<SseEvent> {
        let mut parser = SseParser::new();
        let mut events = Vec::new();
        for chunk in bytes.chunks(chunk_size) {
            events.extend(parser.push(chunk));
        }
        parser.finish();
        events
    }

    #[test]
    fn parses_whole_stream_in_one_chunk() {
        let events = parse_in_chunks(STREAM.as_bytes(), STREAM.len());
        assert_eq!(events.len(), 4);
        assert!(events[3].is_terminal());
    }

    #[test]
    fn chunk_boundaries_do_not_change_the_event_list() {
        let reference = parse_in_chunks(STREAM.as_bytes(), STREAM.len());
        for chunk_size in [1, 2, 3, 7, 16, 61] {
            let events = parse_in_chunks(STREAM.as_bytes(), chunk_size);
            assert_eq!(events, reference, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn one_chunk_may_carry_many_events() {
        let mut parser = SseParser::new();
        let events = parser.push(STREAM.as_bytes());
        assert_eq!(events.len(), 4);
        assert_eq!(parser.push(b""), vec![]);
    }

    #[test]
    fn partial_line_is_retained_until_completed() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: {\"type\":\"analyz").is_empty());
        let events = parser.push(b"ing\",\"status\":\"start\"}\n");
        assert_eq!(
            events,
            vec![SseEvent::Step {
                step: AnalysisStep::Analyzing,
                status: StepStatus::Start,
            }]
        );
    }

    #[test]
    fn malformed_event_does_not_break_neighbors() {
        let stream = concat!(
            "data: {\"type\":\"uploading\",\"status\":\"start\"}\n",
            "data: {this is not json}\n",
            "data: {\"type\":\"uploading\",\"status\":\"completed\"}\n",
        );
        let mut parser = SseParser::new();
        let events = parser.push(stream.as_bytes());
        assert_eq!(events.len(), 2);
        assert_eq!(parser.dropped_events(), 1);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keepalive\n\nevent: progress\n");
        assert!(events.is_empty());
        assert_eq!(parser.dropped_events(), 0);
    }

    #[test]
    fn events_preserve_arrival_order() {
        let events = parse_in_chunks(STREAM.as_bytes(), 5);
        let kinds: Vec<bool> = events.iter().map(|e| e.is_terminal()).collect();
        assert_eq!(kinds, vec![false, false, false, true]);
    }
}
