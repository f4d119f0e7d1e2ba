//! Incremental parser for `text/event-stream` bodies.
//!
//! Events are framed by blank lines, but the HTTP body can cut a frame
//! anywhere, so the parser keeps the unfinished tail around until the rest
//! arrives.

/// A single parsed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, when the server names one.
    pub event: Option<String>,
    /// All `data:` lines of the frame, joined with newlines.
    pub data: String,
}

pub struct SseParser {
    pending: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            pending: String::new(),
        }
    }

    /// Feed raw body bytes; returns every event this chunk completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some((frame, rest)) = split_frame(&self.pending) {
            if let Some(event) = parse_frame(&frame) {
                events.push(event);
            }
            self.pending = rest;
        }
        events
    }
}

/// Split off the first complete frame. The blank-line boundary arrives as
/// either `\n\n` or `\r\n\r\n` depending on the server.
fn split_frame(buf: &str) -> Option<(String, String)> {
    let lf = buf.find("\n\n").map(|at| (at, 2));
    let crlf = buf.find("\r\n\r\n").map(|at| (at, 4));
    let (at, len) = match (lf, crlf) {
        (Some(lf), Some(crlf)) => {
            if crlf.0 < lf.0 {
                crlf
            } else {
                lf
            }
        }
        (Some(lf), None) => lf,
        (None, Some(crlf)) => crlf,
        (None, None) => return None,
    };
    Some((buf[..at].to_string(), buf[at + len..].to_string()))
}

fn parse_frame(frame: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value),
            // id: and retry: are irrelevant for a one-shot response stream
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_split_on_blank_lines() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: hello\n\ndata: world\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[1].data, "world");
    }

    #[test]
    fn test_partial_frames_wait_for_the_rest() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: hel").is_empty());
        let events = parser.push(b"lo\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_crlf_framing() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: {\"a\":1}\r\n\r\ndata: {\"b\":2}\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"a\":1}");
        assert_eq!(events[1].data, "{\"b\":2}");
    }

    #[test]
    fn test_named_events() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: ping\ndata: {}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("ping"));
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn test_multi_line_data_joins() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: line one\ndata: line two\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line one\nline two");
    }

    #[test]
    fn test_comments_and_bookkeeping_fields_ignored() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keep-alive\nid: 7\nretry: 100\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, None);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn test_frame_without_data_produces_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: ping\n\n").is_empty());
    }
}
