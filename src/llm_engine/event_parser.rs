//! NDJSON event parser for the generate endpoint
//!
//! Bytes arrive in arbitrary chunks; lines are reassembled here, decoded one
//! at a time, and turned into [`GenerationEvent`]s. A malformed line is logged
//! and skipped. The first terminal event stops the parser.

use serde::Deserialize;

use super::provider::GenerationEvent;

/// Longest slice of a bad line echoed into the log
const LOG_SNIPPET_LEN: usize = 200;

/// Envelope of one streamed line
#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// What a single line contributes to the event sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank line, or a line with nothing to report
    Skip,
    /// Not a valid envelope; carries the decode error
    Malformed(String),
    /// Optional content delta, then an optional terminal event
    Events {
        delta: Option<String>,
        terminal: Option<GenerationEvent>,
    },
}

/// Classify one line of backend output
pub fn parse_line(line: &str) -> LineOutcome {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineOutcome::Skip;
    }

    let envelope: GenerateLine = match serde_json::from_str(trimmed) {
        Ok(envelope) => envelope,
        Err(e) => return LineOutcome::Malformed(e.to_string()),
    };

    if let Some(error) = envelope.error.filter(|e| !e.is_null()) {
        let message = match error {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        return LineOutcome::Events {
            delta: None,
            terminal: Some(GenerationEvent::BackendError(message)),
        };
    }

    let delta = envelope.response.filter(|text| !text.is_empty());
    let terminal = envelope.done.unwrap_or(false).then_some(GenerationEvent::Done);

    if delta.is_none() && terminal.is_none() {
        LineOutcome::Skip
    } else {
        LineOutcome::Events { delta, terminal }
    }
}

/// Incremental parser with partial-line buffering
#[derive(Debug, Default)]
pub struct EventParser {
    buffer: Vec<u8>,
    finished: bool,
    malformed_lines: usize,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a terminal event has been produced
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of lines skipped because they could not be decoded
    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }

    /// Feed the next chunk of body bytes and collect the events of every completed line
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.buffer.extend_from_slice(chunk);

        let mut consumed = 0;
        while let Some(pos) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + pos;
            let line = self.buffer[consumed..end].to_vec();
            consumed = end + 1;

            self.process_line(&line, &mut events);
            if self.finished {
                break;
            }
        }

        if self.finished {
            self.buffer.clear();
        } else {
            self.buffer.drain(..consumed);
        }
        events
    }

    /// Flush a trailing line that was not newline-terminated when the body ended
    pub fn finish(&mut self) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        if self.finished || self.buffer.is_empty() {
            self.buffer.clear();
            return events;
        }

        let line = std::mem::take(&mut self.buffer);
        self.process_line(&line, &mut events);
        events
    }

    fn process_line(&mut self, raw: &[u8], events: &mut Vec<GenerationEvent>) {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                self.malformed_lines += 1;
                log::warn!("Skipping non UTF-8 line from backend: {}", e);
                return;
            }
        };

        match parse_line(line) {
            LineOutcome::Skip => {}
            LineOutcome::Malformed(reason) => {
                self.malformed_lines += 1;
                log::warn!(
                    "Failed to parse backend line, skipping: {} - {}",
                    snippet(line),
                    reason
                );
            }
            LineOutcome::Events { delta, terminal } => {
                if let Some(text) = delta {
                    events.push(GenerationEvent::ContentDelta(text));
                }
                if let Some(event) = terminal {
                    events.push(event);
                    self.finished = true;
                }
            }
        }
    }
}

fn snippet(line: &str) -> &str {
    match line.char_indices().nth(LOG_SNIPPET_LEN) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GenerationEvent::*;

    fn parse_all(input: &str) -> Vec<GenerationEvent> {
        let mut parser = EventParser::new();
        let mut events = parser.feed(input.as_bytes());
        events.extend(parser.finish());
        events
    }

    #[test]
    fn test_done_is_last_and_deltas_in_order() {
        let input = "{\"response\":\"Hel\"}\n{\"response\":\"lo\"}\n{\"response\":\"\",\"done\":true}\n";
        assert_eq!(
            parse_all(input),
            vec![ContentDelta("Hel".into()), ContentDelta("lo".into()), Done]
        );
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let input = "{\"response\":\"A\"}\n{not json}\n{\"response\":\"B\",\"done\":true}\n";
        let mut parser = EventParser::new();
        let events = parser.feed(input.as_bytes());

        assert_eq!(events, vec![ContentDelta("A".into()), ContentDelta("B".into()), Done]);
        assert_eq!(parser.malformed_lines(), 1);
    }

    #[test]
    fn test_blank_lines_do_not_change_output() {
        let plain = "{\"response\":\"a\"}\n{\"response\":\"b\"}\n{\"done\":true}\n";
        let spaced = "\n{\"response\":\"a\"}\n   \n\n{\"response\":\"b\"}\n\t\n{\"done\":true}\n\n";
        assert_eq!(parse_all(plain), parse_all(spaced));
    }

    #[test]
    fn test_error_line_is_terminal() {
        let input = "{\"response\":\"a\"}\n{\"error\":\"model 'x' not found\"}\n{\"response\":\"b\"}\n{\"done\":true}\n";
        let mut parser = EventParser::new();
        let events = parser.feed(input.as_bytes());

        assert_eq!(
            events,
            vec![ContentDelta("a".into()), BackendError("model 'x' not found".into())]
        );
        assert!(parser.is_finished());
        assert!(parser.feed(b"{\"response\":\"c\"}\n").is_empty());
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_empty_delta_is_suppressed() {
        assert_eq!(parse_line("{\"response\":\"\"}"), LineOutcome::Skip);
        assert_eq!(parse_line("{\"model\":\"llava\"}"), LineOutcome::Skip);
        assert_eq!(parse_all("{\"response\":\"\"}\n{\"done\":true}\n"), vec![Done]);
    }

    #[test]
    fn test_final_line_carries_content_and_done() {
        assert_eq!(
            parse_line("{\"response\":\"end.\",\"done\":true}"),
            LineOutcome::Events {
                delta: Some("end.".into()),
                terminal: Some(Done)
            }
        );
    }

    #[test]
    fn test_non_string_error_is_stringified() {
        assert_eq!(
            parse_line("{\"error\":{\"code\":500}}"),
            LineOutcome::Events {
                delta: None,
                terminal: Some(BackendError("{\"code\":500}".into()))
            }
        );
        // A null error field is not an error
        assert_eq!(
            parse_line("{\"error\":null,\"response\":\"x\"}"),
            LineOutcome::Events {
                delta: Some("x".into()),
                terminal: None
            }
        );
    }

    #[test]
    fn test_non_object_lines_are_malformed() {
        assert!(matches!(parse_line("42"), LineOutcome::Malformed(_)));
        assert!(matches!(parse_line("[1,2]"), LineOutcome::Malformed(_)));
        assert!(matches!(parse_line("{\"done\":\"yes\"}"), LineOutcome::Malformed(_)));
    }

    #[test]
    fn test_lines_split_across_chunks() {
        let mut parser = EventParser::new();
        assert!(parser.feed(b"{\"respo").is_empty());
        assert!(parser.feed(b"nse\":\"caf").is_empty());
        // multi-byte 'é' split between chunks
        let e_acute = "é".as_bytes();
        assert!(parser.feed(&e_acute[..1]).is_empty());
        let mut tail = e_acute[1..].to_vec();
        tail.extend_from_slice(b"\"}\n{\"done\":tr");
        assert_eq!(parser.feed(&tail), vec![ContentDelta("café".into())]);
        assert_eq!(parser.feed(b"ue}\n"), vec![Done]);
    }

    #[test]
    fn test_unterminated_trailing_line_is_flushed() {
        let mut parser = EventParser::new();
        assert_eq!(parser.feed(b"{\"response\":\"a\"}\n{\"response\":\"b\"}"), vec![ContentDelta("a".into())]);
        assert_eq!(parser.finish(), vec![ContentDelta("b".into())]);
        assert!(!parser.is_finished());
    }

    #[test]
    fn test_stream_without_terminal_just_ends() {
        let events = parse_all("{\"response\":\"a\"}\n{\"response\":\"b\"}\n");
        assert_eq!(events, vec![ContentDelta("a".into()), ContentDelta("b".into())]);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut parser = EventParser::new();
        let mut input = vec![0xff, 0xfe, b'\n'];
        input.extend_from_slice(b"{\"response\":\"ok\",\"done\":true}\n");
        assert_eq!(parser.feed(&input), vec![ContentDelta("ok".into()), Done]);
        assert_eq!(parser.malformed_lines(), 1);
    }
}
