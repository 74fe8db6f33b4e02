use serde_json::Value;

use crate::events::StreamEvent;

/// Marker that prefixes payload-carrying lines. A single space after the
/// colon is conventional and optional.
pub const DATA_PREFIX: &str = "data:";
/// Payload that ends the stream.
pub const DONE_PAYLOAD: &str = "[DONE]";

/// Incremental line decoder for `data:`-framed streams.
///
/// Bytes are buffered until a full line is available, so a multi-byte UTF-8
/// sequence split across transport reads decodes intact. Once the terminator
/// has been seen the decoder yields nothing further.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    terminated: bool,
}

impl FrameDecoder {
    /// Feed arbitrary bytes into the decoder and drain complete frames.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.terminated {
            return events;
        }

        self.buffer.extend_from_slice(bytes);
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let Some(event) = decode_line(&String::from_utf8_lossy(&line)) else {
                continue;
            };

            let done = event.is_terminator();
            events.push(event);
            if done {
                self.terminated = true;
                self.buffer.clear();
                break;
            }
        }

        events
    }

    /// Decode a trailing line the transport closed without a newline.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.terminated || self.buffer.is_empty() {
            return None;
        }

        let line = std::mem::take(&mut self.buffer);
        let event = decode_line(&String::from_utf8_lossy(&line));
        if event.as_ref().is_some_and(StreamEvent::is_terminator) {
            self.terminated = true;
        }
        event
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    /// Decode a complete stream body in one shot.
    pub fn decode_str(input: &str) -> Vec<StreamEvent> {
        let mut decoder = Self::default();
        let mut events = decoder.feed(input.as_bytes());
        events.extend(decoder.finish());
        events
    }
}

/// Lazily decode already-split lines, stopping after the terminator.
pub fn decode_lines<I>(lines: I) -> impl Iterator<Item = StreamEvent>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut terminated = false;
    lines
        .into_iter()
        .map_while(move |line| {
            if terminated {
                return None;
            }
            let event = decode_line(line.as_ref());
            terminated = event.as_ref().is_some_and(StreamEvent::is_terminator);
            Some(event)
        })
        .flatten()
}

/// Decode one transport line; `None` for lines that carry no frame.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let payload = line.trim().strip_prefix(DATA_PREFIX)?.trim_start();
    if payload.is_empty() {
        return None;
    }

    if payload == DONE_PAYLOAD {
        return Some(StreamEvent::Terminator);
    }

    Some(match serde_json::from_str::<Value>(payload) {
        Ok(value) => StreamEvent::DataFrame(value),
        Err(error) => StreamEvent::Malformed {
            payload: payload.to_owned(),
            error: error.to_string(),
        },
    })
}
