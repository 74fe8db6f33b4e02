//! Reassembles streamed `delta.content` fragments into one assistant message.

use chat_api::StreamEvent;
use serde_json::Value;
use tracing::warn;

use crate::conversation::ChatMessage;

/// Running buffer for one streamed reply.
#[derive(Debug, Default)]
pub struct DeltaAggregator {
    buffer: String,
    terminated: bool,
    fragments: usize,
    malformed: usize,
}

impl DeltaAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event and return the fragment it appended, if any.
    ///
    /// Events after the terminator are ignored.
    pub fn apply(&mut self, event: &StreamEvent) -> Option<&str> {
        if self.terminated {
            return None;
        }

        match event {
            StreamEvent::DataFrame(frame) => {
                let fragment = extract_delta_text(frame)?;
                let start = self.buffer.len();
                self.buffer.push_str(fragment);
                self.fragments += 1;
                Some(&self.buffer[start..])
            }
            StreamEvent::Malformed { payload, error } => {
                self.malformed += 1;
                warn!(%error, payload_len = payload.len(), "skipping malformed stream frame");
                None
            }
            StreamEvent::Terminator => {
                self.terminated = true;
                None
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    /// Freeze the buffer into an assistant message.
    pub fn finalize(self) -> ChatMessage {
        ChatMessage::assistant(self.buffer)
    }
}

/// `choices[0].delta.content` as a non-empty string, or `None`.
pub fn extract_delta_text(frame: &Value) -> Option<&str> {
    frame
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|text| !text.is_empty())
}
