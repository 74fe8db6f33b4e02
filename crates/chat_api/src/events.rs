use serde_json::Value;

/// One decoded transport frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// `data: <json>` frame with its payload parsed.
    DataFrame(Value),
    /// `data: [DONE]`; nothing follows it.
    Terminator,
    /// `data:` frame whose payload was not valid JSON.
    Malformed { payload: String, error: String },
}

impl StreamEvent {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Terminator)
    }
}

/// How a stream stopped producing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server sent the terminator frame.
    Terminator,
    /// The connection closed without a terminator frame.
    Eof,
    /// The caller raised the cancellation signal.
    Cancelled,
}

impl StreamEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminator => "terminator",
            Self::Eof => "eof",
            Self::Cancelled => "cancelled",
        }
    }
}
