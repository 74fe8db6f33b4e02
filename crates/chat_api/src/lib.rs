//! Transport-only chat-completions client primitives.
//!
//! This crate owns request building, response framing and stream decoding for
//! OpenAI-compatible `chat/completions` endpoints. It knows nothing about
//! conversations, fenced blocks or the workspace; callers consume the decoded
//! [`StreamEvent`]s one at a time.
//!
//! Framing is line-oriented: `data: <json>` lines carry frames, `data: [DONE]`
//! terminates the stream, everything else is ignored. A frame whose JSON does
//! not parse is surfaced as [`StreamEvent::Malformed`] and decoding continues.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, ChatApiClient, StreamResult};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::{StreamEnd, StreamEvent};
pub use payload::{ApiMessage, ChatRequest, Role, SamplingParams};
pub use sse::FrameDecoder;
pub use url::normalize_chat_url;
