//! Streaming chat agent that writes fenced code blocks into a workspace.
//!
//! ## Turn pipeline
//!
//! Each turn sends `[system prompt] + history + user message` to an
//! OpenAI-compatible `chat/completions` endpoint and streams the reply. Text
//! fragments from `choices[0].delta.content` are forwarded live as
//! [`TurnUpdate::Delta`] and accumulated. Once the stream ends (terminator,
//! EOF or cancellation) the reply is finalized, fenced blocks are extracted,
//! a path is inferred for each, and blocks with a valid path are written
//! under the workspace root.
//!
//! Path inference order per block:
//!
//! 1. `path=`, `file=` or `filename=` in the info string
//! 2. the info string itself when it looks like a path (`src/app.ts`)
//! 3. a `file:` / `path:` / `filename:` marker on the first six body lines,
//!    optionally behind a comment prefix
//!
//! Any path containing a `..` segment is refused. Blocks with no inferable
//! path are skipped silently.
//!
//! ## Configuration
//!
//! `ARTIFACT_AGENT_CONFIG_PATH` may point at a JSON file:
//!
//! ```json
//! {
//!   "api_key": "nvapi-...",
//!   "base_url": "https://integrate.api.nvidia.com/v1",
//!   "model": "moonshotai/kimi-k2-instruct",
//!   "timeout_sec": 120,
//!   "sampling": { "temperature": 0.6, "top_p": 0.9, "max_tokens": 4096 }
//! }
//! ```
//!
//! Every field is optional and unknown fields are rejected. The
//! `ARTIFACT_AGENT_API_KEY`, `ARTIFACT_AGENT_BASE_URL`, `ARTIFACT_AGENT_MODEL`,
//! `ARTIFACT_AGENT_SYSTEM_PROMPT` and `ARTIFACT_AGENT_TIMEOUT_SEC` variables
//! override the file. Logging goes to stderr, filtered by
//! `ARTIFACT_AGENT_LOG` (falling back to `RUST_LOG`, then `warn`).

pub mod aggregator;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod logging;
pub mod session;
pub mod transport;
pub mod writer;

pub use aggregator::{extract_delta_text, DeltaAggregator};
pub use config::{AgentConfig, ConfigError};
pub use conversation::{ChatMessage, Conversation};
pub use session::{Session, SessionConfig, TurnError, TurnReport, TurnRequest, TurnUpdate};
pub use transport::CompletionTransport;
pub use writer::{ArtifactError, ArtifactOrigin, ArtifactWriter, BlockOutcome, WrittenArtifact};
