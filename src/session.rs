//! Conversation turns: stream a reply, then persist what it contains.

use std::sync::Arc;

use chat_api::{
    ApiMessage, CancellationSignal, ChatApiError, ChatRequest, Role, SamplingParams, StreamEnd,
    StreamEvent,
};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use workspace_store::Workspace;

use crate::aggregator::DeltaAggregator;
use crate::config::{DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
use crate::conversation::{ChatMessage, Conversation};
use crate::transport::CompletionTransport;
use crate::writer::{ArtifactError, ArtifactWriter, BlockOutcome, WrittenArtifact};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub model: String,
    /// Sent as the first message of every request. Skipped when blank.
    pub system_prompt: String,
    pub sampling: SamplingParams,
    /// Write fenced blocks with an inferable path after each turn.
    pub persist_blocks: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            sampling: SamplingParams::default(),
            persist_blocks: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnRequest {
    pub prompt: String,
    /// Manual override: also save the full reply to this path.
    pub save_as: Option<String>,
}

impl TurnRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            save_as: None,
        }
    }

    #[must_use]
    pub fn with_save_as(mut self, path: impl Into<String>) -> Self {
        self.save_as = Some(path.into());
        self
    }
}

/// Live progress published while a turn runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnUpdate {
    Delta(String),
    ArtifactWritten(WrittenArtifact),
    Error(String),
    Finished(StreamEnd),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    /// `None` when the stream produced no text.
    pub assistant: Option<ChatMessage>,
    pub end: StreamEnd,
    pub written: Vec<WrittenArtifact>,
    pub skipped_blocks: usize,
    pub errors: Vec<String>,
}

impl TurnReport {
    fn new(end: StreamEnd) -> Self {
        Self {
            assistant: None,
            end,
            written: Vec::new(),
            skipped_blocks: 0,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error(transparent)]
    Transport(#[from] ChatApiError),
}

pub struct Session {
    transport: Arc<dyn CompletionTransport>,
    writer: ArtifactWriter,
    conversation: Conversation,
    config: SessionConfig,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("writer", &self.writer)
            .field("messages", &self.conversation.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Session {
    pub fn new(
        transport: Arc<dyn CompletionTransport>,
        workspace: Arc<dyn Workspace>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            writer: ArtifactWriter::new(workspace),
            conversation: Conversation::new(),
            config,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_persist_blocks(&mut self, persist_blocks: bool) {
        self.config.persist_blocks = persist_blocks;
    }

    pub fn clear(&mut self) {
        self.conversation.clear();
    }

    /// System prompt, prior history, then `user`.
    pub fn build_request(&self, user: &ChatMessage) -> ChatRequest {
        let system = Some(self.config.system_prompt.trim())
            .filter(|prompt| !prompt.is_empty())
            .map(|prompt| ApiMessage::new(Role::System, prompt));

        let messages = system
            .into_iter()
            .chain(self.conversation.history().iter().map(ChatMessage::to_api))
            .chain(std::iter::once(user.to_api()))
            .collect();

        ChatRequest::new(self.config.model.clone(), messages).with_sampling(self.config.sampling)
    }

    /// Run one turn: stream the reply, finalize it, then persist.
    ///
    /// Only a transport failure fails the turn; per-artifact problems are
    /// collected in the report. A cancelled stream still finalizes and
    /// persists whatever text arrived.
    pub async fn run_turn(
        &mut self,
        turn: TurnRequest,
        updates: Option<&UnboundedSender<TurnUpdate>>,
        cancellation: &CancellationSignal,
    ) -> Result<TurnReport, TurnError> {
        let prompt = turn.prompt.trim();
        if prompt.is_empty() {
            return Err(TurnError::EmptyPrompt);
        }

        let user = ChatMessage::user(prompt);
        let request = self.build_request(&user);
        info!(
            model = %request.model,
            messages = request.messages.len(),
            "turn started"
        );

        let mut aggregator = DeltaAggregator::new();
        let streamed = self
            .transport
            .stream(&request, cancellation, &mut |event: StreamEvent| {
                if let Some(fragment) = aggregator.apply(&event) {
                    publish(updates, TurnUpdate::Delta(fragment.to_owned()));
                }
            })
            .await;

        let end = match streamed {
            Ok(end) => end,
            Err(error) => {
                warn!(%error, "turn failed");
                publish(updates, TurnUpdate::Error(error.to_string()));
                return Err(error.into());
            }
        };
        if end == StreamEnd::Cancelled {
            info!(chars = aggregator.text().len(), "turn cancelled; keeping partial reply");
        }

        self.conversation.push(user);
        let mut report = TurnReport::new(end);
        let assistant = aggregator.finalize();

        if assistant.content.is_empty() {
            debug!("stream produced no text");
        } else {
            self.conversation.push(assistant.clone());
            if self.config.persist_blocks {
                for outcome in self.writer.persist_blocks(&assistant.content) {
                    match outcome {
                        BlockOutcome::Written(written) => record_written(&mut report, updates, written),
                        BlockOutcome::Skipped => report.skipped_blocks += 1,
                        BlockOutcome::Failed(error) => record_error(&mut report, updates, &error),
                    }
                }
            }
            report.assistant = Some(assistant);
        }

        // The override saves this turn's reply only, never an earlier one.
        if let Some(raw_path) = turn.save_as.as_deref().filter(|path| !path.trim().is_empty()) {
            let saved = match &report.assistant {
                Some(reply) => self.writer.write_override(raw_path, &reply.content),
                None => Err(ArtifactError::NoReply),
            };
            match saved {
                Ok(written) => record_written(&mut report, updates, written),
                Err(error) => record_error(&mut report, updates, &error),
            }
        }

        publish(updates, TurnUpdate::Finished(end));
        info!(
            end = end.as_str(),
            written = report.written.len(),
            skipped = report.skipped_blocks,
            errors = report.errors.len(),
            "turn finished"
        );
        Ok(report)
    }

    /// Save the most recent assistant reply verbatim to `raw_path`.
    pub fn save_last_reply(&self, raw_path: &str) -> Result<WrittenArtifact, ArtifactError> {
        let reply = self
            .conversation
            .last_assistant()
            .ok_or(ArtifactError::NoReply)?;
        self.writer.write_override(raw_path, &reply.content)
    }
}

fn publish(updates: Option<&UnboundedSender<TurnUpdate>>, update: TurnUpdate) {
    if let Some(updates) = updates {
        let _ = updates.send(update);
    }
}

fn record_written(
    report: &mut TurnReport,
    updates: Option<&UnboundedSender<TurnUpdate>>,
    written: WrittenArtifact,
) {
    publish(updates, TurnUpdate::ArtifactWritten(written.clone()));
    report.written.push(written);
}

fn record_error(
    report: &mut TurnReport,
    updates: Option<&UnboundedSender<TurnUpdate>>,
    error: &ArtifactError,
) {
    let message = error.to_string();
    publish(updates, TurnUpdate::Error(message.clone()));
    report.errors.push(message);
}
