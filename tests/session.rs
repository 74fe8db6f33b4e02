use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use artifact_agent::{
    ArtifactOrigin, CompletionTransport, Session, SessionConfig, TurnRequest, TurnUpdate,
};
use artifact_extract::PathSource;
use async_trait::async_trait;
use chat_api::{CancellationSignal, ChatApiError, ChatRequest, Role, StreamEnd, StreamEvent};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;
use workspace_store::{LocalWorkspace, MemoryWorkspace, WorkspaceOp};

struct ScriptedTransport {
    replies: Mutex<Vec<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

#[derive(Clone)]
struct Script {
    events: Vec<StreamEvent>,
    /// Raise the cancellation signal after this many events.
    cancel_after: Option<usize>,
}

impl ScriptedTransport {
    fn with_replies(replies: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn stream(
        &self,
        request: &ChatRequest,
        cancellation: &CancellationSignal,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<StreamEnd, ChatApiError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let script = self
            .replies
            .lock()
            .expect("replies lock")
            .pop()
            .ok_or_else(|| ChatApiError::Unknown("no scripted reply left".to_owned()))?;

        for (index, event) in script.events.into_iter().enumerate() {
            if script.cancel_after == Some(index) {
                cancellation.store(true, Ordering::Release);
            }
            if cancellation.load(Ordering::Acquire) {
                return Ok(StreamEnd::Cancelled);
            }
            let terminator = event.is_terminator();
            on_event(event);
            if terminator {
                return Ok(StreamEnd::Terminator);
            }
        }
        Ok(StreamEnd::Eof)
    }
}

fn delta(content: &str) -> StreamEvent {
    StreamEvent::DataFrame(json!({"choices": [{"delta": {"content": content}}]}))
}

/// Split `reply` into small fragments and end with the terminator.
fn streamed(reply: &str) -> Script {
    let chars = reply.chars().collect::<Vec<_>>();
    let mut events = chars
        .chunks(7)
        .map(|chunk| delta(&chunk.iter().collect::<String>()))
        .collect::<Vec<_>>();
    events.push(StreamEvent::Terminator);
    Script {
        events,
        cancel_after: None,
    }
}

fn memory_session(
    replies: Vec<Script>,
    config: SessionConfig,
) -> (Session, Arc<ScriptedTransport>, Arc<MemoryWorkspace>) {
    let transport = ScriptedTransport::with_replies(replies);
    let workspace = Arc::new(MemoryWorkspace::new());
    let session = Session::new(transport.clone(), workspace.clone(), config);
    (session, transport, workspace)
}

fn drain(receiver: &mut mpsc::UnboundedReceiver<TurnUpdate>) -> Vec<TurnUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = receiver.try_recv() {
        updates.push(update);
    }
    updates
}

#[tokio::test]
async fn info_key_block_is_written_and_deltas_stream_live() {
    let reply = "Here is the helper:\n```path=lib/util.go\nfunc Add(a,b int) int { return a+b }\n```\nDone.";
    let (mut session, _, workspace) = memory_session(vec![streamed(reply)], SessionConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancellation = CancellationSignal::default();

    let report = session
        .run_turn(TurnRequest::new("write Add"), Some(&tx), &cancellation)
        .await
        .expect("turn");

    assert_eq!(report.end, StreamEnd::Terminator);
    assert_eq!(
        workspace.file_string("lib/util.go").as_deref(),
        Some("func Add(a,b int) int { return a+b }")
    );
    assert_eq!(report.written.len(), 1);
    assert_eq!(
        report.written[0].origin,
        ArtifactOrigin::Block(PathSource::InfoKey)
    );
    assert!(report.errors.is_empty());

    let updates = drain(&mut rx);
    let streamed_text = updates
        .iter()
        .filter_map(|update| match update {
            TurnUpdate::Delta(text) => Some(text.as_str()),
            _ => None,
        })
        .collect::<String>();
    assert_eq!(streamed_text, reply);
    assert_eq!(updates.last(), Some(&TurnUpdate::Finished(StreamEnd::Terminator)));
    assert_eq!(
        report.assistant.as_ref().map(|message| message.content.as_str()),
        Some(reply)
    );
}

#[tokio::test]
async fn header_line_is_kept_in_persisted_content() {
    let reply = "```\n// file: notes.txt\nhello\n```";
    let (mut session, _, workspace) = memory_session(vec![streamed(reply)], SessionConfig::default());

    let report = session
        .run_turn(TurnRequest::new("note"), None, &CancellationSignal::default())
        .await
        .expect("turn");

    assert_eq!(
        workspace.file_string("notes.txt").as_deref(),
        Some("// file: notes.txt\nhello")
    );
    assert_eq!(
        report.written[0].origin,
        ArtifactOrigin::Block(PathSource::ContentHeader)
    );
}

#[tokio::test]
async fn traversal_path_is_rejected_without_writing() {
    let reply = "```path=../../etc/passwd\nroot:x:0:0\n```";
    let (mut session, _, workspace) = memory_session(vec![streamed(reply)], SessionConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let report = session
        .run_turn(TurnRequest::new("x"), Some(&tx), &CancellationSignal::default())
        .await
        .expect("turn still succeeds");

    assert!(report.written.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("parent directory"));
    assert!(workspace.operations().is_empty());
    assert!(drain(&mut rx)
        .iter()
        .any(|update| matches!(update, TurnUpdate::Error(message) if message.contains("../../etc/passwd"))));
}

#[tokio::test]
async fn language_only_blocks_are_skipped_quietly() {
    let reply = "```python\nprint('hi')\n```\n```ts\nconst x = 1;\n```";
    let (mut session, _, workspace) = memory_session(vec![streamed(reply)], SessionConfig::default());

    let report = session
        .run_turn(TurnRequest::new("x"), None, &CancellationSignal::default())
        .await
        .expect("turn");

    assert_eq!(report.skipped_blocks, 2);
    assert!(report.errors.is_empty());
    assert!(workspace.file_paths().is_empty());
}

#[tokio::test]
async fn sibling_artifacts_survive_a_failed_write() {
    let reply = "```path=a.txt\nA\n```\n```path=b.txt\nB\n```\n```path=c/d.txt\nD\n```";
    let (mut session, _, workspace) = memory_session(vec![streamed(reply)], SessionConfig::default());
    workspace.fail_writes_to("b.txt");

    let report = session
        .run_turn(TurnRequest::new("x"), None, &CancellationSignal::default())
        .await
        .expect("turn");

    let written = report
        .written
        .iter()
        .map(|artifact| artifact.path.as_str())
        .collect::<Vec<_>>();
    assert_eq!(written, vec!["a.txt", "c/d.txt"]);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("b.txt"));
    assert_eq!(
        workspace.file_paths(),
        vec![PathBuf::from("a.txt"), PathBuf::from("c/d.txt")]
    );
    assert_eq!(workspace.notification_count(), 2);
}

#[tokio::test]
async fn malformed_frames_do_not_interrupt_the_reply() {
    let script = Script {
        events: vec![
            delta("```path=x.md\n"),
            StreamEvent::Malformed {
                payload: "{broken".to_owned(),
                error: "EOF while parsing an object".to_owned(),
            },
            StreamEvent::DataFrame(json!({"choices": [{"delta": {"role": "assistant"}}]})),
            delta("body\n```"),
            StreamEvent::Terminator,
        ],
        cancel_after: None,
    };
    let (mut session, _, workspace) = memory_session(vec![script], SessionConfig::default());

    let report = session
        .run_turn(TurnRequest::new("x"), None, &CancellationSignal::default())
        .await
        .expect("turn");

    assert_eq!(report.end, StreamEnd::Terminator);
    assert_eq!(workspace.file_string("x.md").as_deref(), Some("body"));
}

#[tokio::test]
async fn cancelled_turn_still_persists_aggregated_blocks() {
    let script = Script {
        events: vec![
            delta("```path=early.txt\nkept\n```\n"),
            delta("```path=late.txt\nnever closed"),
            delta("\n```"),
            StreamEvent::Terminator,
        ],
        cancel_after: Some(2),
    };
    let (mut session, _, workspace) = memory_session(vec![script], SessionConfig::default());

    let report = session
        .run_turn(
            TurnRequest::new("x").with_save_as("partial.md"),
            None,
            &CancellationSignal::default(),
        )
        .await
        .expect("turn");

    assert_eq!(report.end, StreamEnd::Cancelled);
    assert_eq!(workspace.file_string("early.txt").as_deref(), Some("kept"));
    assert!(workspace.file("late.txt").is_none());
    assert_eq!(
        workspace.file_string("partial.md").as_deref(),
        Some("```path=early.txt\nkept\n```\n```path=late.txt\nnever closed")
    );
    assert_eq!(session.conversation().len(), 2);
    assert_eq!(
        session.conversation().last_assistant(),
        report.assistant.as_ref()
    );
}

#[tokio::test]
async fn cancellation_before_any_text_keeps_no_assistant_message() {
    let script = Script {
        events: vec![delta("never seen"), StreamEvent::Terminator],
        cancel_after: Some(0),
    };
    let (mut session, _, workspace) = memory_session(vec![script], SessionConfig::default());

    let report = session
        .run_turn(TurnRequest::new("x"), None, &CancellationSignal::default())
        .await
        .expect("turn");

    assert_eq!(report.end, StreamEnd::Cancelled);
    assert!(report.assistant.is_none());
    assert!(session.conversation().last_assistant().is_none());
    assert!(workspace.operations().is_empty());
}

#[tokio::test]
async fn persistence_can_be_disabled() {
    let reply = "```path=skip.txt\nx\n```";
    let config = SessionConfig {
        persist_blocks: false,
        ..SessionConfig::default()
    };
    let (mut session, _, workspace) = memory_session(vec![streamed(reply)], config);

    let report = session
        .run_turn(TurnRequest::new("x"), None, &CancellationSignal::default())
        .await
        .expect("turn");

    assert!(report.written.is_empty());
    assert!(workspace.file_paths().is_empty());
    assert!(report.assistant.is_some());
}

#[tokio::test]
async fn manual_override_saves_full_reply_and_is_sanitized() {
    let reply = "Plain answer with no blocks.";
    let (mut session, _, workspace) = memory_session(
        vec![streamed(reply), streamed("second")],
        SessionConfig::default(),
    );

    let report = session
        .run_turn(
            TurnRequest::new("x").with_save_as("out\\answer.md"),
            None,
            &CancellationSignal::default(),
        )
        .await
        .expect("turn");
    assert_eq!(report.written.len(), 1);
    assert_eq!(report.written[0].origin, ArtifactOrigin::ManualOverride);
    assert_eq!(workspace.file_string("out/answer.md").as_deref(), Some(reply));

    let report = session
        .run_turn(
            TurnRequest::new("y").with_save_as("../answer.md"),
            None,
            &CancellationSignal::default(),
        )
        .await
        .expect("turn");
    assert!(report.written.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(workspace.file_paths(), vec![PathBuf::from("out/answer.md")]);

    let saved = session.save_last_reply("later.md").expect("save");
    assert_eq!(saved.path.as_str(), "later.md");
    assert_eq!(workspace.file_string("later.md").as_deref(), Some("second"));
}

#[tokio::test]
async fn empty_reply_does_not_save_an_earlier_turn() {
    let silent = Script {
        events: vec![StreamEvent::Terminator],
        cancel_after: None,
    };
    let (mut session, _, workspace) = memory_session(
        vec![streamed("first turn reply"), silent],
        SessionConfig::default(),
    );

    session
        .run_turn(TurnRequest::new("one"), None, &CancellationSignal::default())
        .await
        .expect("first turn");
    let report = session
        .run_turn(
            TurnRequest::new("two").with_save_as("turn2.md"),
            None,
            &CancellationSignal::default(),
        )
        .await
        .expect("second turn");

    assert!(report.assistant.is_none());
    assert!(report.written.is_empty());
    assert_eq!(report.errors, vec!["no assistant reply to save".to_owned()]);
    assert_eq!(workspace.file_string("turn2.md"), None);
}

#[tokio::test]
async fn history_is_replayed_on_the_next_turn() {
    let (mut session, transport, _) = memory_session(
        vec![streamed("first answer"), streamed("second answer")],
        SessionConfig::default(),
    );
    let cancellation = CancellationSignal::default();

    session
        .run_turn(TurnRequest::new("first"), None, &cancellation)
        .await
        .expect("turn one");
    session
        .run_turn(TurnRequest::new("second"), None, &cancellation)
        .await
        .expect("turn two");

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let second = requests[1]
        .messages
        .iter()
        .map(|message| (message.role, message.content.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(second[0].0, Role::System);
    assert_eq!(
        &second[1..],
        &[
            (Role::User, "first"),
            (Role::Assistant, "first answer"),
            (Role::User, "second"),
        ]
    );

    session.clear();
    assert!(session.conversation().is_empty());
}

#[tokio::test]
async fn eof_without_terminator_still_finalizes() {
    let mut script = streamed("```path=eof.txt\nok\n```");
    script.events.pop();
    let (mut session, _, workspace) = memory_session(vec![script], SessionConfig::default());

    let report = session
        .run_turn(TurnRequest::new("x"), None, &CancellationSignal::default())
        .await
        .expect("turn");

    assert_eq!(report.end, StreamEnd::Eof);
    assert_eq!(workspace.file_string("eof.txt").as_deref(), Some("ok"));
}

#[tokio::test]
async fn nested_directories_are_created_once_per_new_parent() {
    let reply = "```path=src/a/one.rs\n1\n```\n```path=src/a/two.rs\n2\n```";
    let (mut session, _, workspace) = memory_session(vec![streamed(reply)], SessionConfig::default());

    session
        .run_turn(TurnRequest::new("x"), None, &CancellationSignal::default())
        .await
        .expect("turn");

    assert_eq!(
        workspace.operations(),
        vec![
            WorkspaceOp::CreateDirectory(PathBuf::from("src/a")),
            WorkspaceOp::Write(PathBuf::from("src/a/one.rs")),
            WorkspaceOp::Notify,
            WorkspaceOp::Write(PathBuf::from("src/a/two.rs")),
            WorkspaceOp::Notify,
        ]
    );
}

#[tokio::test]
async fn local_workspace_receives_nested_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Arc::new(LocalWorkspace::open(dir.path()).expect("workspace"));
    let transport = ScriptedTransport::with_replies(vec![streamed(
        "```rust path=crates/demo/src/lib.rs\npub fn demo() {}\n```",
    )]);
    let mut session = Session::new(transport, workspace, SessionConfig::default());

    let report = session
        .run_turn(TurnRequest::new("x"), None, &CancellationSignal::default())
        .await
        .expect("turn");

    assert_eq!(report.written.len(), 1);
    let on_disk = std::fs::read_to_string(dir.path().join("crates/demo/src/lib.rs"))
        .expect("artifact on disk");
    assert_eq!(on_disk, "pub fn demo() {}");
}
