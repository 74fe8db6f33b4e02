use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use artifact_agent::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use artifact_agent::writer::ArtifactOrigin;
use artifact_agent::{logging, AgentConfig, Session, TurnReport, TurnRequest, TurnUpdate};
use chat_api::{ChatApiClient, StreamEnd};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use workspace_store::LocalWorkspace;

/// Chat with a model and write the files it produces into a workspace.
#[derive(Parser, Debug)]
#[command(name = "artifact-agent")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory that receives extracted files
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Also save each full reply to this workspace-relative path
    #[arg(long, value_name = "PATH")]
    save: Option<String>,

    /// Stream replies without writing fenced blocks
    #[arg(long)]
    no_persist: bool,

    /// Prompt to send; prompts are read from stdin when omitted
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let config = AgentConfig::from_env().context("loading configuration")?;
    let workspace = LocalWorkspace::open(&cli.workspace)
        .with_context(|| format!("opening workspace {}", cli.workspace.display()))?;
    let client = ChatApiClient::new(config.chat_api_config()).context("building chat client")?;

    let mut session = Session::new(
        Arc::new(client),
        Arc::new(workspace),
        config.session_config(!cli.no_persist),
    );

    if !cli.prompt.is_empty() {
        let turn = turn_request(cli.prompt.join(" "), cli.save.as_deref());
        run_turn(&mut session, turn).await?;
        return Ok(());
    }

    interactive(&mut session, cli.save.as_deref()).await
}

async fn interactive(session: &mut Session, save: Option<&str>) -> anyhow::Result<()> {
    eprintln!("Type a prompt, or /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        let _ = io::stderr().flush();

        let Some(line) = lines.next_line().await.context("reading stdin")? else {
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_slash_command(&line) {
            Some(SlashCommand::Help) => eprintln!("{HELP_TEXT}"),
            Some(SlashCommand::Clear) => {
                session.clear();
                eprintln!("conversation cleared");
            }
            Some(SlashCommand::Save(path)) => match session.save_last_reply(&path) {
                Ok(written) => eprintln!("saved {}", written.path),
                Err(error) => eprintln!("error: {error}"),
            },
            Some(SlashCommand::Persist(enabled)) => {
                session.set_persist_blocks(enabled);
                eprintln!(
                    "block persistence {}",
                    if enabled { "enabled" } else { "disabled" }
                );
            }
            Some(SlashCommand::Exit) => return Ok(()),
            Some(SlashCommand::Unknown(command)) => {
                eprintln!("unknown command: {command} (try /help)");
            }
            None => {
                // A failed turn is reported and the loop continues.
                if let Err(error) = run_turn(session, turn_request(line, save)).await {
                    eprintln!("error: {error:#}");
                }
            }
        }
    }
}

fn turn_request(prompt: String, save: Option<&str>) -> TurnRequest {
    match save {
        Some(path) => TurnRequest::new(prompt).with_save_as(path),
        None => TurnRequest::new(prompt),
    }
}

async fn run_turn(session: &mut Session, turn: TurnRequest) -> anyhow::Result<TurnReport> {
    let cancellation = Arc::new(AtomicBool::new(false));
    let (updates, mut receiver) = mpsc::unbounded_channel();

    let printer = tokio::spawn(async move {
        while let Some(update) = receiver.recv().await {
            render_update(update);
        }
    });
    let interrupt = tokio::spawn({
        let cancellation = Arc::clone(&cancellation);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancellation.store(true, Ordering::Release);
            }
        }
    });

    let result = session.run_turn(turn, Some(&updates), &cancellation).await;

    interrupt.abort();
    drop(updates);
    let _ = printer.await;

    Ok(result?)
}

fn render_update(update: TurnUpdate) {
    match update {
        TurnUpdate::Delta(text) => {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
        TurnUpdate::ArtifactWritten(written) => {
            let label = match written.origin {
                ArtifactOrigin::Block(source) => source.as_str(),
                ArtifactOrigin::ManualOverride => "save",
            };
            eprintln!("\n[wrote {} ({} bytes, {label})]", written.path, written.bytes);
        }
        TurnUpdate::Error(message) => eprintln!("\n[error] {message}"),
        TurnUpdate::Finished(end) => {
            println!();
            if end == StreamEnd::Cancelled {
                eprintln!("[cancelled]");
            }
        }
    }
}
