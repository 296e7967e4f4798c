//! `lexwatch watch`: follow one case live and steer it from stdin.

use crate::render::{self, Renderer};
use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use lexwatch_core::{
    AuditLogger, CaseApi, CaseSession, ConsoleConfig, HttpCaseApi, SessionEvent, SessionRecorder,
    StatusManager, WebSocketConnector,
};
use lexwatch_proto::Error;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Case to watch
    pub case_id: String,

    /// Start a new analysis run after connecting
    #[arg(long)]
    pub start: bool,

    /// Do not seed the view from the REST API
    #[arg(long)]
    pub no_seed: bool,

    /// Write .lexwatch-status.json/.md into this directory on every change
    #[arg(long, value_name = "DIR")]
    pub status_dir: Option<PathBuf>,

    /// Append every inbound frame to this JSONL file
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,

    /// Append human decisions to this markdown log
    #[arg(long, value_name = "FILE")]
    pub audit_log: Option<PathBuf>,

    /// Exit once the run completes, fails or is stopped
    #[arg(long)]
    pub exit_on_finish: bool,

    /// Give up after this many consecutive failed reconnects
    #[arg(long, default_value_t = 10)]
    pub max_reconnects: u32,
}

/// A line typed by the human.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Pause,
    Resume,
    Stop,
    Start,
    Approve(Option<String>),
    Feedback(String),
    Status,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Feedback(line.to_string());
    };
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, rest)| (name, rest.trim()));
    match name {
        "pause" => Input::Pause,
        "resume" => Input::Resume,
        "stop" => Input::Stop,
        "start" => Input::Start,
        "approve" => Input::Approve((!rest.is_empty()).then(|| rest.to_string())),
        "status" => Input::Status,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => Input::Unknown(other.to_string()),
    }
}

const HELP: &str = "\
  /approve [note]  approve the analysis plan
  /pause           pause the run
  /resume          resume a paused run
  /stop            stop the run
  /start           start a new run
  /status          show the full view
  /quit            leave (the run keeps going)
  anything else    sent as feedback";

pub async fn execute(config: &ConsoleConfig, args: WatchArgs) -> Result<()> {
    let api = HttpCaseApi::new(&config.backend).context("Failed to build API client")?;
    let connector = WebSocketConnector::new(&config.backend);
    let mut session = build_session(config, &args)?;

    if !args.no_seed {
        match session.seed_from(&api).await {
            Ok(true) => info!(case_id = %args.case_id, "seeded from stored analysis"),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "could not seed from the case API, waiting for live events"),
        }
    }

    let mut renderer = Renderer::new();
    renderer.update(&session.snapshot());

    reconnect(&mut session, &connector, args.max_reconnects).await?;
    if args.start {
        let started = session.start_analysis(&api).await?;
        println!("{} analysis {}", "started".green(), started.analysis_id);
    }
    renderer.update(&session.snapshot());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = session.next_event() => {
                match event {
                    Some(SessionEvent::Disconnected { .. }) | None => {
                        renderer.update(&session.snapshot());
                        if args.exit_on_finish && session.state().is_terminal() {
                            break;
                        }
                        reconnect(&mut session, &connector, args.max_reconnects).await?;
                    }
                    Some(SessionEvent::Malformed { reason }) => {
                        eprintln!("{} {reason}", "dropped frame:".yellow());
                    }
                    Some(_) => {}
                }
                renderer.update(&session.snapshot());
                if args.exit_on_finish && session.state().is_terminal() {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if handle_input(&mut session, &api, parse_input(&line)).await {
                            break;
                        }
                        renderer.update(&session.snapshot());
                    }
                    Ok(None) => stdin_open = false,
                    Err(err) => {
                        warn!(error = %err, "stdin read failed, input disabled");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.close().await;
    println!();
    print!("{}", render::summary(&session.snapshot()));
    Ok(())
}

fn build_session(config: &ConsoleConfig, args: &WatchArgs) -> Result<CaseSession> {
    let mut session = CaseSession::new(&args.case_id, config)?;

    let status_dir = args.status_dir.as_ref().or(config.artifacts.status_dir.as_ref());
    if let Some(dir) = status_dir {
        session = session.with_status_manager(StatusManager::new(dir));
    }
    let audit_log = args.audit_log.as_ref().or(config.artifacts.audit_log.as_ref());
    if let Some(path) = audit_log {
        session = session.with_audit_logger(AuditLogger::at(path.clone()));
    }
    let record = args.record.as_ref().or(config.artifacts.record_path.as_ref());
    if let Some(path) = record {
        let recorder = SessionRecorder::create(path)
            .with_context(|| format!("Failed to open recording {}", path.display()))?;
        session = session.with_recorder(recorder);
    }
    Ok(session)
}

/// Runs one typed command. Returns true when the human asked to leave.
async fn handle_input(session: &mut CaseSession, api: &dyn CaseApi, input: Input) -> bool {
    let outcome = match input {
        Input::Empty => return false,
        Input::Quit => return true,
        Input::Help => {
            println!("{HELP}");
            return false;
        }
        Input::Status => {
            print!("{}", render::summary(&session.snapshot()));
            return false;
        }
        Input::Unknown(name) => {
            eprintln!("{} /{name}, try /help", "unknown command".yellow());
            return false;
        }
        Input::Pause => session.pause().await,
        Input::Resume => session.resume().await,
        Input::Stop => session.stop().await,
        Input::Approve(note) => session.approve(note.as_deref()).await,
        Input::Feedback(text) => session.submit_feedback(&text).await,
        Input::Start => session.start_analysis(api).await.map(|_| ()),
    };
    if let Err(err) = outcome {
        report(&err);
    }
    false
}

fn report(err: &Error) {
    let hint = if err.is_retryable() {
        " (try again in a moment)"
    } else {
        ""
    };
    eprintln!("{} {err}{hint}", "error:".red().bold());
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(Duration::from_secs(10))
}

/// Connects, retrying with exponential backoff.
async fn reconnect(
    session: &mut CaseSession,
    connector: &WebSocketConnector,
    max_attempts: u32,
) -> Result<()> {
    let mut backoff = Duration::from_secs(1);
    let mut failures = 0;
    loop {
        match session.connect(connector).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                failures += 1;
                if failures >= max_attempts {
                    bail!("giving up after {failures} failed connection attempts: {err}");
                }
                warn!(error = %err, retry_in = ?backoff, "connection failed");
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_input("/pause"), Input::Pause);
        assert_eq!(parse_input("  /resume "), Input::Resume);
        assert_eq!(parse_input("/approve"), Input::Approve(None));
        assert_eq!(
            parse_input("/approve  looks right"),
            Input::Approve(Some("looks right".into()))
        );
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("/rewind"), Input::Unknown("rewind".into()));
    }

    #[test]
    fn test_plain_text_is_feedback() {
        assert_eq!(
            parse_input("Please add a spoliation category"),
            Input::Feedback("Please add a spoliation category".into())
        );
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn test_backoff_caps_at_ten_seconds() {
        let mut backoff = Duration::from_secs(1);
        for _ in 0..6 {
            backoff = next_backoff(backoff);
        }
        assert_eq!(backoff, Duration::from_secs(10));
    }
}
