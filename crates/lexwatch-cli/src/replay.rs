//! `lexwatch replay`: rebuild the view from a recorded frame stream.

use crate::render;
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use lexwatch_core::ConsoleConfig;
use lexwatch_core::testing::{ReplayConfig, ReplayResult, ReplayRunner};
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// JSONL recording, one raw frame per line
    pub fixture: PathBuf,

    /// Print the final projection as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(config: &ConsoleConfig, args: &ReplayArgs) -> Result<()> {
    let result = run(config, args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(result.snapshot())?);
    } else {
        print!("{}", render::summary(result.snapshot()));
        println!(
            "\n{} {} frames, {} events, {} control, {} malformed",
            "replayed".dimmed(),
            result.frames_read(),
            result.events_applied(),
            result.control_frames(),
            result.malformed_count()
        );
    }
    for malformed in result.malformed() {
        eprintln!(
            "{} line {}: {}",
            "skipped".yellow(),
            malformed.line,
            malformed.reason
        );
    }
    Ok(())
}

fn run(config: &ConsoleConfig, args: &ReplayArgs) -> Result<ReplayResult> {
    let replay = ReplayConfig::new(&args.fixture).with_console(config.clone());
    ReplayRunner::run(&replay)
        .with_context(|| format!("Failed to replay {}", args.fixture.display()))
}
