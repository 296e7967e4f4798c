//! One-shot REST commands: `start` and `status`.

use crate::render;
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use lexwatch_core::{CaseApi, ConsoleConfig, HttpCaseApi, WorkflowState};

#[derive(Parser, Debug)]
pub struct StartArgs {
    /// Case to analyse
    pub case_id: String,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Case to show
    pub case_id: String,

    /// Print the projection as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn start(config: &ConsoleConfig, args: &StartArgs) -> Result<()> {
    let api = HttpCaseApi::new(&config.backend).context("Failed to build API client")?;
    let started = api
        .start_analysis(&args.case_id)
        .await
        .with_context(|| format!("Failed to start analysis for case {}", args.case_id))?;

    println!(
        "{} analysis {} for case {}",
        "Started".green().bold(),
        started.analysis_id,
        args.case_id
    );
    if let Some(message) = started.message {
        println!("{message}");
    }
    Ok(())
}

pub async fn status(config: &ConsoleConfig, args: &StatusArgs) -> Result<()> {
    let api = HttpCaseApi::new(&config.backend).context("Failed to build API client")?;
    let case = api
        .get_case_analysis(&args.case_id)
        .await
        .with_context(|| format!("Failed to read case {}", args.case_id))?;

    let mut state = WorkflowState::new(config)?;
    state.seed(&case);
    let snapshot = state.snapshot();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{} {}\n", case.title.bold(), format!("({})", case.id).dimmed());
        print!("{}", render::summary(&snapshot));
    }
    Ok(())
}
