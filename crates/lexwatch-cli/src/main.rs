//! # lexwatch
//!
//! Terminal console for watching and steering discovery analysis runs.
//!
//! ## Commands
//!
//! - `lexwatch watch <case>` - follow a case live and answer feedback requests
//! - `lexwatch replay <file>` - rebuild the view from a recorded frame stream
//! - `lexwatch start <case>` - start a new analysis run
//! - `lexwatch status <case>` - show the stored state of a case
//! - `lexwatch health` - check that the backend is reachable

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use lexwatch_core::ConsoleConfig;
use std::io::IsTerminal;
use std::path::PathBuf;

mod case;
mod health;
mod render;
mod replay;
mod watch;

/// Lexwatch - human-in-the-loop console for discovery analysis workflows
#[derive(Parser, Debug)]
#[command(name = "lexwatch", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (default: ./lexwatch.yml if present)
    #[arg(short, long, global = true, env = "LEXWATCH_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base URL of the case/analysis REST API
    #[arg(long, global = true, env = "LEXWATCH_API_URL", value_name = "URL")]
    api_url: Option<String>,

    /// Base URL of the live event websocket
    #[arg(long, global = true, env = "LEXWATCH_WS_URL", value_name = "URL")]
    ws_url: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow a case live
    Watch(watch::WatchArgs),

    /// Replay a recorded frame stream
    Replay(replay::ReplayArgs),

    /// Start a new analysis run for a case
    Start(case::StartArgs),

    /// Show the stored state of a case
    Status(case::StatusArgs),

    /// Check backend connectivity
    Health(health::HealthArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let use_colors = !cli.no_color && std::io::stdout().is_terminal();
    colored::control::set_override(use_colors);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Watch(args) => watch::execute(&config, args).await,
        Commands::Replay(args) => replay::execute(&config, &args),
        Commands::Start(args) => case::start(&config, &args).await,
        Commands::Status(args) => case::status(&config, &args).await,
        Commands::Health(args) => health::execute(&config, &args).await,
    }
}

/// Logs go to stderr so stdout stays the console output.
fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ConsoleConfig> {
    let mut config = ConsoleConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(url) = &cli.api_url {
        config.backend.api_url.clone_from(url);
    }
    if let Some(url) = &cli.ws_url {
        config.backend.ws_url.clone_from(url);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
