//! Health command for validating backend reachability.

use anyhow::{Result, bail};
use clap::Parser;
use colored::Colorize;
use lexwatch_core::{CaseApi, ConsoleConfig, Connector, HttpCaseApi, WebSocketConnector};
use tracing::debug;

#[derive(Parser, Debug)]
pub struct HealthArgs {
    /// Show details for each check
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

struct Check {
    name: &'static str,
    target: String,
    outcome: Result<String, String>,
}

pub async fn execute(config: &ConsoleConfig, args: &HealthArgs) -> Result<()> {
    let checks = vec![check_api(config).await, check_socket(config).await];
    let failed = checks.iter().filter(|c| c.outcome.is_err()).count();

    if !args.quiet {
        for check in &checks {
            let mark = match &check.outcome {
                Ok(_) => "OK".green().bold(),
                Err(_) => "FAIL".red().bold(),
            };
            println!("{mark:>4}  {:<10} {}", check.name, check.target);
            if args.verbose || check.outcome.is_err() {
                let detail = match &check.outcome {
                    Ok(detail) | Err(detail) => detail,
                };
                println!("      {}", detail.dimmed());
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} health checks failed", checks.len());
    }
    Ok(())
}

async fn check_api(config: &ConsoleConfig) -> Check {
    let target = config.backend.api_url.clone();
    let outcome = match HttpCaseApi::new(&config.backend) {
        Ok(api) => match api.health().await {
            Ok(report) if report.is_healthy() => Ok(format!(
                "status {}{}",
                report.status,
                report
                    .version
                    .map(|v| format!(", version {v}"))
                    .unwrap_or_default()
            )),
            Ok(report) => Err(format!("backend reports {}", report.status)),
            Err(err) => Err(err.to_string()),
        },
        Err(err) => Err(err.to_string()),
    };
    Check {
        name: "api",
        target,
        outcome,
    }
}

async fn check_socket(config: &ConsoleConfig) -> Check {
    let connector = WebSocketConnector::new(&config.backend);
    let target = connector.url().to_string();
    let outcome = match connector.open("health-check").await {
        Ok(mut transport) => {
            transport.close().await;
            debug!("websocket health check connected");
            Ok("handshake completed".to_string())
        }
        Err(err) => Err(err.to_string()),
    };
    Check {
        name: "websocket",
        target,
        outcome,
    }
}
