use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Args, Parser, Subcommand};
use podflux_core::clock::last_interval_date;
use podflux_core::config::{AppConfig, DEFAULT_CONFIG_PATH};
use podflux_core::pipeline::{self, PodOutcome};
use tracing::{error, info, warn};

mod observability;
mod scheduler;

#[derive(Parser, Debug)]
#[command(author, version, about = "Publishes interval energy production documents", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "PODFLUX_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run on every interval boundary until interrupted (default)
    Serve,
    /// Process a single interval and exit
    RunOnce(RunOnceArgs),
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[derive(Args, Debug, Default)]
struct RunOnceArgs {
    /// Interval to report on (RFC 3339); defaults to the last completed interval
    #[arg(long)]
    at: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckConfig => {
            print_config_summary(&config);
            Ok(())
        }
        Command::RunOnce(args) => {
            let _guard = observability::init(&config.logging)?;
            let date = match args.at {
                Some(raw) => {
                    let at = DateTime::parse_from_rfc3339(&raw)
                        .with_context(|| format!("--at '{raw}' is not an RFC 3339 timestamp"))?;
                    config.interval.floor_local(&at)
                }
                None => last_interval_date(&config.interval),
            };
            let config = Arc::new(config);
            let job_config = Arc::clone(&config);
            let report =
                tokio::task::spawn_blocking(move || pipeline::run_once(&job_config, date))
                    .await
                    .context("run panicked")?;

            let report = match report {
                Ok(report) => report,
                Err(err) => {
                    error!(error = %err, "run failed");
                    return Err(err.into());
                }
            };
            for pod in &report.pods {
                match &pod.outcome {
                    PodOutcome::Delivered { file_name } => {
                        info!(pod = %pod.pod, origin = %pod.origin, file = %file_name, "delivered")
                    }
                    other => {
                        warn!(pod = %pod.pod, origin = %pod.origin, outcome = ?other, "not delivered")
                    }
                }
            }
            if report.failed() > 0 {
                bail!("{} of {} PODs were not delivered", report.failed(), report.pods.len());
            }
            Ok(())
        }
        Command::Serve => {
            let guard = observability::init(&config.logging)?;
            info!(config = %cli.config.display(), "podflux starting");
            scheduler::serve(Arc::new(config), scheduler::shutdown_signal()).await;
            drop(guard);
            Ok(())
        }
    }
}

fn print_config_summary(config: &AppConfig) {
    println!(
        "interval: {} minutes in {}",
        config.interval.minutes, config.interval.timezone
    );
    println!("misfire grace: {}s", config.schedule.misfire_grace_secs);
    println!(
        "source: {} (default feed {}, destination {})",
        config.source.remote,
        config.source.default_feed.name(),
        config.source.destination
    );
    for (name, remote) in &config.remotes {
        println!("remote {name}: {} {}", remote.protocol, remote.describe());
    }
    for pod in &config.pods {
        let (feed, destination) = config.route(&pod.id);
        println!("pod {}: {} -> {}", pod.id, feed.name(), destination);
    }
    println!("configuration OK");
}
