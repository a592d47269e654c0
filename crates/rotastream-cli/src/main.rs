//! rotastream CLI - pipe stdin into a rotating file

use anyhow::{Context, Result};
use clap::Parser;
use rotastream::{Rotator, RotatorEvent, RotatorOptions};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod output;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    output::set_json_mode(cli.json_events);

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rotastream={}", log_level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn load_options(cli: &Cli) -> Result<RotatorOptions> {
    let file = match &cli.config {
        Some(path) => Some(path.clone()),
        None => RotatorOptions::find(&std::env::current_dir()?),
    };

    let base = match file {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            RotatorOptions::load(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => RotatorOptions::default(),
    };

    Ok(base.merge(cli.to_options()))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_options(&cli)?
        .into_config()
        .context("Invalid rotation settings")?;
    let (rotator, events) = Rotator::with_events(config)?;
    info!("Writing to {}", rotator.current_path().display());

    let printer = tokio::spawn(print_events(events));

    let piped = tokio::select! {
        result = rotator.pipe_from(tokio::io::stdin(), "stdin") => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let outcome = match piped {
        Some(Ok(bytes)) => {
            debug!("stdin closed after {} bytes", bytes);
            Ok(())
        }
        Some(Err(e)) => Err(e),
        None => {
            info!("Interrupted, closing");
            Ok(())
        }
    };

    let closed = rotator.close().await;
    drop(rotator);
    if let Err(e) = printer.await {
        warn!("Event printer failed: {}", e);
    }

    outcome?;
    closed?;
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<RotatorEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let done = event == RotatorEvent::Close;
                output::print_event(&event);
                if done {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
