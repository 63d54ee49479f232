//! AirMap bridge - feeds ground-station vehicle events into the AirMap link.
//!
//! Reads JSON-lines messages on stdin (see `feed`), forwards them to the
//! AirMap manager and prints operator-facing errors on stderr.

mod config;
mod feed;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use airmap_client::{ErrorSink, Manager, Notification, ReqwestTransport, TokioResolver};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about = "Bridge vehicle telemetry and missions to AirMap")]
struct Args {
    /// AirMap API base URL
    #[arg(long, env = "AIRMAP_API_URL")]
    api_url: Option<String>,

    /// AirMap API key
    #[arg(long, env = "AIRMAP_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

/// Prints operator-facing errors on stderr.
struct StderrErrorSink;

impl ErrorSink for StderrErrorSink {
    fn show_message(&self, message: &str) {
        eprintln!("{}", message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("airmap_bridge=debug".parse()?)
            .add_directive("airmap_client=debug".parse()?))
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(api_url) = args.api_url {
        config.api_url = api_url;
    }
    if let Some(api_key) = args.api_key {
        config.api_key = api_key;
    }

    tracing::info!("Starting AirMap bridge (API {})", config.api_url);

    let manager = Manager::new(
        config.client_config(),
        ReqwestTransport::shared()?,
        Arc::new(TokioResolver),
        Arc::new(StderrErrorSink),
    )
    .context("Invalid AirMap configuration")?;
    let (handle, task) = manager.spawn();

    tokio::spawn(log_notifications(handle.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read feed")? {
        match feed::parse_line(&line) {
            Ok(Some(message)) => handle.send(message.into()).await?,
            Ok(None) => {}
            Err(err) => tracing::warn!("Ignoring feed line: {}", err),
        }
    }

    tracing::info!("Feed closed, shutting down");
    handle.shutdown().await?;
    task.await.context("AirMap manager task failed")?;
    Ok(())
}

async fn log_notifications(mut events: broadcast::Receiver<Notification>) {
    loop {
        match events.recv().await {
            Ok(Notification::FlightIdChanged(flight_id)) => {
                tracing::info!("AirMap flight id: {}", flight_id);
            }
            Ok(Notification::RestrictionsChanged(restrictions)) => {
                tracing::info!(
                    "Airspace restrictions updated: {} polygons, {} circles",
                    restrictions.polygons.len(),
                    restrictions.circles.len()
                );
            }
            Ok(Notification::NetworkError(err)) => tracing::debug!("AirMap network error: {}", err),
            // already shown by the error sink
            Ok(Notification::UserMessage(_)) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Notification log lagged, {} events skipped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
