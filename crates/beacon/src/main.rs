//! Beacon - route emitter for HTTP router fleets
//!
//! Watches the cluster state store and tells routers which backends serve
//! which hostnames. Runs three tasks: the syncer (handshake and tickers),
//! the watcher (event handling and reconciliation), and the metrics
//! reporter.
//!
//! # Usage
//!
//! ```bash
//! beacon --config configs/beacon.toml
//! beacon --config configs/beacon.toml --log-level debug
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use beacon_bus::NatsBus;
use beacon_config::Config;
use beacon_emitter::{NatsEmitter, RoutingApiEmitter};
use beacon_handler::{Handler, HttpStateSource, Watcher};
use beacon_metrics::{EmitterMetrics, MetricsReporter};
use beacon_syncer::Syncer;

/// Buffer for the raw state event stream
const EVENT_STREAM_BUFFER: usize = 1024;

/// How long shutdown waits for tasks to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Beacon - route emitter
#[derive(Parser, Debug)]
#[command(name = "beacon")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/beacon.toml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    config.validate().context("validating config")?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level)?;

    run(config).await
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(
        sync_interval_secs = config.emitter.sync_interval_secs,
        local_mode = config.emitter.local_mode,
        internal_routes = config.emitter.wait_for_internal_routes_greeting,
        "beacon starting"
    );

    let bus = Arc::new(
        NatsBus::connect(config.bus.addr())
            .await
            .context("connecting to the message bus")?,
    );
    let metrics = Arc::new(EmitterMetrics::new());

    let routing_api_emitter = config
        .routing_api
        .as_ref()
        .map(|api| RoutingApiEmitter::new(&api.url, api.request_timeout()))
        .transpose()
        .context("building the routing api client")?;

    let source = Arc::new(
        HttpStateSource::new(&config.state_store.url, config.state_store.request_timeout())
            .context("building the state store client")?,
    );

    let handler = Handler::new(
        Some(NatsEmitter::new(Arc::clone(&bus))),
        routing_api_emitter,
        config.emitter.local_mode,
        config.emitter.tcp_route_ttl(),
        Arc::clone(&metrics),
    );

    let (syncer, events) = Syncer::new(
        Arc::clone(&bus),
        config.emitter.sync_interval(),
        config.emitter.wait_for_internal_routes_greeting,
    );

    // No push-based event source is wired yet; the watcher converges purely
    // on sync ticks. The sender stays alive so the stream reads as open.
    // TODO: feed the state store's event stream into event_tx once the
    // store exposes one.
    let (event_tx, event_rx) = mpsc::channel(EVENT_STREAM_BUFFER);
    let watcher = Watcher::new(handler, source, events, event_rx);

    let cancel = CancellationToken::new();
    let mut syncer_task = tokio::spawn(syncer.run(cancel.clone()));
    let watcher_task = tokio::spawn(watcher.run(cancel.clone()));

    let reporter_task = if config.metrics.enabled {
        let reporter = MetricsReporter::new(Arc::clone(&metrics), config.metrics.interval());
        Some(tokio::spawn(reporter.run(cancel.clone())))
    } else {
        None
    };

    tracing::info!("beacon started");

    let outcome: Result<()> = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for shutdown signal")?;
            tracing::info!("shutdown signal received");
            Ok(())
        }
        joined = &mut syncer_task => {
            match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(error)) => Err(error).context("syncer failed"),
                Err(error) => Err(error).context("syncer panicked"),
            }
        }
    };

    cancel.cancel();
    drop(event_tx);

    let drain = async {
        let _ = watcher_task.await;
        if !syncer_task.is_finished() {
            let _ = syncer_task.await;
        }
        if let Some(task) = reporter_task {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!("tasks did not drain in time, exiting anyway");
    }

    tracing::info!("beacon stopped");
    outcome
}
