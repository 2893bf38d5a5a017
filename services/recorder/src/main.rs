// recorder: Subscribes to the bus stream and records every observed
// event durably, flagging per-topic publish-rate floods.
//
// Runtime wiring: config → event store → pipeline (detector + alert
// sink) → source task. Shutdown is cooperative: any message already
// being handled finishes before storage handles are released.

use recorder::config;
use recorder::pipeline::pipeline_from_config;
use recorder::source::run_source;
use recorder::storage::event_store::EventStore;
use std::path::Path;
use tokio::sync::watch;
use tokio::time::{Duration, sleep, timeout};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for structured logging to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "recorder starting");

    // Parse optional --config <path> argument.
    // Defaults to /etc/bus-recorder/recorder.toml when not supplied.
    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(p) => std::path::PathBuf::from(p),
            None => {
                eprintln!("FATAL: --config requires a path argument");
                std::process::exit(1);
            }
        },
        None => std::path::PathBuf::from("/etc/bus-recorder/recorder.toml"),
    };

    let cfg = match config::load_config_from_path(&config_path) {
        Ok(cfg) => {
            info!(
                stream_addr = %cfg.bus.stream_addr,
                sqlite_path = %cfg.storage.sqlite_path,
                "config loaded"
            );
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Open the event store
    let store = match EventStore::open(Path::new(&cfg.storage.sqlite_path)) {
        Ok(s) => {
            info!(path = %cfg.storage.sqlite_path, "event store opened");
            s
        }
        Err(e) => {
            eprintln!("FATAL: failed to open event store: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = pipeline_from_config(&cfg, store);

    // Set up shutdown channel and spawn the source task
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut source_task = tokio::spawn(run_source(
        cfg.bus.stream_addr.clone(),
        pipeline,
        shutdown_rx,
    ));

    info!("recorder initialized — ingestion running");

    // Wait for Ctrl-C, SIGTERM, or the source task stopping on its own
    // (which only happens when the store became unusable).
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                tokio::signal::ctrl_c().await.ok();
                shutdown_tx.send(true).ok();
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown: SIGINT received");
            }
            _ = sigterm.recv() => {
                info!("shutdown: SIGTERM received");
            }
            _ = &mut source_task => {
                error!("ingestion stopped; exiting");
                std::process::exit(1);
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown: Ctrl-C received");
            }
            _ = &mut source_task => {
                error!("ingestion stopped; exiting");
                std::process::exit(1);
            }
        }
    }

    // Signal the source task to stop; it finishes the message in
    // flight before returning, then storage handles drop with it.
    shutdown_tx.send(true).ok();
    if timeout(Duration::from_secs(2), source_task).await.is_err() {
        error!("source task did not stop in time");
    }

    // Brief delay to let the final log lines flush
    sleep(Duration::from_millis(50)).await;
    info!("recorder shutdown complete");
}
