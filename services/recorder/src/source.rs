//! Bus stream subscription.
//!
//! The broker side of the system is an external collaborator; this
//! module is the only code that knows how events arrive. It connects
//! to the broker bridge's stream socket and consumes one JSON frame
//! per line, handing each decoded event to the pipeline sequentially,
//! in delivery order. Reconnection uses doubling backoff capped at
//! 30 s. The recorder's per-topic state is reconnection-agnostic, so
//! nothing is reset when the stream comes back.

use crate::pipeline::Pipeline;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bus_core::event::InboundEvent;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Stream frames
// ---------------------------------------------------------------------------

/// One stream frame as emitted by the broker bridge: newline-delimited
/// JSON, payload bytes base64-encoded.
#[derive(Debug, Deserialize)]
struct StreamFrame {
    topic: String,
    payload: String,
    qos: u8,
    retained: bool,
}

#[derive(Debug, Error)]
enum FrameError {
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

fn decode_frame(line: &str) -> Result<InboundEvent, FrameError> {
    let frame: StreamFrame = serde_json::from_str(line)?;
    let payload = BASE64.decode(frame.payload.as_bytes())?;
    Ok(InboundEvent {
        topic: frame.topic,
        payload,
        qos: frame.qos,
        retained: frame.retained,
    })
}

// ---------------------------------------------------------------------------
// Source task: TCP connect → decode frames → pipeline
// ---------------------------------------------------------------------------

/// Consume the bus stream until shutdown. Returns early only when the
/// store has become unusable; the caller treats that return as fatal.
pub async fn run_source(
    stream_addr: String,
    mut pipeline: Pipeline,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff_secs: u64 = 1;

    loop {
        // Check for shutdown before attempting connect
        if *shutdown_rx.borrow() {
            info!("source task stopping (shutdown)");
            return;
        }

        info!(addr = %stream_addr, "connecting to bus stream");

        let stream = match TcpStream::connect(&stream_addr).await {
            Ok(s) => {
                info!(addr = %stream_addr, "bus stream connected");
                backoff_secs = 1; // reset backoff on successful connect
                s
            }
            Err(e) => {
                warn!(
                    addr = %stream_addr,
                    error = %e,
                    backoff_secs,
                    "bus stream connect failed"
                );
                let delay = Duration::from_secs(backoff_secs);
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
                backoff_secs = (backoff_secs * 2).min(30);
                continue;
            }
        };

        let mut reader = BufReader::new(stream);
        let mut line_buf = String::new();

        loop {
            line_buf.clear();

            // Wait for a line or shutdown
            let read_result = tokio::select! {
                result = reader.read_line(&mut line_buf) => result,
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("source task stopping (shutdown)");
                        return;
                    }
                    continue;
                }
            };

            match read_result {
                Err(e) => {
                    warn!(error = %e, "bus stream read error; reconnecting");
                    break;
                }
                Ok(0) => {
                    warn!("bus stream closed; reconnecting");
                    break;
                }
                Ok(_) => {}
            }

            let line = line_buf.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }

            let event = match decode_frame(line) {
                Ok(ev) => ev,
                Err(e) => {
                    warn!(error = %e, "skipped malformed stream frame");
                    continue;
                }
            };

            // One message at a time, strictly in delivery order. A
            // per-message failure is logged and the stream continues;
            // an unusable store stops ingestion entirely.
            match pipeline.handle(&event) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "store unusable; stopping ingestion");
                    return;
                }
                Err(e) => {
                    warn!(topic = %event.topic, error = %e, "event handling failed");
                }
            }
        }

        // Reconnect with backoff
        let delay = Duration::from_secs(backoff_secs);
        info!(backoff_secs, "waiting before reconnect");
        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        }
        backoff_secs = (backoff_secs * 2).min(30);
    }
}
