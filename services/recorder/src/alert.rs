//! Alert delivery sinks.
//!
//! Delivery is best-effort and fire-and-forget: a sink that cannot
//! write logs a warning and drops the alert. Sink failures never reach
//! the ingestion path. The sink implementation is selected by
//! configuration (`[alerts] mode`), not by runtime environment
//! detection.

use crate::config::{AlertConfig, AlertMode};
use crate::detector::FloodAlert;
use chrono::{Local, SecondsFormat};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// Human-readable flood description carried by every sink.
pub fn describe(alert: &FloodAlert) -> String {
    format!(
        "flood: {} msgs in {}s on {}",
        alert.count,
        alert.window.num_seconds(),
        alert.topic
    )
}

/// Side channel for flood conditions.
pub trait AlertSink: Send {
    /// Deliver one alert. Must not fail, block, or panic.
    fn notify(&mut self, alert: &FloodAlert);
}

// ---------------------------------------------------------------------------
// FileSink
// ---------------------------------------------------------------------------

/// Appends one line per alert to a log file, for host-side tooling to
/// tail and turn into notifications. Line shape:
/// `<rfc3339-timestamp> flood: <count> msgs in <window>s on <topic>`.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        FileSink { path }
    }
}

impl AlertSink for FileSink {
    fn notify(&mut self, alert: &FloodAlert) {
        let line = format!(
            "{} {}\n",
            Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            describe(alert)
        );
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "alert append failed");
        }
    }
}

// ---------------------------------------------------------------------------
// NullSink
// ---------------------------------------------------------------------------

/// Discards alerts.
pub struct NullSink;

impl AlertSink for NullSink {
    fn notify(&mut self, _alert: &FloodAlert) {}
}

/// Build the sink selected by configuration.
pub fn sink_from_config(cfg: &AlertConfig) -> Box<dyn AlertSink> {
    match cfg.mode {
        AlertMode::File => Box::new(FileSink::new(PathBuf::from(&cfg.file))),
        AlertMode::None => Box::new(NullSink),
    }
}
