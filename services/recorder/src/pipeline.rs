//! Per-message ingestion pipeline.
//!
//! One `handle` call per inbound event, in delivery order: decode the
//! payload, stamp receipt time, extract the sender, persist, then feed
//! the flood detector with the same receipt timestamp. Only a storage
//! failure is surfaced to the caller; alert delivery failures stay
//! inside the sink and can never corrupt detector state or fail the
//! message.

use crate::alert::{self, AlertSink};
use crate::detector::FloodDetector;
use crate::storage::event_store::{EventStore, NewEvent, StoreError};
use bus_core::event::{InboundEvent, decode_payload};
use bus_core::sender::extract_sender;
use chrono::{Local, SecondsFormat};
use thiserror::Error;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The event violated an invariant and was skipped. Transient and
    /// per-message; never fatal.
    #[error("event dropped: {0}")]
    Rejected(&'static str),
    /// The store refused the write. Surfaced so the caller can decide
    /// whether to drop the event or halt.
    #[error("storage: {0}")]
    Storage(#[from] StoreError),
}

impl PipelineError {
    /// True when the underlying store is unusable and the process
    /// should stop instead of silently dropping further events.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Rejected(_) => false,
            PipelineError::Storage(e) => e.is_fatal(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Ingestion context: store, detector, and alert sink owned together,
/// so independent pipelines can coexist (tests run several at once).
pub struct Pipeline {
    store: EventStore,
    detector: FloodDetector,
    sink: Box<dyn AlertSink>,
}

impl Pipeline {
    pub fn new(store: EventStore, detector: FloodDetector, sink: Box<dyn AlertSink>) -> Self {
        Pipeline {
            store,
            detector,
            sink,
        }
    }

    /// Handle one inbound event. Returns the assigned row id.
    pub fn handle(&mut self, event: &InboundEvent) -> Result<i64, PipelineError> {
        if event.topic.is_empty() {
            return Err(PipelineError::Rejected("empty topic"));
        }

        let payload = decode_payload(&event.payload);
        let received_at = Local::now();
        let timestamp = received_at.to_rfc3339_opts(SecondsFormat::Micros, false);
        let sender = extract_sender(&event.topic, &payload);

        let id = self.store.append(&NewEvent {
            timestamp: &timestamp,
            topic: &event.topic,
            sender: sender.as_deref(),
            payload: &payload,
            qos: event.qos,
            retained: event.retained,
        })?;

        if let Some(flood) = self.detector.record(&event.topic, received_at) {
            warn!(
                topic = %flood.topic,
                count = flood.count,
                window_secs = flood.window.num_seconds(),
                "publish-rate flood detected"
            );
            self.sink.notify(&flood);
        }

        debug!(id, topic = %event.topic, "event recorded");
        Ok(id)
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &EventStore {
        &self.store
    }
}

/// Build a pipeline from loaded configuration and an opened store.
pub fn pipeline_from_config(
    cfg: &crate::config::RecorderConfig,
    store: EventStore,
) -> Pipeline {
    let params = crate::detector::DetectorParams {
        window: chrono::Duration::seconds(cfg.detector.window_secs as i64),
        threshold: cfg.detector.threshold,
        cooldown: chrono::Duration::seconds(cfg.detector.cooldown_secs as i64),
        idle_expiry: chrono::Duration::seconds(cfg.detector.idle_expiry_secs as i64),
    };
    Pipeline::new(
        store,
        FloodDetector::new(params),
        alert::sink_from_config(&cfg.alerts),
    )
}
