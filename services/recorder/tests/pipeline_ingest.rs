/// End-to-end pipeline behavior: decode → stamp → extract → persist →
/// detect → notify.
use recorder::alert::{AlertSink, FileSink, NullSink};
use recorder::detector::{DetectorParams, FloodDetector};
use recorder::pipeline::{Pipeline, PipelineError};
use recorder::storage::event_store::{EventFilter, EventStore};
use bus_core::event::InboundEvent;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn inbound(topic: &str, payload: &[u8], qos: u8, retained: bool) -> InboundEvent {
    InboundEvent {
        topic: topic.to_owned(),
        payload: payload.to_vec(),
        qos,
        retained,
    }
}

fn memory_pipeline(sink: Box<dyn AlertSink>) -> Pipeline {
    let store = EventStore::open_in_memory().expect("open in-memory store");
    Pipeline::new(store, FloodDetector::new(DetectorParams::default()), sink)
}

fn query_all(pipeline: &Pipeline) -> Vec<bus_core::event::Event> {
    pipeline
        .store()
        .query(&EventFilter {
            limit: 1000,
            ..EventFilter::default()
        })
        .expect("query")
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn handled_event_is_persisted_exactly_once_with_fields_preserved() {
    let mut pipeline = memory_pipeline(Box::new(NullSink));
    let payload = br#"{"client_id": "sensor-7", "x": 1}"#;

    let id = pipeline
        .handle(&inbound("home/kitchen/temp", payload, 1, true))
        .expect("handle");

    let events = query_all(&pipeline);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.id, id);
    assert_eq!(event.topic, "home/kitchen/temp");
    assert_eq!(event.payload.as_bytes(), payload);
    assert_eq!(event.sender.as_deref(), Some("sensor-7"));
    assert_eq!(event.qos, 1);
    assert!(event.retained);
    assert!(!event.timestamp.is_empty(), "receipt time stamped");
}

#[test]
fn every_handled_event_appears_exactly_once() {
    let mut pipeline = memory_pipeline(Box::new(NullSink));
    for i in 0..20 {
        pipeline
            .handle(&inbound(&format!("load/{}", i), b"x", 0, false))
            .expect("handle");
    }
    let stats = pipeline.store().stats().expect("stats");
    assert_eq!(stats.total_events, 20);
    assert_eq!(stats.distinct_topics, 20);
}

#[test]
fn binary_payload_is_stored_as_lowercase_hex() {
    let mut pipeline = memory_pipeline(Box::new(NullSink));
    pipeline
        .handle(&inbound("raw/bytes", &[0xff, 0x00, 0xab], 0, false))
        .expect("handle");

    let events = query_all(&pipeline);
    assert_eq!(events[0].payload, "ff00ab");
    assert_eq!(events[0].sender, None);
}

#[test]
fn empty_topic_is_rejected_but_not_fatal() {
    let mut pipeline = memory_pipeline(Box::new(NullSink));

    let err = pipeline
        .handle(&inbound("", b"x", 0, false))
        .expect_err("empty topic must be rejected");
    assert!(matches!(err, PipelineError::Rejected(_)));
    assert!(!err.is_fatal());

    // The next message goes through untouched.
    pipeline
        .handle(&inbound("ok/topic", b"x", 0, false))
        .expect("handle after rejection");
    assert_eq!(query_all(&pipeline).len(), 1);
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[test]
fn flood_writes_one_alert_line_to_the_file_sink() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let alert_path = dir.path().join("alerts.log");
    let mut pipeline = memory_pipeline(Box::new(FileSink::new(alert_path.clone())));

    // A burst well within the 5 s window: wall-clock receipt times for
    // eleven consecutive handles are microseconds apart.
    for _ in 0..11 {
        pipeline
            .handle(&inbound("cova/turnout/state", b"on", 0, false))
            .expect("handle");
    }

    let log = std::fs::read_to_string(&alert_path).expect("alert log written");
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1, "one alert despite eleven events (cooldown)");
    assert!(lines[0].contains("flood: 10 msgs in 5s on cova/turnout/state"));
}

#[test]
fn unwritable_sink_does_not_fail_handling() {
    let dir = tempfile::tempdir().expect("create temp dir");
    // The sink path is a directory; every append will fail.
    let mut pipeline = memory_pipeline(Box::new(FileSink::new(dir.path().to_path_buf())));

    for _ in 0..10 {
        pipeline
            .handle(&inbound("t", b"x", 0, false))
            .expect("sink failure must not reach the pipeline");
    }
    assert_eq!(query_all(&pipeline).len(), 10);
}

// ---------------------------------------------------------------------------
// Storage failure surfacing
// ---------------------------------------------------------------------------

#[test]
fn storage_failure_surfaces_and_is_fatal() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db_path = dir.path().join("events.sqlite3");
    drop(EventStore::open(&db_path).expect("create database"));

    let store = EventStore::open_read_only(&db_path).expect("open read-only");
    let mut pipeline = Pipeline::new(
        store,
        FloodDetector::new(DetectorParams::default()),
        Box::new(NullSink),
    );

    let err = pipeline
        .handle(&inbound("t", b"x", 0, false))
        .expect_err("append must fail on a read-only store");
    assert!(matches!(err, PipelineError::Storage(_)));
    assert!(err.is_fatal());
}
