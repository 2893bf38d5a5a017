//! Per-topic publish-rate flood detection.
//!
//! Streaming algorithm over a trailing window: each `record` call
//! appends one sample, evicts expired samples from the front (samples
//! are non-decreasing in time by construction, so front eviction is
//! complete), then tests the threshold. Amortized O(1) per call; full
//! history is never rescanned. Eviction always runs before the
//! threshold test, including on the call that first fills the window.
//!
//! A cooldown suppresses repeat alerts for a topic that is already
//! known to be flooding; it resets independently of the window.
//!
//! # Idle-window reaping
//! Topic windows are created lazily on first event and reaped once a
//! topic has been silent past `idle_expiry` and its cooldown has
//! elapsed, so the tracked-topic map stays bounded for long-lived
//! processes observing many distinct topics.

use chrono::{DateTime, Duration, Local};
use std::collections::{HashMap, VecDeque};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Detector tuning parameters.
#[derive(Debug, Clone, Copy)]
pub struct DetectorParams {
    /// Trailing window length.
    pub window: Duration,
    /// Sample count within the window that triggers an alert.
    pub threshold: usize,
    /// Minimum gap between consecutive alerts for one topic.
    pub cooldown: Duration,
    /// Idle time after which a topic's window state is dropped.
    pub idle_expiry: Duration,
}

impl Default for DetectorParams {
    fn default() -> Self {
        DetectorParams {
            window: Duration::seconds(5),
            threshold: 10,
            cooldown: Duration::seconds(60),
            idle_expiry: Duration::seconds(300),
        }
    }
}

/// An emitted flood condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloodAlert {
    pub topic: String,
    /// Samples in the window at the moment the threshold was crossed.
    pub count: usize,
    /// Window length the count was measured over.
    pub window: Duration,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TopicWindow {
    samples: VecDeque<DateTime<Local>>,
    last_alert: Option<DateTime<Local>>,
}

/// Idle windows are reaped every this many `record` calls.
const SWEEP_EVERY: u32 = 256;

/// Sliding-window flood detector over all observed topics.
pub struct FloodDetector {
    params: DetectorParams,
    windows: HashMap<String, TopicWindow>,
    sweep_countdown: u32,
}

impl FloodDetector {
    pub fn new(params: DetectorParams) -> Self {
        FloodDetector {
            params,
            windows: HashMap::new(),
            sweep_countdown: SWEEP_EVERY,
        }
    }

    /// Record one observed event. Returns an alert when the topic just
    /// crossed the flood threshold outside its cooldown. Never errors;
    /// alert delivery is the sink's concern, isolated from this state.
    pub fn record(&mut self, topic: &str, observed_at: DateTime<Local>) -> Option<FloodAlert> {
        let params = self.params;
        let window = self
            .windows
            .entry(topic.to_owned())
            .or_insert_with(TopicWindow::default);

        window.samples.push_back(observed_at);
        let cutoff = observed_at - params.window;
        while window.samples.front().is_some_and(|t| *t < cutoff) {
            window.samples.pop_front();
        }

        let mut alert = None;
        if window.samples.len() >= params.threshold {
            let cooled = match window.last_alert {
                Some(last) => observed_at - last >= params.cooldown,
                None => true,
            };
            if cooled {
                window.last_alert = Some(observed_at);
                alert = Some(FloodAlert {
                    topic: topic.to_owned(),
                    count: window.samples.len(),
                    window: params.window,
                });
            }
        }

        self.sweep_countdown -= 1;
        if self.sweep_countdown == 0 {
            self.sweep_countdown = SWEEP_EVERY;
            self.sweep_idle(observed_at);
        }

        alert
    }

    /// Number of topics currently tracked.
    pub fn tracked_topics(&self) -> usize {
        self.windows.len()
    }

    /// Current sample count in a topic's window; 0 for an untracked
    /// topic.
    pub fn window_len(&self, topic: &str) -> usize {
        self.windows.get(topic).map_or(0, |w| w.samples.len())
    }

    /// Drop windows whose newest sample is older than `idle_expiry`,
    /// once their cooldown has also elapsed. The topic being recorded
    /// always holds a fresh sample and is never reaped here.
    fn sweep_idle(&mut self, now: DateTime<Local>) {
        let idle_cutoff = now - self.params.idle_expiry;
        let cooldown = self.params.cooldown;
        self.windows.retain(|_, w| {
            let active = w.samples.back().is_some_and(|t| *t >= idle_cutoff);
            let cooling = w.last_alert.is_some_and(|t| now - t < cooldown);
            active || cooling
        });
    }
}
