/// Flood detector behavior over simulated time.
///
/// Timestamps are constructed explicitly so these tests never sleep;
/// the detector only ever sees the receipt times it is handed.
use chrono::{DateTime, Duration, Local, TimeZone};
use recorder::detector::{DetectorParams, FloodDetector};

fn t0() -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap()
}

fn default_detector() -> FloodDetector {
    FloodDetector::new(DetectorParams::default())
}

// ---------------------------------------------------------------------------
// Threshold crossing
// ---------------------------------------------------------------------------

#[test]
fn ten_events_in_window_trigger_exactly_one_alert() {
    let mut d = default_detector();
    let mut alerts = Vec::new();
    for i in 0..10 {
        if let Some(a) = d.record("cova/turnout/state", t0() + Duration::milliseconds(i * 100)) {
            alerts.push(a);
        }
    }
    assert_eq!(alerts.len(), 1, "exactly one alert for the burst");
    assert_eq!(alerts[0].topic, "cova/turnout/state");
    assert_eq!(alerts[0].count, 10);
    assert_eq!(alerts[0].window, Duration::seconds(5));
}

#[test]
fn eleventh_event_is_suppressed_by_cooldown() {
    let mut d = default_detector();
    for i in 0..10 {
        d.record("t", t0() + Duration::milliseconds(i * 100));
    }
    let eleventh = d.record("t", t0() + Duration::milliseconds(1001));
    assert!(eleventh.is_none(), "cooldown must suppress the repeat alert");
}

#[test]
fn steady_rate_below_threshold_never_alerts() {
    let mut d = default_detector();
    for i in 0..120 {
        let alert = d.record("t", t0() + Duration::seconds(i));
        assert!(alert.is_none(), "1 msg/s never reaches 10 within 5 s");
    }
}

#[test]
fn topics_are_tracked_independently() {
    let mut d = default_detector();
    for i in 0..9 {
        assert!(d.record("a", t0() + Duration::milliseconds(i * 10)).is_none());
    }
    // A different topic bursting must not inherit `a`'s samples.
    assert!(d.record("b", t0() + Duration::milliseconds(100)).is_none());
    assert_eq!(d.window_len("b"), 1);
}

// ---------------------------------------------------------------------------
// Eviction
// ---------------------------------------------------------------------------

#[test]
fn samples_past_the_window_are_evicted() {
    let mut d = default_detector();
    for i in 0..5 {
        d.record("t", t0() + Duration::milliseconds(i * 100));
    }
    assert_eq!(d.window_len("t"), 5);

    d.record("t", t0() + Duration::seconds(10));
    assert_eq!(d.window_len("t"), 1, "old samples evicted from the front");
}

// ---------------------------------------------------------------------------
// Cooldown
// ---------------------------------------------------------------------------

#[test]
fn full_window_within_cooldown_stays_silent() {
    let mut d = default_detector();
    for i in 0..10 {
        d.record("t", t0() + Duration::milliseconds(i * 100));
    }
    // A second burst 10 s later refills the window; cooldown has not
    // elapsed.
    for i in 0..10 {
        let alert = d.record("t", t0() + Duration::seconds(10) + Duration::milliseconds(i * 100));
        assert!(alert.is_none());
    }
}

#[test]
fn cooldown_elapsed_allows_a_new_alert() {
    let mut d = default_detector();
    for i in 0..10 {
        d.record("t", t0() + Duration::milliseconds(i * 100));
    }
    let mut second = Vec::new();
    for i in 0..10 {
        if let Some(a) =
            d.record("t", t0() + Duration::seconds(61) + Duration::milliseconds(i * 100))
        {
            second.push(a);
        }
    }
    assert_eq!(second.len(), 1, "still-flooding topic re-alerts after cooldown");
}

// ---------------------------------------------------------------------------
// Idle-window reaping
// ---------------------------------------------------------------------------

#[test]
fn idle_topic_window_is_reaped() {
    let mut d = default_detector();
    d.record("quiet/topic", t0());
    assert_eq!(d.tracked_topics(), 1);

    // Enough activity on another topic, far past the quiet topic's
    // idle expiry, to run the periodic sweep.
    for i in 0..300 {
        d.record("busy/topic", t0() + Duration::seconds(400) + Duration::milliseconds(i));
    }

    assert_eq!(d.tracked_topics(), 1, "quiet topic dropped, busy topic kept");
    assert_eq!(d.window_len("quiet/topic"), 0);
    assert!(d.window_len("busy/topic") > 0);
}

#[test]
fn idle_topic_in_cooldown_survives_the_sweep() {
    let params = DetectorParams {
        idle_expiry: Duration::seconds(5),
        ..DetectorParams::default()
    };
    let mut d = FloodDetector::new(params);

    // Alert on the quiet topic, then let it go idle past expiry but
    // not past its cooldown.
    for i in 0..10 {
        d.record("quiet/topic", t0() + Duration::milliseconds(i * 100));
    }
    for i in 0..300 {
        d.record("busy/topic", t0() + Duration::seconds(30) + Duration::milliseconds(i));
    }
    assert_eq!(
        d.tracked_topics(),
        2,
        "cooldown state must outlive idle expiry"
    );

    // Once the cooldown has elapsed too, the sweep drops it.
    for i in 0..300 {
        d.record("busy/topic", t0() + Duration::seconds(90) + Duration::milliseconds(i));
    }
    assert_eq!(d.tracked_topics(), 1);
}
