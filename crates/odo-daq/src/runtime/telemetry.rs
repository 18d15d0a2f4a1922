use odo_core::{Broadcaster, PipelineStats, Shutdown};
use odo_io::metrics::{
    init_metrics, serve_metrics, DECODE_ERRORS, DISTANCE_CM, DROPPED_DELIVERIES,
    LAST_SAMPLE_UNIX_SECONDS, REMOVED_SUBSCRIBERS, SAMPLES_TOTAL, SPEED_CM_S, SUBSCRIBERS,
    WHEEL_RPM,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

const UPDATE_INTERVAL: Duration = Duration::from_millis(200);

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Mirrors the controller's counters into Prometheus until `shutdown`
/// fires, then publishes one final update.
pub fn start_metrics_updater(
    stats: Arc<PipelineStats>,
    broadcaster: Arc<Broadcaster>,
    shutdown: Shutdown,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last = Counters::default();
        loop {
            let stopping = shutdown.wait_timeout(UPDATE_INTERVAL);
            let snapshot = stats.snapshot();

            last.samples = advance(&SAMPLES_TOTAL, last.samples, snapshot.samples);
            last.decode_errors = advance(&DECODE_ERRORS, last.decode_errors, snapshot.decode_errors);
            last.dropped = advance(&DROPPED_DELIVERIES, last.dropped, snapshot.dropped_deliveries);
            last.removed = advance(&REMOVED_SUBSCRIBERS, last.removed, snapshot.removed_subscribers);

            if snapshot.samples > 0 {
                WHEEL_RPM.set(snapshot.last_rpm);
                SPEED_CM_S.set(snapshot.last_speed_cm_s);
                DISTANCE_CM.set(snapshot.distance_cm);
                LAST_SAMPLE_UNIX_SECONDS.set(snapshot.last_sample_unix_ms as f64 / 1000.0);
            }
            SUBSCRIBERS.set(broadcaster.subscriber_count() as i64);

            if stopping {
                break;
            }
        }
    })
}

#[derive(Default)]
struct Counters {
    samples: u64,
    decode_errors: u64,
    dropped: u64,
    removed: u64,
}

fn advance(counter: &prometheus::IntCounter, last: u64, now: u64) -> u64 {
    if now > last {
        counter.inc_by(now - last);
    }
    now.max(last)
}
