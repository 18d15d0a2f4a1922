//! Prometheus metrics for the odometer pipeline.
//!
//! Gauges mirror the latest sample; counters follow the controller's
//! running totals and are advanced by the telemetry updater.

use odo_core::tags;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Pipeline Metrics
// ============================================================================

/// Samples published and persisted
pub static SAMPLES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "odometer_samples_total",
        "Samples published to subscribers and appended to the log",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Serial lines that could not be decoded
pub static DECODE_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "odometer_decode_errors_total",
        "Serial lines skipped because they could not be decoded",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Deliveries dropped because a subscriber queue was full
pub static DROPPED_DELIVERIES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "odometer_dropped_deliveries_total",
        "Samples dropped for a subscriber whose queue was full",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Subscribers removed after a failed delivery
pub static REMOVED_SUBSCRIBERS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "odometer_removed_subscribers_total",
        "Subscribers removed after a failed delivery",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Registered broadcast subscribers
pub static SUBSCRIBERS: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new("odometer_subscribers", "Registered broadcast subscribers").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Connected bridge clients
pub static BRIDGE_CLIENTS: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new("odometer_bridge_clients", "Connected bridge clients").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Measurement Metrics
// ============================================================================

/// Latest wheel speed in RPM (pulse path only)
pub static WHEEL_RPM: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::RPM.metric, "Latest wheel speed in RPM").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Latest linear speed in cm/s
pub static SPEED_CM_S: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::SPEED_CM_S.metric, "Latest linear speed in cm/s").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Distance covered since the run started
pub static DISTANCE_CM: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::DISTANCE_CM.metric,
        "Distance integrated from speed since the run started",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Wall-clock time of the latest sample
pub static LAST_SAMPLE_UNIX_SECONDS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::TIMESTAMP.metric,
        "Unix time of the latest published sample",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(addr = %bind_addr, error = %e, "Failed to start metrics server");
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();

                    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
                        tracing::warn!(error = %e, "Failed to encode metrics");
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let mut response = Response::from_data(buffer);
                    if let Ok(header) = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        encoder.format_type().as_bytes(),
                    ) {
                        response = response.with_header(header);
                    }
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once the first sample went out
                    if SAMPLES_TOTAL.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = SAMPLES_TOTAL.get();
    let _ = DECODE_ERRORS.get();
    let _ = DROPPED_DELIVERIES.get();
    let _ = REMOVED_SUBSCRIBERS.get();
    let _ = SUBSCRIBERS.get();
    let _ = BRIDGE_CLIENTS.get();
    let _ = WHEEL_RPM.get();
    let _ = SPEED_CM_S.get();
    let _ = DISTANCE_CM.get();
    let _ = LAST_SAMPLE_UNIX_SECONDS.get();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_pipeline_metrics() {
        init_metrics();
        WHEEL_RPM.set(60.0);

        let names: Vec<String> = REGISTRY
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        for expected in [
            "odometer_samples_total",
            "odometer_wheel_rpm",
            "odometer_speed_cm_per_second",
            "odometer_distance_cm",
            "odometer_bridge_clients",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }
}
