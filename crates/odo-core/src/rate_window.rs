use crate::config::RunConfig;
use crate::sample::Sample;
use chrono::Local;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Revolutions per minute for `count` edges seen over one `window`.
///
/// With the reference one-second window this is exactly
/// `(count / pulses_per_revolution) * 60`.
pub fn rpm_from_count(count: u64, pulses_per_revolution: u32, window: Duration) -> f64 {
    let revolutions = count as f64 / pulses_per_revolution as f64;
    revolutions * (60.0 / window.as_secs_f64())
}

/// Linear speed at the wheel rim in cm/s.
pub fn speed_from_rpm(rpm: f64, wheel_diameter_cm: f64) -> f64 {
    let circumference_cm = PI * wheel_diameter_cm;
    rpm * circumference_cm / 60.0
}

/// Edge accumulator for the pulse path.
///
/// The edge callback is the only writer of the counter; the window timer
/// reads and resets it in a single atomic swap so no edge is lost or counted
/// twice across a boundary.
#[derive(Debug)]
pub struct RateWindow {
    edges: AtomicU64,
    pulses_per_revolution: u32,
    wheel_diameter_cm: f64,
    window: Duration,
}

impl RateWindow {
    pub fn new(pulses_per_revolution: u32, wheel_diameter_cm: f64, window: Duration) -> Self {
        Self {
            edges: AtomicU64::new(0),
            pulses_per_revolution,
            wheel_diameter_cm,
            window,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            config.pulses_per_revolution,
            config.wheel_diameter_cm,
            config.window,
        )
    }

    /// Called once per debounced rising edge.
    pub fn on_edge(&self) {
        self.edges.fetch_add(1, Ordering::Relaxed);
    }

    /// Edges accumulated in the open window.
    pub fn pending(&self) -> u64 {
        self.edges.load(Ordering::Relaxed)
    }

    pub fn take_count(&self) -> u64 {
        self.edges.swap(0, Ordering::AcqRel)
    }

    pub fn close_window(&self, elapsed: Duration, count: u64) -> Sample {
        let rpm = rpm_from_count(count, self.pulses_per_revolution, self.window);
        let speed_cm_s = speed_from_rpm(rpm, self.wheel_diameter_cm);
        debug!(
            count,
            elapsed_ms = elapsed.as_millis() as u64,
            rpm,
            speed_cm_s,
            "Window closed"
        );
        Sample::pulse(Local::now(), rpm, speed_cm_s)
    }

    /// Takes the current count and closes the window over it.
    pub fn close(&self, elapsed: Duration) -> Sample {
        let count = self.take_count();
        self.close_window(elapsed, count)
    }
}

/// Fixed-increment window schedule.
///
/// Window starts advance by exactly `increment` on every close, never by the
/// measured time, so scheduling jitter does not accumulate.
#[derive(Debug, Clone)]
pub struct WindowClock {
    window_start: Instant,
    increment: Duration,
    closed: u64,
}

impl WindowClock {
    pub fn new(start: Instant, increment: Duration) -> Self {
        Self {
            window_start: start,
            increment,
            closed: 0,
        }
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    pub fn deadline(&self) -> Instant {
        self.window_start + self.increment
    }

    pub fn closed(&self) -> u64 {
        self.closed
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline().saturating_duration_since(now)
    }

    /// Closes the open window if its deadline has passed, returning the
    /// real elapsed time since the window started.
    pub fn poll(&mut self, now: Instant) -> Option<Duration> {
        if now < self.deadline() {
            return None;
        }
        let elapsed = now.duration_since(self.window_start);
        self.window_start += self.increment;
        self.closed += 1;
        Some(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SECOND: Duration = Duration::from_millis(1000);

    #[test]
    fn twenty_edges_is_one_revolution_per_second() {
        let window = RateWindow::new(20, 6.0, SECOND);
        for _ in 0..20 {
            window.on_edge();
        }
        let sample = window.close(SECOND);
        assert_eq!(sample.rpm(), Some(60.0));
        assert!((sample.speed_cm_s() - 6.0 * PI).abs() < 1e-9);
        assert!((sample.speed_cm_s() - 18.85).abs() < 0.01);
    }

    #[test]
    fn empty_window_is_zero_not_error() {
        let window = RateWindow::new(20, 6.0, SECOND);
        let sample = window.close(SECOND);
        assert_eq!(sample.rpm(), Some(0.0));
        assert_eq!(sample.speed_cm_s(), 0.0);
    }

    #[test]
    fn close_resets_counter() {
        let window = RateWindow::new(20, 6.0, SECOND);
        window.on_edge();
        window.on_edge();
        assert_eq!(window.pending(), 2);
        let _ = window.close(SECOND);
        assert_eq!(window.pending(), 0);
    }

    #[test]
    fn half_second_window_doubles_rate() {
        assert_eq!(rpm_from_count(10, 20, Duration::from_millis(500)), 60.0);
    }

    #[test]
    fn concurrent_edges_are_all_counted() {
        let window = Arc::new(RateWindow::new(20, 6.0, SECOND));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let w = Arc::clone(&window);
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    w.on_edge();
                }
            }));
        }

        let mut seen = 0;
        for _ in 0..50 {
            seen += window.take_count();
            thread::yield_now();
        }
        for handle in handles {
            handle.join().unwrap();
        }
        seen += window.take_count();
        assert_eq!(seen, 40_000);
    }

    #[test]
    fn clock_waits_for_deadline() {
        let start = Instant::now();
        let mut clock = WindowClock::new(start, SECOND);
        assert_eq!(clock.poll(start + Duration::from_millis(999)), None);
        assert_eq!(
            clock.poll(start + Duration::from_millis(1150)),
            Some(Duration::from_millis(1150))
        );
        assert_eq!(clock.window_start(), start + SECOND);
        assert_eq!(clock.remaining(start + Duration::from_millis(1150)), Duration::from_millis(850));
    }

    #[test]
    fn clock_catches_up_one_window_per_poll() {
        let start = Instant::now();
        let mut clock = WindowClock::new(start, SECOND);
        let late = start + Duration::from_millis(3500);
        assert!(clock.poll(late).is_some());
        assert!(clock.poll(late).is_some());
        assert!(clock.poll(late).is_some());
        assert_eq!(clock.poll(late), None);
        assert_eq!(clock.closed(), 3);
        assert_eq!(clock.window_start(), start + 3 * SECOND);
    }
}
