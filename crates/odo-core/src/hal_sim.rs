use crate::hal::{Debouncer, Edge, EdgeCallback, HardwareError, PulseInput};
use crate::shutdown::Shutdown;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Slotted encoder disc driven at a constant speed.
///
/// Emits `pulses_per_revolution` edges per revolution on a background
/// thread. With `contact_bounce` every edge is followed by a spurious one
/// half a millisecond later, which the debounce window must swallow.
#[derive(Debug)]
pub struct SimulatedWheel {
    rpm: f64,
    pulses_per_revolution: u32,
    contact_bounce: bool,
    pin: Option<u8>,
    stop: Shutdown,
    worker: Option<JoinHandle<u64>>,
}

impl SimulatedWheel {
    pub fn new(rpm: f64, pulses_per_revolution: u32) -> Self {
        Self {
            rpm: rpm.max(0.0),
            pulses_per_revolution,
            contact_bounce: false,
            pin: None,
            stop: Shutdown::new(),
            worker: None,
        }
    }

    pub fn with_contact_bounce(mut self, enabled: bool) -> Self {
        self.contact_bounce = enabled;
        self
    }

    /// Time between two real edges, `None` when the wheel stands still.
    pub fn edge_interval(&self) -> Option<Duration> {
        let edges_per_second = self.rpm * self.pulses_per_revolution as f64 / 60.0;
        if edges_per_second.is_finite() && edges_per_second > 0.0 {
            Some(Duration::from_secs_f64(1.0 / edges_per_second))
        } else {
            None
        }
    }
}

impl PulseInput for SimulatedWheel {
    fn register(
        &mut self,
        pin: u8,
        edge: Edge,
        debounce: Duration,
        on_edge: EdgeCallback,
    ) -> Result<(), HardwareError> {
        if let Some(claimed) = self.pin {
            return Err(HardwareError::Unavailable {
                pin,
                reason: format!("simulated wheel already drives pin {claimed}"),
            });
        }

        let interval = self.edge_interval();
        let bounce = self.contact_bounce;
        let stop = self.stop.clone();
        info!(pin, ?edge, rpm = self.rpm, debounce_ms = debounce.as_millis() as u64, "Simulated wheel attached");

        self.worker = Some(thread::spawn(move || {
            let mut debouncer = Debouncer::new(debounce);
            let mut accepted = 0u64;
            let Some(interval) = interval else {
                while !stop.wait_timeout(Duration::from_millis(200)) {}
                return accepted;
            };

            let mut next_edge = Instant::now() + interval;
            loop {
                let wait = next_edge.saturating_duration_since(Instant::now());
                if stop.wait_timeout(wait) {
                    break;
                }
                if debouncer.accept(Instant::now()) {
                    on_edge();
                    accepted += 1;
                }
                if bounce {
                    thread::sleep(Duration::from_micros(500));
                    if debouncer.accept(Instant::now()) {
                        on_edge();
                        accepted += 1;
                    }
                }
                next_edge += interval;
            }
            accepted
        }));
        self.pin = Some(pin);
        Ok(())
    }

    fn release(&mut self) {
        self.stop.trigger();
        if let Some(worker) = self.worker.take() {
            let edges = worker.join().unwrap_or_default();
            debug!(edges, "Simulated wheel released");
        }
        self.pin = None;
        self.stop = Shutdown::new();
    }
}

impl Drop for SimulatedWheel {
    fn drop(&mut self) {
        self.release();
    }
}
