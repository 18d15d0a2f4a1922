use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Invoked once per accepted edge, from the input's own thread.
pub type EdgeCallback = Box<dyn Fn() + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
}

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("input pin {pin} is unavailable: {reason}")]
    Unavailable { pin: u8, reason: String },
}

/// Edge-triggered digital input.
pub trait PulseInput: Send {
    /// Starts delivering debounced `edge` transitions on `pin` to `on_edge`.
    fn register(
        &mut self,
        pin: u8,
        edge: Edge,
        debounce: Duration,
        on_edge: EdgeCallback,
    ) -> Result<(), HardwareError>;

    /// Stops delivery and frees the pin. Safe to call more than once.
    fn release(&mut self);
}

/// Suppresses edges closer than `window` to the last accepted one.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Raw bytes of one line, terminator included if present.
    Line(Vec<u8>),
    /// Nothing arrived before the read timeout.
    Timeout,
    /// The stream ended.
    Eof,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("read from {port} failed: {source}")]
    Read {
        port: String,
        #[source]
        source: io::Error,
    },
}

/// Line-oriented byte stream such as a serial port.
pub trait LineSource: Send {
    /// Human-readable name used in diagnostics.
    fn name(&self) -> &str;

    /// Waits at most `timeout` for the next complete line.
    fn read_line(&mut self, timeout: Duration) -> Result<LineEvent, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debouncer_drops_contact_bounce() {
        let mut debouncer = Debouncer::new(Duration::from_millis(5));
        let t0 = Instant::now();
        assert!(debouncer.accept(t0));
        assert!(!debouncer.accept(t0 + Duration::from_millis(1)));
        assert!(!debouncer.accept(t0 + Duration::from_millis(4)));
        assert!(debouncer.accept(t0 + Duration::from_millis(5)));
        assert!(!debouncer.accept(t0 + Duration::from_millis(9)));
        assert!(debouncer.accept(t0 + Duration::from_millis(11)));
    }

    #[test]
    fn zero_window_accepts_everything() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(debouncer.accept(t0));
        assert!(debouncer.accept(t0));
    }
}
