use crate::broadcast::{Broadcaster, PublishOutcome};
use crate::config::{ConfigError, RunConfig};
use crate::hal::{Edge, HardwareError, LineEvent, LineSource, PulseInput, SourceError};
use crate::odometer::Odometer;
use crate::persistence::{CsvLog, LogError, LogLayout};
use crate::processor::SampleProcessor;
use crate::rate_window::{RateWindow, WindowClock};
use crate::sample::Sample;
use crate::shutdown::Shutdown;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// External stop signal.
    Interrupted,
    /// The serial sensor went quiet for longer than the idle timeout.
    IdleTimeout,
    /// Empty line or end of the byte stream.
    EndOfData,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline is single-use and already left Idle (state {0:?})")]
    AlreadyStarted(PipelineState),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Live counters, readable from other threads while the run is going.
#[derive(Debug, Default)]
pub struct PipelineStats {
    samples: AtomicU64,
    decode_errors: AtomicU64,
    dropped_deliveries: AtomicU64,
    removed_subscribers: AtomicU64,
    last_rpm_bits: AtomicU64,
    last_speed_bits: AtomicU64,
    distance_bits: AtomicU64,
    last_sample_unix_ms: AtomicI64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    pub samples: u64,
    pub decode_errors: u64,
    pub dropped_deliveries: u64,
    pub removed_subscribers: u64,
    pub last_rpm: f64,
    pub last_speed_cm_s: f64,
    pub distance_cm: f64,
    /// Zero until the first sample.
    pub last_sample_unix_ms: i64,
}

impl PipelineStats {
    fn record(&self, sample: &Sample, distance_cm: f64, outcome: &PublishOutcome) {
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.dropped_deliveries
            .fetch_add(outcome.dropped as u64, Ordering::Relaxed);
        self.removed_subscribers
            .fetch_add(outcome.removed as u64, Ordering::Relaxed);
        if let Some(rpm) = sample.rpm() {
            self.last_rpm_bits.store(rpm.to_bits(), Ordering::Relaxed);
        }
        self.last_speed_bits
            .store(sample.speed_cm_s().to_bits(), Ordering::Relaxed);
        self.distance_bits
            .store(distance_cm.to_bits(), Ordering::Relaxed);
        self.last_sample_unix_ms
            .store(sample.timestamp().timestamp_millis(), Ordering::Relaxed);
    }

    fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples: self.samples.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            dropped_deliveries: self.dropped_deliveries.load(Ordering::Relaxed),
            removed_subscribers: self.removed_subscribers.load(Ordering::Relaxed),
            last_rpm: f64::from_bits(self.last_rpm_bits.load(Ordering::Relaxed)),
            last_speed_cm_s: f64::from_bits(self.last_speed_bits.load(Ordering::Relaxed)),
            distance_cm: f64::from_bits(self.distance_bits.load(Ordering::Relaxed)),
            last_sample_unix_ms: self.last_sample_unix_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stop_reason: StopReason,
    pub log_path: PathBuf,
    pub rows_written: u64,
    pub stats: StatsSnapshot,
}

/// Owns one run: claims the input, drives sampling, fans samples out to the
/// broadcaster and the log, and tears everything down exactly once.
pub struct PipelineController {
    config: RunConfig,
    broadcaster: Arc<Broadcaster>,
    shutdown: Shutdown,
    stats: Arc<PipelineStats>,
    odometer: Odometer,
    state: PipelineState,
}

impl PipelineController {
    pub fn new(config: RunConfig, broadcaster: Arc<Broadcaster>, shutdown: Shutdown) -> Self {
        Self {
            config,
            broadcaster,
            shutdown,
            stats: Arc::new(PipelineStats::default()),
            odometer: Odometer::new(),
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "Pipeline state change");
        self.state = next;
    }

    fn begin(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyStarted(self.state));
        }
        if let Err(e) = self.config.validate() {
            self.transition(PipelineState::Stopped);
            return Err(e.into());
        }
        Ok(())
    }

    fn open_log(&mut self, layout: LogLayout) -> Result<CsvLog, PipelineError> {
        CsvLog::open(&self.config.output_dir, &self.config.output_base_name, layout).map_err(|e| {
            error!(error = %e, "Cannot open sample log");
            self.transition(PipelineState::Stopped);
            e.into()
        })
    }

    /// Counts edges from `input` and closes one window per configured
    /// increment until the shutdown signal fires.
    pub fn run_pulse<P: PulseInput + ?Sized>(
        &mut self,
        input: &mut P,
    ) -> Result<RunReport, PipelineError> {
        self.begin()?;

        let window = Arc::new(RateWindow::from_config(&self.config));
        let edge_window = Arc::clone(&window);
        if let Err(e) = input.register(
            self.config.input_pin,
            Edge::Rising,
            self.config.debounce,
            Box::new(move || edge_window.on_edge()),
        ) {
            error!(error = %e, pin = self.config.input_pin, "Cannot claim input pin");
            self.transition(PipelineState::Stopped);
            return Err(e.into());
        }

        let mut log = match self.open_log(LogLayout::Pulse) {
            Ok(log) => log,
            Err(e) => {
                input.release();
                return Err(e);
            }
        };

        info!(
            window_ms = self.config.window.as_millis() as u64,
            pulses_per_revolution = self.config.pulses_per_revolution,
            wheel_diameter_cm = self.config.wheel_diameter_cm,
            "Pulse sampling started"
        );
        self.transition(PipelineState::Running);
        let outcome = self.pulse_loop(&window, &mut log);

        self.transition(PipelineState::Stopping);
        self.shutdown.trigger();
        input.release();
        let discarded = window.take_count();
        if discarded > 0 {
            debug!(edges = discarded, "Discarding partial window");
        }
        self.finish(outcome, log)
    }

    fn pulse_loop(&mut self, window: &RateWindow, log: &mut CsvLog) -> Result<StopReason, PipelineError> {
        let mut clock = WindowClock::new(Instant::now(), self.config.window);
        loop {
            let wait = clock
                .remaining(Instant::now())
                .min(self.config.poll_interval);
            if self.shutdown.wait_timeout(wait) {
                info!("Measurement stopped by user");
                return Ok(StopReason::Interrupted);
            }
            if let Some(elapsed) = clock.poll(Instant::now()) {
                let sample = window.close(elapsed);
                self.emit(&sample, log)?;
            }
        }
    }

    /// Reads lines from `source` until it goes idle, ends, or the shutdown
    /// signal fires. Bad lines are logged and skipped.
    pub fn run_serial<S: LineSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<RunReport, PipelineError> {
        self.begin()?;
        let mut log = self.open_log(LogLayout::Serial)?;

        info!(
            source = source.name(),
            idle_timeout_ms = self.config.idle_timeout.as_millis() as u64,
            field = %self.config.speed_field,
            "Serial sampling started"
        );
        self.transition(PipelineState::Running);
        let processor = SampleProcessor::new(self.config.speed_field.clone());
        let outcome = self.serial_loop(source, &processor, &mut log);

        self.transition(PipelineState::Stopping);
        self.shutdown.trigger();
        self.finish(outcome, log)
    }

    fn serial_loop<S: LineSource + ?Sized>(
        &mut self,
        source: &mut S,
        processor: &SampleProcessor,
        log: &mut CsvLog,
    ) -> Result<StopReason, PipelineError> {
        let read_timeout = self.config.poll_interval.min(self.config.idle_timeout);
        let mut last_data = Instant::now();

        loop {
            if self.shutdown.is_triggered() {
                info!("Measurement stopped by user");
                return Ok(StopReason::Interrupted);
            }

            match source.read_line(read_timeout)? {
                LineEvent::Line(raw) => {
                    last_data = Instant::now();
                    let line = raw.trim_ascii();
                    if line.is_empty() {
                        info!("No data received from the sensor");
                        return Ok(StopReason::EndOfData);
                    }
                    match processor.process(line) {
                        Ok(sample) => self.emit(&sample, log)?,
                        Err(e) => {
                            self.stats.record_decode_error();
                            warn!(
                                error = %e,
                                line = %String::from_utf8_lossy(line),
                                "Unable to process line"
                            );
                        }
                    }
                }
                LineEvent::Timeout => {
                    let idle = last_data.elapsed();
                    if idle >= self.config.idle_timeout {
                        warn!(idle_ms = idle.as_millis() as u64, "Speed reading timed out");
                        return Ok(StopReason::IdleTimeout);
                    }
                }
                LineEvent::Eof => {
                    info!(source = source.name(), "Sensor stream ended");
                    return Ok(StopReason::EndOfData);
                }
            }
        }
    }

    /// Broadcast first so subscribers are not held up by the disk, then
    /// persist; both finish before the next sample is taken.
    fn emit(&mut self, sample: &Sample, log: &mut CsvLog) -> Result<(), PipelineError> {
        let outcome = self.broadcaster.publish(sample);
        if let Err(e) = log.append_sample(sample) {
            error!(error = %e, "Cannot persist sample, aborting run");
            return Err(e.into());
        }
        let distance_cm = self.odometer.advance(sample);
        self.stats.record(sample, distance_cm, &outcome);

        info!(
            timestamp = %sample.formatted_timestamp(),
            value = sample.value(),
            unit = sample.unit().as_str(),
            speed_cm_s = sample.speed_cm_s(),
            delivered = outcome.delivered,
            "Sample published"
        );
        Ok(())
    }

    fn finish(
        &mut self,
        outcome: Result<StopReason, PipelineError>,
        mut log: CsvLog,
    ) -> Result<RunReport, PipelineError> {
        let closed = log.close();
        self.transition(PipelineState::Stopped);

        let stop_reason = match outcome {
            Ok(reason) => reason,
            Err(e) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "Sample log did not close cleanly");
                }
                return Err(e);
            }
        };
        closed?;

        let report = RunReport {
            stop_reason,
            log_path: log.path().to_path_buf(),
            rows_written: log.rows_written(),
            stats: self.stats.snapshot(),
        };
        info!(
            reason = ?report.stop_reason,
            rows = report.rows_written,
            path = %report.log_path.display(),
            "Measurement finished"
        );
        Ok(report)
    }
}
