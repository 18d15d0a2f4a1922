pub mod broadcast;
pub mod config;
pub mod control_loop;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod odometer;
pub mod persistence;
pub mod processor;
pub mod rate_window;
pub mod sample;
pub mod shutdown;
pub mod tags;

pub use broadcast::{Broadcaster, PublishOutcome, SubscriberId, Subscription};
pub use config::{ConfigError, RunConfig};
pub use control_loop::{
    PipelineController, PipelineError, PipelineState, PipelineStats, RunReport, StatsSnapshot,
    StopReason,
};
pub use hal::{
    Debouncer, Edge, EdgeCallback, HardwareError, LineEvent, LineSource, PulseInput, SourceError,
};
#[cfg(feature = "simulation")]
pub use hal_sim::SimulatedWheel;
pub use odometer::Odometer;
pub use persistence::{next_available_path, CsvLog, LogEntry, LogError, LogLayout};
pub use processor::{DecodeError, SampleProcessor};
pub use rate_window::{rpm_from_count, speed_from_rpm, RateWindow, WindowClock};
pub use sample::{Reading, Sample, Unit, TIMESTAMP_FORMAT};
pub use shutdown::Shutdown;
