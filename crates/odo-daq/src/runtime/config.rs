use clap::{Parser, ValueEnum};
use odo_core::RunConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Simulated slotted wheel on the pulse path
    Sim,
    /// UART sensor printing one JSON object per line
    Serial,
    /// Newline-delimited capture file fed through the serial path
    Replay,
}

/// Wheel odometer acquisition: sample, broadcast and log wheel speed.
#[derive(Debug, Clone, Parser)]
#[command(name = "odo-daq", version, about)]
pub struct RuntimeConfig {
    /// Where samples come from
    #[arg(long, value_enum, default_value_t = SourceKind::Sim, env = "ODO_SOURCE")]
    pub source: SourceKind,

    /// Wheel speed of the simulated wheel
    #[arg(long, default_value_t = 60.0, env = "ODO_SIM_RPM")]
    pub sim_rpm: f64,

    /// Add contact bounce to every simulated edge
    #[arg(long)]
    pub sim_bounce: bool,

    /// Capture file for `--source replay`
    #[arg(long, required_if_eq("source", "replay"), env = "ODO_REPLAY")]
    pub replay: Option<PathBuf>,

    /// Delay between replayed lines in milliseconds
    #[arg(long, default_value_t = 0)]
    pub replay_interval_ms: u64,

    #[arg(long, default_value = "/dev/ttyTHS1", env = "ODO_SERIAL_PORT")]
    pub serial_port: String,

    #[arg(long, default_value_t = 9600, env = "ODO_BAUD")]
    pub baud: u32,

    /// Sampling window length in milliseconds
    #[arg(long, default_value_t = 1000, env = "ODO_WINDOW_MS")]
    pub window_ms: u64,

    /// Upper bound on how long the window timer sleeps between checks
    #[arg(long, default_value_t = 200)]
    pub poll_ms: u64,

    #[arg(long = "ppr", default_value_t = 20, env = "ODO_PPR")]
    pub pulses_per_revolution: u32,

    #[arg(long, default_value_t = 6.0, env = "ODO_WHEEL_DIAMETER_CM")]
    pub wheel_diameter_cm: f64,

    /// BCM pin of the encoder input
    #[arg(long, default_value_t = 17)]
    pub pin: u8,

    #[arg(long, default_value_t = 5)]
    pub debounce_ms: u64,

    /// Stop the serial path after this long without a line
    #[arg(long, default_value_t = 1000, env = "ODO_IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: u64,

    /// JSON field holding the speed on the serial path
    #[arg(long, default_value = "speed")]
    pub speed_field: String,

    #[arg(long, default_value = ".", env = "ODO_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Log file base name; `.csv` and a numeric suffix are added
    #[arg(long, default_value = "Pengukuran_odometer_DC", env = "ODO_OUTPUT_NAME")]
    pub output_name: String,

    /// Per-subscriber queue length
    #[arg(long, default_value_t = 64)]
    pub queue_capacity: usize,

    /// Run for a fixed duration then exit
    #[arg(long)]
    pub run_seconds: Option<u64>,

    /// Bridge TCP bind address
    #[arg(long = "bind", default_value = "127.0.0.1:7000", env = "ODO_BIND")]
    pub bind_addr: String,

    /// Disable the TCP bridge
    #[arg(long = "no-bridge", action = clap::ArgAction::SetFalse)]
    pub bridge_enabled: bool,

    /// Output logs in JSON format
    #[arg(long, env = "ODO_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable Prometheus metrics server on address (e.g. 0.0.0.0:9090)
    #[arg(long, env = "ODO_METRICS_ADDR")]
    pub metrics_addr: Option<String>,
}

impl RuntimeConfig {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            window: Duration::from_millis(self.window_ms),
            poll_interval: Duration::from_millis(self.poll_ms),
            pulses_per_revolution: self.pulses_per_revolution,
            wheel_diameter_cm: self.wheel_diameter_cm,
            input_pin: self.pin,
            debounce: Duration::from_millis(self.debounce_ms),
            serial_port: self.serial_port.clone(),
            baud_rate: self.baud,
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            speed_field: self.speed_field.clone(),
            output_dir: self.output_dir.clone(),
            output_base_name: self.output_name.clone(),
            subscriber_capacity: self.queue_capacity,
        }
    }
}
