use crate::runtime::config::{RuntimeConfig, SourceKind};
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use anyhow::{Context, Result};
use clap::Parser;
use odo_core::{Broadcaster, PipelineController, RunConfig, RunReport, Shutdown, SimulatedWheel};
use odo_io::bridge::{spawn_bridge, BridgeConfig};
use odo_io::serial::ReaderLineSource;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info};

pub fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::parse();
    match run(config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Measurement aborted");
            eprintln!("odo-daq: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub fn run(config: RuntimeConfig) -> Result<RunReport> {
    init_tracing(config.json_logs);

    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let run_config = config.run_config();
    info!(
        source = ?config.source,
        config = %serde_json::to_string(&run_config).unwrap_or_default(),
        "Starting odometer"
    );

    let broadcaster = Arc::new(Broadcaster::new(run_config.subscriber_capacity));
    let shutdown = Shutdown::new();

    let ctrlc_shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Stop requested");
        ctrlc_shutdown.trigger();
    })
    .context("failed to install Ctrl-C handler")?;

    let bridge = if config.bridge_enabled {
        let bridge_config = BridgeConfig {
            bind_addr: config.bind_addr.clone(),
            ..Default::default()
        };
        let handle = spawn_bridge(Arc::clone(&broadcaster), bridge_config, shutdown.clone())
            .context("failed to start the dashboard bridge")?;
        Some(handle)
    } else {
        info!("Bridge disabled");
        None
    };

    let mut controller =
        PipelineController::new(run_config.clone(), Arc::clone(&broadcaster), shutdown.clone());
    let updater = telemetry::start_metrics_updater(
        controller.stats(),
        Arc::clone(&broadcaster),
        shutdown.clone(),
    );
    let timer = config.run_seconds.map(|seconds| {
        info!(seconds, "Running for limited duration");
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            if !shutdown.wait_timeout(Duration::from_secs(seconds)) {
                info!("Run duration elapsed");
                shutdown.trigger();
            }
        })
    });

    let outcome = run_source(&config, &run_config, &mut controller);

    // Writers block on their queues until the broadcaster closes.
    shutdown.trigger();
    broadcaster.close();
    if let Some(handle) = bridge {
        handle.join();
    }
    let _ = updater.join();
    if let Some(handle) = timer {
        let _ = handle.join();
    }

    let report = outcome?;
    info!(
        reason = ?report.stop_reason,
        rows = report.rows_written,
        samples = report.stats.samples,
        decode_errors = report.stats.decode_errors,
        dropped_deliveries = report.stats.dropped_deliveries,
        distance_cm = report.stats.distance_cm,
        path = %report.log_path.display(),
        "Run complete"
    );
    Ok(report)
}

fn run_source(
    config: &RuntimeConfig,
    run_config: &RunConfig,
    controller: &mut PipelineController,
) -> Result<RunReport> {
    match config.source {
        SourceKind::Sim => {
            let mut wheel =
                SimulatedWheel::new(config.sim_rpm, run_config.pulses_per_revolution)
                    .with_contact_bounce(config.sim_bounce);
            controller
                .run_pulse(&mut wheel)
                .context("pulse measurement failed")
        }
        SourceKind::Serial => run_serial_port(run_config, controller),
        SourceKind::Replay => {
            let path = config
                .replay
                .as_deref()
                .context("--source replay needs --replay <PATH>")?;
            let mut source = ReaderLineSource::open_replay(path)
                .with_context(|| format!("failed to open replay file {}", path.display()))?
                .paced(Duration::from_millis(config.replay_interval_ms));
            controller
                .run_serial(&mut source)
                .context("replay measurement failed")
        }
    }
}

#[cfg(feature = "hardware-serial")]
fn run_serial_port(run_config: &RunConfig, controller: &mut PipelineController) -> Result<RunReport> {
    let read_timeout = run_config.poll_interval.min(run_config.idle_timeout);
    let mut port = odo_io::serial::SerialLineSource::open(
        &run_config.serial_port,
        run_config.baud_rate,
        read_timeout,
    )
    .context("sensor serial port unavailable")?;
    controller
        .run_serial(&mut port)
        .context("serial measurement failed")
}

#[cfg(not(feature = "hardware-serial"))]
fn run_serial_port(run_config: &RunConfig, _controller: &mut PipelineController) -> Result<RunReport> {
    anyhow::bail!(
        "serial port {} requested but odo-daq was built without the hardware-serial feature",
        run_config.serial_port
    )
}
