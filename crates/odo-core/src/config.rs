use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("wheel diameter must be a positive finite number, got {0}")]
    InvalidDiameter(f64),
}

/// Parameters fixed for the lifetime of one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    pub window: Duration,
    pub poll_interval: Duration,
    pub pulses_per_revolution: u32,
    pub wheel_diameter_cm: f64,
    pub input_pin: u8,
    pub debounce: Duration,
    pub serial_port: String,
    pub baud_rate: u32,
    pub idle_timeout: Duration,
    pub speed_field: String,
    pub output_dir: PathBuf,
    pub output_base_name: String,
    pub subscriber_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(200),
            pulses_per_revolution: 20,
            wheel_diameter_cm: 6.0,
            input_pin: 17,
            debounce: Duration::from_millis(5),
            serial_port: "/dev/ttyTHS1".to_string(),
            baud_rate: 9600,
            idle_timeout: Duration::from_secs(1),
            speed_field: "speed".to_string(),
            output_dir: PathBuf::from("."),
            output_base_name: "Pengukuran_odometer_DC".to_string(),
            subscriber_capacity: 64,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.is_zero() {
            return Err(ConfigError::Zero("window"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Zero("poll interval"));
        }
        if self.pulses_per_revolution == 0 {
            return Err(ConfigError::Zero("pulses per revolution"));
        }
        if !self.wheel_diameter_cm.is_finite() || self.wheel_diameter_cm <= 0.0 {
            return Err(ConfigError::InvalidDiameter(self.wheel_diameter_cm));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Zero("idle timeout"));
        }
        if self.subscriber_capacity == 0 {
            return Err(ConfigError::Zero("subscriber capacity"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(RunConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_pulses_per_revolution() {
        let config = RunConfig {
            pulses_per_revolution: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("pulses per revolution"))
        );
    }

    #[test]
    fn rejects_nan_diameter() {
        let config = RunConfig {
            wheel_diameter_cm: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDiameter(_))
        ));
    }
}
