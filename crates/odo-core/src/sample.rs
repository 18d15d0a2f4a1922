use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp layout shared by the CSV log and the wire protocol.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Rpm,
    SpeedCmS,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Rpm => "rpm",
            Unit::SpeedCmS => "cm/s",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Reading {
    /// Computed from a closed counting window.
    Pulse { rpm: f64, speed_cm_s: f64 },
    /// Reported directly by a serial speed sensor.
    Serial { speed_cm_s: f64 },
}

/// One measurement, immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    timestamp: DateTime<Local>,
    reading: Reading,
}

impl Sample {
    pub fn pulse(timestamp: DateTime<Local>, rpm: f64, speed_cm_s: f64) -> Self {
        Self {
            timestamp,
            reading: Reading::Pulse { rpm, speed_cm_s },
        }
    }

    pub fn serial(timestamp: DateTime<Local>, speed_cm_s: f64) -> Self {
        Self {
            timestamp,
            reading: Reading::Serial { speed_cm_s },
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn reading(&self) -> Reading {
        self.reading
    }

    /// Primary value: RPM for pulse samples, speed for serial samples.
    pub fn value(&self) -> f64 {
        match self.reading {
            Reading::Pulse { rpm, .. } => rpm,
            Reading::Serial { speed_cm_s } => speed_cm_s,
        }
    }

    pub fn unit(&self) -> Unit {
        match self.reading {
            Reading::Pulse { .. } => Unit::Rpm,
            Reading::Serial { .. } => Unit::SpeedCmS,
        }
    }

    pub fn rpm(&self) -> Option<f64> {
        match self.reading {
            Reading::Pulse { rpm, .. } => Some(rpm),
            Reading::Serial { .. } => None,
        }
    }

    pub fn speed_cm_s(&self) -> f64 {
        match self.reading {
            Reading::Pulse { speed_cm_s, .. } | Reading::Serial { speed_cm_s } => speed_cm_s,
        }
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_sample_reports_rpm_as_primary_value() {
        let sample = Sample::pulse(Local::now(), 60.0, 18.85);
        assert_eq!(sample.unit(), Unit::Rpm);
        assert_eq!(sample.value(), 60.0);
        assert_eq!(sample.rpm(), Some(60.0));
        assert_eq!(sample.speed_cm_s(), 18.85);
    }

    #[test]
    fn serial_sample_has_no_rpm() {
        let sample = Sample::serial(Local::now(), 12.5);
        assert_eq!(sample.unit(), Unit::SpeedCmS);
        assert_eq!(sample.value(), 12.5);
        assert_eq!(sample.rpm(), None);
    }

    #[test]
    fn timestamp_formats_with_millis() {
        let ts = chrono::TimeZone::with_ymd_and_hms(&Local, 2024, 3, 1, 8, 30, 5).unwrap();
        let sample = Sample::serial(ts, 1.0);
        assert_eq!(sample.formatted_timestamp(), "2024-03-01 08:30:05.000");
    }
}
