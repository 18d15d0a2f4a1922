use odo_core::{tags, Reading, Sample};
use serde::{Deserialize, Serialize};

/// Keys carried by a `speed_data` message, in wire order.
pub const SPEED_DATA_TAGS: &[tags::Tag] = &[
    tags::TIMESTAMP,
    tags::RPM,
    tags::SPEED_CM_S,
    tags::DISTANCE_CM,
];

/// Keys carried by a `speed_update` message, in wire order.
pub const SPEED_UPDATE_TAGS: &[tags::Tag] =
    &[tags::TIMESTAMP, tags::SERIAL_SPEED, tags::DISTANCE_CM];

/// Pulse-path sample as sent to dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedDataMsg {
    pub timestamp: String,
    pub rpm: f64,
    pub speed_cm_per_s: f64,
    pub distance_cm: f64,
}

/// Serial-path sample as sent to dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedUpdateMsg {
    pub timestamp: String,
    pub speed: f64,
    pub distance_cm: f64,
}

/// One JSON line on the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    SpeedData(SpeedDataMsg),
    SpeedUpdate(SpeedUpdateMsg),
}

impl OutgoingMessage {
    pub fn from_sample(sample: &Sample, distance_cm: f64) -> Self {
        let timestamp = sample.formatted_timestamp();
        match sample.reading() {
            Reading::Pulse { rpm, speed_cm_s } => OutgoingMessage::SpeedData(SpeedDataMsg {
                timestamp,
                rpm,
                speed_cm_per_s: speed_cm_s,
                distance_cm,
            }),
            Reading::Serial { speed_cm_s } => OutgoingMessage::SpeedUpdate(SpeedUpdateMsg {
                timestamp,
                speed: speed_cm_s,
                distance_cm,
            }),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            OutgoingMessage::SpeedData(_) => "speed_data",
            OutgoingMessage::SpeedUpdate(_) => "speed_update",
        }
    }

    /// Serialised form with the trailing newline.
    pub fn encode_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}
