#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
    pub csv_header: &'static str,
}

pub const TIMESTAMP: Tag = Tag {
    key: "timestamp",
    metric: "odometer_last_sample_unix_seconds",
    csv_header: "Timestamp",
};

pub const RPM: Tag = Tag {
    key: "rpm",
    metric: "odometer_wheel_rpm",
    csv_header: "RPM",
};

pub const SPEED_CM_S: Tag = Tag {
    key: "speed_cm_per_s",
    metric: "odometer_speed_cm_per_second",
    csv_header: "Speed (cm/s)",
};

/// Serial sensors report speed under a bare key and header.
pub const SERIAL_SPEED: Tag = Tag {
    key: "speed",
    metric: "odometer_speed_cm_per_second",
    csv_header: "Speed",
};

pub const DISTANCE_CM: Tag = Tag {
    key: "distance_cm",
    metric: "odometer_distance_cm",
    csv_header: "Distance (cm)",
};

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Tag; 5] = [TIMESTAMP, RPM, SPEED_CM_S, SERIAL_SPEED, DISTANCE_CM];

    #[test]
    fn keys_and_headers_are_unique() {
        for (i, a) in ALL.iter().enumerate() {
            for b in &ALL[i + 1..] {
                assert_ne!(a.key, b.key);
                assert_ne!(a.csv_header, b.csv_header);
            }
        }
    }

    #[test]
    fn metrics_share_the_odometer_prefix() {
        for tag in ALL {
            assert!(tag.metric.starts_with("odometer_"), "{}", tag.metric);
            assert!(!tag.csv_header.is_empty());
        }
        assert_eq!(DISTANCE_CM.csv_header, "Distance (cm)");
    }
}
