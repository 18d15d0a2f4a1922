use crate::sample::Sample;
use chrono::{DateTime, Local};

/// Running distance integrated from consecutive speed samples.
#[derive(Debug, Clone, Default)]
pub struct Odometer {
    distance_cm: f64,
    last: Option<DateTime<Local>>,
}

impl Odometer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `speed * dt` since the previous sample; the first sample adds
    /// nothing. Out-of-order timestamps contribute zero.
    pub fn advance(&mut self, sample: &Sample) -> f64 {
        let now = sample.timestamp();
        if let Some(last) = self.last {
            let dt_s = (now - last).num_microseconds().unwrap_or(0).max(0) as f64 / 1e6;
            self.distance_cm += sample.speed_cm_s() * dt_s;
        }
        self.last = Some(now);
        self.distance_cm
    }

    pub fn distance_cm(&self) -> f64 {
        self.distance_cm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn integrates_speed_over_time() {
        let t0 = Local::now();
        let mut odo = Odometer::new();
        assert_eq!(odo.advance(&Sample::serial(t0, 10.0)), 0.0);
        assert_eq!(odo.advance(&Sample::serial(t0 + Duration::seconds(1), 10.0)), 10.0);
        assert_eq!(odo.advance(&Sample::serial(t0 + Duration::seconds(3), 5.0)), 20.0);
        assert_eq!(odo.distance_cm(), 20.0);
    }

    #[test]
    fn ignores_backwards_clock() {
        let t0 = Local::now();
        let mut odo = Odometer::new();
        odo.advance(&Sample::serial(t0, 10.0));
        assert_eq!(odo.advance(&Sample::serial(t0 - Duration::seconds(1), 10.0)), 0.0);
    }
}
