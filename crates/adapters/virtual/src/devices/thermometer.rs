//! Virtual room thermometer.

/// Ticks in one simulated day at the default five-minute cadence.
const TICKS_PER_DAY: f64 = 288.0;

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualThermometer {
    pub room: String,
    base: f64,
    amplitude: f64,
    phase: f64,
}

impl VirtualThermometer {
    /// A thermometer oscillating ±1.5 °C around `base` over a simulated day.
    #[must_use]
    pub fn new(room: impl Into<String>, base: f64, phase: f64) -> Self {
        Self {
            room: room.into(),
            base,
            amplitude: 1.5,
            phase,
        }
    }

    /// Reading at `tick`, rounded to a tenth of a degree.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn reading(&self, tick: u64) -> f64 {
        let angle = std::f64::consts::TAU * (tick as f64 / TICKS_PER_DAY) + self.phase;
        let value = self.base + self.amplitude * angle.sin();
        (value * 10.0).round() / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_read_base_at_zero_phase_start() {
        let thermometer = VirtualThermometer::new("lounge", 20.0, 0.0);
        assert!((thermometer.reading(0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_stay_within_amplitude() {
        let thermometer = VirtualThermometer::new("office", 21.0, 1.0);
        for tick in 0..300 {
            let value = thermometer.reading(tick);
            assert!((19.5..=22.5).contains(&value), "{value} out of range");
        }
    }

    #[test]
    fn should_repeat_daily() {
        let thermometer = VirtualThermometer::new("bedroom", 18.0, 0.5);
        assert!((thermometer.reading(7) - thermometer.reading(7 + 288)).abs() < 0.11);
    }
}
