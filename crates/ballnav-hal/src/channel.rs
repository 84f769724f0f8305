//! Generic `DutyCycleChannel` trait for PWM-driven stimulus outputs (odor
//! valves, speaker volume, LEDs).

use ballnav_types::NavError;

/// One stimulus delivery channel driven by a duty cycle in `[0, 100]` %.
pub trait DutyCycleChannel: Send + Sync {
    /// Channel number, matching [`OdorSource::channel`][ballnav_types::OdorSource].
    fn channel(&self) -> u8;

    /// Drive the channel at `percent`.  Callers guarantee `0 ≤ percent ≤ 100`.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::HardwareFault`] if the command cannot be applied.
    fn set_duty_cycle(&mut self, percent: f64) -> Result<(), NavError>;

    /// The most recently applied duty cycle.
    fn duty_cycle(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockChannel {
        channel: u8,
        percent: f64,
    }

    impl DutyCycleChannel for MockChannel {
        fn channel(&self) -> u8 {
            self.channel
        }

        fn set_duty_cycle(&mut self, percent: f64) -> Result<(), NavError> {
            self.percent = percent;
            Ok(())
        }

        fn duty_cycle(&self) -> f64 {
            self.percent
        }
    }

    #[test]
    fn mock_channel_records_duty_cycle() {
        let mut ch = MockChannel { channel: 3, percent: 0.0 };
        assert_eq!(ch.channel(), 3);
        ch.set_duty_cycle(42.5).unwrap();
        assert!((ch.duty_cycle() - 42.5).abs() < f64::EPSILON);
        ch.set_duty_cycle(0.0).unwrap();
        assert_eq!(ch.duty_cycle(), 0.0);
    }
}
