//! Windowed locomotion speed.
//!
//! Keeps the last `window` poses with their timestamps.  `speed` is the path
//! length across the window divided by its duration; `vx`/`vy` use the net
//! displacement, so an animal pacing back and forth is fast but goes nowhere.

use std::collections::VecDeque;

use ballnav_types::{Point2, Pose, Velocity};

/// Default number of retained pose samples.
pub const DEFAULT_WINDOW: usize = 5;

#[derive(Debug)]
pub struct VelocityEstimator {
    window: usize,
    samples: VecDeque<(u64, Point2)>,
    last: Velocity,
}

impl VelocityEstimator {
    /// `window` is clamped to at least two samples.
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            last: Velocity::default(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Most recent estimate.
    pub fn current(&self) -> Velocity {
        self.last
    }

    /// `true` once the window spans two samples.  Before that the estimate
    /// reads zero whatever the animal is doing.
    pub fn is_settled(&self) -> bool {
        self.samples.len() >= 2
    }

    /// Push the pose observed at `timestamp_ms` and return the new estimate.
    ///
    /// Samples that do not advance the clock leave the estimate unchanged.
    pub fn update(&mut self, timestamp_ms: u64, pose: &Pose) -> Velocity {
        if let Some(&(last_ts, _)) = self.samples.back() {
            if timestamp_ms <= last_ts {
                return self.last;
            }
        }
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back((timestamp_ms, pose.position()));
        self.last = self.estimate();
        self.last
    }

    /// Forget history, e.g. after the pose was teleported to a trial start.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.last = Velocity::default();
    }

    fn estimate(&self) -> Velocity {
        let (Some(&(t0, p0)), Some(&(t1, p1))) = (self.samples.front(), self.samples.back()) else {
            return Velocity::default();
        };
        if t1 <= t0 {
            return Velocity::default();
        }
        let dt = (t1 - t0) as f64 / 1_000.0;
        let path: f64 = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .map(|((_, a), (_, b))| a.distance_to(b))
            .sum();
        Velocity {
            speed: path / dt,
            vx: (p1.x - p0.x) / dt,
            vy: (p1.y - p0.y) / dt,
        }
    }
}

impl Default for VelocityEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn single_sample_is_stationary() {
        let mut est = VelocityEstimator::default();
        assert_eq!(est.update(0, &Pose::new(3.0, 4.0, 0.0)), Velocity::default());
    }

    #[test]
    fn constant_motion_gives_constant_speed() {
        let mut est = VelocityEstimator::new(3);
        let mut v = Velocity::default();
        for i in 0..10u64 {
            // 0.01 m every 10 ms = 1 m/s along x.
            v = est.update(i * 10, &Pose::new(i as f64 * 0.01, 0.0, 0.0));
        }
        assert!((v.speed - 1.0).abs() < EPS);
        assert!((v.vx - 1.0).abs() < EPS);
        assert!(v.vy.abs() < EPS);
    }

    #[test]
    fn back_and_forth_has_speed_but_no_net_velocity() {
        let mut est = VelocityEstimator::new(3);
        est.update(0, &Pose::new(0.0, 0.0, 0.0));
        est.update(100, &Pose::new(0.1, 0.0, 0.0));
        let v = est.update(200, &Pose::new(0.0, 0.0, 0.0));
        assert!((v.speed - 1.0).abs() < EPS);
        assert!(v.vx.abs() < EPS);
    }

    #[test]
    fn window_drops_old_samples() {
        let mut est = VelocityEstimator::new(2);
        est.update(0, &Pose::new(0.0, 0.0, 0.0));
        est.update(100, &Pose::new(1.0, 0.0, 0.0));
        // Animal stops; only the last two samples count.
        let v = est.update(200, &Pose::new(1.0, 0.0, 0.0));
        assert!(v.speed.abs() < EPS);
    }

    #[test]
    fn stale_timestamp_keeps_previous_estimate() {
        let mut est = VelocityEstimator::new(3);
        est.update(0, &Pose::new(0.0, 0.0, 0.0));
        let before = est.update(100, &Pose::new(0.0, 0.1, 0.0));
        let after = est.update(100, &Pose::new(5.0, 5.0, 0.0));
        assert_eq!(before, after);
    }

    #[test]
    fn reset_clears_history() {
        let mut est = VelocityEstimator::new(3);
        est.update(0, &Pose::new(0.0, 0.0, 0.0));
        est.update(100, &Pose::new(1.0, 0.0, 0.0));
        est.reset();
        assert!(!est.is_settled());
        assert_eq!(est.current(), Velocity::default());
        // The teleport itself must not register as motion.
        assert_eq!(est.update(200, &Pose::new(-3.0, 0.0, 0.0)), Velocity::default());
    }

    #[test]
    fn settles_after_two_samples() {
        let mut est = VelocityEstimator::new(4);
        assert!(!est.is_settled());
        est.update(0, &Pose::new(0.0, 0.0, 0.0));
        assert!(!est.is_settled());
        // A stale sample does not count.
        est.update(0, &Pose::new(1.0, 0.0, 0.0));
        assert!(!est.is_settled());
        est.update(10, &Pose::new(0.0, 0.0, 0.0));
        assert!(est.is_settled());
    }
}
