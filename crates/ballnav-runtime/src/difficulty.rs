//! Adaptive difficulty.
//!
//! [`DifficultyState`] is a plain value: [`DifficultyState::apply`] takes a
//! trial outcome and returns the next state without touching anything else.
//! Consecutive rewards build a streak; when the streak reaches
//! [`DifficultyRamp::streak_threshold`] the reward zone shrinks and moves away
//! from the start position, and the streak starts over.
//!
//! ```rust
//! use ballnav_runtime::difficulty::{DifficultyRamp, DifficultyState};
//! use ballnav_types::{Point2, TrialOutcome};
//!
//! let ramp = DifficultyRamp { streak_threshold: 2, radius_step: 0.01, ..Default::default() };
//! let mut state = DifficultyState::new(Point2::new(0.0, 0.0), Point2::new(0.3, 0.0), 0.1);
//!
//! state = state.apply(TrialOutcome::Reward, &ramp);
//! assert_eq!(state.reward_radius, 0.1);
//! state = state.apply(TrialOutcome::Reward, &ramp);
//! assert!(state.reward_radius < 0.1);
//! ```

use ballnav_types::{Point2, TrialOutcome};
use serde::{Deserialize, Serialize};
use tracing::info;

/// How the task gets harder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyRamp {
    /// Consecutive rewards needed for one step.
    pub streak_threshold: u32,
    /// Reward radius decrease per step (m).
    pub radius_step: f64,
    pub min_radius: f64,
    /// Distance the reward center moves away from the start per step (m).
    pub center_step: f64,
    /// Upper bound on the center's distance from the start (m).
    pub max_center_distance: f64,
}

impl Default for DifficultyRamp {
    fn default() -> Self {
        Self {
            streak_threshold: 3,
            radius_step: 0.01,
            min_radius: 0.02,
            center_step: 0.0,
            max_center_distance: 0.7,
        }
    }
}

/// Current reward zone and the success streak that moves it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyState {
    pub consecutive_successes: u32,
    pub reward_center: Point2,
    pub reward_radius: f64,
    /// Number of ramp steps taken so far.
    pub level: u32,
    /// Reference point the center is pushed away from.
    pub start: Point2,
}

impl DifficultyState {
    pub fn new(start: Point2, reward_center: Point2, reward_radius: f64) -> Self {
        Self {
            consecutive_successes: 0,
            reward_center,
            reward_radius,
            level: 0,
            start,
        }
    }

    /// Next state after a trial ended with `outcome`.
    ///
    /// Abort breaks the streak.  Punish, Timeout and SessionTerminated leave
    /// it alone.
    #[must_use]
    pub fn apply(&self, outcome: TrialOutcome, ramp: &DifficultyRamp) -> DifficultyState {
        let mut next = *self;
        match outcome {
            TrialOutcome::Reward => {
                next.consecutive_successes += 1;
                if next.consecutive_successes >= ramp.streak_threshold.max(1) {
                    next.step_up(ramp);
                }
            }
            TrialOutcome::Abort => next.consecutive_successes = 0,
            TrialOutcome::Punish | TrialOutcome::Timeout | TrialOutcome::SessionTerminated => {}
        }
        next
    }

    fn step_up(&mut self, ramp: &DifficultyRamp) {
        self.consecutive_successes = 0;
        self.level += 1;
        self.reward_radius = (self.reward_radius - ramp.radius_step).max(ramp.min_radius);

        let offset_x = self.reward_center.x - self.start.x;
        let offset_y = self.reward_center.y - self.start.y;
        let distance = offset_x.hypot(offset_y);
        // A center sitting on the start has no direction to move in.
        if distance > f64::EPSILON && distance < ramp.max_center_distance {
            let target = (distance + ramp.center_step).min(ramp.max_center_distance);
            let scale = target / distance;
            self.reward_center = Point2::new(
                self.start.x + offset_x * scale,
                self.start.y + offset_y * scale,
            );
        }

        info!(
            level = self.level,
            radius = self.reward_radius,
            center_x = self.reward_center.x,
            center_y = self.reward_center.y,
            "difficulty increased"
        );
    }
}
