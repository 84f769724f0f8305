//! Session configuration.
//!
//! Everything the engine needs is fixed at session start and lives in one
//! [`SessionConfig`].  All fields have serde defaults, so a TOML file only
//! has to name what it changes:
//!
//! ```toml
//! extinction_factor = 2.0
//!
//! [task]
//! trial_duration_ms = 45000
//! ```
//!
//! [`SessionConfig::validate`] rejects inconsistent settings before the tick
//! loop starts.

use ballnav_perception::field::DEFAULT_FALLOFF_SCALE;
use ballnav_perception::velocity::DEFAULT_WINDOW;
use ballnav_perception::{MotionFusion, OdorField, SensorGeometry, SpatialField};
use ballnav_types::{NavError, OdorSource, Point2, Pose};
use serde::{Deserialize, Serialize};

use crate::difficulty::{DifficultyRamp, DifficultyState};

/// A circular region in which a contact counts as a response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseZone {
    pub center: Point2,
    pub radius: f64,
}

impl ResponseZone {
    pub fn contains(&self, point: &Point2) -> bool {
        self.center.distance_to(point) <= self.radius
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Side length of the square arena (m).
    pub size: f64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self { size: 1.0 }
    }
}

/// Trial timing and the geometry of rewarded and punished responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub trial_duration_ms: u64,
    pub intertrial_duration_ms: u64,
    /// Time spent in Reward before InterTrial; 0 leaves on the next tick.
    pub reward_duration_ms: u64,
    pub punish_duration_ms: u64,
    pub abort_duration_ms: u64,
    /// Speed below which the animal counts as stationary (m/s).
    pub velocity_threshold: f64,
    /// Pose every trial starts from.
    pub start_pose: Pose,
    /// Contacts this close to the start never punish or abort.
    pub start_exclusion_radius: f64,
    pub response_zones: Vec<ResponseZone>,
    pub reward_center: Point2,
    pub reward_radius: f64,
    pub reward_port: u8,
    /// Reward volume per delivery (µl).
    pub reward_amount: f64,
    /// Multiply the punish timeout by the number of consecutive punishments.
    pub incremental_punishment: bool,
    /// Restart the inter-trial timer on every contact.
    pub noresponse_intertrial: bool,
    /// Time the animal must hold the start location before a trial begins.
    pub init_ready_ms: u64,
    /// Distance from `start_pose` that counts as holding the start.
    pub init_radius: f64,
    /// Time spent inside a zone before a contact there is scored.
    pub trial_ready_ms: u64,
    /// End the session once this much reward (µl) has been delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reward: Option<f64>,
    /// End the session at the first inter-trial after this long.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_duration_ms: Option<u64>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            trial_duration_ms: 30_000,
            intertrial_duration_ms: 1_000,
            reward_duration_ms: 0,
            punish_duration_ms: 1_000,
            abort_duration_ms: 0,
            velocity_threshold: 0.025,
            start_pose: Pose::new(0.5, 0.5, 0.0),
            start_exclusion_radius: 0.05,
            response_zones: vec![
                ResponseZone {
                    center: Point2::new(0.2, 0.2),
                    radius: 0.1,
                },
                ResponseZone {
                    center: Point2::new(0.8, 0.8),
                    radius: 0.1,
                },
            ],
            reward_center: Point2::new(0.8, 0.8),
            reward_radius: 0.1,
            reward_port: 1,
            reward_amount: 4.0,
            incremental_punishment: true,
            noresponse_intertrial: false,
            init_ready_ms: 0,
            init_radius: 0.1,
            trial_ready_ms: 0,
            max_reward: None,
            session_duration_ms: None,
        }
    }
}

/// Root configuration for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fixed tick period of the host loop.
    pub tick_period_ms: u64,
    /// Motion sensor silence that raises a stall alert.
    pub sensor_timeout_ms: u64,
    pub arena: ArenaConfig,
    pub geometry: SensorGeometry,
    pub sources: Vec<OdorSource>,
    pub extinction_factor: f64,
    pub falloff_scale: f64,
    /// Pose samples used for the speed estimate.
    pub velocity_window: usize,
    pub task: TaskConfig,
    pub difficulty: DifficultyRamp,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 10,
            sensor_timeout_ms: 500,
            arena: ArenaConfig::default(),
            geometry: SensorGeometry::default(),
            sources: vec![
                OdorSource {
                    id: 1,
                    position: Point2::new(0.2, 0.2),
                    channel: 1,
                },
                OdorSource {
                    id: 2,
                    position: Point2::new(0.8, 0.8),
                    channel: 2,
                },
            ],
            extinction_factor: 1.0,
            falloff_scale: DEFAULT_FALLOFF_SCALE,
            velocity_window: DEFAULT_WINDOW,
            task: TaskConfig::default(),
            difficulty: DifficultyRamp::default(),
        }
    }
}

impl SessionConfig {
    /// Check every setting the engine depends on.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), NavError> {
        if self.tick_period_ms == 0 {
            return Err(NavError::Config("tick_period_ms must be at least 1".into()));
        }
        if self.velocity_window < 2 {
            return Err(NavError::Config(format!(
                "velocity_window must be at least 2, got {}",
                self.velocity_window
            )));
        }
        MotionFusion::new(self.geometry.clone())?;
        self.odor_field()?;
        self.validate_task()?;
        self.validate_ramp()
    }

    /// The odor layer described by this config.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::Config`] for an invalid arena, falloff or source set.
    pub fn odor_field(&self) -> Result<OdorField, NavError> {
        let field = SpatialField::new(self.arena.size, self.falloff_scale)?;
        OdorField::new(field, self.sources.clone(), self.extinction_factor)
    }

    /// Difficulty at the start of the session.
    pub fn initial_difficulty(&self) -> DifficultyState {
        DifficultyState::new(
            self.task.start_pose.position(),
            self.task.reward_center,
            self.task.reward_radius,
        )
    }

    fn validate_task(&self) -> Result<(), NavError> {
        let task = &self.task;
        if task.trial_duration_ms == 0 {
            return Err(NavError::Config("trial_duration_ms must be positive".into()));
        }
        if !(task.velocity_threshold.is_finite() && task.velocity_threshold >= 0.0) {
            return Err(NavError::Config(format!(
                "velocity_threshold must be a non-negative number, got {}",
                task.velocity_threshold
            )));
        }
        if !(task.reward_radius.is_finite() && task.reward_radius > 0.0) {
            return Err(NavError::Config(format!(
                "reward_radius must be positive, got {}",
                task.reward_radius
            )));
        }
        if !(task.reward_amount.is_finite() && task.reward_amount > 0.0) {
            return Err(NavError::Config(format!(
                "reward_amount must be positive, got {}",
                task.reward_amount
            )));
        }
        if !(task.start_exclusion_radius.is_finite() && task.start_exclusion_radius >= 0.0) {
            return Err(NavError::Config(
                "start_exclusion_radius must be non-negative".into(),
            ));
        }
        if !(task.init_radius.is_finite() && task.init_radius > 0.0) {
            return Err(NavError::Config(format!(
                "init_radius must be positive, got {}",
                task.init_radius
            )));
        }
        if let Some(cap) = task.max_reward
            && !(cap.is_finite() && cap > 0.0)
        {
            return Err(NavError::Config(format!(
                "max_reward must be positive when set, got {cap}"
            )));
        }
        if task.session_duration_ms == Some(0) {
            return Err(NavError::Config(
                "session_duration_ms must be positive when set".into(),
            ));
        }
        if let Some(zone) = task
            .response_zones
            .iter()
            .find(|z| !(z.radius.is_finite() && z.radius > 0.0))
        {
            return Err(NavError::Config(format!(
                "response zone at ({}, {}) has invalid radius {}",
                zone.center.x, zone.center.y, zone.radius
            )));
        }
        Ok(())
    }

    fn validate_ramp(&self) -> Result<(), NavError> {
        let ramp = &self.difficulty;
        if ramp.streak_threshold == 0 {
            return Err(NavError::Config("streak_threshold must be at least 1".into()));
        }
        for (name, value) in [
            ("radius_step", ramp.radius_step),
            ("center_step", ramp.center_step),
            ("max_center_distance", ramp.max_center_distance),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(NavError::Config(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        if !(ramp.min_radius.is_finite() && ramp.min_radius > 0.0) {
            return Err(NavError::Config(format!(
                "min_radius must be positive, got {}",
                ramp.min_radius
            )));
        }
        if ramp.min_radius > self.task.reward_radius {
            return Err(NavError::Config(format!(
                "min_radius {} exceeds the initial reward_radius {}",
                ramp.min_radius, self.task.reward_radius
            )));
        }
        Ok(())
    }
}
