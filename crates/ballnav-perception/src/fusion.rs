//! Dual-sensor motion fusion.
//!
//! Two optical sensors look at the treadmill ball from different yaw angles
//! `φz1`, `φz2` and a common inclination `φy` above the ball's equator.  Each
//! sensor reports a lateral count `dx` and a rolling count `dy`.
//!
//! A yaw rotation of the ball shows up on both lateral axes, but each lateral
//! axis is also contaminated by the translation the *other* sensor sees on
//! its rolling axis.  Per tick:
//!
//! ```text
//! c1 = dy2 · sin²φz1                    c2 = dy1 · sin²φz2
//! s1 = (dx1 − c1) / sin²φz1             s2 = (dx2 − c2) / sin²φz2
//! dθ = ½ (s1 + s2) · k_rot              θ += dθ
//!
//! [cosφz1 sinφz1] [fx]   [dy1]
//! [cosφz2 sinφz2] [fy] = [dy2] / cosφy        (det = sin(φz2 − φz1))
//!
//! Δx = fx cosθ − fy sinθ                Δy = fx sinθ + fy cosθ
//! ```
//!
//! where `k_rot = meters_per_count / ball_radius_m`.  Singular geometries
//! (`sin²φz = 0`, parallel sensors, `cosφy = 0`) are rejected by
//! [`MotionFusion::new`], so `integrate` never divides by zero.
//!
//! # Example
//!
//! ```rust
//! use ballnav_perception::fusion::{FusionOutcome, MotionFusion, SensorGeometry};
//! use ballnav_types::{PoseDelta, SensorReading, SensorSample};
//!
//! let mut fusion = MotionFusion::new(SensorGeometry::default()).unwrap();
//! let still = SensorSample::new(0, SensorReading::new(0.0, 0.0), SensorReading::new(0.0, 0.0));
//! assert_eq!(fusion.integrate(&still), FusionOutcome::Updated(PoseDelta::ZERO));
//! ```

use ballnav_types::{NavError, Pose, PoseDelta, SensorReading, SensorSample};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Smallest `sin²`, `|det|` or `|cosφy|` accepted for a mounting geometry.
const SINGULARITY_EPS: f64 = 1e-6;

/// Fixed mounting geometry of the two sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorGeometry {
    /// Yaw mounting angle of each sensor around the ball (degrees).
    pub mounting_deg: [f64; 2],
    /// Inclination of both sensors above the ball's equator (degrees).
    pub inclination_deg: f64,
    /// Surface displacement per sensor count (metres).
    pub meters_per_count: f64,
    pub ball_radius_m: f64,
}

impl Default for SensorGeometry {
    fn default() -> Self {
        Self {
            mounting_deg: [45.0, 135.0],
            inclination_deg: 45.0,
            // 1000 cpi optical sensor.
            meters_per_count: 2.54e-5,
            ball_radius_m: 0.1,
        }
    }
}

/// Why a tick could not update the pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    /// The sensor collaborator produced no sample at all.
    NoSample,
    /// One sensor did not answer.
    SensorTimeout { sensor: usize },
    /// One sensor reported NaN or infinity.
    NonFinite { sensor: usize },
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradedReason::NoSample => write!(f, "no motion sample"),
            DegradedReason::SensorTimeout { sensor } => write!(f, "sensor {sensor} timed out"),
            DegradedReason::NonFinite { sensor } => {
                write!(f, "sensor {sensor} reported a non-finite value")
            }
        }
    }
}

/// Result of one [`MotionFusion::integrate`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FusionOutcome {
    /// The pose advanced by this delta.
    Updated(PoseDelta),
    /// The pose was held unchanged.
    Degraded(DegradedReason),
}

impl FusionOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, FusionOutcome::Degraded(_))
    }
}

/// Integrates dual-sensor readings into a running [`Pose`].
///
/// The pose is owned here; everything else reads copies via
/// [`MotionFusion::pose`].
#[derive(Debug)]
pub struct MotionFusion {
    geometry: SensorGeometry,
    sin2: [f64; 2],
    sin_z: [f64; 2],
    cos_z: [f64; 2],
    det: f64,
    cos_incl: f64,
    radians_per_count: f64,
    pose: Pose,
    degraded_ticks: u64,
}

impl MotionFusion {
    /// Validate `geometry` and build a fusion engine at the origin.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::Config`] for a singular or non-physical geometry.
    pub fn new(geometry: SensorGeometry) -> Result<Self, NavError> {
        let phi = geometry.mounting_deg.map(f64::to_radians);
        let sin_z = phi.map(f64::sin);
        let cos_z = phi.map(f64::cos);
        let sin2 = sin_z.map(|s| s * s);

        for (i, s2) in sin2.iter().enumerate() {
            if !s2.is_finite() || *s2 < SINGULARITY_EPS {
                return Err(NavError::Config(format!(
                    "sensor {i} mounting angle {}° is singular (sin² = 0)",
                    geometry.mounting_deg[i]
                )));
            }
        }

        let det = cos_z[0] * sin_z[1] - sin_z[0] * cos_z[1];
        if det.abs() < SINGULARITY_EPS {
            return Err(NavError::Config(format!(
                "sensor mounting angles {}° and {}° are parallel",
                geometry.mounting_deg[0], geometry.mounting_deg[1]
            )));
        }

        let cos_incl = geometry.inclination_deg.to_radians().cos();
        if !cos_incl.is_finite() || cos_incl.abs() < SINGULARITY_EPS {
            return Err(NavError::Config(format!(
                "sensor inclination {}° is singular",
                geometry.inclination_deg
            )));
        }

        if !(geometry.meters_per_count.is_finite() && geometry.meters_per_count > 0.0) {
            return Err(NavError::Config(format!(
                "meters_per_count must be positive, got {}",
                geometry.meters_per_count
            )));
        }
        if !(geometry.ball_radius_m.is_finite() && geometry.ball_radius_m > 0.0) {
            return Err(NavError::Config(format!(
                "ball_radius_m must be positive, got {}",
                geometry.ball_radius_m
            )));
        }

        Ok(Self {
            radians_per_count: geometry.meters_per_count / geometry.ball_radius_m,
            geometry,
            sin2,
            sin_z,
            cos_z,
            det,
            cos_incl,
            pose: Pose::default(),
            degraded_ticks: 0,
        })
    }

    pub fn geometry(&self) -> &SensorGeometry {
        &self.geometry
    }

    /// Current pose (copy).
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Number of ticks that held the pose because of a bad sample.
    pub fn degraded_ticks(&self) -> u64 {
        self.degraded_ticks
    }

    /// Teleport to `pose`, e.g. the start position of a new trial.
    pub fn reset_to(&mut self, pose: Pose) {
        self.pose = pose;
    }

    /// Integrate one tick of raw readings.
    ///
    /// A missing or non-finite reading holds the pose and returns
    /// [`FusionOutcome::Degraded`]; zero motion is never substituted.
    pub fn integrate(&mut self, sample: &SensorSample) -> FusionOutcome {
        let readings = match Self::check(sample) {
            Ok(r) => r,
            Err(reason) => return self.degrade(reason),
        };
        let delta = self.delta_for(readings);
        self.pose.x += delta.dx;
        self.pose.y += delta.dy;
        trace!(?delta, pose = ?self.pose, "pose integrated");
        FusionOutcome::Updated(delta)
    }

    /// Record a tick for which no sample arrived at all.
    pub fn hold(&mut self) -> FusionOutcome {
        self.degrade(DegradedReason::NoSample)
    }

    fn degrade(&mut self, reason: DegradedReason) -> FusionOutcome {
        self.degraded_ticks += 1;
        warn!(%reason, degraded_ticks = self.degraded_ticks, "holding pose for degraded tick");
        FusionOutcome::Degraded(reason)
    }

    fn check(sample: &SensorSample) -> Result<[SensorReading; 2], DegradedReason> {
        let mut out = [SensorReading::default(); 2];
        for (i, slot) in sample.sensors.iter().enumerate() {
            match slot {
                None => return Err(DegradedReason::SensorTimeout { sensor: i }),
                Some(r) if !r.is_finite() => return Err(DegradedReason::NonFinite { sensor: i }),
                Some(r) => out[i] = *r,
            }
        }
        Ok(out)
    }

    /// Rotation is applied to `self.pose.theta` here; translation is returned
    /// in the world frame for the caller to accumulate.
    fn delta_for(&mut self, [r1, r2]: [SensorReading; 2]) -> PoseDelta {
        let contamination = [r2.dy * self.sin2[0], r1.dy * self.sin2[1]];
        let step1 = (r1.dx - contamination[0]) / self.sin2[0];
        let step2 = (r2.dx - contamination[1]) / self.sin2[1];
        let dtheta = 0.5 * (step1 + step2) * self.radians_per_count;
        self.pose.theta += dtheta;

        let b1 = r1.dy / self.cos_incl;
        let b2 = r2.dy / self.cos_incl;
        let fx = (b1 * self.sin_z[1] - self.sin_z[0] * b2) / self.det * self.geometry.meters_per_count;
        let fy = (self.cos_z[0] * b2 - b1 * self.cos_z[1]) / self.det * self.geometry.meters_per_count;

        let (sin_t, cos_t) = self.pose.theta.sin_cos();
        PoseDelta {
            dx: fx * cos_t - fy * sin_t,
            dy: fx * sin_t + fy * cos_t,
            dtheta,
        }
    }
}
