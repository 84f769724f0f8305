//! Simulated stimulus gradient.
//!
//! [`SpatialField`] maps a pose to one duty cycle per [`OdorSource`]:
//!
//! ```text
//! d       = sqrt(((|x − sx| / L)² + (|y − sy| / L)²) / 2)
//! base    = clamp(1 − d, 0, 1)
//! percent = 100 · base^(k · e)
//! ```
//!
//! with `L` the arena side length, `e` the extinction factor and `k` the
//! falloff scale.  A pose on top of a source yields exactly 100 %; poses
//! outside the arena clamp to 0 %.
//!
//! [`FieldComponent`] lets several stimulus layers share one interface;
//! [`CompositeField`] concatenates their outputs in registration order.

use ballnav_types::{ChannelIntensity, IntensityVector, NavError, OdorSource, Pose};
use serde::{Deserialize, Serialize};

/// Default falloff scale `k`.
pub const DEFAULT_FALLOFF_SCALE: f64 = 100.0;

/// Anything that turns a pose into channel intensities.
pub trait FieldComponent: Send + Sync {
    fn name(&self) -> &str;

    /// Channels this component drives, in output order.
    fn channels(&self) -> Vec<u8>;

    /// Intensities at `pose`.  Must be pure: same pose, same output.
    fn evaluate(&self, pose: &Pose) -> IntensityVector;
}

// ────────────────────────────────────────────────────────────────────────────
// Gradient math
// ────────────────────────────────────────────────────────────────────────────

/// Arena geometry plus the falloff scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialField {
    arena_size: f64,
    falloff_scale: f64,
}

impl SpatialField {
    /// # Errors
    ///
    /// Returns [`NavError::Config`] unless both values are finite and positive.
    pub fn new(arena_size: f64, falloff_scale: f64) -> Result<Self, NavError> {
        if !(arena_size.is_finite() && arena_size > 0.0) {
            return Err(NavError::Config(format!(
                "arena_size must be positive, got {arena_size}"
            )));
        }
        if !(falloff_scale.is_finite() && falloff_scale > 0.0) {
            return Err(NavError::Config(format!(
                "falloff_scale must be positive, got {falloff_scale}"
            )));
        }
        Ok(Self {
            arena_size,
            falloff_scale,
        })
    }

    pub fn arena_size(&self) -> f64 {
        self.arena_size
    }

    /// One [`ChannelIntensity`] per source, in source order.
    pub fn evaluate(
        &self,
        pose: &Pose,
        sources: &[OdorSource],
        extinction_factor: f64,
    ) -> IntensityVector {
        sources
            .iter()
            .map(|source| ChannelIntensity {
                channel: source.channel,
                percent: self.percent_at(pose, source, extinction_factor),
            })
            .collect()
    }

    fn percent_at(&self, pose: &Pose, source: &OdorSource, extinction_factor: f64) -> f64 {
        let nx = (pose.x - source.position.x).abs() / self.arena_size;
        let ny = (pose.y - source.position.y).abs() / self.arena_size;
        let d = ((nx * nx + ny * ny) / 2.0).sqrt();
        let base = 1.0 - d;
        if !base.is_finite() || base <= 0.0 {
            return 0.0;
        }
        let percent = 100.0 * base.min(1.0).powf(self.falloff_scale * extinction_factor);
        if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Components
// ────────────────────────────────────────────────────────────────────────────

/// A set of odor sources sharing one extinction factor.
#[derive(Debug, Clone)]
pub struct OdorField {
    field: SpatialField,
    sources: Vec<OdorSource>,
    extinction_factor: f64,
}

impl OdorField {
    /// # Errors
    ///
    /// Returns [`NavError::Config`] when `extinction_factor` is not positive
    /// or two sources share a channel.
    pub fn new(
        field: SpatialField,
        sources: Vec<OdorSource>,
        extinction_factor: f64,
    ) -> Result<Self, NavError> {
        if !(extinction_factor.is_finite() && extinction_factor > 0.0) {
            return Err(NavError::Config(format!(
                "extinction_factor must be positive, got {extinction_factor}"
            )));
        }
        for (i, a) in sources.iter().enumerate() {
            if let Some(b) = sources[i + 1..].iter().find(|b| b.channel == a.channel) {
                return Err(NavError::Config(format!(
                    "odor sources {} and {} both drive channel {}",
                    a.id, b.id, a.channel
                )));
            }
        }
        Ok(Self {
            field,
            sources,
            extinction_factor,
        })
    }

    pub fn sources(&self) -> &[OdorSource] {
        &self.sources
    }

    pub fn extinction_factor(&self) -> f64 {
        self.extinction_factor
    }
}

impl FieldComponent for OdorField {
    fn name(&self) -> &str {
        "odor"
    }

    fn channels(&self) -> Vec<u8> {
        self.sources.iter().map(|s| s.channel).collect()
    }

    fn evaluate(&self, pose: &Pose) -> IntensityVector {
        self.field.evaluate(pose, &self.sources, self.extinction_factor)
    }
}

/// Stack of components evaluated in order and concatenated.
#[derive(Default)]
pub struct CompositeField {
    components: Vec<Box<dyn FieldComponent>>,
}

impl CompositeField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, component: Box<dyn FieldComponent>) -> Self {
        self.components.push(component);
        self
    }

    pub fn push(&mut self, component: Box<dyn FieldComponent>) {
        self.components.push(component);
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl FieldComponent for CompositeField {
    fn name(&self) -> &str {
        "composite"
    }

    fn channels(&self) -> Vec<u8> {
        self.components.iter().flat_map(|c| c.channels()).collect()
    }

    fn evaluate(&self, pose: &Pose) -> IntensityVector {
        self.components.iter().flat_map(|c| c.evaluate(pose)).collect()
    }
}
