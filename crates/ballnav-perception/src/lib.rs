//! `ballnav-perception` – from raw sensor counts to a place in the virtual
//! world.
//!
//! # Modules
//!
//! - [`fusion`] – [`MotionFusion`][fusion::MotionFusion]: turns the two
//!   cross-coupled optical sensor streams into a drift-corrected pose
//!   increment and integrates it.
//! - [`velocity`] – [`VelocityEstimator`][velocity::VelocityEstimator]:
//!   windowed locomotion speed from successive poses.
//! - [`field`] – [`SpatialField`][field::SpatialField]: the simulated odor
//!   gradient, and [`CompositeField`][field::CompositeField] for stacking
//!   several stimulus components behind one interface.

pub mod field;
pub mod fusion;
pub mod velocity;

pub use field::{CompositeField, FieldComponent, OdorField, SpatialField};
pub use fusion::{DegradedReason, FusionOutcome, MotionFusion, SensorGeometry};
pub use velocity::VelocityEstimator;
