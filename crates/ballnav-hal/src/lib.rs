//! `ballnav-hal` – Hardware Abstraction Layer.
//!
//! The tick loop only ever talks to the traits defined here, so rig drivers
//! (serial valve boards, PWM odor controllers, optical mouse sensors, lick
//! detectors) can be swapped without touching the task logic.
//!
//! # Modules
//!
//! - [`valve`] – [`RewardValve`][valve::RewardValve]: liquid reward delivery.
//! - [`channel`] – [`DutyCycleChannel`][channel::DutyCycleChannel]: PWM
//!   stimulus channels (odor valves, tone volume).
//! - [`sensor`] – [`MotionSensor`][sensor::MotionSensor] and
//!   [`ResponseSource`][sensor::ResponseSource]: the input side of the rig.
//! - [`registry`] – [`HardwareRegistry`][registry::HardwareRegistry]: routes
//!   [`ActuatorCommand`][ballnav_types::ActuatorCommand]s to drivers.
//! - [`sim`] – in-process stand-ins for every trait, for CI and dry runs.

pub mod channel;
pub mod registry;
pub mod sensor;
pub mod sim;
pub mod valve;

pub use channel::DutyCycleChannel;
pub use registry::HardwareRegistry;
pub use sensor::{MotionSensor, ResponseSource};
pub use sim::{ScriptedMotionSensor, ScriptedResponses, SimChannel, SimRegistry, SimValve};
pub use valve::RewardValve;
