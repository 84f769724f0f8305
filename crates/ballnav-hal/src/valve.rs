//! Generic `RewardValve` trait for liquid reward delivery hardware.
//!
//! Drivers implement this trait and register themselves with a
//! [`HardwareRegistry`][crate::registry::HardwareRegistry].  The task logic
//! only ever issues [`ActuatorCommand::DeliverReward`][ballnav_types::ActuatorCommand]
//! and never learns how the valve is opened.

use ballnav_types::NavError;

/// A reward valve bound to one response port.
pub trait RewardValve: Send + Sync {
    /// Stable identifier for this valve, e.g. `"valve_1"`.
    fn id(&self) -> &str;

    /// The response port this valve feeds.
    fn port(&self) -> u8;

    /// Submit a delivery of `amount` (µl).  Must return as soon as the
    /// command is accepted; completion is the driver's business.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::HardwareFault`] if the command is rejected (valve
    /// still busy, board disconnected, amount out of calibration range).
    fn deliver(&mut self, amount: f64) -> Result<(), NavError>;

    /// `true` when the valve can accept a new delivery.
    fn is_ready(&self) -> bool;

    /// Total amount delivered since the driver was created.
    fn total_delivered(&self) -> f64;
}
