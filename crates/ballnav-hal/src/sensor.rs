//! Input-side hardware traits: the dual optical motion sensor and the
//! response (lick / proximity) ports.

use ballnav_types::{ResponseEvent, SensorSample};

/// The pair of optical sensors reading the treadmill surface.
pub trait MotionSensor: Send {
    /// Stable identifier, e.g. `"ball_mice"`.
    fn id(&self) -> &str;

    /// Read the displacement accumulated since the previous call.
    ///
    /// Returns `None` when no sample is available this tick (device timeout).
    /// Individual sensors that did not answer are `None` inside the sample.
    fn read(&mut self) -> Option<SensorSample>;
}

/// Discrete response events from lick and proximity ports.
pub trait ResponseSource: Send {
    /// Return every event that occurred at or before `now_ms` and has not been
    /// returned yet, oldest first.
    fn poll(&mut self, now_ms: u64) -> Vec<ResponseEvent>;
}
