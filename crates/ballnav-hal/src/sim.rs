//! In-process simulation drivers for CI and dry runs without a rig.
//!
//! [`SimRegistry`] builds a [`HardwareRegistry`] pre-populated with stub
//! valves and channels that record every command.  [`ScriptedMotionSensor`]
//! and [`ScriptedResponses`] replay pre-recorded input so that whole sessions
//! can run headless.
//!
//! # Example
//!
//! ```rust
//! use ballnav_hal::sim::SimRegistry;
//! use ballnav_types::ActuatorCommand;
//!
//! let mut registry = SimRegistry::new()
//!     .with_valve(1)
//!     .with_channels([1, 2, 3, 4])
//!     .build();
//!
//! registry
//!     .dispatch(&ActuatorCommand::SetDutyCycle { channel: 2, percent: 35.0 })
//!     .expect("sim channel must succeed");
//! ```

use std::collections::VecDeque;

use ballnav_types::{NavError, ResponseEvent, SensorSample};

use crate::channel::DutyCycleChannel;
use crate::registry::HardwareRegistry;
use crate::sensor::{MotionSensor, ResponseSource};
use crate::valve::RewardValve;

// ────────────────────────────────────────────────────────────────────────────
// Stub valve
// ────────────────────────────────────────────────────────────────────────────

/// A simulated reward valve that accumulates delivered amounts.
pub struct SimValve {
    id: String,
    port: u8,
    ready: bool,
    total: f64,
    deliveries: usize,
}

impl SimValve {
    /// Create a ready valve on `port`.
    pub fn new(port: u8) -> Box<Self> {
        Box::new(Self {
            id: format!("sim_valve_{port}"),
            port,
            ready: true,
            total: 0.0,
            deliveries: 0,
        })
    }

    /// Create a valve that reports itself as not ready and rejects deliveries.
    pub fn not_ready(port: u8) -> Box<Self> {
        let mut valve = Self::new(port);
        valve.ready = false;
        valve
    }

    /// Number of accepted deliveries.
    pub fn deliveries(&self) -> usize {
        self.deliveries
    }
}

impl RewardValve for SimValve {
    fn id(&self) -> &str {
        &self.id
    }

    fn port(&self) -> u8 {
        self.port
    }

    fn deliver(&mut self, amount: f64) -> Result<(), NavError> {
        if !self.ready {
            return Err(NavError::HardwareFault {
                component: self.id.clone(),
                details: "valve not ready".to_string(),
            });
        }
        self.total += amount;
        self.deliveries += 1;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn total_delivered(&self) -> f64 {
        self.total
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub channel
// ────────────────────────────────────────────────────────────────────────────

/// A simulated PWM channel that records the last duty cycle.
pub struct SimChannel {
    channel: u8,
    percent: f64,
}

impl SimChannel {
    pub fn new(channel: u8) -> Box<Self> {
        Box::new(Self {
            channel,
            percent: 0.0,
        })
    }
}

impl DutyCycleChannel for SimChannel {
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

// ────────────────────────────────────────────────────────────────────────────
// Scripted inputs
// ────────────────────────────────────────────────────────────────────────────

/// Replays a fixed list of motion samples, one per [`read`][MotionSensor::read].
/// `None` entries simulate sensor timeouts.  Once exhausted it keeps
/// returning `None`.
#[derive(Default)]
pub struct ScriptedMotionSensor {
    samples: VecDeque<Option<SensorSample>>,
}

impl ScriptedMotionSensor {
    pub fn new(samples: impl IntoIterator<Item = Option<SensorSample>>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl MotionSensor for ScriptedMotionSensor {
    fn id(&self) -> &str {
        "scripted_motion"
    }

    fn read(&mut self) -> Option<SensorSample> {
        self.samples.pop_front().flatten()
    }
}

/// Replays response events in timestamp order.
#[derive(Default)]
pub struct ScriptedResponses {
    pending: VecDeque<ResponseEvent>,
}

impl ScriptedResponses {
    pub fn new(events: impl IntoIterator<Item = ResponseEvent>) -> Self {
        let mut pending: Vec<ResponseEvent> = events.into_iter().collect();
        pending.sort_by_key(|e| e.timestamp_ms);
        Self {
            pending: pending.into(),
        }
    }
}

impl ResponseSource for ScriptedResponses {
    fn poll(&mut self, now_ms: u64) -> Vec<ResponseEvent> {
        let mut due = Vec::new();
        while let Some(front) = self.pending.front() {
            if front.timestamp_ms > now_ms {
                break;
            }
            if let Some(event) = self.pending.pop_front() {
                due.push(event);
            }
        }
        due
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRegistry builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder that constructs a [`HardwareRegistry`] pre-populated with
/// simulated drivers.
#[derive(Default)]
pub struct SimRegistry {
    valves: Vec<Box<dyn RewardValve>>,
    channels: Vec<Box<dyn DutyCycleChannel>>,
}

impl SimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a simulated reward valve on `port`.
    pub fn with_valve(mut self, port: u8) -> Self {
        self.valves.push(SimValve::new(port));
        self
    }

    /// Register one simulated stimulus channel per entry of `channels`.
    pub fn with_channels(mut self, channels: impl IntoIterator<Item = u8>) -> Self {
        for ch in channels {
            self.channels.push(SimChannel::new(ch));
        }
        self
    }

    /// Register a custom valve driver, e.g. one that fails on purpose.
    pub fn with_custom_valve(mut self, valve: Box<dyn RewardValve>) -> Self {
        self.valves.push(valve);
        self
    }

    /// Consume the builder and return a fully configured [`HardwareRegistry`].
    pub fn build(self) -> HardwareRegistry {
        let mut registry = HardwareRegistry::new();
        for v in self.valves {
            registry.register_valve(v);
        }
        for c in self.channels {
            registry.register_channel(c);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballnav_types::{ActuatorCommand, SensorReading};

    #[test]
    fn sim_registry_dispatches_reward_and_duty_cycle() {
        let mut registry = SimRegistry::new().with_valve(1).with_channels([1, 2]).build();
        registry
            .dispatch(&ActuatorCommand::DeliverReward { port: 1, amount: 5.0 })
            .expect("sim valve must succeed");
        registry
            .dispatch(&ActuatorCommand::SetDutyCycle { channel: 2, percent: 12.0 })
            .expect("sim channel must succeed");
        assert_eq!(registry.valve(1).unwrap().total_delivered(), 5.0);
        assert_eq!(registry.channel(2).unwrap().duty_cycle(), 12.0);
    }

    #[test]
    fn not_ready_valve_rejects() {
        let mut valve = SimValve::not_ready(3);
        assert!(valve.deliver(1.0).is_err());
        assert_eq!(valve.deliveries(), 0);
    }

    #[test]
    fn scripted_sensor_replays_then_runs_dry() {
        let sample = SensorSample::new(10, SensorReading::new(1.0, 0.0), SensorReading::new(0.0, 1.0));
        let mut sensor = ScriptedMotionSensor::new([Some(sample), None]);
        assert_eq!(sensor.remaining(), 2);
        assert_eq!(sensor.read(), Some(sample));
        assert_eq!(sensor.read(), None);
        assert_eq!(sensor.read(), None);
        assert_eq!(sensor.remaining(), 0);
    }

    #[test]
    fn scripted_responses_release_due_events_only() {
        let mut responses = ScriptedResponses::new([
            ResponseEvent::lick(2, 300),
            ResponseEvent::lick(1, 100),
        ]);
        assert!(responses.poll(50).is_empty());
        let due = responses.poll(150);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].port, 1);
        let due = responses.poll(1_000);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].port, 2);
        assert!(responses.poll(2_000).is_empty());
    }
}
