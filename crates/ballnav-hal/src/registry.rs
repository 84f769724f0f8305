//! [`HardwareRegistry`] – central driver registry and command dispatcher.
//!
//! The registry stores every registered [`RewardValve`] (keyed by response
//! port) and [`DutyCycleChannel`] (keyed by channel number).  When the tick
//! loop issues an [`ActuatorCommand`], the registry resolves the target driver
//! and forwards the call.  Failures are returned to the caller, which logs
//! them; the registry never retries.

use std::collections::BTreeMap;

use ballnav_types::{ActuatorCommand, NavError};
use tracing::{debug, instrument};

use crate::channel::DutyCycleChannel;
use crate::valve::RewardValve;

/// Central hardware driver registry and [`ActuatorCommand`] dispatcher.
#[derive(Default)]
pub struct HardwareRegistry {
    valves: BTreeMap<u8, Box<dyn RewardValve>>,
    channels: BTreeMap<u8, Box<dyn DutyCycleChannel>>,
}

impl HardwareRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a valve.  Any previously registered valve on the same port is
    /// replaced.
    pub fn register_valve(&mut self, valve: Box<dyn RewardValve>) {
        self.valves.insert(valve.port(), valve);
    }

    /// Register a stimulus channel.  Any previously registered driver with
    /// the same channel number is replaced.
    pub fn register_channel(&mut self, channel: Box<dyn DutyCycleChannel>) {
        self.channels.insert(channel.channel(), channel);
    }

    pub fn valve(&self, port: u8) -> Option<&dyn RewardValve> {
        self.valves.get(&port).map(|v| v.as_ref())
    }

    pub fn channel(&self, channel: u8) -> Option<&dyn DutyCycleChannel> {
        self.channels.get(&channel).map(|c| c.as_ref())
    }

    /// Channel numbers in ascending order.
    pub fn channel_ids(&self) -> Vec<u8> {
        self.channels.keys().copied().collect()
    }

    /// `true` when every registered valve can accept a delivery.
    pub fn is_ready(&self) -> bool {
        self.valves.values().all(|v| v.is_ready())
    }

    /// Dispatch an [`ActuatorCommand`] to the appropriate registered driver.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::HardwareFault`] when the target driver is not
    /// registered or when the underlying driver rejects the command.
    #[instrument(level = "debug", skip(self))]
    pub fn dispatch(&mut self, command: &ActuatorCommand) -> Result<(), NavError> {
        match command {
            ActuatorCommand::DeliverReward { port, amount } => match self.valves.get_mut(port) {
                Some(valve) => valve.deliver(*amount),
                None => Err(NavError::HardwareFault {
                    component: format!("port_{port}"),
                    details: format!("no reward valve registered on port {port}"),
                }),
            },

            ActuatorCommand::SetDutyCycle { channel, percent } => {
                match self.channels.get_mut(channel) {
                    Some(ch) => ch.set_duty_cycle(percent.clamp(0.0, 100.0)),
                    None => Err(NavError::HardwareFault {
                        component: format!("channel_{channel}"),
                        details: format!("stimulus channel {channel} is not registered"),
                    }),
                }
            }

            // Every channel is attempted even if an earlier one fails; the
            // first failure is reported.
            ActuatorCommand::AllChannelsOff => {
                let mut first_err = None;
                for ch in self.channels.values_mut() {
                    if let Err(e) = ch.set_duty_cycle(0.0) {
                        first_err.get_or_insert(e);
                    }
                }
                debug!(channels = self.channels.len(), "all stimulus channels off");
                match first_err {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimChannel, SimValve};

    struct BrokenChannel;

    impl DutyCycleChannel for BrokenChannel {
        fn channel(&self) -> u8 {
            9
        }

        fn set_duty_cycle(&mut self, _percent: f64) -> Result<(), NavError> {
            Err(NavError::HardwareFault {
                component: "channel_9".to_string(),
                details: "PWM board offline".to_string(),
            })
        }

        fn duty_cycle(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn dispatch_reward_reaches_valve() {
        let mut registry = HardwareRegistry::new();
        registry.register_valve(SimValve::new(1));

        registry
            .dispatch(&ActuatorCommand::DeliverReward { port: 1, amount: 8.0 })
            .unwrap();

        let delivered = registry.valve(1).unwrap().total_delivered();
        assert!((delivered - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dispatch_reward_to_missing_port_returns_error() {
        let mut registry = HardwareRegistry::new();
        let result = registry.dispatch(&ActuatorCommand::DeliverReward { port: 4, amount: 1.0 });
        assert!(matches!(result, Err(NavError::HardwareFault { .. })));
    }

    #[test]
    fn dispatch_duty_cycle_is_clamped() {
        let mut registry = HardwareRegistry::new();
        registry.register_channel(SimChannel::new(2));

        registry
            .dispatch(&ActuatorCommand::SetDutyCycle { channel: 2, percent: 140.0 })
            .unwrap();
        assert_eq!(registry.channel(2).unwrap().duty_cycle(), 100.0);
    }

    #[test]
    fn all_channels_off_zeroes_every_channel() {
        let mut registry = HardwareRegistry::new();
        registry.register_channel(SimChannel::new(1));
        registry.register_channel(SimChannel::new(2));
        for ch in [1, 2] {
            registry
                .dispatch(&ActuatorCommand::SetDutyCycle { channel: ch, percent: 50.0 })
                .unwrap();
        }

        registry.dispatch(&ActuatorCommand::AllChannelsOff).unwrap();
        assert_eq!(registry.channel(1).unwrap().duty_cycle(), 0.0);
        assert_eq!(registry.channel(2).unwrap().duty_cycle(), 0.0);
    }

    #[test]
    fn all_channels_off_reports_fault_but_reaches_healthy_channels() {
        let mut registry = HardwareRegistry::new();
        registry.register_channel(SimChannel::new(1));
        registry.register_channel(Box::new(BrokenChannel));
        registry
            .dispatch(&ActuatorCommand::SetDutyCycle { channel: 1, percent: 30.0 })
            .unwrap();

        let result = registry.dispatch(&ActuatorCommand::AllChannelsOff);
        assert!(result.is_err());
        assert_eq!(registry.channel(1).unwrap().duty_cycle(), 0.0);
    }

    #[test]
    fn re_registering_valve_replaces_old_driver() {
        let mut registry = HardwareRegistry::new();
        registry.register_valve(SimValve::new(1));
        registry
            .dispatch(&ActuatorCommand::DeliverReward { port: 1, amount: 3.0 })
            .unwrap();

        registry.register_valve(SimValve::new(1));
        assert_eq!(registry.valve(1).unwrap().total_delivered(), 0.0);
    }

    #[test]
    fn registry_ready_requires_all_valves_ready() {
        let mut registry = HardwareRegistry::new();
        assert!(registry.is_ready());
        registry.register_valve(SimValve::new(1));
        assert!(registry.is_ready());
        registry.register_valve(SimValve::not_ready(2));
        assert!(!registry.is_ready());
    }

    #[test]
    fn channel_ids_are_sorted() {
        let mut registry = HardwareRegistry::new();
        registry.register_channel(SimChannel::new(4));
        registry.register_channel(SimChannel::new(1));
        registry.register_channel(SimChannel::new(3));
        assert_eq!(registry.channel_ids(), vec![1, 3, 4]);
    }
}
