//! [`TickDriver`] – the per-tick orchestrator.
//!
//! Each call to [`TickDriver::tick`] runs one full cycle, in order:
//!
//! 1. **Cancel** – read the shared stop flag.
//! 2. **Fuse** – integrate the motion sample into the pose, or hold the pose
//!    and flag the tick as degraded.
//! 3. **Speed** – update the windowed velocity estimate.
//! 4. **Stimulus** – evaluate the field at the new pose; duty cycles are sent
//!    only while a trial is running.
//! 5. **Decide** – step the [`NavigationStateMachine`].
//! 6. **Reset** – teleport the pose if a new trial asked for it.
//! 7. **Act** – dispatch every command through the [`HardwareRegistry`].
//!    Faults are logged and published, never retried.
//! 8. **Publish** – transitions, sealed records and telemetry go out on the
//!    [`EventBus`].
//!
//! Commands produced in tick N are dispatched before tick N returns, so tick
//! N+1 can never double-trigger a reward.
//!
//! # Example
//!
//! ```rust
//! use ballnav_hal::SimRegistry;
//! use ballnav_middleware::EventBus;
//! use ballnav_runtime::config::SessionConfig;
//! use ballnav_runtime::tick_driver::{TickDriver, TickInput};
//!
//! let registry = SimRegistry::new().with_valve(1).with_channels([1, 2]).build();
//! let mut driver = TickDriver::new(SessionConfig::default(), registry, EventBus::default())?;
//! let report = driver.tick(TickInput::idle(0))?;
//! assert!(report.degraded);
//! # Ok::<(), ballnav_types::NavError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use ballnav_hal::{HardwareRegistry, MotionSensor, ResponseSource};
use ballnav_middleware::{EventBus, Topic};
use ballnav_perception::{
    CompositeField, FieldComponent, FusionOutcome, MotionFusion, VelocityEstimator,
};
use ballnav_types::{
    ActuatorCommand, Event, EventPayload, IntensityVector, NavError, Pose, ResponseEvent,
    SensorSample, StateTransition, TelemetryData, TrialOutcome, TrialRecord, TrialState, Velocity,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::state_machine::{NavigationStateMachine, TickContext};
use crate::watchdog::{ComponentHealth, Watchdog};

const SOURCE: &str = "ballnav-runtime::tick_driver";
const MOTION_SENSOR: &str = "motion_sensor";

// ─────────────────────────────────────────────────────────────────────────────
// Inputs and outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the outside world hands the engine for one tick.  Also the
/// line format of replay files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickInput {
    pub timestamp_ms: u64,
    #[serde(default)]
    pub motion: Option<SensorSample>,
    #[serde(default)]
    pub responses: Vec<ResponseEvent>,
}

impl TickInput {
    /// A tick with no sample and no responses.
    pub fn idle(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            motion: None,
            responses: Vec::new(),
        }
    }

    /// Pull one tick's worth of input from the HAL collaborators.
    pub fn poll(
        timestamp_ms: u64,
        sensor: &mut dyn MotionSensor,
        responses: &mut dyn ResponseSource,
    ) -> Self {
        Self {
            timestamp_ms,
            motion: sensor.read(),
            responses: responses.poll(timestamp_ms),
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub timestamp_ms: u64,
    pub pose: Pose,
    pub velocity: Velocity,
    pub state: TrialState,
    pub degraded: bool,
    pub intensities: IntensityVector,
    /// Commands dispatched this tick, including rejected ones.
    pub commands: Vec<ActuatorCommand>,
    pub transitions: Vec<StateTransition>,
    pub sealed_record: Option<TrialRecord>,
    pub actuator_faults: usize,
    pub finished: bool,
}

/// Running totals for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub ticks: u64,
    pub degraded_ticks: u64,
    pub trials: u64,
    pub rewards: u64,
    pub punishments: u64,
    pub aborts: u64,
    pub timeouts: u64,
    pub terminated: u64,
    pub actuator_faults: u64,
    pub sensor_stalls: u64,
}

impl SessionSummary {
    fn count(&mut self, outcome: TrialOutcome) {
        self.trials += 1;
        match outcome {
            TrialOutcome::Reward => self.rewards += 1,
            TrialOutcome::Punish => self.punishments += 1,
            TrialOutcome::Abort => self.aborts += 1,
            TrialOutcome::Timeout => self.timeouts += 1,
            TrialOutcome::SessionTerminated => self.terminated += 1,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TickDriver
// ─────────────────────────────────────────────────────────────────────────────

pub struct TickDriver {
    fusion: MotionFusion,
    velocity: VelocityEstimator,
    field: CompositeField,
    machine: NavigationStateMachine,
    registry: HardwareRegistry,
    bus: EventBus,
    watchdog: Watchdog,
    cancel: Arc<AtomicBool>,
    stimulus_on: bool,
    last_timestamp_ms: Option<u64>,
    summary: SessionSummary,
}

impl TickDriver {
    /// Validate `config` and assemble the engine around `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::Config`] when the configuration is rejected; the
    /// session must not start in that case.
    pub fn new(
        config: SessionConfig,
        registry: HardwareRegistry,
        bus: EventBus,
    ) -> Result<Self, NavError> {
        config.validate()?;

        let mut fusion = MotionFusion::new(config.geometry.clone())?;
        fusion.reset_to(config.task.start_pose);
        let field = CompositeField::new().with(Box::new(config.odor_field()?));

        for channel in field.channels() {
            if registry.channel(channel).is_none() {
                warn!(channel, "no stimulus driver registered for source channel");
            }
        }
        if registry.valve(config.task.reward_port).is_none() {
            warn!(port = config.task.reward_port, "no reward valve registered");
        }

        let mut watchdog = Watchdog::new();
        watchdog.register(MOTION_SENSOR, config.sensor_timeout_ms, 0);

        let machine = NavigationStateMachine::new(
            config.task.clone(),
            config.difficulty,
            config.initial_difficulty(),
        );

        info!(
            sources = config.sources.len(),
            arena = config.arena.size,
            extinction = config.extinction_factor,
            "tick driver ready"
        );

        Ok(Self {
            fusion,
            velocity: VelocityEstimator::new(config.velocity_window),
            field,
            machine,
            registry,
            bus,
            watchdog,
            cancel: Arc::new(AtomicBool::new(false)),
            stimulus_on: false,
            last_timestamp_ms: None,
            summary: SessionSummary::default(),
        })
    }

    /// Use an externally owned stop flag, e.g. one set by a Ctrl-C handler.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Shared stop flag; storing `true` ends the session on the next tick.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Clone of the [`EventBus`] so callers can subscribe.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn registry(&self) -> &HardwareRegistry {
        &self.registry
    }

    pub fn pose(&self) -> Pose {
        self.fusion.pose()
    }

    pub fn state(&self) -> TrialState {
        self.machine.state()
    }

    pub fn machine(&self) -> &NavigationStateMachine {
        &self.machine
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn is_finished(&self) -> bool {
        self.machine.is_finished()
    }

    /// Motion sensor health as of the last tick.
    pub fn sensor_health(&self) -> ComponentHealth {
        self.watchdog
            .health(MOTION_SENSOR, self.last_timestamp_ms.unwrap_or_default())
    }

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::SensorFault`] when `input.timestamp_ms` is older
    /// than the previous tick's.  Nothing is changed in that case.
    pub fn tick(&mut self, input: TickInput) -> Result<TickReport, NavError> {
        let now = input.timestamp_ms;
        if let Some(last) = self.last_timestamp_ms {
            if now < last {
                return Err(NavError::SensorFault(format!(
                    "tick timestamp {now} ms precedes previous tick at {last} ms"
                )));
            }
        }
        self.last_timestamp_ms = Some(now);
        self.summary.ticks += 1;

        // ── 1. Cancel ───────────────────────────────────────────────────────
        let stop_requested = self.cancel.load(Ordering::Acquire);

        // ── 2. Fuse ─────────────────────────────────────────────────────────
        let outcome = match input.motion.as_ref() {
            Some(sample) => self.fusion.integrate(sample),
            None => self.fusion.hold(),
        };
        let degraded = match outcome {
            FusionOutcome::Updated(_) => {
                self.watchdog.heartbeat(MOTION_SENSOR, now);
                false
            }
            FusionOutcome::Degraded(reason) => {
                self.summary.degraded_ticks += 1;
                self.publish(
                    Topic::SystemAlerts,
                    EventPayload::DegradedTick {
                        timestamp_ms: now,
                        reason: reason.to_string(),
                    },
                );
                true
            }
        };
        for stall in self.watchdog.take_stalls(now) {
            warn!(component = %stall.component, silent_ms = stall.silent_ms, "input stalled");
            self.summary.sensor_stalls += 1;
            self.publish(
                Topic::SystemAlerts,
                EventPayload::SensorStalled {
                    silent_ms: stall.silent_ms,
                },
            );
        }
        let pose = self.fusion.pose();

        // ── 3. Speed ────────────────────────────────────────────────────────
        // A degraded tick keeps the last estimate rather than reporting rest.
        let velocity = if degraded {
            self.velocity.current()
        } else {
            self.velocity.update(now, &pose)
        };

        // ── 4. Stimulus ─────────────────────────────────────────────────────
        let intensities = self.field.evaluate(&pose);
        let mut commands = Vec::new();
        if self.machine.state() == TrialState::Trial {
            commands.extend(intensities.iter().map(|c| ActuatorCommand::SetDutyCycle {
                channel: c.channel,
                percent: c.percent,
            }));
            self.stimulus_on = true;
        }

        // ── 5. Decide ───────────────────────────────────────────────────────
        let step = self.machine.step(&TickContext {
            now_ms: now,
            pose,
            speed: velocity.speed,
            responses: &input.responses,
            actuators_ready: self.registry.is_ready(),
            stop_requested,
            degraded,
            speed_settled: self.velocity.is_settled(),
        });
        commands.extend(step.commands);
        if self.stimulus_on && self.machine.state() != TrialState::Trial {
            commands.push(ActuatorCommand::AllChannelsOff);
            self.stimulus_on = false;
        }

        // ── 6. Reset ────────────────────────────────────────────────────────
        if let Some(start) = step.reset_pose {
            debug!(x = start.x, y = start.y, theta = start.theta, "pose reset to trial start");
            self.fusion.reset_to(start);
            // Only a real jump invalidates the speed window.
            if start.position().distance_to(&pose.position()) > 0.0 {
                self.velocity.reset();
            }
        }

        // ── 7. Act ──────────────────────────────────────────────────────────
        let actuator_faults = self.dispatch_all(&commands);

        // ── 8. Publish ──────────────────────────────────────────────────────
        for transition in &step.transitions {
            self.publish(Topic::TrialLog, EventPayload::StateChanged(*transition));
        }
        if let Some(record) = &step.sealed_record {
            if let Some(outcome) = record.outcome {
                self.summary.count(outcome);
            }
            self.publish(Topic::TrialLog, EventPayload::TrialCompleted(record.clone()));
        }
        let state = self.machine.state();
        let reported_pose = self.fusion.pose();
        self.publish(
            Topic::Telemetry,
            EventPayload::Telemetry(TelemetryData {
                timestamp_ms: now,
                pose: reported_pose,
                speed: velocity.speed,
                state,
                degraded,
            }),
        );

        let finished = self.machine.is_finished();
        if finished {
            info!(summary = ?self.summary, "session finished");
        }

        Ok(TickReport {
            tick: self.summary.ticks,
            timestamp_ms: now,
            pose: reported_pose,
            velocity,
            state,
            degraded,
            intensities,
            commands,
            transitions: step.transitions,
            sealed_record: step.sealed_record,
            actuator_faults,
            finished,
        })
    }

    /// Drive the session from HAL collaborators until it finishes or
    /// `max_ticks` have run.  `clock` yields each tick's timestamp.
    ///
    /// # Errors
    ///
    /// Propagates the first error from [`TickDriver::tick`].
    pub fn run_with(
        &mut self,
        sensor: &mut dyn MotionSensor,
        responses: &mut dyn ResponseSource,
        mut clock: impl FnMut() -> u64,
        max_ticks: u64,
    ) -> Result<SessionSummary, NavError> {
        for _ in 0..max_ticks {
            if self.is_finished() {
                break;
            }
            let input = TickInput::poll(clock(), sensor, responses);
            self.tick(input)?;
        }
        Ok(self.summary.clone())
    }

    /// Dispatch each command; returns the number rejected.
    fn dispatch_all(&mut self, commands: &[ActuatorCommand]) -> usize {
        let mut faults = 0;
        for command in commands {
            match self.registry.dispatch(command) {
                Ok(()) => {
                    self.publish(Topic::ActuatorCommands, EventPayload::CommandIssued(command.clone()));
                }
                Err(e) => {
                    faults += 1;
                    self.summary.actuator_faults += 1;
                    warn!(?command, error = %e, "actuator command rejected");
                    let component = match &e {
                        NavError::HardwareFault { component, .. } => component.clone(),
                        _ => "hal".to_string(),
                    };
                    self.publish(
                        Topic::SystemAlerts,
                        EventPayload::ActuatorFault {
                            component,
                            message: e.to_string(),
                        },
                    );
                }
            }
        }
        faults
    }

    /// Best-effort publish; a topic with no subscribers is not an error.
    fn publish(&self, topic: Topic, payload: EventPayload) {
        let _ = self.bus.publish_to(topic, Event::new(SOURCE, payload));
    }
}
