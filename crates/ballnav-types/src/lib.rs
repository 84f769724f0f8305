use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A point in the virtual arena (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &Point2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Cumulative virtual pose.  `theta` is unbounded: it accumulates
/// continuously and is never wrapped by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// Incremental pose update produced by one tick of motion fusion.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseDelta {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

impl PoseDelta {
    pub const ZERO: PoseDelta = PoseDelta {
        dx: 0.0,
        dy: 0.0,
        dtheta: 0.0,
    };
}

/// Raw 2-axis displacement reported by a single optical sensor (counts).
///
/// `dx` is the lateral axis (rotation-sensitive), `dy` the axis that follows
/// forward/backward rolling of the support surface.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorReading {
    pub dx: f64,
    pub dy: f64,
}

impl SensorReading {
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn is_finite(&self) -> bool {
        self.dx.is_finite() && self.dy.is_finite()
    }
}

/// One tick worth of raw readings from the two mounted sensors.
///
/// A `None` slot means the sensor did not answer within its polling window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorSample {
    pub timestamp_ms: u64,
    pub sensors: [Option<SensorReading>; 2],
}

impl SensorSample {
    pub fn new(timestamp_ms: u64, first: SensorReading, second: SensorReading) -> Self {
        Self {
            timestamp_ms,
            sensors: [Some(first), Some(second)],
        }
    }
}

/// Derived locomotion speed (m/s) with its world-frame components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub speed: f64,
    pub vx: f64,
    pub vy: f64,
}

/// A fixed point emitter of the simulated gradient (e.g. an odorant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdorSource {
    pub id: u32,
    pub position: Point2,
    /// Delivery channel the intensity is routed to.
    pub channel: u8,
}

/// Duty cycle for one delivery channel, always within `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelIntensity {
    pub channel: u8,
    pub percent: f64,
}

/// Per-source intensities, in source order.
pub type IntensityVector = Vec<ChannelIntensity>;

/// Physical type of a response port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    Lick,
    Proximity,
}

/// What happened at a response port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseKind {
    /// Lick / contact detected by a lick port.
    Lick,
    /// A proximity sensor changed state.
    Proximity { in_position: bool },
}

impl ResponseKind {
    pub fn port_kind(&self) -> PortKind {
        match self {
            ResponseKind::Lick => PortKind::Lick,
            ResponseKind::Proximity { .. } => PortKind::Proximity,
        }
    }

    /// `true` when the event counts as a response (contact) for the task.
    pub fn is_contact(&self) -> bool {
        match self {
            ResponseKind::Lick => true,
            ResponseKind::Proximity { in_position } => *in_position,
        }
    }
}

/// A discrete response event reported by the port hardware.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub port: u8,
    pub timestamp_ms: u64,
    pub kind: ResponseKind,
}

impl ResponseEvent {
    pub fn lick(port: u8, timestamp_ms: u64) -> Self {
        Self {
            port,
            timestamp_ms,
            kind: ResponseKind::Lick,
        }
    }
}

/// States of the trial automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialState {
    PreTrial,
    Trial,
    Reward,
    Abort,
    Punish,
    InterTrial,
}

impl std::fmt::Display for TrialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrialState::PreTrial => "PreTrial",
            TrialState::Trial => "Trial",
            TrialState::Reward => "Reward",
            TrialState::Abort => "Abort",
            TrialState::Punish => "Punish",
            TrialState::InterTrial => "InterTrial",
        };
        f.write_str(name)
    }
}

/// How a trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    Reward,
    Abort,
    Punish,
    Timeout,
    SessionTerminated,
}

impl std::fmt::Display for TrialOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrialOutcome::Reward => "reward",
            TrialOutcome::Abort => "abort",
            TrialOutcome::Punish => "punish",
            TrialOutcome::Timeout => "timeout",
            TrialOutcome::SessionTerminated => "session-terminated",
        };
        f.write_str(name)
    }
}

/// A single state change, as logged on the trial record and the bus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: TrialState,
    pub to: TrialState,
    pub timestamp_ms: u64,
}

/// One pose sample kept on the trial record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub timestamp_ms: u64,
    pub pose: Pose,
}

/// Everything that happened during one trial.  Created at PreTrial entry and
/// sealed (outcome + end time set) when InterTrial is entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_index: u64,
    pub start_ms: u64,
    pub end_ms: Option<u64>,
    pub outcome: Option<TrialOutcome>,
    pub reward_center: Point2,
    pub reward_radius: f64,
    pub pose_trace: Vec<TracePoint>,
    pub responses: Vec<ResponseEvent>,
    pub transitions: Vec<StateTransition>,
}

impl TrialRecord {
    pub fn new(trial_index: u64, start_ms: u64, reward_center: Point2, reward_radius: f64) -> Self {
        Self {
            trial_index,
            start_ms,
            end_ms: None,
            outcome: None,
            reward_center,
            reward_radius,
            pose_trace: Vec::new(),
            responses: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.outcome.is_some() && self.end_ms.is_some()
    }
}

/// Commands the core hands to the actuation collaborators.  They are
/// fire-and-forget: submission never waits for the hardware to finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload")]
pub enum ActuatorCommand {
    /// Open the reward valve on `port` for `amount` (µl).
    DeliverReward { port: u8, amount: f64 },
    /// Drive one stimulus delivery channel at `percent` duty cycle.
    SetDutyCycle { channel: u8, percent: f64 },
    /// Drop every stimulus channel to 0 %.
    AllChannelsOff,
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "ballnav-runtime::tick_driver"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Per-tick locomotion snapshot.
    Telemetry(TelemetryData),
    /// A tick whose motion sample was missing or malformed.
    DegradedTick { timestamp_ms: u64, reason: String },
    /// The sensors have been silent for longer than the configured timeout.
    SensorStalled { silent_ms: u64 },
    StateChanged(StateTransition),
    /// A sealed trial record, ready for the logging collaborator.
    TrialCompleted(TrialRecord),
    CommandIssued(ActuatorCommand),
    ActuatorFault { component: String, message: String },
}

/// Locomotion snapshot published every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryData {
    pub timestamp_ms: u64,
    pub pose: Pose,
    pub speed: f64,
    pub state: TrialState,
    pub degraded: bool,
}

/// Global error type spanning configuration, sensor and actuator faults.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum NavError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Sensor Fault: {0}")]
    SensorFault(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Event Bus Error: {0}")]
    Channel(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actuator_command_reward_roundtrip() {
        let cmd = ActuatorCommand::DeliverReward {
            port: 2,
            amount: 10.0,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("DeliverReward"));
        let back: ActuatorCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn response_kind_contact_rules() {
        assert!(ResponseKind::Lick.is_contact());
        assert!(ResponseKind::Proximity { in_position: true }.is_contact());
        assert!(!ResponseKind::Proximity { in_position: false }.is_contact());
        assert_eq!(
            ResponseKind::Proximity { in_position: true }.port_kind(),
            PortKind::Proximity
        );
    }

    #[test]
    fn trial_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&TrialOutcome::SessionTerminated).unwrap();
        assert_eq!(json, "\"session_terminated\"");
        assert_eq!(TrialOutcome::SessionTerminated.to_string(), "session-terminated");
    }

    #[test]
    fn trial_record_sealed_only_with_outcome_and_end() {
        let mut record = TrialRecord::new(0, 100, Point2::new(1.0, 1.0), 0.5);
        assert!(!record.is_sealed());
        record.outcome = Some(TrialOutcome::Timeout);
        assert!(!record.is_sealed());
        record.end_ms = Some(4100);
        assert!(record.is_sealed());
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "ballnav-runtime::tick_driver",
            EventPayload::Telemetry(TelemetryData {
                timestamp_ms: 10,
                pose: Pose::new(1.0, 2.0, 0.5),
                speed: 0.01,
                state: TrialState::Trial,
                degraded: false,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
    }

    #[test]
    fn nav_error_display() {
        let err = NavError::Config("mounting angle 0° is singular".to_string());
        assert!(err.to_string().contains("Configuration Error"));

        let err2 = NavError::HardwareFault {
            component: "valve_1".to_string(),
            details: "timeout".to_string(),
        };
        assert!(err2.to_string().contains("valve_1"));
    }

    #[test]
    fn point_distance() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);
    }
}
