//! `ballnav-runtime` – the session engine.
//!
//! Ties motion fusion, the stimulus field and the trial state machine into a
//! single synchronous tick loop.
//!
//! # Modules
//!
//! - [`tick_driver`] – [`TickDriver`][tick_driver::TickDriver]: runs one
//!   fuse → stimulate → decide → act cycle per call and publishes the results
//!   on the event bus.
//! - [`state_machine`] –
//!   [`NavigationStateMachine`][state_machine::NavigationStateMachine]: the
//!   PreTrial → Trial → Reward/Punish/Abort → InterTrial cycle.
//! - [`difficulty`] – [`DifficultyState`][difficulty::DifficultyState]: reward
//!   streak and the shrinking reward zone, as a pure value.
//! - [`config`] – [`SessionConfig`][config::SessionConfig]: everything fixed at
//!   session start, with validation.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: flags inputs that have
//!   gone silent.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber, with optional OTLP export when
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

pub mod config;
pub mod difficulty;
pub mod state_machine;
pub mod telemetry;
pub mod tick_driver;
pub mod watchdog;

pub use config::{ArenaConfig, ResponseZone, SessionConfig, TaskConfig};
pub use difficulty::{DifficultyRamp, DifficultyState};
pub use state_machine::{NavigationStateMachine, SessionEnd, StepOutput, TickContext};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use tick_driver::{SessionSummary, TickDriver, TickInput, TickReport};
pub use watchdog::{ComponentHealth, Watchdog};
