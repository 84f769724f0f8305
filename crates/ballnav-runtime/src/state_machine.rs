//! [`NavigationStateMachine`] – the trial cycle.
//!
//! ```text
//!            ┌──────── at start, actuators ready ─────┐
//!            │                                        ▼
//!        PreTrial ◄── intertrial elapsed ── InterTrial ◄── timeout ── Trial
//!                                               ▲                      │
//!                                               ├──── Reward ◄─────────┤
//!                                               ├──── Punish ◄─────────┤
//!                                               └──── Abort  ◄─────────┘
//! ```
//!
//! [`NavigationStateMachine::step`] runs once per tick and never blocks.
//! Side effects are returned in [`StepOutput`] for the driver to carry out.
//!
//! While in Trial, a contact is classified from the current pose and speed:
//!
//! | Where | Port | Speed | Result |
//! |---|---|---|---|
//! | inside the reward radius | reward port | below threshold | Reward |
//! | inside another response zone, outside the start exclusion | any | below threshold | Punish |
//! | inside another response zone, outside the start exclusion | any | at or above threshold | Abort |
//! | anywhere else | any | any | logged only |
//!
//! The checks run in that order, which gives Reward > Punish > Abort when
//! zones overlap.  A contact only counts once the animal has stayed in the
//! zone for `trial_ready_ms`, and never on a tick whose speed estimate is
//! degraded or still filling.  With no qualifying contact, a trial that
//! outlives `trial_duration_ms` goes straight to InterTrial as a timeout.
//!
//! The session ends on an explicit stop, or at the end of an inter-trial
//! once `max_reward` has been delivered or `session_duration_ms` has passed.

use std::fmt;

use ballnav_types::{
    ActuatorCommand, Pose, ResponseEvent, StateTransition, TracePoint, TrialOutcome, TrialRecord,
    TrialState,
};
use tracing::{debug, info};

use crate::config::TaskConfig;
use crate::difficulty::{DifficultyRamp, DifficultyState};

/// Everything the machine may look at during one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub now_ms: u64,
    pub pose: Pose,
    pub speed: f64,
    pub responses: &'a [ResponseEvent],
    pub actuators_ready: bool,
    pub stop_requested: bool,
    /// The motion sample was missing or malformed; pose and speed are held.
    pub degraded: bool,
    /// The speed estimate spans at least two pose samples.
    pub speed_settled: bool,
}

/// Side effects requested by one [`NavigationStateMachine::step`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StepOutput {
    pub commands: Vec<ActuatorCommand>,
    pub transitions: Vec<StateTransition>,
    /// Set on the tick InterTrial is entered.
    pub sealed_record: Option<TrialRecord>,
    /// Teleport the animal here (trial start).
    pub reset_pose: Option<Pose>,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Stop flag set by the host.
    Requested,
    /// `max_reward` has been delivered.
    RewardCapReached,
    /// `session_duration_ms` has passed.
    DurationElapsed,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEnd::Requested => "stop requested",
            SessionEnd::RewardCapReached => "reward cap reached",
            SessionEnd::DurationElapsed => "session duration elapsed",
        };
        f.write_str(name)
    }
}

/// Where the animal is, for dwell timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Start,
    RewardZone,
    ResponseZone(usize),
}

pub struct NavigationStateMachine {
    task: TaskConfig,
    ramp: DifficultyRamp,
    difficulty: DifficultyState,
    state: TrialState,
    entered_ms: u64,
    /// Set by the first step, which performs the PreTrial entry.
    session_start_ms: Option<u64>,
    end: Option<SessionEnd>,
    record: Option<TrialRecord>,
    outcome: Option<TrialOutcome>,
    trials_started: u64,
    consecutive_punishments: u32,
    punish_period_ms: u64,
    total_reward: f64,
    /// Region the animal currently occupies and since when.
    dwell: Option<(Region, u64)>,
}

impl NavigationStateMachine {
    pub fn new(task: TaskConfig, ramp: DifficultyRamp, difficulty: DifficultyState) -> Self {
        Self {
            task,
            ramp,
            difficulty,
            state: TrialState::PreTrial,
            entered_ms: 0,
            session_start_ms: None,
            end: None,
            record: None,
            outcome: None,
            trials_started: 0,
            consecutive_punishments: 0,
            punish_period_ms: 0,
            total_reward: 0.0,
            dwell: None,
        }
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn difficulty(&self) -> &DifficultyState {
        &self.difficulty
    }

    /// The record of the trial in progress, if one is open.
    pub fn current_record(&self) -> Option<&TrialRecord> {
        self.record.as_ref()
    }

    pub fn trials_started(&self) -> u64 {
        self.trials_started
    }

    /// Reward volume requested so far (µl).
    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    /// `true` once the session has ended.  Later steps are no-ops.
    pub fn is_finished(&self) -> bool {
        self.end.is_some()
    }

    pub fn end_reason(&self) -> Option<SessionEnd> {
        self.end
    }

    /// Advance by one tick.
    pub fn step(&mut self, ctx: &TickContext<'_>) -> StepOutput {
        let mut out = StepOutput::default();
        if self.end.is_some() {
            return out;
        }
        if self.session_start_ms.is_none() {
            self.session_start_ms = Some(ctx.now_ms);
            self.enter(TrialState::PreTrial, ctx.now_ms, &mut out);
        }
        // The driver applies a requested reset after this step returns.
        let pose = out.reset_pose.unwrap_or(ctx.pose);

        if let Some(record) = self.record.as_mut() {
            record.pose_trace.push(TracePoint {
                timestamp_ms: ctx.now_ms,
                pose,
            });
            record.responses.extend_from_slice(ctx.responses);
        }

        if ctx.stop_requested {
            self.stop(ctx.now_ms, &mut out);
            return out;
        }

        let elapsed = ctx.now_ms.saturating_sub(self.entered_ms);
        match self.state {
            TrialState::PreTrial => self.evaluate_pretrial(ctx, &pose, &mut out),
            TrialState::Trial => self.evaluate_trial(ctx, &pose, elapsed, &mut out),
            TrialState::Reward => {
                if elapsed >= self.task.reward_duration_ms {
                    self.transition(TrialState::InterTrial, ctx.now_ms, &mut out);
                }
            }
            TrialState::Abort => {
                if elapsed >= self.task.abort_duration_ms {
                    self.transition(TrialState::InterTrial, ctx.now_ms, &mut out);
                }
            }
            TrialState::Punish => {
                if elapsed >= self.punish_period_ms {
                    self.transition(TrialState::InterTrial, ctx.now_ms, &mut out);
                }
            }
            TrialState::InterTrial => {
                if self.task.noresponse_intertrial && has_contact(ctx.responses) {
                    debug!("contact during inter-trial, restarting timer");
                    self.entered_ms = ctx.now_ms;
                } else if elapsed >= self.task.intertrial_duration_ms {
                    match self.session_limit(ctx.now_ms) {
                        Some(reason) => {
                            info!(%reason, total_reward = self.total_reward, "session complete");
                            self.end = Some(reason);
                        }
                        None => self.transition(TrialState::PreTrial, ctx.now_ms, &mut out),
                    }
                }
            }
        }
        out
    }

    /// Start the trial once the animal has held the start location for
    /// `init_ready_ms`.
    fn evaluate_pretrial(&mut self, ctx: &TickContext<'_>, pose: &Pose, out: &mut StepOutput) {
        let at_start = pose.position().distance_to(&self.task.start_pose.position())
            <= self.task.init_radius;
        let held = self.dwell_ms(at_start.then_some(Region::Start), ctx.now_ms);
        if ctx.actuators_ready && held.is_some_and(|ms| ms >= self.task.init_ready_ms) {
            self.transition(TrialState::Trial, ctx.now_ms, out);
        }
    }

    /// Classify this tick's contacts, then fall back to the timeout.
    fn evaluate_trial(
        &mut self,
        ctx: &TickContext<'_>,
        pose: &Pose,
        elapsed: u64,
        out: &mut StepOutput,
    ) {
        let region = self.locate(pose);
        let dwell = self.dwell_ms(region, ctx.now_ms);
        if has_contact(ctx.responses) {
            if let Some(next) = self.classify(ctx, pose, region, dwell) {
                self.transition(next, ctx.now_ms, out);
                return;
            }
        }
        if elapsed > self.task.trial_duration_ms {
            self.outcome = Some(TrialOutcome::Timeout);
            self.difficulty = self.difficulty.apply(TrialOutcome::Timeout, &self.ramp);
            self.transition(TrialState::InterTrial, ctx.now_ms, out);
        }
    }

    fn locate(&self, pose: &Pose) -> Option<Region> {
        let position = pose.position();
        if position.distance_to(&self.difficulty.reward_center) <= self.difficulty.reward_radius {
            return Some(Region::RewardZone);
        }
        if position.distance_to(&self.task.start_pose.position()) <= self.task.start_exclusion_radius
        {
            return None;
        }
        self.task
            .response_zones
            .iter()
            .position(|z| z.contains(&position))
            .map(Region::ResponseZone)
    }

    fn classify(
        &self,
        ctx: &TickContext<'_>,
        pose: &Pose,
        region: Option<Region>,
        dwell: Option<u64>,
    ) -> Option<TrialState> {
        let Some(region) = region else {
            debug!(x = pose.x, y = pose.y, "contact outside any scoring zone");
            return None;
        };
        if dwell.unwrap_or_default() < self.task.trial_ready_ms {
            debug!(?region, dwell_ms = ?dwell, "contact before the zone was held");
            return None;
        }
        if ctx.degraded || !ctx.speed_settled {
            debug!(degraded = ctx.degraded, "contact not scored, speed estimate unreliable");
            return None;
        }

        let slow = ctx.speed < self.task.velocity_threshold;
        match region {
            Region::RewardZone => {
                if !slow {
                    debug!(speed = ctx.speed, "moving contact in reward zone");
                    return None;
                }
                let at_reward_port = ctx
                    .responses
                    .iter()
                    .any(|r| r.kind.is_contact() && r.port == self.task.reward_port);
                if !at_reward_port {
                    debug!(reward_port = self.task.reward_port, "contact at a non-reward port");
                }
                at_reward_port.then_some(TrialState::Reward)
            }
            Region::ResponseZone(_) => Some(if slow {
                TrialState::Punish
            } else {
                TrialState::Abort
            }),
            Region::Start => None,
        }
    }

    /// Milliseconds spent in `region` so far; `None` outside every region.
    fn dwell_ms(&mut self, region: Option<Region>, now_ms: u64) -> Option<u64> {
        let Some(region) = region else {
            self.dwell = None;
            return None;
        };
        match self.dwell {
            Some((current, since)) if current == region => Some(now_ms.saturating_sub(since)),
            _ => {
                self.dwell = Some((region, now_ms));
                Some(0)
            }
        }
    }

    fn session_limit(&self, now_ms: u64) -> Option<SessionEnd> {
        if self.task.max_reward.is_some_and(|cap| self.total_reward >= cap) {
            return Some(SessionEnd::RewardCapReached);
        }
        let started = self.session_start_ms.unwrap_or(now_ms);
        if self
            .task
            .session_duration_ms
            .is_some_and(|limit| now_ms.saturating_sub(started) >= limit)
        {
            return Some(SessionEnd::DurationElapsed);
        }
        None
    }

    /// Force the session to wind down.  An undecided trial is sealed as
    /// terminated; a decided one keeps its outcome.
    fn stop(&mut self, now_ms: u64, out: &mut StepOutput) {
        if self.state != TrialState::InterTrial {
            if self.outcome.is_none() {
                self.outcome = Some(TrialOutcome::SessionTerminated);
            }
            self.transition(TrialState::InterTrial, now_ms, out);
        }
        info!(trials = self.trials_started, "session stopped");
        self.end = Some(SessionEnd::Requested);
    }

    fn transition(&mut self, to: TrialState, now_ms: u64, out: &mut StepOutput) {
        let transition = StateTransition {
            from: self.state,
            to,
            timestamp_ms: now_ms,
        };
        info!(from = %self.state, to = %to, at_ms = now_ms, "trial state change");
        out.transitions.push(transition);
        if let Some(record) = self.record.as_mut() {
            record.transitions.push(transition);
        }
        self.enter(to, now_ms, out);
    }

    /// Entry actions.
    fn enter(&mut self, state: TrialState, now_ms: u64, out: &mut StepOutput) {
        self.state = state;
        self.entered_ms = now_ms;
        match state {
            TrialState::PreTrial => {
                self.trials_started += 1;
                self.outcome = None;
                self.dwell = None;
                self.record = Some(TrialRecord::new(
                    self.trials_started,
                    now_ms,
                    self.difficulty.reward_center,
                    self.difficulty.reward_radius,
                ));
                out.reset_pose = Some(self.task.start_pose);
            }
            TrialState::Trial => self.dwell = None,
            TrialState::Reward => {
                out.commands.push(ActuatorCommand::DeliverReward {
                    port: self.task.reward_port,
                    amount: self.task.reward_amount,
                });
                self.total_reward += self.task.reward_amount;
                self.outcome = Some(TrialOutcome::Reward);
                self.consecutive_punishments = 0;
                self.difficulty = self.difficulty.apply(TrialOutcome::Reward, &self.ramp);
            }
            TrialState::Abort => {
                self.outcome = Some(TrialOutcome::Abort);
                self.difficulty = self.difficulty.apply(TrialOutcome::Abort, &self.ramp);
            }
            TrialState::Punish => {
                self.outcome = Some(TrialOutcome::Punish);
                self.consecutive_punishments += 1;
                self.punish_period_ms = if self.task.incremental_punishment {
                    self.task
                        .punish_duration_ms
                        .saturating_mul(u64::from(self.consecutive_punishments))
                } else {
                    self.task.punish_duration_ms
                };
                self.difficulty = self.difficulty.apply(TrialOutcome::Punish, &self.ramp);
            }
            TrialState::InterTrial => {
                if let Some(mut record) = self.record.take() {
                    let outcome = self.outcome.unwrap_or(TrialOutcome::SessionTerminated);
                    record.end_ms = Some(now_ms);
                    record.outcome = Some(outcome);
                    info!(trial = record.trial_index, %outcome, "trial sealed");
                    out.sealed_record = Some(record);
                }
            }
        }
    }
}

fn has_contact(responses: &[ResponseEvent]) -> bool {
    responses.iter().any(|r| r.kind.is_contact())
}
