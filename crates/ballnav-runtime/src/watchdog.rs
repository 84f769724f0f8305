//! [`Watchdog`] – input health monitor.
//!
//! Collaborators that feed the tick loop (the motion sensor above all) are
//! registered with a silence limit.  The driver calls
//! [`Watchdog::heartbeat`] whenever a component delivers usable data and
//! [`Watchdog::take_stalls`] once per tick.  Time is the tick clock in
//! milliseconds, so replayed sessions behave exactly like live ones.
//!
//! A stall is reported once; the next heartbeat re-arms it.

use std::collections::HashMap;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Health state reported for a single component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentHealth {
    Healthy,
    TimedOut,
}

/// A component that just exceeded its silence limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stall {
    pub component: String,
    pub silent_ms: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Internal entry
// ────────────────────────────────────────────────────────────────────────────

struct ComponentEntry {
    last_heartbeat_ms: u64,
    timeout_ms: u64,
    alerted: bool,
}

impl ComponentEntry {
    fn silent_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_heartbeat_ms)
    }

    fn timed_out(&self, now_ms: u64) -> bool {
        self.silent_ms(now_ms) > self.timeout_ms
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

/// Tracks heartbeats from registered inputs and detects silent ones.
///
/// # Example
///
/// ```
/// use ballnav_runtime::watchdog::{ComponentHealth, Watchdog};
///
/// let mut wd = Watchdog::new();
/// wd.register("motion_sensor", 100, 0);
/// wd.heartbeat("motion_sensor", 80);
///
/// assert_eq!(wd.health("motion_sensor", 150), ComponentHealth::Healthy);
/// assert_eq!(wd.health("motion_sensor", 181), ComponentHealth::TimedOut);
/// ```
#[derive(Default)]
pub struct Watchdog {
    components: HashMap<String, ComponentEntry>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component_id` with a silence limit of `timeout_ms`,
    /// counting from `now_ms`.  Re-registering resets the deadline.
    pub fn register(&mut self, component_id: &str, timeout_ms: u64, now_ms: u64) {
        self.components.insert(
            component_id.to_string(),
            ComponentEntry {
                last_heartbeat_ms: now_ms,
                timeout_ms,
                alerted: false,
            },
        );
    }

    /// Record a heartbeat.  No-op for unregistered components.
    pub fn heartbeat(&mut self, component_id: &str, now_ms: u64) {
        if let Some(entry) = self.components.get_mut(component_id) {
            entry.last_heartbeat_ms = entry.last_heartbeat_ms.max(now_ms);
            entry.alerted = false;
        }
    }

    /// Unknown components are reported as [`ComponentHealth::TimedOut`].
    pub fn health(&self, component_id: &str, now_ms: u64) -> ComponentHealth {
        match self.components.get(component_id) {
            Some(entry) if !entry.timed_out(now_ms) => ComponentHealth::Healthy,
            _ => ComponentHealth::TimedOut,
        }
    }

    /// Stalls not yet reported since the component's last heartbeat.
    pub fn take_stalls(&mut self, now_ms: u64) -> Vec<Stall> {
        let mut stalls = Vec::new();
        for (id, entry) in &mut self.components {
            if !entry.alerted && entry.timed_out(now_ms) {
                entry.alerted = true;
                stalls.push(Stall {
                    component: id.clone(),
                    silent_ms: entry.silent_ms(now_ms),
                });
            }
        }
        stalls
    }
}
