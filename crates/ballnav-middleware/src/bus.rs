//! Topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the tick loop.  Publishing never waits: a slow subscriber lags and loses
//! the oldest events instead.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Telemetry`] | Per-tick pose / speed snapshots |
//! | [`Topic::ActuatorCommands`] | Reward and duty-cycle commands as issued |
//! | [`Topic::TrialLog`] | State transitions and sealed trial records |
//! | [`Topic::SystemAlerts`] | Degraded ticks, stalled sensors, actuator faults |

use ballnav_types::{Event, NavError};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 1024;

/// Routing lanes of the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// High-frequency locomotion data.
    Telemetry,
    /// Commands handed to the hardware collaborators.
    ActuatorCommands,
    /// Trial-level records and state changes.
    TrialLog,
    /// Recoverable faults: degraded ticks, stalled sensors, rejected commands.
    SystemAlerts,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    telemetry: broadcast::Sender<Event>,
    actuator_commands: broadcast::Sender<Event>,
    trial_log: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (telemetry, _) = broadcast::channel(capacity);
        let (actuator_commands, _) = broadcast::channel(capacity);
        let (trial_log, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            telemetry,
            actuator_commands,
            trial_log,
            system_alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`NavError::Channel`] when nobody is listening on the topic.  The tick
    /// loop treats the latter as a normal condition and ignores it.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, NavError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| NavError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of receivers currently attached to `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Telemetry => &self.telemetry,
            Topic::ActuatorCommands => &self.actuator_commands,
            Topic::TrialLog => &self.trial_log,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Drain every event already buffered for this receiver without waiting.
    ///
    /// Lagged gaps are logged and skipped.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }
        events
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballnav_types::{EventPayload, Pose, TelemetryData, TrialState};

    fn make_event(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::Telemetry(TelemetryData {
                timestamp_ms: 0,
                pose: Pose::new(1.0, 2.0, 0.0),
                speed: 0.0,
                state: TrialState::PreTrial,
                degraded: false,
            }),
        )
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::Telemetry, make_event("test"));
        assert!(matches!(result, Err(NavError::Channel(_))));
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::Telemetry);
        let mut subscriber2 = bus.subscribe_to(Topic::Telemetry);

        let event = make_event("tick_driver");
        bus.publish_to(Topic::Telemetry, event.clone())?;

        let recv1 = subscriber1.recv().await?;
        let recv2 = subscriber2.recv().await?;
        assert_eq!(recv1.id, event.id);
        assert_eq!(recv2.id, event.id);
        Ok(())
    }

    /// A subscriber on `SystemAlerts` must not receive events published to
    /// `Telemetry` because they are routed through separate channels.
    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts_sub = bus.subscribe_to(Topic::SystemAlerts);
        let _telemetry_sub = bus.subscribe_to(Topic::Telemetry);

        bus.publish_to(Topic::Telemetry, make_event("tick_driver"))?;

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            alerts_sub.recv(),
        )
        .await;
        assert!(result.is_err(), "SystemAlerts subscriber must not receive a Telemetry event");
        Ok(())
    }

    #[test]
    fn drain_returns_buffered_events_in_order() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe_to(Topic::TrialLog);
        let first = make_event("a");
        let second = make_event("b");
        bus.publish_to(Topic::TrialLog, first.clone()).unwrap();
        bus.publish_to(Topic::TrialLog, second.clone()).unwrap();

        let drained = sub.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].id, first.id);
        assert_eq!(drained[1].id, second.id);
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn drain_skips_lagged_gap() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe_to(Topic::Telemetry);
        for _ in 0..10 {
            let _ = bus.publish_to(Topic::Telemetry, make_event("flood"));
        }
        // Only the newest `capacity` events survive.
        assert_eq!(sub.drain().len(), 4);
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(Topic::SystemAlerts), 0);
        let rx = bus.subscribe_to(Topic::SystemAlerts);
        assert_eq!(bus.subscriber_count(Topic::SystemAlerts), 1);
        assert_eq!(rx.topic(), Topic::SystemAlerts);
        drop(rx);
        assert_eq!(bus.subscriber_count(Topic::SystemAlerts), 0);
    }
}
