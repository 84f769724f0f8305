//! `ballnav-middleware` – event routing between the tick loop and its
//! collaborators.
//!
//! The core never writes logs, trial files or hardware traces itself.  It
//! publishes typed [`Event`][ballnav_types::Event]s to the [`EventBus`] and
//! whoever cares (a JSONL trial sink, a live plot, a test) subscribes.
//!
//! # Modules
//!
//! - [`bus`] – Topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
