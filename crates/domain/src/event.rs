//! Event: an immutable record of something that happened.
//!
//! Events are produced when a device accepts a command and changes state.
//! They are published on the event bus for observers (logging, future UIs)
//! and carry enough context to explain the change.

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::id::{DeviceId, EventId};
use crate::machine::Transition;
use crate::source::Source;
use crate::state::State;
use crate::time::{Timestamp, now};

/// What kind of event occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StateChanged,
    DeviceAdded,
    DeviceRemoved,
}

/// A domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub device_id: DeviceId,
    pub device_name: String,
    pub previous: State,
    pub state: State,
    pub command: Option<Command>,
    pub source: Option<Source>,
    pub timestamp: Timestamp,
}

impl Event {
    /// Record an accepted transition of `device_id`.
    #[must_use]
    pub fn state_changed(
        device_id: DeviceId,
        device_name: impl Into<String>,
        transition: &Transition,
        source: Option<Source>,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type: EventType::StateChanged,
            device_id,
            device_name: device_name.into(),
            previous: transition.previous,
            state: transition.state,
            command: Some(transition.command),
            source,
            timestamp: now(),
        }
    }

    /// Record a device joining the hub with its resolved initial `state`.
    #[must_use]
    pub fn device_added(device_id: DeviceId, device_name: impl Into<String>, state: State) -> Self {
        Self {
            id: EventId::new(),
            event_type: EventType::DeviceAdded,
            device_id,
            device_name: device_name.into(),
            previous: State::Unknown,
            state,
            command: None,
            source: None,
            timestamp: now(),
        }
    }

    /// Record a device leaving the hub in `state`.
    #[must_use]
    pub fn device_removed(
        device_id: DeviceId,
        device_name: impl Into<String>,
        state: State,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type: EventType::DeviceRemoved,
            device_id,
            device_name: device_name.into(),
            previous: state,
            state,
            command: None,
            source: None,
            timestamp: now(),
        }
    }
}
