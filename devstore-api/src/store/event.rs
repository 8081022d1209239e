//! Events emitted by state machine changes.

use crate::command::DeviceData;

/// Events emitted when a mutation is committed.
///
/// They are produced by the state machine and handed to the subscription hub
/// while the commit is still exclusive, so every subscriber sees them in
/// commit order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A new device was added.
    DeviceAdded(DeviceData),
    /// A device was updated, either fully or by a protocol state merge.
    DeviceUpdated {
        id: String,
        old: DeviceData,
        new: DeviceData,
    },
    /// A device was removed. Carries the last stored record.
    DeviceRemoved(DeviceData),
}

/// Kind of change carried by a list/watch response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Snapshot entry, no state change.
    None,
    Added,
    Updated,
    Removed,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::DeviceAdded(_) => EventType::Added,
            Event::DeviceUpdated { .. } => EventType::Updated,
            Event::DeviceRemoved(_) => EventType::Removed,
        }
    }

    /// Get the device ID for this event.
    pub fn device_id(&self) -> &str {
        match self {
            Event::DeviceAdded(d) | Event::DeviceRemoved(d) => &d.id,
            Event::DeviceUpdated { id, .. } => id,
        }
    }

    /// The record delivered to subscribers: the new value for adds and
    /// updates, the last known value for removals.
    pub fn device(&self) -> &DeviceData {
        match self {
            Event::DeviceAdded(d) | Event::DeviceRemoved(d) => d,
            Event::DeviceUpdated { new, .. } => new,
        }
    }
}

/// An event with its position in the store's single commit order.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    /// Starts at 1 and increases by exactly 1 per committed event.
    pub index: u64,
    pub event: Event,
}
