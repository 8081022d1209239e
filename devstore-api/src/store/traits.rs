//! DeviceStore trait definitions.
//!
//! Handlers and health collaborators work against this trait and never see
//! the state machine or the hub directly.

use async_trait::async_trait;

use crate::command::{DeviceData, ProtocolStateData};

use super::error::Result;
use super::hub::Subscription;

// =============================================================================
// Request DTOs
// =============================================================================

/// Request to merge one protocol health entry into a device.
#[derive(Debug, Clone)]
pub struct MergeProtocolStateRequest {
    pub id: String,
    /// When set, the merge is rejected unless it matches the stored revision.
    pub revision: Option<u64>,
    pub state: ProtocolStateData,
}

/// Result of [`DeviceStore::watch`].
pub struct Watch {
    /// Every device present when the watch was registered.
    pub snapshot: Vec<DeviceData>,
    /// Index of the last event already reflected in `snapshot`.
    pub index: u64,
    /// Live events committed after the snapshot; `None` for a plain list.
    pub subscription: Option<Subscription>,
}

// =============================================================================
// Store trait
// =============================================================================

/// Store trait for device inventory operations.
///
/// All mutations are serialized; each successful one bumps the device
/// revision by exactly one and publishes exactly one event.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Add a new device. The stored record starts at revision 1.
    async fn add_device(&self, device: DeviceData) -> Result<DeviceData>;

    /// Replace a device's fields. `device.revision` must equal the stored
    /// revision.
    async fn update_device(&self, device: DeviceData) -> Result<DeviceData>;

    /// Get a device by ID.
    async fn get_device(&self, id: &str) -> Result<DeviceData>;

    /// Remove a device regardless of revision.
    async fn remove_device(&self, id: &str) -> Result<()>;

    /// List all devices.
    async fn list_devices(&self) -> Result<Vec<DeviceData>>;

    /// Replace or append a single protocol state entry.
    async fn merge_protocol_state(&self, req: MergeProtocolStateRequest) -> Result<DeviceData>;

    /// Take a snapshot and, if `subscribe` is set, attach a subscription
    /// that starts exactly after it.
    async fn watch(&self, subscribe: bool) -> Result<Watch>;
}
