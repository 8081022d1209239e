//! Protocol state merger for health-check collaborators.
//!
//! Probes for reachability, channel and service health report one
//! [`ProtocolStateData`] at a time; they never hold or resend the full device
//! record.

use std::sync::Arc;

use tracing::debug;

use crate::command::{DeviceData, ProtocolStateData};
use crate::store::{DeviceStore, MergeProtocolStateRequest, Result};

pub struct ProtocolStateMerger {
    store: Arc<dyn DeviceStore>,
}

impl ProtocolStateMerger {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self { store }
    }

    /// Merge `state` into the current record of device `id`.
    ///
    /// Every accepted call bumps the revision and emits an update, even when
    /// `state` equals what is already stored.
    pub async fn merge(&self, id: &str, state: ProtocolStateData) -> Result<DeviceData> {
        self.submit(id, None, state).await
    }

    /// Like [`merge`](Self::merge), but only if the device is still at
    /// `revision`.
    pub async fn merge_at(
        &self,
        id: &str,
        revision: u64,
        state: ProtocolStateData,
    ) -> Result<DeviceData> {
        self.submit(id, Some(revision), state).await
    }

    async fn submit(
        &self,
        id: &str,
        revision: Option<u64>,
        state: ProtocolStateData,
    ) -> Result<DeviceData> {
        let device = self
            .store
            .merge_protocol_state(MergeProtocolStateRequest {
                id: id.to_string(),
                revision,
                state,
            })
            .await?;

        debug!(
            id = %device.id,
            protocol = %state.protocol,
            revision = device.revision,
            "Protocol state merged"
        );
        Ok(device)
    }
}
