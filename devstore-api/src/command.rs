use std::collections::HashMap;
use std::time::Duration;

use crate::store::StoreError;

/// Mutations applied to the device state machine.
///
/// Every write to the inventory is expressed as one of these commands so the
/// state machine can be driven the same way from memory or from a replayed
/// log.
#[derive(Debug, Clone)]
pub enum Command {
    AddDevice {
        device: DeviceData,
    },
    UpdateDevice {
        device: DeviceData,
    },
    /// Replace (or append) the entry for `state.protocol`. When `revision`
    /// is set it must match the stored revision.
    MergeProtocolState {
        id: String,
        revision: Option<u64>,
        state: ProtocolStateData,
    },
    RemoveDevice {
        id: String,
    },
}

impl Command {
    /// Device this command targets.
    pub fn device_id(&self) -> &str {
        match self {
            Command::AddDevice { device } | Command::UpdateDevice { device } => &device.id,
            Command::MergeProtocolState { id, .. } | Command::RemoveDevice { id } => id,
        }
    }
}

/// Outcome of applying a [`Command`].
#[derive(Debug, Clone)]
pub enum Response {
    /// The stored record after an add, update or merge.
    Device(DeviceData),
    /// The last stored record of a removed device.
    Removed(DeviceData),
    Error(StoreError),
}

// =============================================================================
// Device records
// =============================================================================

/// A managed network element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceData {
    pub id: String,
    pub revision: u64,
    pub address: String,
    pub target: String,
    pub version: String,
    /// `None` means the connection default applies.
    pub timeout: Option<Duration>,
    pub credentials: Credentials,
    pub tls: TlsConfig,
    pub device_type: String,
    pub role: String,
    pub attributes: HashMap<String, String>,
    pub protocol_states: Vec<ProtocolStateData>,
}

impl DeviceData {
    /// Convenience constructor with the fields `Add` requires.
    pub fn new(id: impl Into<String>, address: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Replace the entry for the same protocol in place, or append it.
    pub fn merge_protocol_state(&mut self, state: ProtocolStateData) {
        match self
            .protocol_states
            .iter_mut()
            .find(|s| s.protocol == state.protocol)
        {
            Some(existing) => *existing = state,
            None => self.protocol_states.push(state),
        }
    }

    /// First protocol that appears more than once in `protocol_states`.
    pub fn duplicate_protocol(&self) -> Option<Protocol> {
        self.protocol_states
            .iter()
            .enumerate()
            .find(|(i, s)| {
                self.protocol_states[..*i]
                    .iter()
                    .any(|prev| prev.protocol == s.protocol)
            })
            .map(|(_, s)| s.protocol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TlsConfig {
    pub ca_cert: String,
    pub cert: String,
    pub key: String,
    pub plain: bool,
    pub insecure: bool,
}

/// Health snapshot of one protocol on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolStateData {
    pub protocol: Protocol,
    pub connectivity_state: ConnectivityState,
    pub channel_state: ChannelState,
    pub service_state: ServiceState,
}

// =============================================================================
// Health enumerations
//
// Variant 0 is always "unknown": never reported and reported-as-unknown are
// the same thing.
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    #[default]
    Unknown,
    Telemetry,
    FlowProgramming,
    Operations,
}

/// L3 reachability, independent of any RPC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityState {
    #[default]
    Unknown,
    Reachable,
    Unreachable,
}

/// Transport channel liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

/// Readiness of the service riding the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    #[default]
    Unknown,
    Available,
    Unavailable,
    Connecting,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Protocol::Unknown => "unknown",
            Protocol::Telemetry => "telemetry",
            Protocol::FlowProgramming => "flow-programming",
            Protocol::Operations => "operations",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(protocol: Protocol, service_state: ServiceState) -> ProtocolStateData {
        ProtocolStateData {
            protocol,
            service_state,
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_replaces_matching_protocol() {
        let mut device = DeviceData::new("d1", "10.0.0.1:50051", "1.0");
        device.merge_protocol_state(state(Protocol::Telemetry, ServiceState::Connecting));
        device.merge_protocol_state(state(Protocol::Operations, ServiceState::Available));
        device.merge_protocol_state(state(Protocol::Telemetry, ServiceState::Available));

        assert_eq!(device.protocol_states.len(), 2);
        assert_eq!(device.protocol_states[0].protocol, Protocol::Telemetry);
        assert_eq!(
            device.protocol_states[0].service_state,
            ServiceState::Available
        );
        assert_eq!(device.protocol_states[1].protocol, Protocol::Operations);
    }

    #[test]
    fn test_duplicate_protocol() {
        let mut device = DeviceData::new("d1", "10.0.0.1:50051", "1.0");
        assert_eq!(device.duplicate_protocol(), None);

        device.protocol_states = vec![
            state(Protocol::Telemetry, ServiceState::Unknown),
            state(Protocol::FlowProgramming, ServiceState::Unknown),
        ];
        assert_eq!(device.duplicate_protocol(), None);

        device
            .protocol_states
            .push(state(Protocol::FlowProgramming, ServiceState::Available));
        assert_eq!(device.duplicate_protocol(), Some(Protocol::FlowProgramming));
    }

    #[test]
    fn test_defaults_are_unknown() {
        let s = ProtocolStateData::default();
        assert_eq!(s.protocol, Protocol::Unknown);
        assert_eq!(s.connectivity_state, ConnectivityState::Unknown);
        assert_eq!(s.channel_state, ChannelState::Unknown);
        assert_eq!(s.service_state, ServiceState::Unknown);
    }
}
