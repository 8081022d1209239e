//! Conversions between protobuf messages and domain records.

use std::time::Duration;

use crate::command::{
    ChannelState, ConnectivityState, Credentials, DeviceData, Protocol, ProtocolStateData,
    ServiceState, TlsConfig,
};
use crate::store::{EventType, StoreError};

use super::proto;
use super::proto::list_devices_response::Type as ListType;

// =============================================================================
// Device
// =============================================================================

impl TryFrom<proto::Device> for DeviceData {
    type Error = StoreError;

    fn try_from(d: proto::Device) -> Result<Self, Self::Error> {
        let timeout = match d.timeout {
            Some(t) => Some(Duration::try_from(t).map_err(|e| {
                StoreError::InvalidArgument(format!("device '{}' timeout: {}", d.id, e))
            })?),
            None => None,
        };

        Ok(Self {
            timeout,
            credentials: d.credentials.map(Credentials::from).unwrap_or_default(),
            tls: d.tls.map(TlsConfig::from).unwrap_or_default(),
            protocol_states: d
                .protocol_states
                .iter()
                .map(ProtocolStateData::from)
                .collect(),
            id: d.id,
            revision: d.revision,
            address: d.address,
            target: d.target,
            version: d.version,
            device_type: d.r#type,
            role: d.role,
            attributes: d.attributes,
        })
    }
}

impl From<&DeviceData> for proto::Device {
    fn from(d: &DeviceData) -> Self {
        Self {
            id: d.id.clone(),
            revision: d.revision,
            address: d.address.clone(),
            target: d.target.clone(),
            version: d.version.clone(),
            // A timeout too large for the wire falls back to the default
            timeout: d
                .timeout
                .and_then(|t| prost_types::Duration::try_from(t).ok()),
            credentials: Some(proto::Credentials {
                user: d.credentials.user.clone(),
                password: d.credentials.password.clone(),
            }),
            tls: Some(proto::TlsConfig {
                ca_cert: d.tls.ca_cert.clone(),
                cert: d.tls.cert.clone(),
                key: d.tls.key.clone(),
                plain: d.tls.plain,
                insecure: d.tls.insecure,
            }),
            r#type: d.device_type.clone(),
            role: d.role.clone(),
            attributes: d.attributes.clone(),
            protocol_states: d.protocol_states.iter().map(proto::ProtocolState::from).collect(),
        }
    }
}

impl From<proto::Credentials> for Credentials {
    fn from(c: proto::Credentials) -> Self {
        Self {
            user: c.user,
            password: c.password,
        }
    }
}

impl From<proto::TlsConfig> for TlsConfig {
    fn from(t: proto::TlsConfig) -> Self {
        Self {
            ca_cert: t.ca_cert,
            cert: t.cert,
            key: t.key,
            plain: t.plain,
            insecure: t.insecure,
        }
    }
}

// =============================================================================
// Protocol state
//
// Out-of-range enum values fall back to the zero ("unknown") variant.
// =============================================================================

impl From<&proto::ProtocolState> for ProtocolStateData {
    fn from(s: &proto::ProtocolState) -> Self {
        let protocol = match s.protocol() {
            proto::Protocol::Unknown => Protocol::Unknown,
            proto::Protocol::Telemetry => Protocol::Telemetry,
            proto::Protocol::FlowProgramming => Protocol::FlowProgramming,
            proto::Protocol::Operations => Protocol::Operations,
        };
        let connectivity_state = match s.connectivity_state() {
            proto::ConnectivityState::Unknown => ConnectivityState::Unknown,
            proto::ConnectivityState::Reachable => ConnectivityState::Reachable,
            proto::ConnectivityState::Unreachable => ConnectivityState::Unreachable,
        };
        let channel_state = match s.channel_state() {
            proto::ChannelState::Unknown => ChannelState::Unknown,
            proto::ChannelState::Connected => ChannelState::Connected,
            proto::ChannelState::Disconnected => ChannelState::Disconnected,
        };
        let service_state = match s.service_state() {
            proto::ServiceState::Unknown => ServiceState::Unknown,
            proto::ServiceState::Available => ServiceState::Available,
            proto::ServiceState::Unavailable => ServiceState::Unavailable,
            proto::ServiceState::Connecting => ServiceState::Connecting,
        };

        Self {
            protocol,
            connectivity_state,
            channel_state,
            service_state,
        }
    }
}

impl From<&ProtocolStateData> for proto::ProtocolState {
    fn from(s: &ProtocolStateData) -> Self {
        let protocol = match s.protocol {
            Protocol::Unknown => proto::Protocol::Unknown,
            Protocol::Telemetry => proto::Protocol::Telemetry,
            Protocol::FlowProgramming => proto::Protocol::FlowProgramming,
            Protocol::Operations => proto::Protocol::Operations,
        };
        let connectivity_state = match s.connectivity_state {
            ConnectivityState::Unknown => proto::ConnectivityState::Unknown,
            ConnectivityState::Reachable => proto::ConnectivityState::Reachable,
            ConnectivityState::Unreachable => proto::ConnectivityState::Unreachable,
        };
        let channel_state = match s.channel_state {
            ChannelState::Unknown => proto::ChannelState::Unknown,
            ChannelState::Connected => proto::ChannelState::Connected,
            ChannelState::Disconnected => proto::ChannelState::Disconnected,
        };
        let service_state = match s.service_state {
            ServiceState::Unknown => proto::ServiceState::Unknown,
            ServiceState::Available => proto::ServiceState::Available,
            ServiceState::Unavailable => proto::ServiceState::Unavailable,
            ServiceState::Connecting => proto::ServiceState::Connecting,
        };

        Self {
            protocol: protocol as i32,
            connectivity_state: connectivity_state as i32,
            channel_state: channel_state as i32,
            service_state: service_state as i32,
        }
    }
}

// =============================================================================
// List responses
// =============================================================================

pub fn list_response(event_type: EventType, device: &DeviceData) -> proto::ListDevicesResponse {
    let list_type = match event_type {
        EventType::None => ListType::None,
        EventType::Added => ListType::Added,
        EventType::Updated => ListType::Updated,
        EventType::Removed => ListType::Removed,
    };

    proto::ListDevicesResponse {
        r#type: list_type as i32,
        device: Some(device.into()),
    }
}
