//! Audit trail of committed inventory changes.
//!
//! Entries go to the `audit` tracing target so they can be routed separately
//! from operational logs (`RUST_LOG=audit=info`).

use std::sync::Arc;

use crate::command::{DeviceData, Protocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Audit,
    Warn,
}

/// Device store audit logger
pub struct StoreAuditLogger {
    component: String,
    enabled: bool,
}

impl StoreAuditLogger {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            enabled: true,
        }
    }

    /// Create a noop audit logger (for testing)
    pub fn new_noop() -> Self {
        Self {
            component: String::new(),
            enabled: false,
        }
    }

    fn log(&self, level: AuditLevel, message: String, object_ids: Vec<String>) {
        if !self.enabled {
            return;
        }
        match level {
            AuditLevel::Audit => {
                tracing::info!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
            AuditLevel::Warn => {
                tracing::warn!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
        }
    }

    // Device events
    pub fn device_added(&self, device: &DeviceData) {
        self.log(
            AuditLevel::Audit,
            format!("Device added: {} at {}", device.id, device.address),
            vec![device.id.clone()],
        );
    }

    pub fn device_updated(&self, device: &DeviceData) {
        self.log(
            AuditLevel::Audit,
            format!("Device updated: {} (revision {})", device.id, device.revision),
            vec![device.id.clone()],
        );
    }

    pub fn protocol_state_merged(&self, device: &DeviceData, protocol: Protocol) {
        self.log(
            AuditLevel::Audit,
            format!(
                "Protocol state merged: {} {} (revision {})",
                device.id, protocol, device.revision
            ),
            vec![device.id.clone()],
        );
    }

    pub fn device_removed(&self, device_id: &str) {
        self.log(
            AuditLevel::Audit,
            format!("Device removed: {}", device_id),
            vec![device_id.to_string()],
        );
    }

    // Subscription events
    pub fn subscriber_dropped(&self, subscriber: u64, index: u64) {
        self.log(
            AuditLevel::Warn,
            format!(
                "Subscriber {} disconnected on overflow at event {}",
                subscriber, index
            ),
            vec![format!("subscriber-{}", subscriber)],
        );
    }
}

/// Create a shared audit logger
pub fn create_audit_logger(component: &str) -> Arc<StoreAuditLogger> {
    Arc::new(StoreAuditLogger::new(component))
}
