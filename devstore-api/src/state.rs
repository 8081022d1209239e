//! Device inventory state machine.

use std::collections::HashMap;

use crate::command::{Command, DeviceData, ProtocolStateData, Response};
use crate::store::{Event, StoreError};

/// Current device records keyed by id.
///
/// `apply` is deterministic: given the same sequence of commands it produces
/// the same records, revisions and events, so it can sit behind either the
/// in-memory store or a replicated log.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub devices: HashMap<String, DeviceData>,
}

impl DeviceState {
    // =========================================================================
    // Queries
    // =========================================================================

    /// Get a device by ID
    pub fn get_device(&self, id: &str) -> Option<&DeviceData> {
        self.devices.get(id)
    }

    /// List all devices (no ordering guarantee)
    pub fn list_devices(&self) -> Vec<&DeviceData> {
        self.devices.values().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Apply a command. A rejected command returns `Response::Error`, no
    /// events, and leaves the state untouched.
    pub fn apply(&mut self, cmd: Command) -> (Response, Vec<Event>) {
        let result = match cmd {
            Command::AddDevice { device } => self.add_device(device),
            Command::UpdateDevice { device } => self.update_device(device),
            Command::MergeProtocolState {
                id,
                revision,
                state,
            } => self.merge_protocol_state(id, revision, state),
            Command::RemoveDevice { id } => self.remove_device(id),
        };

        match result {
            Ok((response, event)) => (response, vec![event]),
            Err(e) => (Response::Error(e), vec![]),
        }
    }

    fn add_device(&mut self, mut device: DeviceData) -> Result<(Response, Event), StoreError> {
        require_id(&device.id)?;
        if device.address.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "device '{}' address is required",
                device.id
            )));
        }
        if device.version.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "device '{}' version is required",
                device.id
            )));
        }
        reject_duplicate_protocols(&device)?;

        if self.devices.contains_key(&device.id) {
            return Err(StoreError::AlreadyExists(format!(
                "device '{}' already exists",
                device.id
            )));
        }

        device.revision = 1;
        self.devices.insert(device.id.clone(), device.clone());
        Ok((Response::Device(device.clone()), Event::DeviceAdded(device)))
    }

    fn update_device(&mut self, mut device: DeviceData) -> Result<(Response, Event), StoreError> {
        reject_duplicate_protocols(&device)?;

        let stored = self.lookup_mut(&device.id)?;
        check_revision(stored, device.revision)?;

        let old = stored.clone();
        device.revision = old.revision + 1;
        *stored = device.clone();

        Ok((
            Response::Device(device.clone()),
            Event::DeviceUpdated {
                id: device.id.clone(),
                old,
                new: device,
            },
        ))
    }

    fn merge_protocol_state(
        &mut self,
        id: String,
        revision: Option<u64>,
        state: ProtocolStateData,
    ) -> Result<(Response, Event), StoreError> {
        let stored = self.lookup_mut(&id)?;
        if let Some(revision) = revision {
            check_revision(stored, revision)?;
        }

        let old = stored.clone();
        stored.merge_protocol_state(state);
        stored.revision = old.revision + 1;
        let new = stored.clone();

        Ok((
            Response::Device(new.clone()),
            Event::DeviceUpdated { id, old, new },
        ))
    }

    fn remove_device(&mut self, id: String) -> Result<(Response, Event), StoreError> {
        match self.devices.remove(&id) {
            Some(last) => Ok((Response::Removed(last.clone()), Event::DeviceRemoved(last))),
            None => Err(not_found(&id)),
        }
    }

    fn lookup_mut(&mut self, id: &str) -> Result<&mut DeviceData, StoreError> {
        self.devices.get_mut(id).ok_or_else(|| not_found(id))
    }
}

fn require_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::InvalidArgument("device id is required".into()));
    }
    Ok(())
}

fn reject_duplicate_protocols(device: &DeviceData) -> Result<(), StoreError> {
    match device.duplicate_protocol() {
        Some(protocol) => Err(StoreError::InvalidArgument(format!(
            "device '{}' lists protocol {} more than once",
            device.id, protocol
        ))),
        None => Ok(()),
    }
}

fn check_revision(stored: &DeviceData, supplied: u64) -> Result<(), StoreError> {
    if stored.revision != supplied {
        return Err(StoreError::Conflict {
            id: stored.id.clone(),
            expected: stored.revision,
            actual: supplied,
        });
    }
    Ok(())
}

fn not_found(id: &str) -> StoreError {
    StoreError::NotFound(format!("device '{}' not found", id))
}
