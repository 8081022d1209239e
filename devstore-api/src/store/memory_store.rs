//! MemoryStore implementation - drives the device state machine in process.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::audit::StoreAuditLogger;
use crate::command::{Command, DeviceData, Protocol, Response};
use crate::config::StoreConfig;
use crate::state::DeviceState;

use super::error::{Result, StoreError};
use super::event::Event;
use super::hub::SubscriptionHub;
use super::traits::{DeviceStore, MergeProtocolStateRequest, Watch};

/// Single-instance device store.
///
/// The write guard on `state` is the one serialization point: a command is
/// applied and its events are published to the hub under the same guard.
/// Watch registration takes the read guard, so it can never interleave with
/// a commit. Audit entries are written under the same guard and therefore
/// follow commit order.
pub struct MemoryStore {
    state: RwLock<DeviceState>,
    hub: SubscriptionHub,
    audit: Arc<StoreAuditLogger>,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_audit(config, Arc::new(StoreAuditLogger::new_noop()))
    }

    pub fn with_audit(config: StoreConfig, audit: Arc<StoreAuditLogger>) -> Self {
        Self {
            state: RwLock::new(DeviceState::default()),
            hub: SubscriptionHub::new(config, audit.clone()),
            audit,
        }
    }

    /// End every open watch. Called on shutdown so streaming clients see a
    /// clean end of stream instead of holding the server open.
    pub async fn close(&self) {
        let _state = self.state.write().await;
        self.hub.close();
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Apply a command and publish its events under the write guard.
    async fn write_command(&self, cmd: Command) -> Response {
        let id = cmd.device_id().to_string();
        let merged = match &cmd {
            Command::MergeProtocolState { state, .. } => Some(state.protocol),
            _ => None,
        };

        let mut state = self.state.write().await;
        let (response, events) = state.apply(cmd);
        if !events.is_empty() {
            self.audit_commit(&events, merged);
            let index = self.hub.publish(events);
            debug!(id = %id, index, "Committed");
        }
        response
    }

    fn audit_commit(&self, events: &[Event], merged: Option<Protocol>) {
        for event in events {
            match (event, merged) {
                (Event::DeviceAdded(device), _) => self.audit.device_added(device),
                (Event::DeviceUpdated { new, .. }, Some(protocol)) => {
                    self.audit.protocol_state_merged(new, protocol)
                }
                (Event::DeviceUpdated { new, .. }, None) => self.audit.device_updated(new),
                (Event::DeviceRemoved(device), _) => self.audit.device_removed(&device.id),
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn add_device(&self, device: DeviceData) -> Result<DeviceData> {
        match self.write_command(Command::AddDevice { device }).await {
            Response::Device(data) => Ok(data),
            Response::Error(e) => Err(e),
            _ => Err(StoreError::Internal("unexpected response".into())),
        }
    }

    async fn update_device(&self, device: DeviceData) -> Result<DeviceData> {
        match self.write_command(Command::UpdateDevice { device }).await {
            Response::Device(data) => Ok(data),
            Response::Error(e) => Err(e),
            _ => Err(StoreError::Internal("unexpected response".into())),
        }
    }

    async fn get_device(&self, id: &str) -> Result<DeviceData> {
        let state = self.state.read().await;
        state
            .get_device(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("device '{}' not found", id)))
    }

    async fn remove_device(&self, id: &str) -> Result<()> {
        let cmd = Command::RemoveDevice { id: id.to_string() };
        match self.write_command(cmd).await {
            Response::Removed(_) => Ok(()),
            Response::Error(e) => Err(e),
            _ => Err(StoreError::Internal("unexpected response".into())),
        }
    }

    async fn list_devices(&self) -> Result<Vec<DeviceData>> {
        let state = self.state.read().await;
        Ok(state.list_devices().into_iter().cloned().collect())
    }

    async fn merge_protocol_state(&self, req: MergeProtocolStateRequest) -> Result<DeviceData> {
        let cmd = Command::MergeProtocolState {
            id: req.id,
            revision: req.revision,
            state: req.state,
        };

        match self.write_command(cmd).await {
            Response::Device(data) => Ok(data),
            Response::Error(e) => Err(e),
            _ => Err(StoreError::Internal("unexpected response".into())),
        }
    }

    async fn watch(&self, subscribe: bool) -> Result<Watch> {
        let state = self.state.read().await;
        let snapshot: Vec<DeviceData> = state.list_devices().into_iter().cloned().collect();
        let index = self.hub.last_index();
        let subscription = subscribe.then(|| self.hub.register());
        drop(state);

        debug!(
            devices = snapshot.len(),
            index, subscribe, "Watch registered"
        );
        Ok(Watch {
            snapshot,
            index,
            subscription,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Protocol, ProtocolStateData, ServiceState};
    use crate::store::{Event, EventType};
    use std::collections::HashSet;
    use std::time::Duration;

    fn device(id: &str) -> DeviceData {
        DeviceData::new(id, "10.0.0.1:50051", "1.0")
    }

    /// Collects formatted tracing output so audit lines can be asserted on.
    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let store = MemoryStore::default();
        let mut d = device("d1");
        d.target = "leaf-1".into();
        d.timeout = Some(Duration::from_secs(5));

        let added = store.add_device(d.clone()).await.unwrap();
        assert_eq!(added.revision, 1);

        let fetched = store.get_device("d1").await.unwrap();
        assert_eq!(fetched, DeviceData { revision: 1, ..d });
    }

    #[tokio::test]
    async fn test_get_unknown_device() {
        let store = MemoryStore::default();
        assert!(matches!(
            store.get_device("nope").await,
            Err(StoreError::NotFound(_))
        ));
        // An empty id is just another id that is not present
        assert!(matches!(
            store.get_device("").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_then_get() {
        let store = MemoryStore::default();
        store.add_device(device("d1")).await.unwrap();

        store.remove_device("d1").await.unwrap();
        assert!(matches!(
            store.get_device("d1").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.remove_device("d1").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.list_devices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_mutation_publishes_nothing() {
        let store = MemoryStore::default();
        store.add_device(device("d1")).await.unwrap();

        let mut watch = store.watch(true).await.unwrap();
        let sub = watch.subscription.as_mut().unwrap();

        assert!(store.add_device(device("d1")).await.is_err());
        assert!(store.remove_device("ghost").await.is_err());
        store.add_device(device("d2")).await.unwrap();

        let next = sub.recv().await.unwrap().unwrap();
        assert_eq!(next.index, 2);
        assert_eq!(next.event.event_type(), EventType::Added);
        assert_eq!(next.event.device_id(), "d2");
    }

    #[tokio::test]
    async fn test_concurrent_updates_same_revision() {
        let store = Arc::new(MemoryStore::default());
        let added = store.add_device(device("d1")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let mut change = added.clone();
            change.role = format!("role-{}", i);
            handles.push(tokio::spawn(async move { store.update_device(change).await }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(d) => {
                    assert_eq!(d.revision, 2);
                    ok += 1;
                }
                Err(StoreError::Conflict { expected: 2, actual: 1, .. }) => conflicts += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(store.get_device("d1").await.unwrap().revision, 2);
    }

    #[tokio::test]
    async fn test_merge_emits_update() {
        let store = MemoryStore::default();
        store.add_device(device("d1")).await.unwrap();
        let mut watch = store.watch(true).await.unwrap();

        let state = ProtocolStateData {
            protocol: Protocol::Operations,
            service_state: ServiceState::Available,
            ..Default::default()
        };
        let merged = store
            .merge_protocol_state(MergeProtocolStateRequest {
                id: "d1".into(),
                revision: None,
                state,
            })
            .await
            .unwrap();
        assert_eq!(merged.revision, 2);

        let event = watch
            .subscription
            .as_mut()
            .unwrap()
            .recv()
            .await
            .unwrap()
            .unwrap();
        match event.event {
            Event::DeviceUpdated { old, new, .. } => {
                assert_eq!(old.revision, 1);
                assert_eq!(new.protocol_states, vec![state]);
            }
            other => panic!("Expected update, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_list_does_not_subscribe() {
        let store = MemoryStore::default();
        store.add_device(device("a")).await.unwrap();
        store.add_device(device("b")).await.unwrap();

        let watch = store.watch(false).await.unwrap();
        let ids: HashSet<String> = watch.snapshot.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, HashSet::from(["a".to_string(), "b".to_string()]));
        assert_eq!(watch.index, 2);
        assert!(watch.subscription.is_none());
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_watch_deregisters() {
        let store = MemoryStore::default();
        let watch = store.watch(true).await.unwrap();
        assert_eq!(store.subscriber_count(), 1);
        drop(watch);
        assert_eq!(store.subscriber_count(), 0);
    }

    /// Snapshot plus live events must cover every device exactly once, no
    /// matter where the registration lands among concurrent adds.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_snapshot_then_live_has_no_gap_or_duplicate() {
        const DEVICES: usize = 200;
        let store = Arc::new(MemoryStore::new(StoreConfig::unbounded()));

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..DEVICES {
                    store.add_device(device(&format!("d{}", i))).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        tokio::task::yield_now().await;
        let mut watch = store.watch(true).await.unwrap();
        writer.await.unwrap();

        let mut seen: HashSet<String> = watch.snapshot.iter().map(|d| d.id.clone()).collect();
        assert_eq!(seen.len(), watch.snapshot.len());
        assert_eq!(watch.index as usize, watch.snapshot.len());

        let sub = watch.subscription.as_mut().unwrap();
        let mut expected_index = watch.index;
        while seen.len() < DEVICES {
            let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
                .await
                .expect("timed out waiting for event")
                .unwrap()
                .unwrap();
            expected_index += 1;
            assert_eq!(event.index, expected_index);
            assert!(
                seen.insert(event.event.device_id().to_string()),
                "duplicate {}",
                event.event.device_id()
            );
        }
    }

    #[tokio::test]
    async fn test_close_ends_open_watches() {
        let store = MemoryStore::default();
        let mut watch = store.watch(true).await.unwrap();

        store.close().await;
        assert_eq!(store.subscriber_count(), 0);
        assert!(watch.subscription.as_mut().unwrap().recv().await.is_none());

        // Writes keep working; nobody is listening any more
        store.add_device(device("d1")).await.unwrap();
        assert!(store.watch(true).await.unwrap().subscription.unwrap().recv().await.is_none());
    }

    #[tokio::test]
    async fn test_audit_follows_commits() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let store = MemoryStore::with_audit(
            StoreConfig::default(),
            crate::audit::create_audit_logger("test"),
        );
        let added = store.add_device(device("d1")).await.unwrap();
        assert!(store.add_device(device("d1")).await.is_err());
        store.update_device(added).await.unwrap();
        store
            .merge_protocol_state(MergeProtocolStateRequest {
                id: "d1".into(),
                revision: None,
                state: ProtocolStateData {
                    protocol: Protocol::Operations,
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        store.remove_device("d1").await.unwrap();

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let audit: Vec<&str> = output.lines().filter(|l| l.contains("audit:")).collect();
        assert_eq!(audit.len(), 4, "{}", output);
        assert!(audit[0].contains("Device added: d1"));
        assert!(audit[1].contains("Device updated: d1 (revision 2)"));
        assert!(audit[2].contains("Protocol state merged: d1 operations (revision 3)"));
        assert!(audit[3].contains("Device removed: d1"));
    }
}
