//! Shared test utilities for devstore-api integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use devstore_api::grpc::proto::device_service_client::DeviceServiceClient;
use devstore_api::grpc::proto::{Device, ListDevicesResponse};
use devstore_api::{DeviceServiceImpl, DeviceServiceServer, MemoryStore, StoreConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tonic::Streaming;
use tonic::transport::{Channel, Server};

/// Allocate an available port for testing.
pub fn allocate_port() -> u16 {
    portpicker::pick_unused_port().expect("No available port")
}

/// Test server wrapper around a DeviceService backed by a fresh MemoryStore.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(StoreConfig::default()).await
    }

    pub async fn spawn_with(config: StoreConfig) -> Self {
        let addr: SocketAddr = format!("127.0.0.1:{}", allocate_port()).parse().unwrap();
        let store = Arc::new(MemoryStore::new(config));
        let service = DeviceServiceImpl::new(store.clone());

        // Shut down the way the daemon does: close the store, then drain
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let closing = store.clone();
        let handle = tokio::spawn(async move {
            Server::builder()
                .add_service(DeviceServiceServer::new(service))
                .serve_with_shutdown(addr, async move {
                    shutdown_rx.changed().await.ok();
                    closing.close().await;
                })
                .await
        });

        Self {
            addr,
            store,
            shutdown_tx,
            handle,
        }
    }

    /// Connect a client, retrying until the server accepts connections.
    pub async fn client(&self) -> DeviceServiceClient<Channel> {
        let endpoint = format!("http://{}", self.addr);
        for _ in 0..100 {
            if let Ok(client) = DeviceServiceClient::connect(endpoint.clone()).await {
                return client;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Server at {} did not come up", self.addr);
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

/// Device with only the fields `Add` requires.
pub fn device(id: &str, address: &str, version: &str) -> Device {
    Device {
        id: id.to_string(),
        address: address.to_string(),
        version: version.to_string(),
        ..Default::default()
    }
}

/// Next List message, failing the test after a few seconds of silence.
pub async fn next_message(stream: &mut Streaming<ListDevicesResponse>) -> Option<ListDevicesResponse> {
    tokio::time::timeout(Duration::from_secs(5), stream.message())
        .await
        .expect("timed out waiting for List message")
        .expect("List stream failed")
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
