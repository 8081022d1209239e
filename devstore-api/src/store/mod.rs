//! DeviceStore abstraction for the inventory.
//!
//! # Architecture
//!
//! ```text
//! grpc/server.rs ─┐
//! protocol_state ─┴→ Arc<dyn DeviceStore>
//!                         ↓
//!                   MemoryStore: RwLock<DeviceState>
//!                         │  write guard: apply(Command) → events
//!                         ↓
//!                   SubscriptionHub ──→ Subscription (one per List stream)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use devstore_api::store::{DeviceStore, MemoryStore};
//! use devstore_api::command::DeviceData;
//!
//! let store = Arc::new(MemoryStore::default());
//! let device = store
//!     .add_device(DeviceData::new("d1", "10.0.0.1:50051", "1.0"))
//!     .await?;
//! assert_eq!(device.revision, 1);
//!
//! let mut watch = store.watch(true).await?;
//! // watch.snapshot, then watch.subscription.recv() in commit order
//! ```

mod error;
mod event;
mod hub;
mod memory_store;
mod traits;

pub use error::{Result, StoreError};
pub use event::{Event, EventType, WatchEvent};
pub use hub::{Subscription, SubscriptionHub};
pub use memory_store::MemoryStore;
pub use traits::*;
