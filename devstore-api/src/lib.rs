pub mod audit;
pub mod command;
pub mod config;
pub mod grpc;
pub mod protocol_state;
pub mod state;
pub mod store;

pub use audit::{StoreAuditLogger, create_audit_logger};
pub use command::{Command, DeviceData, ProtocolStateData, Response};
pub use config::{Backpressure, StoreConfig};
pub use grpc::DeviceServiceImpl;
pub use grpc::proto::device_service_server::DeviceServiceServer;
pub use protocol_state::ProtocolStateMerger;
pub use state::DeviceState;
pub use store::{DeviceStore, Event, MemoryStore, StoreError};
