//! gRPC service for device inventory clients and health collaborators.

pub mod convert;
pub mod server;

// Include the generated protobuf code
pub mod proto {
    tonic::include_proto!("devstore.device");
}

use tonic::Status;

use crate::store::StoreError;

pub use server::DeviceServiceImpl;

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::InvalidArgument(_) => Status::invalid_argument(message),
            StoreError::AlreadyExists(_) => Status::already_exists(message),
            StoreError::NotFound(_) => Status::not_found(message),
            StoreError::Conflict { .. } => Status::aborted(message),
            StoreError::ResourceExhausted(_) => Status::resource_exhausted(message),
            StoreError::Internal(_) => Status::internal(message),
        }
    }
}
