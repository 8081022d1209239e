//! gRPC server implementation for DeviceService.

use std::pin::Pin;
use std::sync::Arc;

use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use crate::command::{DeviceData, ProtocolStateData};
use crate::protocol_state::ProtocolStateMerger;
use crate::store::{DeviceStore, EventType, Watch};

use super::convert::list_response;
use super::proto::device_service_server::DeviceService;
use super::proto::{
    AddDeviceRequest, AddDeviceResponse, GetDeviceRequest, GetDeviceResponse, GetVersionRequest,
    ListDevicesRequest, ListDevicesResponse, RemoveDeviceRequest, RemoveDeviceResponse,
    UpdateDeviceRequest, UpdateDeviceResponse, UpdateProtocolStateRequest,
    UpdateProtocolStateResponse, VersionInfo,
};

/// DeviceService gRPC implementation.
///
/// Holds no state of its own; every call is dispatched to the store, which
/// also writes the audit trail.
pub struct DeviceServiceImpl {
    store: Arc<dyn DeviceStore>,
    merger: ProtocolStateMerger,
}

impl DeviceServiceImpl {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self {
            merger: ProtocolStateMerger::new(store.clone()),
            store,
        }
    }
}

fn required_device(device: Option<super::proto::Device>) -> Result<DeviceData, Status> {
    let device = device.ok_or_else(|| Status::invalid_argument("device is required"))?;
    Ok(DeviceData::try_from(device)?)
}

#[tonic::async_trait]
impl DeviceService for DeviceServiceImpl {
    async fn get_version(
        &self,
        _request: Request<GetVersionRequest>,
    ) -> Result<Response<VersionInfo>, Status> {
        Ok(Response::new(VersionInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }))
    }

    async fn add(
        &self,
        request: Request<AddDeviceRequest>,
    ) -> Result<Response<AddDeviceResponse>, Status> {
        let device = required_device(request.into_inner().device)?;
        info!(id = %device.id, address = %device.address, "Adding device");

        let device = self.store.add_device(device).await?;

        info!(id = %device.id, revision = device.revision, "Device added");
        Ok(Response::new(AddDeviceResponse {
            device: Some((&device).into()),
        }))
    }

    async fn update(
        &self,
        request: Request<UpdateDeviceRequest>,
    ) -> Result<Response<UpdateDeviceResponse>, Status> {
        let device = required_device(request.into_inner().device)?;
        info!(id = %device.id, revision = device.revision, "Updating device");

        let device = self.store.update_device(device).await.inspect_err(|e| {
            debug!(error = %e, "Update rejected");
        })?;

        info!(id = %device.id, revision = device.revision, "Device updated");
        Ok(Response::new(UpdateDeviceResponse {
            device: Some((&device).into()),
        }))
    }

    async fn get(
        &self,
        request: Request<GetDeviceRequest>,
    ) -> Result<Response<GetDeviceResponse>, Status> {
        let req = request.into_inner();
        let device = self.store.get_device(&req.id).await?;
        Ok(Response::new(GetDeviceResponse {
            device: Some((&device).into()),
        }))
    }

    async fn remove(
        &self,
        request: Request<RemoveDeviceRequest>,
    ) -> Result<Response<RemoveDeviceResponse>, Status> {
        let req = request.into_inner();
        let device = req
            .device
            .ok_or_else(|| Status::invalid_argument("device is required"))?;
        // Removal is unconditional; the supplied revision is not checked
        info!(id = %device.id, "Removing device");

        self.store.remove_device(&device.id).await?;

        info!(id = %device.id, "Device removed");
        Ok(Response::new(RemoveDeviceResponse {}))
    }

    type ListStream = Pin<Box<dyn Stream<Item = Result<ListDevicesResponse, Status>> + Send + 'static>>;

    async fn list(
        &self,
        request: Request<ListDevicesRequest>,
    ) -> Result<Response<Self::ListStream>, Status> {
        let subscribe = request.into_inner().subscribe;
        let Watch {
            snapshot,
            index,
            subscription,
        } = self.store.watch(subscribe).await?;

        info!(devices = snapshot.len(), index, subscribe, "List started");

        // The subscription lives inside the stream: when tonic drops the
        // stream on client disconnect or shutdown, it deregisters.
        let stream = async_stream::stream! {
            for device in snapshot {
                yield Ok::<ListDevicesResponse, Status>(list_response(EventType::None, &device));
            }

            if let Some(mut subscription) = subscription {
                while let Some(next) = subscription.recv().await {
                    match next {
                        Ok(watch_event) => {
                            let event = watch_event.event;
                            yield Ok(list_response(event.event_type(), event.device()));
                        }
                        Err(e) => {
                            warn!(subscriber = subscription.id(), error = %e, "List stream terminated");
                            yield Err(Status::from(e));
                            break;
                        }
                    }
                }
            }
        };

        Ok(Response::new(Box::pin(stream)))
    }

    async fn update_protocol_state(
        &self,
        request: Request<UpdateProtocolStateRequest>,
    ) -> Result<Response<UpdateProtocolStateResponse>, Status> {
        let req = request.into_inner();
        let state = req
            .state
            .as_ref()
            .map(ProtocolStateData::from)
            .ok_or_else(|| Status::invalid_argument("state is required"))?;

        let device = match req.revision {
            Some(revision) => self.merger.merge_at(&req.id, revision, state).await?,
            None => self.merger.merge(&req.id, state).await?,
        };

        Ok(Response::new(UpdateProtocolStateResponse {
            device: Some((&device).into()),
        }))
    }
}
