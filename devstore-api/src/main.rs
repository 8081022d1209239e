use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tonic::transport::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use devstore_api::{
    DeviceServiceImpl, DeviceServiceServer, MemoryStore, StoreAuditLogger, StoreConfig,
    create_audit_logger,
};

#[derive(Parser)]
#[command(name = "devstore-api")]
#[command(about = "Device inventory store with ordered change streaming")]
struct Args {
    /// gRPC listen address
    #[arg(short, long, default_value = "[::1]:50061")]
    listen: String,

    /// Events queued per List subscriber before it is disconnected
    #[arg(long, default_value_t = StoreConfig::DEFAULT_SUBSCRIBER_BUFFER)]
    subscriber_buffer: usize,

    /// Never disconnect slow subscribers (queues grow without bound)
    #[arg(long)]
    unbounded_subscribers: bool,

    /// Disable the audit trail
    #[arg(long)]
    no_audit: bool,
}

impl Args {
    fn store_config(&self) -> StoreConfig {
        let config = if self.unbounded_subscribers {
            StoreConfig::unbounded()
        } else {
            StoreConfig::default()
        };
        config.with_subscriber_buffer(self.subscriber_buffer)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("devstore_api=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = args.store_config();

    let audit = if args.no_audit {
        Arc::new(StoreAuditLogger::new_noop())
    } else {
        create_audit_logger("devstore")
    };

    info!(
        listen = %args.listen,
        subscriber_buffer = config.subscriber_buffer,
        backpressure = ?config.backpressure,
        "Starting devstore-api"
    );

    if args.unbounded_subscribers {
        warn!("Unbounded subscriber queues enabled, slow List clients can grow memory without limit");
    }

    let store = Arc::new(MemoryStore::with_audit(config, audit));
    let service = DeviceServiceImpl::new(store.clone());

    let addr = args.listen.parse()?;

    // Create shutdown signal channel
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let grpc_handle = tokio::spawn(async move {
        info!(addr = %addr, "gRPC API listening");
        Server::builder()
            .add_service(DeviceServiceServer::new(service))
            .serve_with_shutdown(addr, async move {
                shutdown_rx.changed().await.ok();
                // Open List streams would keep the graceful drain waiting forever
                store.close().await;
            })
            .await
    });

    // Wait for shutdown signal
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            info!("Received SIGINT");
        }
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    let _ = shutdown_tx.send(true);
    grpc_handle.await??;

    info!("Shutdown complete");
    Ok(())
}
