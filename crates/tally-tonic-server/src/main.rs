#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use core::{future::Future, time::Duration};
use futures::Stream;
use server::config::{CliArgs, ServerConfig};
use server::service::handler::StoreService;
use server::telemetry::{TelemetryProviders, init_telemetry};
use tally_tonic_core::proto::{FILE_DESCRIPTOR_SET, counter_store_server::CounterStoreServer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_reflection::server::Builder;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(providers, incoming, config).await;
            // A panic can still leave the socket file behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(providers, incoming, config).await
    }
}

async fn run_server_with_incoming<I, IO, IE>(
    providers: TelemetryProviders,
    incoming: I,
    config: ServerConfig,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let service = StoreService::new(&config)?;
    let res = serve(service, incoming, shutdown_signal(), config.shutdown_grace).await;

    #[cfg(feature = "tracing")]
    {
        if res.is_ok() {
            tracing::info!("Service shut down successfully");
        }
    }

    providers.shutdown();
    res
}

/// Serves the counter store, health and reflection services on `incoming`
/// until `signal` resolves, then stops accepting requests and flushes the
/// database.
///
/// Open connections get `grace` to close after the flush. Blocking clients
/// only poll their connection while a request is in flight, so an idle one
/// never acknowledges the shutdown on its own.
async fn serve<I, IO, IE, F>(
    service: StoreService,
    incoming: I,
    signal: F,
    grace: Duration,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<Box<dyn std::error::Error + Send + Sync>>,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<CounterStoreServer<StoreService>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let (drain_tx, drain_rx) = oneshot::channel::<()>();
    let shutdown = {
        let service = service.clone();
        async move {
            signal.await;

            #[cfg(feature = "tracing")]
            tracing::info!("Shutdown signal received, terminating gracefully...");

            // 1. Publish the status
            health_reporter
                .set_not_serving::<CounterStoreServer<StoreService>>()
                .await;

            // 2. Reject new requests and persist everything acknowledged so far
            if let Err(_e) = service.shutdown().await {
                #[cfg(feature = "tracing")]
                tracing::error!("Error during service shutdown: {:?}", _e);
            }

            // 3. Start the drain deadline
            let _ = drain_tx.send(());
        }
    };

    let drained = async move {
        match drain_rx.await {
            Ok(()) => tokio::time::sleep(grace).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    let server = Server::builder()
        .http2_adaptive_window(Some(true))
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_store_service(service))
        .serve_with_incoming_shutdown(incoming, shutdown);

    // Connection tasks left behind end with the runtime.
    tokio::select! {
        res = server => res?,
        () = drained => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Connections still open after {:?}, closing them", grace);
        }
    }
    Ok(())
}

fn log_startup_info(_addr: &str, _config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting counter store on {} with full config: {:#?}",
            _addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting counter store on {} (data: {}, sync writes: {})",
            _addr,
            if _config.temporary {
                "temporary".to_string()
            } else {
                _config.data_dir.display().to_string()
            },
            _config.sync_writes
        );
    }
}

fn build_store_service(service: StoreService) -> CounterStoreServer<StoreService> {
    CounterStoreServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("failed to install SIGTERM handler: {:?}", _e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("failed to install Ctrl+C handler: {:?}", _e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }
}
