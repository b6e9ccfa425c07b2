//! blob-quickstart -- read and write Azure Blob Storage files over HTTP.
//!
//! Configuration comes from the environment.  SIGTERM/SIGINT stop accepting
//! connections and let in-flight requests finish.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use blob_quickstart::config::{Config, LoggingConfig};
use blob_quickstart::storage::azure::{build_container_handle, BlobServiceClient};
use blob_quickstart::storage::memory::MemoryContainer;
use blob_quickstart::storage::BlobContainer;

/// Command-line arguments for the blob-quickstart server.
#[derive(Parser, Debug)]
#[command(
    name = "blob-quickstart",
    version,
    about = "Read and write Azure Blob Storage files using a managed identity"
)]
struct Cli {
    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

/// Initialize tracing / logging.  `RUST_LOG` wins over `LOG_LEVEL`.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(&config.logging);

    let bind_addr = cli.bind.clone().unwrap_or_else(|| config.bind_addr());

    if config.observability.metrics {
        blob_quickstart::metrics::init_metrics()?;
        blob_quickstart::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let container: Arc<dyn BlobContainer> = match config.storage.backend.as_str() {
        "memory" => {
            info!(
                "In-memory blob container initialized: container={}",
                config.storage.container_name
            );
            Arc::new(MemoryContainer::new(config.storage.container_name.clone()))
        }
        "azure" => {
            let credential = blob_quickstart::identity::resolve_credential(&config.identity)?;

            info!("Blob Storage Name {}", config.storage.account_name);
            info!("Blob Storage Container {}", config.storage.container_name);

            let handle = match &config.storage.endpoint {
                Some(endpoint) => BlobServiceClient::new(endpoint.clone(), credential)?
                    .container_client(config.storage.container_name.clone()),
                None => build_container_handle(
                    &config.storage.account_name,
                    &config.storage.container_name,
                    credential,
                )?,
            };
            info!(
                "Azure blob container initialized: endpoint={} container={}",
                handle.endpoint(),
                handle.name()
            );
            Arc::new(handle)
        }
        other => anyhow::bail!("unknown BLOB_BACKEND '{other}', expected 'azure' or 'memory'"),
    };

    let state = Arc::new(blob_quickstart::AppState { config, container });

    let app = blob_quickstart::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("blob-quickstart listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("blob-quickstart shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
