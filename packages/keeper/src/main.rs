use std::{net::SocketAddr, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, watch};

use ethernauts_keeper::{
    chain::EthernautsClient,
    config::KeeperConfig,
    jobs::{
        JobContext, JobProcessor, ProcessBatchData, UploadResourceData, JOB_PROCESS_BATCH,
        JOB_UPDATE_BASE_URL, JOB_UPLOAD_RESOURCE,
    },
    queue::{FlowQueue, Job, JobQueue},
    routes,
    state::AppState,
    storage::FleekClient,
};

#[derive(Debug, Parser)]
#[command(name = "ethernauts-keeper")]
#[command(about = "Uploads Ethernauts metadata to IPFS and updates the contract base URI")]
struct Cli {
    #[command(flatten)]
    config: KeeperConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Shuffle a batch and upload all of its resources, then update the base URI.
    ProcessBatch {
        #[arg(long)]
        batch_number: u64,
        #[arg(long)]
        batch_size: u64,
    },
    /// Point the contract at the current metadata folder hash.
    UpdateBaseUrl,
    /// Upload a single token's metadata and image.
    UploadResource {
        #[arg(long)]
        token_id: u64,
        #[arg(long)]
        asset_id: u64,
    },
    /// Run the worker continuously with an HTTP status server.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ethernauts_keeper=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let rpc_url = config.rpc_url();
    tracing::info!(
        rpc_url = %rpc_url,
        contract = %config.contract_address,
        bucket = %config.fleek_bucket,
        "starting ethernauts-keeper"
    );

    if matches!(
        cli.command,
        Command::ProcessBatch { .. } | Command::UploadResource { .. }
    ) {
        config.require_resource_folders()?;
    } else if let Err(e) = config.require_resource_folders() {
        tracing::warn!(error = %e, "resource folders unavailable, uploads will fail");
    }
    let settings = Arc::new(config.job_settings());

    // Broadcast channel for job lifecycle events
    let (event_tx, _) = broadcast::channel::<String>(256);
    let queue = Arc::new(FlowQueue::new(event_tx.clone()));

    let contract = EthernautsClient::new(rpc_url, config.contract_address.clone())
        .with_from(config.from.clone())
        .with_poll_interval(config.receipt_poll_interval());
    let storage = FleekClient::new(
        &config.fleek_endpoint,
        config.fleek_bucket.clone(),
        config.fleek_api_key.clone(),
        config.fleek_api_secret.clone(),
    );

    let processor = JobProcessor::new(JobContext {
        contract: Arc::new(contract),
        queue: queue.clone(),
        storage: Arc::new(storage),
        settings: settings.clone(),
    });

    let queue_name = settings.mints_queue_name.as_str();
    let job = match cli.command {
        Command::ProcessBatch {
            batch_number,
            batch_size,
        } => Job::new(
            JOB_PROCESS_BATCH,
            queue_name,
            serde_json::to_value(ProcessBatchData {
                batch_number,
                batch_size,
            })?,
        ),
        Command::UpdateBaseUrl => Job::new(JOB_UPDATE_BASE_URL, queue_name, serde_json::Value::Null),
        Command::UploadResource { token_id, asset_id } => Job::new(
            JOB_UPLOAD_RESOURCE,
            queue_name,
            serde_json::to_value(UploadResourceData { token_id, asset_id })?,
        ),
        Command::Serve { port } => {
            let state = Arc::new(AppState {
                queue: queue.clone(),
                mints_queue_name: settings.mints_queue_name.clone(),
                event_tx,
            });
            return serve(state, processor, port).await;
        }
    };

    queue.add(job).await?;
    let counts = queue.run_until_idle(&processor).await;
    tracing::info!(
        completed = counts.completed,
        failed = counts.failed,
        waiting_children = counts.waiting_children,
        "queue drained"
    );

    if counts.failed > 0 {
        bail!("{} job(s) failed", counts.failed);
    }
    Ok(())
}

async fn serve(state: Arc<AppState>, processor: JobProcessor, port: u16) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let queue = state.queue.clone();
    let worker = tokio::spawn(async move { queue.run(&processor, shutdown_rx).await });

    let app = routes::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "status server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    worker.await.context("queue worker panicked")?;

    Ok(())
}
