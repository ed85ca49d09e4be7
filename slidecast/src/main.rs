use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use slidecast::api::{ApiServer, ApiServerConfig, AppState};
use slidecast::config::{AppConfig, ExecutionMode};
use slidecast::exec::{
    ExecutionStrategy, InlineExecutor, JobQueue, QueuedExecutor, WorkerPool, WorkerPoolConfig,
};
use slidecast::progress::{InMemoryProgressStore, ProgressPublisher};
use slidecast::render::audio::AudioSynchronizer;
use slidecast::render::encoder::EncodeInvoker;
use slidecast::render::JobLifecycleManager;
use slidecast::storage::AssetStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default();
    let _guard = slidecast::logging::init(&config.log_dir)?;

    let assets = Arc::new(AssetStore::new(&config.storage));
    assets.ensure_layout().await?;

    let shutdown = CancellationToken::new();

    let progress = Arc::new(InMemoryProgressStore::new(config.progress_ttl));
    InMemoryProgressStore::spawn_sweeper(progress.clone(), shutdown.clone());
    let publisher: Arc<dyn ProgressPublisher> = progress;

    let manager = Arc::new(JobLifecycleManager::new(
        (*assets).clone(),
        AudioSynchronizer::new(&config.tools.ffmpeg_path, &config.tools.ffprobe_path),
        EncodeInvoker::new(&config.tools.ffmpeg_path),
        publisher.clone(),
        config.retry,
    ));

    let mut pool = None;
    let executor: Arc<dyn ExecutionStrategy> = match config.execution_mode {
        ExecutionMode::Inline => {
            info!("Using inline execution");
            Arc::new(InlineExecutor::new(manager))
        }
        ExecutionMode::Queued => {
            info!(workers = config.workers, "Using queued execution");
            let queue = Arc::new(JobQueue::new());
            let worker_pool = WorkerPool::new(WorkerPoolConfig {
                max_workers: config.workers,
                job_timeout_secs: config.job_timeout.as_secs(),
                ..WorkerPoolConfig::default()
            });
            worker_pool.start(queue.clone(), manager, publisher.clone());
            pool = Some(worker_pool);
            Arc::new(QueuedExecutor::new(queue, publisher.clone()))
        }
    };

    let state = AppState::new(executor, publisher, assets);
    let server = ApiServer::new(ApiServerConfig::from_env_or_default(), state);
    let server_cancel = server.cancel_token();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        server_cancel.cancel();
    });

    server.run().await?;

    shutdown.cancel();
    if let Some(pool) = pool {
        pool.stop().await;
    }
    info!("slidecast stopped");

    Ok(())
}
