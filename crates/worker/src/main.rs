//! Worker entrypoint: wire config, store, queue, and coordinator, then
//! consume until something fatal happens.
//!
//! Exits nonzero on a fatal fault; the supervisor restart is what turns a
//! dead broker or store connection into a reconnect cycle.

use anyhow::Context;
use tracing::{error, info};

use motionforge_infra::{
    RedisStreamQueue, RedisStreamQueueConfig, RedisTaskStore, RedisTaskStoreConfig,
    RetryCoordinator,
};
use motionforge_messaging::TaskQueue;
use motionforge_worker::{Config, RenderExecutor};

fn main() {
    motionforge_observability::init();

    if let Err(e) = run() {
        error!(error = %format!("{e:#}"), "worker exiting");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.inputs_dir)
        .with_context(|| format!("failed to create {}", config.inputs_dir.display()))?;
    std::fs::create_dir_all(&config.outputs_dir)
        .with_context(|| format!("failed to create {}", config.outputs_dir.display()))?;

    info!(
        queue = %config.queue,
        worker_name = %config.worker_name,
        device = %config.device,
        max_attempts = config.max_attempts,
        "starting animation worker"
    );

    let store =
        RedisTaskStore::connect(RedisTaskStoreConfig::default().with_url(&config.store_url))?;

    let mut queue_config = RedisStreamQueueConfig::default()
        .with_url(&config.broker_url)
        .with_queue(&config.queue)
        .with_consumer(&config.worker_name);
    queue_config.block_ms = config.block_ms;
    queue_config.claim_idle_ms = config.claim_idle_ms;
    let queue = RedisStreamQueue::connect(queue_config)?;

    let executor = RenderExecutor::new(&config);
    let coordinator = RetryCoordinator::new(store, executor).with_max_attempts(config.max_attempts);

    queue.consume(&coordinator).context("consumption aborted")
}
