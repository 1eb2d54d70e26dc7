// ============================================================
// Layer 2 — Distributed Launch
// ============================================================
// One worker per local device, each on its own scoped thread.
//
//   world_size = world_size | num_gpus * num_nodes
//   world_rank = node_rank * num_gpus + local_rank
//
// Workers share nothing mutable; every one of them runs the
// full per-dataset pipeline with its own WorkerLaunch. Only
// world rank 0 prompts about existing logs.

use anyhow::{anyhow, Context, Result};

use crate::application::config::RunConfig;
use crate::domain::placement::{DevicePlacement, WorkerLaunch};

/// The rendezvous info for every device listed in `config.gpus`.
pub fn worker_launches(config: &RunConfig) -> Vec<WorkerLaunch> {
    let world_size = config.effective_world_size();
    config
        .gpus
        .iter()
        .enumerate()
        .map(|(local_rank, &device)| WorkerLaunch {
            local_rank,
            world_rank: config.node_rank * config.num_gpus + local_rank,
            world_size,
            device,
            dist_url: config.dist_url.clone(),
            dist_backend: config.dist_backend.clone(),
        })
        .collect()
}

/// Run `worker` once per local device and wait for all of them.
/// Fails if any worker fails; otherwise returns local rank 0's result.
pub fn spawn_workers<T, F>(config: &RunConfig, worker: F) -> Result<T>
where
    T: Send,
    F: Fn(DevicePlacement) -> Result<T> + Sync,
{
    let launches = worker_launches(config);
    tracing::info!(
        "Launching {} worker(s), world size {} via {} ({})",
        launches.len(),
        config.effective_world_size(),
        config.dist_url,
        config.dist_backend
    );

    let results: Vec<Result<T>> = std::thread::scope(|scope| {
        let handles: Vec<_> = launches
            .into_iter()
            .map(|launch| {
                let worker = &worker;
                scope.spawn(move || {
                    let rank = launch.world_rank;
                    tracing::debug!("Worker rank {rank} on device {}", launch.device);
                    worker(DevicePlacement::Distributed(launch))
                        .with_context(|| format!("worker rank {rank} failed"))
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| Err(anyhow!("worker thread panicked"))))
            .collect()
    });

    let mut primary = None;
    for result in results {
        let value = result?;
        if primary.is_none() {
            primary = Some(value);
        }
    }
    primary.context("no devices to launch workers on")
}
