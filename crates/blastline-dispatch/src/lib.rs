//! # Blastline Dispatch
//!
//! The campaign dispatch engine: the batch scheduler that paces sends to
//! look human, the worker that claims and drives a campaign end to end,
//! the worker pool consuming the job queue, and the watchdog that
//! re-queues campaigns orphaned by a crash.

pub mod batch;
pub mod watchdog;
pub mod worker;

use std::sync::Arc;

use async_trait::async_trait;
use blastline_core::types::RunSignal;
use blastline_store::Store;

pub use worker::{DispatchWorker, RunOutcome};

/// The cooperative cancellation probe: "should I stop or pause now?".
/// The scheduling algorithms only see this predicate; the storage polling
/// behind it is an implementation detail.
#[async_trait]
pub trait ControlProbe: Send + Sync {
    async fn check(&self) -> RunSignal;
}

/// Probe backed by re-reading the campaign row.
pub struct StoreProbe {
    store: Arc<Store>,
    campaign_id: String,
}

impl StoreProbe {
    pub fn new(store: Arc<Store>, campaign_id: &str) -> Self {
        Self { store, campaign_id: campaign_id.to_string() }
    }
}

#[async_trait]
impl ControlProbe for StoreProbe {
    async fn check(&self) -> RunSignal {
        match self.store.control_signal(&self.campaign_id) {
            Ok(signal) => signal,
            // A probe read failing must not kill a run mid-flight.
            Err(e) => {
                tracing::warn!("⚠️ control probe read failed for {}: {e}", self.campaign_id);
                RunSignal::Continue
            }
        }
    }
}

/// Spawn the dispatcher pool: `workers` concurrent loops that pop campaign
/// jobs from the queue and run them. Jobs for different campaigns run in
/// parallel; the atomic claim keeps two workers off the same campaign.
pub fn spawn_dispatcher_pool(
    worker: Arc<DispatchWorker>,
    workers: usize,
    queue_poll_secs: u64,
) -> Vec<tokio::task::JoinHandle<()>> {
    tracing::info!("🚀 dispatcher pool started ({workers} workers)");
    (0..workers.max(1))
        .map(|n| {
            let worker = worker.clone();
            tokio::spawn(async move {
                dispatcher_loop(worker, n, queue_poll_secs).await;
            })
        })
        .collect()
}

async fn dispatcher_loop(worker: Arc<DispatchWorker>, n: usize, queue_poll_secs: u64) {
    loop {
        let job = match worker.store().dequeue(worker::JOB_LOCK_SECS) {
            Ok(Some(job)) => job,
            Ok(None) => {
                tokio::time::sleep(std::time::Duration::from_secs(queue_poll_secs.max(1))).await;
                continue;
            }
            Err(e) => {
                tracing::warn!("⚠️ worker {n}: queue poll failed: {e}");
                tokio::time::sleep(std::time::Duration::from_secs(queue_poll_secs.max(1))).await;
                continue;
            }
        };

        tracing::info!("📤 worker {n}: picked campaign {}", job.campaign_id);
        match worker.claim_and_run(&job.campaign_id).await {
            Ok(outcome) => {
                tracing::info!("worker {n}: campaign {} → {outcome:?}", job.campaign_id);
            }
            Err(e) => {
                tracing::warn!("❌ worker {n}: campaign {} failed: {e}", job.campaign_id);
            }
        }
        // The job is done either way; failed campaigns are not auto-retried.
        if let Err(e) = worker.store().ack_job(job.id) {
            tracing::warn!("⚠️ worker {n}: ack failed for job {}: {e}", job.id);
        }
    }
}
