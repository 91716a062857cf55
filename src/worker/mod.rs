// src/worker/mod.rs
//! Periodic background loops shared by both processes.
//!
//! Each loop runs one step, sleeps for its interval, and repeats. A failed
//! step is logged and retried after a back-off that doubles per consecutive
//! failure, capped at the normal interval. Shutdown is broadcast on a
//! `watch` channel; a step in flight is cancelled at its next await point.

pub mod ingest;
pub mod publisher;

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub retry_after: Duration,
    pub max_retry_after: Duration,
}

impl RetryPolicy {
    pub fn new(interval: Duration, retry_after: Duration) -> Self {
        Self {
            interval,
            retry_after,
            max_retry_after: interval.max(retry_after),
        }
    }

    /// Sleep before the next step given the current failure streak.
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.interval;
        }
        let factor = 1u32 << (consecutive_failures - 1).min(16);
        self.retry_after
            .saturating_mul(factor)
            .min(self.max_retry_after)
    }
}

pub type ShutdownTx = watch::Sender<bool>;
pub type ShutdownRx = watch::Receiver<bool>;

pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    watch::channel(false)
}

/// Wait for Ctrl-C, then tell every loop to stop.
pub async fn wait_for_shutdown_signal(tx: ShutdownTx) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: "worker", "shutdown signal received"),
        Err(e) => warn!(target: "worker", error = %e, "ctrl-c handler failed; shutting down"),
    }
    let _ = tx.send(true);
}

fn stop_requested(rx: &ShutdownRx) -> bool {
    *rx.borrow()
}

/// Spawn a named loop running `step` under `policy` until shutdown.
pub fn spawn_loop<F, Fut>(
    name: &'static str,
    policy: RetryPolicy,
    mut shutdown: ShutdownRx,
    mut step: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        info!(target: "worker", task = name, interval_secs = policy.interval.as_secs(), "loop started");
        let mut failures = 0u32;
        loop {
            if stop_requested(&shutdown) {
                break;
            }

            let outcome = tokio::select! {
                res = step() => Some(res),
                _ = shutdown.changed() => None,
            };
            match outcome {
                None => break,
                Some(Ok(())) => failures = 0,
                Some(Err(e)) => {
                    failures = failures.saturating_add(1);
                    metrics::counter!("worker_step_failures_total", "task" => name).increment(1);
                    warn!(target: "worker", task = name, failures, "step failed: {e:#}");
                }
            }

            let delay = policy.delay_after(failures);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || stop_requested(&shutdown) {
                        break;
                    }
                }
            }
        }
        info!(target: "worker", task = name, "loop stopped");
    })
}

/// Await every loop handle, logging any that panicked.
pub async fn join_all(handles: Vec<JoinHandle<()>>) {
    for h in handles {
        if let Err(e) = h.await {
            warn!(target: "worker", error = %e, "loop task ended abnormally");
        }
    }
}
