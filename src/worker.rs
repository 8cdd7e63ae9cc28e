//! The worker collaborator seam.
//!
//! The supervisor treats the workload as opaque: it only ever calls
//! `start()`, `stop()` and `stats()`. The host application provides the real
//! queue-consuming implementation; [`IdleWorker`] is the built-in stand-in
//! used by the binary so the supervisor is exercisable on its own.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Snapshot of the worker's connection/queue counters, logged by the
/// supervisor's info action.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub connections: u64,
    pub queued: u64,
    pub processed: u64,
}

/// Long-running workload controlled by the supervisor.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run the work loop. Blocks until `stop()` is called or the worker
    /// decides to exit on its own.
    async fn start(&self) -> anyhow::Result<()>;

    /// Request an orderly shutdown: finish or flush in-flight work, then
    /// make `start()` return.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Current counters for the info action.
    fn stats(&self) -> WorkerStats;
}

/// Built-in worker that holds the process open until stopped.
///
/// It processes nothing; it exists so `qworkerd start` produces a functional
/// daemon whose lifecycle, signals and PID handling can be operated end to end.
pub struct IdleWorker {
    shutdown_tx: watch::Sender<bool>,
    ticks: AtomicU64,
}

impl IdleWorker {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            ticks: AtomicU64::new(0),
        }
    }
}

impl Default for IdleWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Worker for IdleWorker {
    async fn start(&self) -> anyhow::Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return Ok(());
        }
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.ticks.fetch_add(1, Ordering::Relaxed);
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn stop(&self) -> anyhow::Result<()> {
        // send_replace updates the value even when start() has not
        // subscribed yet, so a later start() returns immediately.
        self.shutdown_tx.send_replace(true);
        Ok(())
    }

    fn stats(&self) -> WorkerStats {
        WorkerStats {
            connections: 0,
            queued: 0,
            processed: self.ticks.load(Ordering::Relaxed),
        }
    }
}
