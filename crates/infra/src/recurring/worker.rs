//! Background thread that runs recurring generation on a fixed tick.

use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use super::engine::RecurringEngine;
use crate::store::BillingStore;

#[derive(Debug, Clone)]
pub struct RecurringWorkerConfig {
    /// Time between generation runs
    pub tick_interval: Duration,
    /// Thread name, also used in logs
    pub name: String,
    /// Run once immediately instead of waiting for the first tick
    pub run_on_start: bool,
}

impl Default for RecurringWorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3600),
            name: "recurring-worker".to_string(),
            run_on_start: true,
        }
    }
}

impl RecurringWorkerConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }
}

/// Counters across every tick since the worker started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub ticks: u64,
    pub generated: u64,
    pub failed: u64,
    pub skipped: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

/// Handle to a running worker. Dropping it also stops the thread, but
/// without waiting for it.
#[derive(Debug)]
pub struct RecurringWorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl RecurringWorkerHandle {
    /// Stop after the current run and wait for the thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        lock_stats(&self.stats).clone()
    }
}

pub struct RecurringWorker;

impl RecurringWorker {
    pub fn spawn<S>(engine: Arc<RecurringEngine<S>>, config: RecurringWorkerConfig) -> RecurringWorkerHandle
    where
        S: BillingStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let worker_stats = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || worker_loop(&engine, &config, &shutdown_rx, &worker_stats))
            .expect("failed to spawn recurring worker thread");

        RecurringWorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn worker_loop<S: BillingStore>(
    engine: &RecurringEngine<S>,
    config: &RecurringWorkerConfig,
    shutdown_rx: &mpsc::Receiver<()>,
    stats: &Mutex<WorkerStats>,
) {
    info!(
        worker = %config.name,
        tick_secs = config.tick_interval.as_secs(),
        "recurring worker started"
    );

    if config.run_on_start {
        tick(engine, config, stats);
    }

    loop {
        match shutdown_rx.recv_timeout(config.tick_interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => tick(engine, config, stats),
            // Explicit shutdown or the handle was dropped.
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(worker = %config.name, "recurring worker stopped");
}

fn tick<S: BillingStore>(engine: &RecurringEngine<S>, config: &RecurringWorkerConfig, stats: &Mutex<WorkerStats>) {
    let result = engine.run_due_generation();

    let mut s = lock_stats(stats);
    s.ticks += 1;
    s.last_tick_at = Some(engine.clock().now());
    match result {
        Ok(run) if run.skipped => s.skipped += 1,
        Ok(run) => {
            s.generated += run.generated.len() as u64;
            s.failed += run.failed.len() as u64;
        }
        Err(e) => {
            s.failed += 1;
            error!(worker = %config.name, error = %e, "recurring generation run failed");
        }
    }
}

fn lock_stats(stats: &Mutex<WorkerStats>) -> MutexGuard<'_, WorkerStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
