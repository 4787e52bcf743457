//! Recurring invoice generation: schedule management, the per-tick engine and
//! the background worker that drives it.

mod engine;
mod worker;

pub use engine::{GenerationFailure, GenerationRun, RecurringEngine, RecurringSettings};
pub use worker::{RecurringWorker, RecurringWorkerConfig, RecurringWorkerHandle, WorkerStats};
