//! Background worker threads with graceful shutdown.

pub mod periodic;
pub mod subscriber;

use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use serde::Serialize;

pub use periodic::PeriodicWorker;
pub use subscriber::SubscriberWorker;

/// Runtime counters of a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Completed iterations (ticks or handled messages).
    pub runs: u64,
    pub failures: u64,
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Request graceful shutdown and wait for the current iteration to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

fn record(stats: &Mutex<WorkerStats>, ok: bool) {
    if let Ok(mut s) = stats.lock() {
        s.runs += 1;
        if !ok {
            s.failures += 1;
        }
    }
}
