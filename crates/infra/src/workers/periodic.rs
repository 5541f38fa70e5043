use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{WorkerHandle, WorkerStats, record};

/// Runs a task on a fixed interval until shut down.
///
/// A failed run is logged and counted; the next tick retries. The task runs
/// once immediately, then after every `interval`.
#[derive(Debug)]
pub struct PeriodicWorker;

impl PeriodicWorker {
    pub fn spawn<F, E>(name: &str, interval: Duration, mut task: F) -> io::Result<WorkerHandle>
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let worker_stats = stats.clone();
        let worker_name = name.to_string();

        let join = thread::Builder::new().name(name.to_string()).spawn(move || {
            info!(worker = %worker_name, interval_ms = interval.as_millis() as u64, "worker started");
            loop {
                match task() {
                    Ok(()) => {
                        debug!(worker = %worker_name, "tick complete");
                        record(&worker_stats, true);
                    }
                    Err(err) => {
                        warn!(worker = %worker_name, error = ?err, "tick failed; retrying next interval");
                        record(&worker_stats, false);
                    }
                }

                match shutdown_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!(worker = %worker_name, "worker stopped");
        })?;

        Ok(WorkerHandle {
            name: name.to_string(),
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn runs_until_shutdown_and_counts_failures() {
        let calls = Arc::new(AtomicU64::new(0));
        let seen = calls.clone();
        let handle = PeriodicWorker::spawn("test-periodic", Duration::from_millis(5), move || {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 { Ok(()) } else { Err("odd tick") }
        })
        .unwrap();

        while handle.stats().runs < 4 {
            thread::sleep(Duration::from_millis(2));
        }
        let stats = handle.stats();
        assert!(stats.failures >= 1);
        assert_eq!(handle.name(), "test-periodic");
        handle.shutdown();

        let after = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), after);
    }
}
