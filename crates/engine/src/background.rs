//! Background job runner
//!
//! A small pool of worker threads consuming a bounded FIFO of named jobs.
//! Index reconciliation runs here so that draining the log never blocks a
//! caller. Jobs report failure through `Result`; failures and panics are
//! logged and counted, and never take a worker down.

use crate::config::ReconcilerConfig;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use stratamap_core::{Error, Result};
use thiserror::Error as ThisError;
use tracing::{debug, error, warn};

/// Rejection of a submitted job
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum BackpressureError {
    /// Queue is at its configured depth
    #[error("background queue is full ({depth} jobs)")]
    QueueFull {
        /// Configured maximum depth
        depth: usize,
    },
    /// Runner has been shut down
    #[error("background runner is shut down")]
    ShutDown,
}

/// Runner counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs waiting
    pub queued: usize,
    /// Jobs executing
    pub running: usize,
    /// Jobs finished successfully
    pub succeeded: u64,
    /// Jobs that returned an error or panicked
    pub failed: u64,
    /// Worker threads
    pub workers: usize,
}

type JobFn = Box<dyn FnOnce() -> Result<()> + Send>;

struct Job {
    name: String,
    run: JobFn,
}

#[derive(Default)]
struct State {
    queue: VecDeque<Job>,
    running: usize,
    succeeded: u64,
    failed: u64,
    shutting_down: bool,
}

struct Shared {
    state: Mutex<State>,
    job_ready: Condvar,
    idle: Condvar,
    max_queue_depth: usize,
}

/// Fixed pool running named jobs in submission order
pub struct BackgroundScheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl BackgroundScheduler {
    /// Start `workers` threads named `stratamap-bg-N` over a queue holding at
    /// most `max_queue_depth` jobs
    pub fn new(workers: usize, max_queue_depth: usize) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            job_ready: Condvar::new(),
            idle: Condvar::new(),
            max_queue_depth,
        });
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("stratamap-bg-{}", i))
                .spawn(move || work(&shared))
                .map_err(|e| Error::store(format!("failed to spawn background worker: {}", e)))?;
            handles.push(handle);
        }
        debug!(target: "stratamap::background", workers, max_queue_depth, "Background runner started");
        Ok(BackgroundScheduler {
            shared,
            workers: Mutex::new(handles),
            worker_count: workers,
        })
    }

    /// Runner sized by the reconciler configuration
    pub fn from_config(config: &ReconcilerConfig) -> Result<Self> {
        BackgroundScheduler::new(config.workers, config.max_queue_depth)
    }

    /// Queue a job
    pub fn submit<F>(&self, name: impl Into<String>, job: F) -> std::result::Result<(), BackpressureError>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.shutting_down {
            return Err(BackpressureError::ShutDown);
        }
        if state.queue.len() >= self.shared.max_queue_depth {
            return Err(BackpressureError::QueueFull {
                depth: self.shared.max_queue_depth,
            });
        }
        state.queue.push_back(Job {
            name: name.into(),
            run: Box::new(job),
        });
        drop(state);
        self.shared.job_ready.notify_one();
        Ok(())
    }

    /// Block until the queue is empty and no job is running
    pub fn drain(&self) {
        let mut state = self.shared.state.lock();
        while !state.queue.is_empty() || state.running > 0 {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Stop accepting jobs, finish the queued ones and join every worker.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutting_down = true;
        }
        self.shared.job_ready.notify_all();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                warn!(target: "stratamap::background", "Background worker exited abnormally");
            }
        }
    }

    /// Current counters
    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        SchedulerStats {
            queued: state.queue.len(),
            running: state.running,
            succeeded: state.succeeded,
            failed: state.failed,
            workers: self.worker_count,
        }
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BackgroundScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundScheduler")
            .field("stats", &self.stats())
            .finish()
    }
}

fn work(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    state.running += 1;
                    break job;
                }
                if state.shutting_down {
                    return;
                }
                shared.job_ready.wait(&mut state);
            }
        };

        let Job { name, run } = job;
        let ok = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(run)) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(target: "stratamap::background", job = %name, error = %e, "Background job failed");
                false
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic".to_string());
                error!(target: "stratamap::background", job = %name, reason = %reason, "Background job panicked");
                false
            }
        };

        let mut state = shared.state.lock();
        state.running -= 1;
        if ok {
            state.succeeded += 1;
        } else {
            state.failed += 1;
        }
        if state.queue.is_empty() && state.running == 0 {
            shared.idle.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_and_drain() {
        let runner = BackgroundScheduler::new(2, 64).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for i in 0..10 {
            let c = Arc::clone(&counter);
            runner
                .submit(format!("job-{}", i), move || {
                    c.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })
                .unwrap();
        }
        runner.drain();
        assert_eq!(counter.load(Ordering::Relaxed), 10);
        assert_eq!(runner.stats().succeeded, 10);
    }

    #[test]
    fn test_single_worker_is_fifo() {
        let runner = BackgroundScheduler::new(1, 64).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let o = Arc::clone(&order);
            runner
                .submit("ordered", move || {
                    o.lock().push(i);
                    Ok(())
                })
                .unwrap();
        }
        runner.drain();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_failures_and_panics_are_counted() {
        let runner = BackgroundScheduler::new(1, 64).unwrap();
        runner
            .submit("fails", || Err(Error::store("unreachable store")))
            .unwrap();
        runner.submit("panics", || panic!("boom")).unwrap();
        runner.submit("ok", || Ok(())).unwrap();
        runner.drain();
        let stats = runner.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.running, 0);
    }

    #[test]
    fn test_queue_full() {
        let runner = BackgroundScheduler::new(1, 1).unwrap();
        let gate = Arc::new(Barrier::new(2));
        let g = Arc::clone(&gate);
        runner
            .submit("blocker", move || {
                g.wait();
                Ok(())
            })
            .unwrap();
        // wait for the worker to take the blocker off the queue
        while runner.stats().running == 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
        runner.submit("queued", || Ok(())).unwrap();
        assert_eq!(
            runner.submit("rejected", || Ok(())),
            Err(BackpressureError::QueueFull { depth: 1 })
        );
        gate.wait();
        runner.drain();
    }

    #[test]
    fn test_shutdown_finishes_queue_then_rejects() {
        let runner = BackgroundScheduler::new(1, 64).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = Arc::clone(&counter);
            runner
                .submit("count", move || {
                    std::thread::sleep(Duration::from_millis(2));
                    c.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })
                .unwrap();
        }
        runner.shutdown();
        assert_eq!(counter.load(Ordering::Relaxed), 3);
        assert_eq!(runner.submit("late", || Ok(())), Err(BackpressureError::ShutDown));
        runner.shutdown();
    }

    #[test]
    fn test_from_config() {
        let config = ReconcilerConfig {
            workers: 3,
            ..ReconcilerConfig::default()
        };
        let runner = BackgroundScheduler::from_config(&config).unwrap();
        assert_eq!(runner.stats().workers, 3);
        runner.drain();
    }
}
