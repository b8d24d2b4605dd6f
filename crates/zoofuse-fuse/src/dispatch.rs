//! Worker pool for FUSE requests.
//!
//! The `fuser` session delivers requests on a single thread. Every callback
//! packages its work (reply included) into a job and hands it to this pool,
//! so a slow remote call blocks one worker instead of the whole mount.
//!
//! # Design
//!
//! - Fixed number of worker threads
//! - Bounded submission queue; when it is full the job runs on the
//!   submitting thread, which pushes back on the kernel
//! - Dropping the pool closes the queue and joins the workers after they
//!   drain what is left

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Queued jobs allowed per worker before submitters run jobs inline.
const QUEUE_DEPTH_PER_WORKER: usize = 64;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Counters for the pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Jobs handed to a worker.
    pub jobs_queued: AtomicU64,
    /// Jobs run on the submitting thread because the queue was full.
    pub jobs_inline: AtomicU64,
    /// Jobs finished by workers.
    pub jobs_completed: AtomicU64,
}

/// Fixed-size pool of request workers.
pub struct RequestPool {
    submit_tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
}

impl std::fmt::Debug for RequestPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPool")
            .field("workers", &self.workers.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl RequestPool {
    /// Starts `threads` workers (at least one).
    pub fn new(threads: usize) -> io::Result<Self> {
        let threads = threads.max(1);
        let (submit_tx, submit_rx) = bounded::<Job>(threads * QUEUE_DEPTH_PER_WORKER);
        let stats = Arc::new(PoolStats::default());

        let mut workers = Vec::with_capacity(threads);
        for worker_id in 0..threads {
            let rx = submit_rx.clone();
            let stats = Arc::clone(&stats);
            let handle = thread::Builder::new()
                .name(format!("zoofuse-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, &rx, &stats))?;
            workers.push(handle);
        }

        info!(threads, "Request pool started");

        Ok(Self {
            submit_tx: Some(submit_tx),
            workers,
            stats,
        })
    }

    /// Runs `job` on a worker, or inline if the queue is saturated.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(tx) = &self.submit_tx else {
            job();
            return;
        };

        match tx.try_send(Box::new(job)) {
            Ok(()) => {
                self.stats.jobs_queued.fetch_add(1, Ordering::Relaxed);
                trace!("Job queued");
            }
            Err(TrySendError::Full(job)) => {
                self.stats.jobs_inline.fetch_add(1, Ordering::Relaxed);
                warn!(
                    capacity = ?tx.capacity(),
                    "Request queue full, running job inline"
                );
                job();
            }
            Err(TrySendError::Disconnected(job)) => {
                self.stats.jobs_inline.fetch_add(1, Ordering::Relaxed);
                job();
            }
        }
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for RequestPool {
    fn drop(&mut self) {
        // Closing the channel lets workers exit once the queue is drained.
        self.submit_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        debug!(
            queued = self.stats.jobs_queued.load(Ordering::Relaxed),
            inline = self.stats.jobs_inline.load(Ordering::Relaxed),
            completed = self.stats.jobs_completed.load(Ordering::Relaxed),
            "Request pool stopped"
        );
    }
}

fn worker_loop(worker_id: usize, rx: &Receiver<Job>, stats: &PoolStats) {
    debug!(worker_id, "Worker started");
    while let Ok(job) = rx.recv() {
        job();
        stats.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }
    debug!(worker_id, "Worker exiting");
}
