//! Cooperative task-offload pool.
//!
//! Event handlers run inline on the supervisory loop, so anything
//! long-running is handed to this pool of plain OS threads. The pool
//! keeps a baseline of workers, grows when every worker is busy, and
//! shrinks back toward the baseline as workers sit idle. Submission
//! prefers the idle worker with the shallowest backlog; at the growth
//! cap, work queues instead of spawning.

use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use log::{debug, error};
use thiserror::Error;

/// How long an idle worker waits for work before considering retirement.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Growth cap as a multiple of the baseline, when none is given.
const DEFAULT_CAP_FACTOR: usize = 4;

enum Job {
    Run(Box<dyn FnOnce() + Send>),
    Exit,
}

struct Worker {
    sender: Sender<Job>,
    busy: Arc<AtomicBool>,
    join: thread::JoinHandle<()>,
}

struct Shared {
    baseline: usize,
    workers: RwLock<BTreeMap<u64, Worker>>,
    next_id: AtomicU64,
}

/// Pool of worker threads for offloaded tasks.
pub struct TaskPool {
    shared: Arc<Shared>,
    cap: usize,
}

impl Default for TaskPool {
    fn default() -> Self { Self::new() }
}

impl TaskPool {
    /// Pool with one baseline worker per available CPU.
    #[must_use]
    pub fn new() -> Self { Self::with_baseline(num_cpus::get().max(1)) }

    /// Pool with an explicit baseline worker count.
    ///
    /// The pool may grow to `DEFAULT_CAP_FACTOR` times the baseline under
    /// load; use [`TaskPool::with_cap`] to bound it differently.
    #[must_use]
    pub fn with_baseline(baseline: usize) -> Self {
        Self::with_cap(baseline, baseline.max(1) * DEFAULT_CAP_FACTOR)
    }

    /// Pool with explicit baseline and maximum worker counts.
    #[must_use]
    pub fn with_cap(baseline: usize, cap: usize) -> Self {
        let baseline = baseline.max(1);
        let shared = Arc::new(Shared {
            baseline,
            workers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
        });
        let pool = Self {
            shared,
            cap: cap.max(baseline),
        };
        {
            let mut workers = pool.shared.workers.write().expect("pool lock");
            for _ in 0..baseline {
                pool.spawn_worker(&mut workers, None);
            }
        }
        pool
    }

    /// Current number of live workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared.workers.read().expect("pool lock").len()
    }

    #[cfg(test)]
    fn worker_ids(&self) -> Vec<u64> {
        self.shared
            .workers
            .read()
            .expect("pool lock")
            .keys()
            .copied()
            .collect()
    }

    /// Submit a task for execution on some worker.
    ///
    /// Panics inside the task are caught and logged; they never take the
    /// worker down.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job = Job::Run(Box::new(task));
        // Dispatch happens under the read lock so a worker deciding to
        // retire (which takes the write lock) cannot miss a queued job.
        let queued = {
            let workers = self.shared.workers.read().expect("pool lock");
            let idle = workers
                .values()
                .filter(|worker| !worker.busy.load(Ordering::Acquire))
                .min_by_key(|worker| worker.sender.len());
            match idle {
                Some(worker) => worker.sender.send(job).map_err(|err| err.0),
                None if workers.len() < self.cap => Err(job),
                None => {
                    let least_backlogged = workers
                        .values()
                        .min_by_key(|worker| worker.sender.len())
                        .expect("pool has at least one worker");
                    least_backlogged.sender.send(job).map_err(|err| err.0)
                }
            }
        };
        if let Err(job) = queued {
            let mut workers = self.shared.workers.write().expect("pool lock");
            self.spawn_worker(&mut workers, Some(job));
        }
    }

    /// Submit a task and get a handle to its result.
    pub fn submit_with_result<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        self.submit(move || {
            let _ = tx.send(task());
        });
        TaskHandle { rx }
    }

    fn spawn_worker(&self, workers: &mut BTreeMap<u64, Worker>, first: Option<Job>) {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded();
        if let Some(job) = first {
            let _ = tx.send(job);
        }
        let busy = Arc::new(AtomicBool::new(false));
        let spawned = thread::Builder::new()
            .name(format!("wiregate-task-{id}"))
            .spawn({
                let busy = Arc::clone(&busy);
                let shared = Arc::clone(&self.shared);
                move || worker_loop(id, &rx, &busy, &shared)
            });
        match spawned {
            Ok(join) => {
                workers.insert(
                    id,
                    Worker {
                        sender: tx,
                        busy,
                        join,
                    },
                );
            }
            Err(err) => error!("failed to spawn pool worker: {err}"),
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        let drained: Vec<Worker> = {
            let mut workers = self.shared.workers.write().expect("pool lock");
            std::mem::take(&mut *workers).into_values().collect()
        };
        for worker in &drained {
            let _ = worker.sender.send(Job::Exit);
        }
        for worker in drained {
            if worker.join.join().is_err() {
                error!("pool worker exited abnormally");
            }
        }
    }
}

fn worker_loop(id: u64, jobs: &Receiver<Job>, busy: &AtomicBool, shared: &Shared) {
    loop {
        match jobs.recv_timeout(IDLE_POLL) {
            Ok(Job::Run(task)) => {
                busy.store(true, Ordering::Release);
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!("worker {id} task panicked");
                }
                busy.store(false, Ordering::Release);
            }
            Ok(Job::Exit) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {
                let mut workers = shared.workers.write().expect("pool lock");
                // Retirement goes to the lowest-id idle worker, so the
                // oldest workers leave first regardless of whose timeout
                // fires first.
                let first_idle = workers
                    .iter()
                    .find(|(_, worker)| !worker.busy.load(Ordering::Acquire))
                    .map(|(id, _)| *id);
                // Re-check the queue under the lock: a submitter may have
                // just dispatched to this worker.
                if workers.len() > shared.baseline && first_idle == Some(id) && jobs.is_empty() {
                    workers.remove(&id);
                    debug!("worker {id} retired");
                    return;
                }
            }
        }
    }
}

/// Handle to a task submitted with [`TaskPool::submit_with_result`].
pub struct TaskHandle<T> {
    rx: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the task produces its result.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Panicked`] when the task panicked before
    /// producing a value.
    pub fn join(self) -> Result<T, TaskError> {
        self.rx.recv().map_err(|_| TaskError::Panicked)
    }

    /// Block for at most `deadline` waiting for the result.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Timeout`] when the deadline elapses first, or
    /// [`TaskError::Panicked`] when the task panicked.
    pub fn join_timeout(self, deadline: Duration) -> Result<T, TaskError> {
        self.rx.recv_timeout(deadline).map_err(|err| match err {
            RecvTimeoutError::Timeout => TaskError::Timeout,
            RecvTimeoutError::Disconnected => TaskError::Panicked,
        })
    }
}

/// Failure joining an offloaded task.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task panicked before producing a result")]
    Panicked,
    #[error("task result not ready within the deadline")]
    Timeout,
}
