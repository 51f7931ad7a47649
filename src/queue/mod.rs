//! Admission-controlled, strictly serialized job queue.
//!
//! Every submission passes an admission check against a fixed capacity of
//! queued-plus-executing jobs. Admitted jobs are handed to a single consumer
//! task that runs them one at a time in submission order, across all owners.
//!
//! - `pending` — per-owner outstanding job counts
//! - `job` — queued job and caller-side `JobHandle`

pub mod job;
pub mod pending;

pub use job::{JobHandle, Work};
pub use pending::PendingTracker;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use job::Job;

/// Worker lifecycle as observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// No job is executing.
    Idle,
    /// A job is executing; more may be waiting.
    Draining,
}

/// Point-in-time view of outstanding work, for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Queued jobs plus the executing one, if any.
    pub total_pending: usize,
    /// Configured maximum of `total_pending`.
    pub capacity: usize,
}

/// Counters shared between submitters and the worker.
#[derive(Debug, Default)]
struct QueueState {
    /// Admitted jobs not yet picked up by the worker.
    queued: usize,
    /// Whether the worker is executing a job right now.
    active: bool,
    pending: PendingTracker,
}

impl QueueState {
    fn total_pending(&self) -> usize {
        self.queued + usize::from(self.active)
    }
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serialized job queue with a fixed system-wide capacity.
///
/// Must be created inside a Tokio runtime; construction spawns the worker.
/// Dropping the queue lets the worker finish what is already queued and exit.
pub struct JobQueue<T> {
    capacity: usize,
    state: Arc<Mutex<QueueState>>,
    tx: mpsc::UnboundedSender<Job<T>>,
    worker: JoinHandle<()>,
}

impl<T: Send + 'static> JobQueue<T> {
    /// Create a queue admitting at most `capacity` outstanding jobs.
    pub fn new(capacity: usize) -> Self {
        let state = Arc::new(Mutex::new(QueueState::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx, Arc::clone(&state)));

        info!(capacity, "Job queue started");

        Self {
            capacity,
            state,
            tx,
            worker,
        }
    }

    /// Admit and enqueue a job for `owner`.
    ///
    /// Fails with `CapacityExceeded` without side effects when the queue is
    /// full. Admission, accounting and enqueue happen under one lock, so the
    /// order of admission is the order of execution.
    pub fn submit<F, Fut>(&self, owner: &str, work: F) -> Result<JobHandle<T>, ChatError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ChatError>> + Send + 'static,
    {
        let mut state = lock(&self.state);

        let total_pending = state.total_pending();
        if total_pending >= self.capacity {
            warn!(
                owner,
                total_pending,
                capacity = self.capacity,
                "Rejecting job, queue is full"
            );
            return Err(ChatError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let (job, handle) = Job::new(owner, Box::new(move || work().boxed()));
        let job_id = job.id;

        if self.tx.send(job).is_err() {
            return Err(ChatError::WorkerGone);
        }
        state.queued += 1;
        state.pending.increment(owner);

        debug!(
            job_id = %job_id,
            owner,
            total_pending = state.total_pending(),
            "Job queued"
        );

        Ok(handle)
    }

    /// Current outstanding work and capacity.
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = lock(&self.state);
        QueueSnapshot {
            total_pending: state.total_pending(),
            capacity: self.capacity,
        }
    }

    /// Whether `owner` has at least one job queued or executing.
    pub fn is_busy(&self, owner: &str) -> bool {
        self.pending_for(owner) > 0
    }

    /// Queued plus executing jobs belonging to `owner`.
    pub fn pending_for(&self, owner: &str) -> usize {
        lock(&self.state).pending.count(owner)
    }

    pub fn worker_state(&self) -> WorkerState {
        if lock(&self.state).active {
            WorkerState::Draining
        } else {
            WorkerState::Idle
        }
    }

    /// Stop accepting work and wait for already-queued jobs to finish.
    pub async fn shutdown(self) {
        let Self { tx, worker, .. } = self;
        drop(tx);
        if let Err(e) = worker.await {
            warn!(error = %e, "Queue worker ended abnormally");
        }
    }
}

/// Drains jobs one at a time until every sender is gone.
async fn run_worker<T>(mut rx: mpsc::UnboundedReceiver<Job<T>>, state: Arc<Mutex<QueueState>>) {
    while let Some(job) = rx.recv().await {
        let Job {
            id,
            owner,
            work,
            done,
            submitted_at,
        } = job;

        {
            let mut state = lock(&state);
            state.queued = state.queued.saturating_sub(1);
            state.active = true;
        }

        debug!(
            job_id = %id,
            owner = %owner,
            waited_ms = submitted_at.elapsed().as_millis() as u64,
            "Job started"
        );

        let outcome = AssertUnwindSafe(async move { work().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ChatError::WorkerPanicked {
                    reason: panic_message(panic.as_ref()),
                })
            });

        match &outcome {
            Ok(_) => debug!(job_id = %id, owner = %owner, "Job completed"),
            Err(e) => warn!(job_id = %id, owner = %owner, error = %e, "Job failed"),
        }

        // Release accounting before settling so a woken caller sees the slot free.
        {
            let mut state = lock(&state);
            state.active = false;
            state.pending.decrement(&owner);
        }

        if done.send(outcome).is_err() {
            debug!(job_id = %id, "Job handle dropped before completion");
        }
    }

    debug!("Queue worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
