//! Queued job and the caller-side completion handle.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::ChatError;

/// Deferred unit of work. Called exactly once by the worker.
pub type Work<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, ChatError>> + Send>;

/// A job waiting in (or just removed from) the queue.
pub(crate) struct Job<T> {
    pub id: Uuid,
    pub owner: String,
    pub work: Work<T>,
    pub done: oneshot::Sender<Result<T, ChatError>>,
    pub submitted_at: Instant,
}

impl<T> Job<T> {
    pub fn new(owner: &str, work: Work<T>) -> (Self, JobHandle<T>) {
        let (done, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let job = Self {
            id,
            owner: owner.to_string(),
            work,
            done,
            submitted_at: Instant::now(),
        };
        (job, JobHandle { id, rx })
    }
}

/// Resolves once the job has run to completion, failed, or timed out.
///
/// Dropping the handle does not cancel the job.
#[derive(Debug)]
pub struct JobHandle<T> {
    id: Uuid,
    rx: oneshot::Receiver<Result<T, ChatError>>,
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, ChatError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(ChatError::WorkerGone)))
    }
}
