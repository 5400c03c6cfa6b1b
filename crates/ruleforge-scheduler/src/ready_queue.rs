//! A bounded worker pool draining a lock-free ready queue of runnable step
//! jobs. This is the literal "ready queue of runnable step executions" the
//! concurrency model calls for: a fixed set of long-lived workers pull work
//! that has already cleared its dependency ordering, rather than each step
//! spawning its own task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use ruleforge_action::StepOutcome;
use ruleforge_concurrent::mpmc::{LockFreeMpmcQueue, MpmcError};
use ruleforge_core::error::{BuildError, Result};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

pub type StepRunResult = Result<StepOutcome>;

/// A unit of ready work: the step's own execution future, paired with where
/// to deliver its result.
struct StepJob {
    respond_to: oneshot::Sender<StepRunResult>,
    run: BoxFuture<'static, StepRunResult>,
}

/// A fixed pool of workers draining a shared lock-free queue. The queue
/// capacity is not a backpressure signal to callers, just a bound on the
/// unscheduled backlog at any instant; it is sized generously so a
/// realistic build never fills it.
pub struct StepPool {
    queue: LockFreeMpmcQueue<StepJob>,
    notify: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl StepPool {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        let queue = LockFreeMpmcQueue::with_capacity(queue_capacity.max(1));
        let notify = Arc::new(Notify::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(worker_count.max(1));
        for _ in 0..worker_count.max(1) {
            workers.push(tokio::spawn(Self::worker_loop(
                queue.clone(),
                notify.clone(),
                shutdown.clone(),
            )));
        }
        Self {
            queue,
            notify,
            shutdown,
            workers,
        }
    }

    async fn worker_loop(queue: LockFreeMpmcQueue<StepJob>, notify: Arc<Notify>, shutdown: Arc<AtomicBool>) {
        loop {
            match queue.try_pop() {
                Ok(job) => {
                    let outcome = job.run.await;
                    let _ = job.respond_to.send(outcome);
                }
                Err(MpmcError::Empty) => {
                    if shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    notify.notified().await;
                }
                Err(MpmcError::Full) => unreachable!("try_pop never returns Full"),
            }
        }
    }

    /// Submits `run` to the pool and awaits its result. Fails with
    /// `BuildError::Internal` if the ready queue is saturated rather than
    /// retrying: a full queue under `worker_count * 64`-deep capacity means
    /// something upstream is misbehaving, not ordinary backpressure.
    pub async fn run(&self, run: BoxFuture<'static, StepRunResult>) -> StepRunResult {
        let (respond_to, receiver) = oneshot::channel();
        self.queue
            .try_push(StepJob { respond_to, run })
            .map_err(|_| BuildError::Internal("step ready-queue is full".to_string()))?;
        self.notify.notify_one();
        receiver
            .await
            .map_err(|_| BuildError::Internal("step worker dropped its reply channel".to_string()))?
    }
}

impl Drop for StepPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.notify.notify_waiters();
        for worker in &self.workers {
            worker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_submitted_work_and_returns_its_result() {
        let pool = StepPool::new(4, 64);
        let outcome = pool
            .run(Box::pin(async { Ok(StepOutcome::Success) }))
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn many_jobs_all_complete() {
        let pool = StepPool::new(4, 256);
        let futures = (0..100).map(|_| pool.run(Box::pin(async { Ok(StepOutcome::Success) })));
        let results = futures::future::join_all(futures).await;
        assert!(results.into_iter().all(|r| r.unwrap().is_success()));
    }
}
