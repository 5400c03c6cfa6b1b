use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MpmcError {
    #[error("ready queue is full")]
    Full,
    #[error("ready queue is empty")]
    Empty,
}

/// Lock-free bounded multi-producer multi-consumer queue, built on
/// crossbeam's `ArrayQueue`. This is the ready queue [`StepPool`] drains:
/// any number of dependency-resolution tasks can push runnable step jobs
/// concurrently while a fixed pool of workers pops them, with no lock
/// contention on the hot path in either direction.
///
/// [`StepPool`]: https://docs.rs/ruleforge-scheduler (crate-local: `ruleforge_scheduler::ready_queue::StepPool`)
pub struct LockFreeMpmcQueue<T> {
    inner: Arc<ArrayQueue<T>>,
}

impl<T> Clone for LockFreeMpmcQueue<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> LockFreeMpmcQueue<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { inner: Arc::new(ArrayQueue::new(capacity)) }
    }

    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), MpmcError> {
        self.inner.push(value).map_err(|_| MpmcError::Full)
    }

    #[inline]
    pub fn try_pop(&self) -> Result<T, MpmcError> {
        self.inner.pop().ok_or(MpmcError::Empty)
    }

    /// Jobs currently queued but not yet picked up by a worker.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn a_pushed_job_is_popped_in_fifo_order() {
        let queue = LockFreeMpmcQueue::with_capacity(4);
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop().unwrap(), 1);
        assert_eq!(queue.try_pop().unwrap(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn popping_an_empty_queue_reports_empty_not_a_spurious_full() {
        let queue: LockFreeMpmcQueue<u32> = LockFreeMpmcQueue::with_capacity(4);
        assert!(matches!(queue.try_pop(), Err(MpmcError::Empty)));
    }

    #[test]
    fn two_worker_threads_drain_jobs_from_two_producer_threads_without_loss() {
        let queue = LockFreeMpmcQueue::with_capacity(1024);
        let producer_a = queue.clone();
        let producer_b = queue.clone();
        let handle_a = thread::spawn(move || {
            for job_id in 0..10_000 {
                loop {
                    if producer_a.try_push(job_id).is_ok() {
                        break;
                    }
                }
            }
        });
        let handle_b = thread::spawn(move || {
            for job_id in 10_000..20_000 {
                loop {
                    if producer_b.try_push(job_id).is_ok() {
                        break;
                    }
                }
            }
        });

        let mut drained = 0usize;
        while drained < 20_000 {
            if queue.try_pop().is_ok() {
                drained += 1;
            } else {
                thread::yield_now();
            }
        }
        handle_a.join().unwrap();
        handle_b.join().unwrap();
    }
}
