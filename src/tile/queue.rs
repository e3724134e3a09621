//! Bounded priority queue feeding the fetch workers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::imagesources::{ImageRequest, ImageSourceId};
use crate::slicing::StackId;
use crate::sync::lock;

/// One pending layer-tile fetch.
pub(crate) struct FetchJob {
    pub priority: i32,
    /// Logical time of the request; also the LIFO tie-breaker
    pub timestamp: u64,
    /// Provider epoch the job was created in
    pub epoch: u64,
    pub stack: StackId,
    pub source: ImageSourceId,
    pub tile: usize,
    pub request: ImageRequest,
}

impl PartialEq for FetchJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FetchJob {}

impl PartialOrd for FetchJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FetchJob {
    /// Higher priority first; within a priority, newest first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.timestamp.cmp(&other.timestamp))
    }
}

struct QueueState {
    heap: BinaryHeap<FetchJob>,
    /// Jobs popped but not yet marked done
    active: usize,
    closed: bool,
}

/// A size-bounded max-heap of [`FetchJob`]s.
///
/// Producers never block: [`try_push`](Self::try_push) hands the job back
/// when the queue is full. Consumers await [`pop`](Self::pop).
pub(crate) struct FetchQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    available: Notify,
    idle: Notify,
}

impl FetchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                active: 0,
                closed: false,
            }),
            capacity,
            available: Notify::new(),
            idle: Notify::new(),
        }
    }

    /// Enqueue without blocking. Full or closed queues return the job.
    pub fn try_push(&self, job: FetchJob) -> Result<(), FetchJob> {
        {
            let mut state = lock(&self.state);
            if state.closed || state.heap.len() >= self.capacity {
                return Err(job);
            }
            state.heap.push(job);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Wait for the next job. Returns `None` once the queue is closed.
    ///
    /// Every returned job must be followed by a call to [`done`](Self::done).
    pub async fn pop(&self) -> Option<FetchJob> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = lock(&self.state);
                if state.closed {
                    return None;
                }
                if let Some(job) = state.heap.pop() {
                    state.active += 1;
                    return Some(job);
                }
            }

            notified.await;
        }
    }

    /// Mark a popped job finished.
    pub fn done(&self) {
        let idle = {
            let mut state = lock(&self.state);
            state.active = state.active.saturating_sub(1);
            state.heap.is_empty() && state.active == 0
        };
        if idle {
            self.idle.notify_waiters();
        }
    }

    /// Drop every queued job. Jobs already popped still complete.
    pub fn clear(&self) -> usize {
        let (dropped, idle) = {
            let mut state = lock(&self.state);
            let dropped = state.heap.len();
            state.heap.clear();
            (dropped, state.active == 0)
        };
        if idle {
            self.idle.notify_waiters();
        }
        dropped
    }

    /// Stop accepting jobs and wake every consumer.
    pub fn close(&self) {
        {
            let mut state = lock(&self.state);
            state.closed = true;
            state.heap.clear();
        }
        self.available.notify_waiters();
        self.idle.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Number of queued (not yet popped) jobs.
    pub fn len(&self) -> usize {
        lock(&self.state).heap.len()
    }

    /// Wait until nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = lock(&self.state);
                if state.closed || (state.heap.is_empty() && state.active == 0) {
                    return;
                }
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::sync::Arc;
    use std::time::Duration;

    fn job(priority: i32, timestamp: u64) -> FetchJob {
        FetchJob {
            priority,
            timestamp,
            epoch: 0,
            stack: StackId::default(),
            source: ImageSourceId::next(),
            tile: timestamp as usize,
            request: ImageRequest::ready(Ok(RgbaImage::new(1, 1))),
        }
    }

    #[tokio::test]
    async fn test_priority_then_lifo() {
        let queue = FetchQueue::new(10);
        for (p, t) in [(0, 1), (0, 2), (5, 3), (0, 4)] {
            assert!(queue.try_push(job(p, t)).is_ok());
        }
        let mut order = Vec::new();
        for _ in 0..4 {
            order.push(queue.pop().await.unwrap().timestamp);
            queue.done();
        }
        assert_eq!(order, vec![3, 4, 2, 1]);
    }

    #[test]
    fn test_full_queue_returns_job() {
        let queue = FetchQueue::new(2);
        assert!(queue.try_push(job(0, 1)).is_ok());
        assert!(queue.try_push(job(0, 2)).is_ok());
        let rejected = queue.try_push(job(0, 3)).unwrap_err();
        assert_eq!(rejected.timestamp, 3);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.clear(), 2);
    }

    #[tokio::test]
    async fn test_close_wakes_consumers() {
        let queue = Arc::new(FetchQueue::new(4));
        let q = queue.clone();
        let consumer = tokio::spawn(async move { q.pop().await.is_none() });
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();
        assert!(consumer.await.unwrap());
        assert!(queue.try_push(job(0, 1)).is_err());
    }

    #[tokio::test]
    async fn test_wait_idle_tracks_active_jobs() {
        let queue = Arc::new(FetchQueue::new(4));
        queue.try_push(job(0, 1)).ok();
        let popped = queue.pop().await.unwrap();

        let q = queue.clone();
        let waiter = tokio::spawn(async move { q.wait_idle().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(popped);
        queue.done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
