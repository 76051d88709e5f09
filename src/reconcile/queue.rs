//! Deduplicating work queue.
//!
//! A key is queued at most once. While a worker processes a key, re-adding it
//! only marks it dirty; it is queued again when the worker calls
//! [`WorkQueue::done`]. Two workers therefore never reconcile the same key at
//! the same time.
//!
//! Delayed adds carry a per-key token so that only the most recent schedule
//! for a key fires.

use crate::api::meta::ObjectKey;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    /// Latest delayed-add token per key.
    scheduled: HashMap<ObjectKey, u64>,
    next_token: u64,
    shut_down: bool,
}

/// Work queue for one resource kind.
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `key` unless it is already queued.
    pub fn add(&self, key: ObjectKey) {
        {
            let mut state = self.state.lock();
            if state.shut_down || state.dirty.contains(&key) {
                return;
            }
            state.dirty.insert(key.clone());
            if state.processing.contains(&key) {
                return;
            }
            state.queue.push_back(key);
        }
        self.notify.notify_one();
    }

    /// Queue `key` after `delay`, superseding any earlier delayed add for it.
    pub fn add_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        let token = {
            let mut state = self.state.lock();
            if state.shut_down {
                return;
            }
            state.next_token += 1;
            let token = state.next_token;
            state.scheduled.insert(key.clone(), token);
            token
        };

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut state = queue.state.lock();
                if state.scheduled.get(&key) == Some(&token) {
                    state.scheduled.remove(&key);
                    true
                } else {
                    false
                }
            };
            if current {
                queue.add(key);
            }
        });
    }

    /// Next key to process, or `None` once shut down and drained.
    pub async fn next(&self) -> Option<ObjectKey> {
        loop {
            // Registered before the state check so a shutdown in between is not missed.
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shut_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark `key` processed, re-queueing it if it was added meanwhile.
    pub fn done(&self, key: &ObjectKey) {
        let requeued = {
            let mut state = self.state.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shut_down {
                state.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Stop accepting work and wake every waiting worker.
    pub fn shutdown(&self) {
        self.state.lock().shut_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    /// Keys waiting to be processed.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with a pending delayed add.
    pub fn scheduled(&self) -> usize {
        self.state.lock().scheduled.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("default", name)
    }

    #[tokio::test]
    async fn test_add_deduplicates() {
        let queue = WorkQueue::new();
        queue.add(key("a"));
        queue.add(key("a"));
        queue.add(key("b"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next().await, Some(key("a")));
        assert_eq!(queue.next().await, Some(key("b")));
    }

    #[tokio::test]
    async fn test_add_while_processing_requeues_on_done() {
        let queue = WorkQueue::new();
        queue.add(key("a"));
        let first = queue.next().await.unwrap();

        queue.add(key("a"));
        assert!(queue.is_empty());

        queue.done(&first);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next().await, Some(key("a")));
    }

    #[tokio::test]
    async fn test_shutdown_releases_workers() {
        let queue = Arc::new(WorkQueue::new());
        let worker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await })
        };
        tokio::task::yield_now().await;
        queue.shutdown();
        assert_eq!(worker.await.unwrap(), None);
        queue.add(key("late"));
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_keeps_latest_schedule() {
        let queue = Arc::new(WorkQueue::new());
        queue.add_after(key("a"), Duration::from_secs(60));
        queue.add_after(key("a"), Duration::from_secs(1));
        assert_eq!(queue.scheduled(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next().await, Some(key("a")));
        queue.done(&key("a"));

        // The superseded 60s schedule never fires.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(queue.is_empty());
    }
}
