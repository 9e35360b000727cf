//! Per-worker run queue.
//!
//! A lock-based deque: the owning worker and thieves both take from the
//! head, high-priority executors are pushed to the head, normal ones to the
//! tail.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ember_id::ActorId;

use super::{Priority, Schedulable};

#[derive(Default)]
pub struct WorkerQueue {
    inner: Mutex<VecDeque<Arc<dyn Schedulable>>>,
}

impl WorkerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<dyn Schedulable>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, executor: Arc<dyn Schedulable>) {
        let mut queue = self.lock();
        match executor.priority() {
            Priority::High => queue.push_front(executor),
            Priority::Normal => queue.push_back(executor),
        }
    }

    pub fn pop(&self) -> Option<Arc<dyn Schedulable>> {
        self.lock().pop_front()
    }

    /// Takes every entry for `actor_id` out of the queue.
    pub fn remove_actor(&self, actor_id: &ActorId) -> Vec<Arc<dyn Schedulable>> {
        let mut queue = self.lock();
        let mut removed = Vec::new();
        queue.retain(|executor| {
            if executor.actor_id() == actor_id {
                removed.push(Arc::clone(executor));
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn drain(&self) -> Vec<Arc<dyn Schedulable>> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl std::fmt::Debug for WorkerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerQueue").field("len", &self.len()).finish()
    }
}
