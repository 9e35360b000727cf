//! Scheduling seams and the work-stealing scheduler.
//!
//! The scheduler only sees executors through [`Schedulable`], so actors of
//! any type share one set of worker queues.

mod queue;
mod work_stealing;

pub use queue::WorkerQueue;
pub use work_stealing::{SchedulerSettings, SchedulerStats, WorkStealingScheduler};

use std::sync::Arc;

use async_trait::async_trait;
use ember_id::{ActorId, IncarnationId};
use serde::{Deserialize, Serialize};

use crate::executor::Resumed;

/// Queue placement priority of an executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Placed at the head of a worker queue.
    High,
    #[default]
    Normal,
}

/// The scheduler's view of an actor executor.
///
/// Implementors keep a `scheduled` flag so that an executor holds at most
/// one queue slot, and an activation lock that a worker holds for the whole
/// of an activation.
#[async_trait]
pub trait Schedulable: Send + Sync + 'static {
    fn actor_id(&self) -> &ActorId;

    fn incarnation(&self) -> IncarnationId;

    fn priority(&self) -> Priority;

    fn is_active(&self) -> bool;

    /// Permanently stops this executor from being processed.
    fn deactivate(&self);

    fn has_messages(&self) -> bool;

    /// Processes the next queued message. Returns `false` if the mailbox was empty.
    async fn process_next(&self) -> bool;

    fn suspend_execution(&self) -> Resumed;

    /// Releases a pending suspension; a no-op returning `false` if none is pending.
    fn resume_execution(&self) -> bool;

    fn is_suspended(&self) -> bool;

    /// Claims the single queue slot. Returns `false` if already claimed.
    fn try_mark_scheduled(&self) -> bool;

    fn release_scheduled(&self);

    fn activation_lock(&self) -> &tokio::sync::Mutex<()>;
}

/// Places executors on workers.
pub trait Scheduler: Send + Sync + 'static {
    /// Queues an executor for activation.
    ///
    /// Returns `false` without queueing if the executor is inactive or
    /// already holds a queue slot.
    fn enqueue(&self, executor: Arc<dyn Schedulable>) -> bool;

    /// Evicts and deactivates every queued executor for `actor_id`.
    ///
    /// Returns whether anything was removed. An activation already in
    /// progress is not interrupted.
    fn remove_actor(&self, actor_id: &ActorId) -> bool;

    fn clean_all_worker_queues(&self);
}
