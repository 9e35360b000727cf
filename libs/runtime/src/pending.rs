//! Reply slots for in-flight asks.

use std::any::Any;

use dashmap::DashMap;
use ember_id::RequestId;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::ActorError;

/// A type-erased reply, downcast by the asking pointer.
pub type Reply = Box<dyn Any + Send>;

pub type ReplyReceiver = oneshot::Receiver<Result<Reply, ActorError>>;

/// Concurrent table of outstanding asks.
///
/// Each slot is resolved at most once: `complete`, `fail` and `cancel` all
/// remove it, so later calls for the same id return `false`.
#[derive(Default)]
pub struct PendingRequests {
    slots: DashMap<RequestId, oneshot::Sender<Result<Reply, ActorError>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a slot under a fresh request id.
    pub fn register(&self) -> (RequestId, ReplyReceiver) {
        let (tx, rx) = oneshot::channel();
        let mut request_id = RequestId::new();
        while self.slots.contains_key(&request_id) {
            request_id = RequestId::new();
        }
        self.slots.insert(request_id, tx);
        trace!(%request_id, "Registered pending request");
        (request_id, rx)
    }

    pub fn complete(&self, request_id: RequestId, reply: Reply) -> bool {
        self.resolve(request_id, Ok(reply))
    }

    pub fn fail(&self, request_id: RequestId, error: ActorError) -> bool {
        self.resolve(request_id, Err(error))
    }

    /// Drops the slot without answering it.
    pub fn cancel(&self, request_id: RequestId) -> bool {
        self.slots.remove(&request_id).is_some()
    }

    /// Fails every outstanding slot.
    pub fn fail_all(&self, error: ActorError) -> usize {
        let ids: Vec<RequestId> = self.slots.iter().map(|slot| *slot.key()).collect();
        ids.into_iter()
            .filter(|id| self.fail(*id, error.clone()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn resolve(&self, request_id: RequestId, outcome: Result<Reply, ActorError>) -> bool {
        match self.slots.remove(&request_id) {
            Some((_, tx)) => {
                // The asker may have timed out and dropped its receiver.
                let _ = tx.send(outcome);
                true
            }
            None => {
                trace!(%request_id, "No pending request to resolve");
                false
            }
        }
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("outstanding", &self.len())
            .finish()
    }
}
