//! Children as a supervisor sees them.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use ember_id::{ActorId, IncarnationId};
use tracing::{debug, info};

use crate::actor::{Actor, ActorFactory};
use crate::error::SupervisionError;
use crate::executor::ActorExecutor;
use crate::scheduler::Schedulable;
use crate::system::SystemInner;

/// A restartable child of a supervisor.
#[async_trait]
pub trait SupervisedChild: Send + Sync + 'static {
    fn actor_id(&self) -> &ActorId;

    /// Incarnation currently running for this child.
    fn incarnation(&self) -> IncarnationId;

    /// Replaces the current incarnation with a fresh one built from its
    /// last known state. The new executor is registered but not enqueued.
    async fn restart(&self) -> Result<Arc<dyn Schedulable>, SupervisionError>;

    /// Stops the child for good and unregisters it.
    async fn terminate(&self);
}

/// How to rebuild an actor: its factory and the state to fall back to.
pub(crate) struct Blueprint<A: Actor> {
    pub factory: ActorFactory<A>,
    pub initial_state: A::State,
}

/// Supervised handle for a typed actor.
pub(crate) struct ChildEntry<A: Actor> {
    id: ActorId,
    current: Mutex<Arc<ActorExecutor<A>>>,
    blueprint: Blueprint<A>,
    system: Weak<SystemInner>,
}

impl<A: Actor> ChildEntry<A> {
    pub(crate) fn new(
        executor: Arc<ActorExecutor<A>>,
        blueprint: Blueprint<A>,
        system: Weak<SystemInner>,
    ) -> Self {
        Self {
            id: executor.id().clone(),
            current: Mutex::new(executor),
            blueprint,
            system,
        }
    }

    fn current(&self) -> Arc<ActorExecutor<A>> {
        Arc::clone(&self.current.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl<A: Actor> SupervisedChild for ChildEntry<A> {
    fn actor_id(&self) -> &ActorId {
        &self.id
    }

    fn incarnation(&self) -> IncarnationId {
        self.current().incarnation()
    }

    async fn restart(&self) -> Result<Arc<dyn Schedulable>, SupervisionError> {
        let system = self.system.upgrade().ok_or(SupervisionError::SystemGone)?;
        let old = self.current();
        old.quiesce().await;

        let known = old.last_state();
        let next = system
            .build_executor(&self.id, &self.blueprint, Some(known), old.mailbox(), old.wiring())
            .await
            .map_err(|source| SupervisionError::Recreate {
                id: self.id.clone(),
                source,
            })?;

        old.set_successor(&next);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        system.register(&next);

        info!(
            actor_id = %self.id,
            from = %old.incarnation(),
            to = %next.incarnation(),
            "Actor recreated"
        );
        Ok(next)
    }

    async fn terminate(&self) {
        let executor = self.current();
        executor.quiesce().await;

        let failed = executor.close();
        executor.stop();
        if let Some(system) = self.system.upgrade() {
            system.unregister(&self.id, executor.incarnation());
        }

        debug!(actor_id = %self.id, failed_asks = failed, "Child terminated");
    }
}
