//! Actor system: the composition root.
//!
//! The system owns the executor registry, the scheduler, the pending-ask
//! table and the root supervisor. Each [`ActorSystem`] is an independent
//! instance; handles are cheap to clone.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ember_id::{ActorId, IncarnationId, SystemId};
use tracing::{debug, info, warn};

use crate::actor::Actor;
use crate::adapter::ActorAdapter;
use crate::codec::JsonSerializer;
use crate::config::Config;
use crate::envelope::Envelope;
use crate::error::{ActorError, DeliveryError, SystemError};
use crate::executor::{ActorExecutor, ExecutorWiring};
use crate::mailbox::Mailbox;
use crate::pending::PendingRequests;
use crate::pointer::ActorPointer;
use crate::scheduler::{Priority, Schedulable, Scheduler, SchedulerSettings, WorkStealingScheduler};
use crate::store::{backend_for, StateStore, StoreBackend};
use crate::supervisor::{Blueprint, ChildEntry, Supervisor, SupervisorStrategy};

/// Id of the supervisor every actor falls under by default.
pub const ROOT_SUPERVISOR: &str = "root-supervisor";

/// Retries the root supervisor allows each child.
const ROOT_MAX_RETRIES: u32 = 5;

/// Per-actor options for [`ActorSystem::actor_of_with`].
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Supervisor to place the actor under; the root supervisor if `None`.
    pub supervisor: Option<Supervisor>,
    pub priority: Priority,
}

struct Registered {
    executor: Arc<dyn Schedulable>,
    typed: Arc<dyn Any + Send + Sync>,
}

impl Registered {
    fn of<A: Actor>(executor: &Arc<ActorExecutor<A>>) -> Self {
        Self {
            executor: Arc::clone(executor) as Arc<dyn Schedulable>,
            typed: Arc::clone(executor) as Arc<dyn Any + Send + Sync>,
        }
    }
}

pub(crate) struct SystemInner {
    id: SystemId,
    config: Config,
    scheduler: Arc<WorkStealingScheduler>,
    registry: DashMap<ActorId, Registered>,
    pending: Arc<PendingRequests>,
    store: Option<Arc<dyn StoreBackend>>,
    serializer: JsonSerializer,
    root: Supervisor,
    supervisors: Mutex<Vec<Supervisor>>,
    running: AtomicBool,
}

impl SystemInner {
    /// Builds an executor from a blueprint, rehydrating its state.
    pub(crate) async fn build_executor<A: Actor>(
        self: &Arc<Self>,
        id: &ActorId,
        blueprint: &Blueprint<A>,
        known: Option<A::State>,
        mailbox: Arc<Mailbox<Envelope<A::Message>>>,
        wiring: ExecutorWiring,
    ) -> Result<Arc<ActorExecutor<A>>, ActorError> {
        let store = self
            .store
            .clone()
            .map(|backend| StateStore::new(backend, self.serializer));
        let adapter = ActorAdapter::rehydrate(
            id.clone(),
            &blueprint.factory,
            known,
            &blueprint.initial_state,
            store,
            Arc::downgrade(self),
        )
        .await?;

        Ok(ActorExecutor::new(adapter, mailbox, wiring))
    }

    /// Points the registry entry for the executor's id at the executor.
    pub(crate) fn register<A: Actor>(&self, executor: &Arc<ActorExecutor<A>>) {
        self.registry
            .insert(executor.id().clone(), Registered::of(executor));
    }

    /// Drops the registry entry if it still belongs to `incarnation`.
    pub(crate) fn unregister(&self, id: &ActorId, incarnation: IncarnationId) -> bool {
        self.registry
            .remove_if(id, |_, entry| entry.executor.incarnation() == incarnation)
            .is_some()
    }

    pub(crate) fn executor_of<A: Actor>(
        &self,
        id: &ActorId,
    ) -> Result<Arc<ActorExecutor<A>>, DeliveryError> {
        let typed = self
            .registry
            .get(id)
            .map(|entry| Arc::clone(&entry.typed))
            .ok_or_else(|| DeliveryError::NotFound(id.clone()))?;

        typed
            .downcast::<ActorExecutor<A>>()
            .map_err(|_| DeliveryError::ActorType(id.clone()))
    }

    pub(crate) fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }
}

impl Drop for SystemInner {
    fn drop(&mut self) {
        self.scheduler.signal_shutdown();
        for supervisor in self
            .supervisors
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            supervisor.request_stop();
        }
        self.root.request_stop();
    }
}

/// Handle to a running actor system.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl ActorSystem {
    /// Creates a system and starts its scheduler.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create(config: Config) -> Result<Self, SystemError> {
        tokio::runtime::Handle::try_current().map_err(|_| SystemError::NoRuntime)?;
        config.validate()?;

        let scheduler = WorkStealingScheduler::new(SchedulerSettings::from(&config));
        let root = Supervisor::new(
            ActorId::new(ROOT_SUPERVISOR)?,
            SupervisorStrategy::one_for_one().with_max_retries(ROOT_MAX_RETRIES),
            None,
        );
        root.set_scheduler(scheduler.clone());
        root.set_config(config.clone());

        let inner = Arc::new(SystemInner {
            id: SystemId::new(),
            store: backend_for(&config.store),
            serializer: JsonSerializer::from(config.serializer),
            config,
            scheduler,
            registry: DashMap::new(),
            pending: Arc::new(PendingRequests::new()),
            root,
            supervisors: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
        });
        inner.scheduler.start();

        info!(
            system_id = %inner.id,
            workers = inner.scheduler.worker_count(),
            store = ?inner.config.store,
            mailbox = ?inner.config.mailbox,
            "Actor system started"
        );

        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<SystemInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<SystemInner> {
        &self.inner
    }

    pub fn id(&self) -> SystemId {
        self.inner.id
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn scheduler(&self) -> &Arc<WorkStealingScheduler> {
        &self.inner.scheduler
    }

    pub fn root_supervisor(&self) -> &Supervisor {
        &self.inner.root
    }

    /// Number of asks still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Creates a supervisor under `parent`, or under the root supervisor.
    pub fn supervisor(
        &self,
        id: &str,
        strategy: SupervisorStrategy,
        parent: Option<&Supervisor>,
    ) -> Result<Supervisor, SystemError> {
        self.ensure_running()?;
        let parent = parent.unwrap_or(&self.inner.root).clone();
        let supervisor = Supervisor::new(ActorId::new(id)?, strategy, Some(parent));
        supervisor.set_scheduler(self.inner.scheduler.clone());
        supervisor.set_config(self.inner.config.clone());

        self.inner
            .supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(supervisor.clone());
        Ok(supervisor)
    }

    /// Creates an actor and returns a pointer to it.
    ///
    /// The actor is built by `factory` from the state found in the store,
    /// or `initial_state` if the store has none for `id`.
    pub async fn actor_of<A, F>(
        &self,
        id: &str,
        initial_state: A::State,
        supervisor: Option<&Supervisor>,
        factory: F,
    ) -> Result<ActorPointer<A>, SystemError>
    where
        A: Actor,
        F: Fn(&ActorId, A::State) -> A + Send + Sync + 'static,
    {
        let options = SpawnOptions {
            supervisor: supervisor.cloned(),
            ..SpawnOptions::default()
        };
        self.actor_of_with(id, initial_state, options, factory).await
    }

    pub async fn actor_of_with<A, F>(
        &self,
        id: &str,
        initial_state: A::State,
        options: SpawnOptions,
        factory: F,
    ) -> Result<ActorPointer<A>, SystemError>
    where
        A: Actor,
        F: Fn(&ActorId, A::State) -> A + Send + Sync + 'static,
    {
        self.ensure_running()?;
        let id = ActorId::new(id)?;
        if self.inner.registry.contains_key(&id) {
            return Err(SystemError::DuplicateActor(id));
        }

        let supervisor = options
            .supervisor
            .unwrap_or_else(|| self.inner.root.clone());
        let scheduler: Arc<dyn Scheduler> = self.inner.scheduler.clone();
        supervisor.adopt_scheduler(Arc::clone(&scheduler));

        let blueprint = Blueprint {
            factory: Arc::new(factory),
            initial_state,
        };
        let mailbox = Arc::new(Mailbox::from_kind(
            self.inner.config.mailbox,
            self.inner.serializer,
        ));
        let wiring = ExecutorWiring {
            scheduler: Arc::downgrade(&scheduler),
            supervisor: supervisor.message_channel(),
            pending: Arc::clone(&self.inner.pending),
            priority: options.priority,
        };

        let executor = self
            .inner
            .build_executor(&id, &blueprint, None, mailbox, wiring)
            .await?;

        match self.inner.registry.entry(id.clone()) {
            Entry::Occupied(_) => {
                executor.stop();
                return Err(SystemError::DuplicateActor(id));
            }
            Entry::Vacant(slot) => {
                slot.insert(Registered::of(&executor));
            }
        }

        supervisor.add_child(Box::new(ChildEntry::new(
            Arc::clone(&executor),
            blueprint,
            Arc::downgrade(&self.inner),
        )));

        info!(
            actor_id = %id,
            supervisor_id = %supervisor.id(),
            incarnation = %executor.incarnation(),
            "Actor created"
        );
        Ok(ActorPointer::new(id, self.clone()))
    }

    /// Pointer to an existing actor of type `A`.
    pub fn pointer<A: Actor>(&self, id: &str) -> Result<ActorPointer<A>, SystemError> {
        let id = ActorId::new(id)?;
        self.inner.executor_of::<A>(&id)?;
        Ok(ActorPointer::new(id, self.clone()))
    }

    /// The live executor registered under `id`.
    pub fn executor(&self, id: &str) -> Option<Arc<dyn Schedulable>> {
        let id = ActorId::new(id).ok()?;
        self.inner
            .registry
            .get(&id)
            .map(|entry| Arc::clone(&entry.executor))
    }

    pub fn contains(&self, id: &str) -> bool {
        ActorId::new(id).is_ok_and(|id| self.inner.registry.contains_key(&id))
    }

    pub fn actor_ids(&self) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self
            .inner
            .registry
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Stops every supervisor and the scheduler, then fails outstanding asks.
    pub async fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(system_id = %self.inner.id, "Shutting down actor system");

        let supervisors: Vec<Supervisor> = self
            .inner
            .supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for supervisor in supervisors.iter().rev() {
            supervisor.shutdown().await;
        }
        self.inner.root.shutdown().await;
        self.inner.scheduler.shutdown().await;

        let failed = self.inner.pending.fail_all(ActorError::Stopped);
        if failed > 0 {
            warn!(failed, "Outstanding asks failed at shutdown");
        }
        self.inner.registry.clear();

        debug!(system_id = %self.inner.id, "Actor system stopped");
    }

    fn ensure_running(&self) -> Result<(), SystemError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(SystemError::NotRunning)
        }
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("id", &self.inner.id)
            .field("actors", &self.inner.registry.len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Context;

    #[derive(Debug)]
    struct Noop;

    impl Actor for Noop {
        type State = ();
        type Message = ();
        type Reply = ();

        fn on_receive(&mut self, _: (), ctx: Context<()>) -> Result<(Context<()>, ()), ActorError> {
            Ok((ctx, ()))
        }
    }

    #[derive(Debug)]
    struct Other;

    impl Actor for Other {
        type State = u8;
        type Message = u8;
        type Reply = u8;

        fn on_receive(&mut self, m: u8, ctx: Context<u8>) -> Result<(Context<u8>, u8), ActorError> {
            Ok((ctx, m))
        }
    }

    #[test]
    fn test_create_outside_runtime_fails() {
        assert!(matches!(
            ActorSystem::create(Config::for_testing()),
            Err(SystemError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_config() {
        let config = Config {
            max_reductions: 0,
            ..Config::for_testing()
        };
        assert!(matches!(
            ActorSystem::create(config),
            Err(SystemError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let system = ActorSystem::create(Config::for_testing()).unwrap();
        system
            .actor_of("one", (), None, |_, _| Noop)
            .await
            .unwrap();

        let err = system
            .actor_of("one", (), None, |_, _| Noop)
            .await
            .unwrap_err();
        assert!(matches!(err, SystemError::DuplicateActor(id) if id.as_str() == "one"));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_pointer_checks_type() {
        let system = ActorSystem::create(Config::for_testing()).unwrap();
        system
            .actor_of("typed", (), None, |_, _| Noop)
            .await
            .unwrap();

        assert!(system.pointer::<Noop>("typed").is_ok());
        assert!(matches!(
            system.pointer::<Other>("typed"),
            Err(SystemError::Delivery(DeliveryError::ActorType(_)))
        ));
        assert!(matches!(
            system.pointer::<Noop>("missing"),
            Err(SystemError::Delivery(DeliveryError::NotFound(_)))
        ));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_id_rejected() {
        let system = ActorSystem::create(Config::for_testing()).unwrap();
        let err = system
            .actor_of(" padded ", (), None, |_, _| Noop)
            .await
            .unwrap_err();
        assert!(matches!(err, SystemError::InvalidId(_)));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_blocks_new_actors() {
        let system = ActorSystem::create(Config::for_testing()).unwrap();
        system.actor_of("a", (), None, |_, _| Noop).await.unwrap();

        system.shutdown().await;
        system.shutdown().await;

        assert!(!system.is_running());
        assert!(system.actor_ids().is_empty());
        assert!(matches!(
            system.actor_of("b", (), None, |_, _| Noop).await,
            Err(SystemError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_independent_systems() {
        let first = ActorSystem::create(Config::for_testing()).unwrap();
        let second = ActorSystem::create(Config::for_testing()).unwrap();
        first.actor_of("same", (), None, |_, _| Noop).await.unwrap();
        second.actor_of("same", (), None, |_, _| Noop).await.unwrap();

        assert_ne!(first.id(), second.id());
        assert!(first.contains("same") && second.contains("same"));
        first.shutdown().await;
        second.shutdown().await;
    }
}
