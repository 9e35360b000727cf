//! Supervision tree.
//!
//! A supervisor:
//! - Receives failure reports from its children's executors over a channel
//! - Restarts failed children after a randomized exponential backoff
//! - Removes a child for good once it exhausts its retry budget
//! - Delegates failures upward when its strategy is `Escalate`
//!
//! All bookkeeping (children, failure counts) lives inside a single task per
//! supervisor, so none of it needs locking. Backoff timers post `RestartDue`
//! back into the same channel.

mod child;
mod strategy;

pub(crate) use child::{Blueprint, ChildEntry};
pub use child::SupervisedChild;
pub use strategy::{StrategyKind, SupervisorStrategy};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use ember_id::{ActorId, IncarnationId};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ActorError, SupervisionError};
use crate::scheduler::{Schedulable, Scheduler};

// =============================================================================
// Messages
// =============================================================================

/// Messages consumed by a supervisor's loop.
pub enum SupervisorMessage {
    /// An executor failed and deactivated itself.
    ActorFailed {
        executor: Arc<dyn Schedulable>,
        error: ActorError,
    },

    AddChild(Box<dyn SupervisedChild>),

    /// A backoff timer elapsed for `actor_id`.
    RestartDue {
        actor_id: ActorId,
        incarnation: IncarnationId,
    },

    /// A child supervisor handed one of its failures upward.
    Escalated {
        from: Supervisor,
        actor_id: ActorId,
        error: ActorError,
    },

    /// Ordered by the parent after an escalation.
    RestartChildren,

    /// Ordered by the parent once escalations exceed its budget.
    StopChildren,

    GetStatus {
        reply: oneshot::Sender<SupervisorStatus>,
    },

    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

impl std::fmt::Debug for SupervisorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ActorFailed { executor, error } => f
                .debug_struct("ActorFailed")
                .field("actor_id", executor.actor_id())
                .field("incarnation", &executor.incarnation())
                .field("error", error)
                .finish(),
            Self::AddChild(child) => f.debug_tuple("AddChild").field(child.actor_id()).finish(),
            Self::RestartDue {
                actor_id,
                incarnation,
            } => f
                .debug_struct("RestartDue")
                .field("actor_id", actor_id)
                .field("incarnation", incarnation)
                .finish(),
            Self::Escalated {
                from,
                actor_id,
                error,
            } => f
                .debug_struct("Escalated")
                .field("from", from.id())
                .field("actor_id", actor_id)
                .field("error", error)
                .finish(),
            Self::RestartChildren => f.write_str("RestartChildren"),
            Self::StopChildren => f.write_str("StopChildren"),
            Self::GetStatus { .. } => f.write_str("GetStatus"),
            Self::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}

/// Snapshot of a supervisor's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorStatus {
    pub id: ActorId,
    pub strategy: StrategyKind,
    pub children: Vec<ActorId>,
    /// Failures counted since each child's last removal.
    pub failure_counts: BTreeMap<ActorId, u32>,
    pub restarts: u64,
    pub removals: u64,
    /// Failures handed to the parent.
    pub escalations: u64,
}

// =============================================================================
// Handle
// =============================================================================

struct Shared {
    id: ActorId,
    strategy: SupervisorStrategy,
    tx: mpsc::UnboundedSender<SupervisorMessage>,
    scheduler: RwLock<Option<Arc<dyn Scheduler>>>,
    config: RwLock<Option<Config>>,
    parent: Option<Supervisor>,
}

/// Cloneable handle to a supervisor and its loop.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Creates a supervisor and spawns its loop.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(id: ActorId, strategy: SupervisorStrategy, parent: Option<Supervisor>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            shared: Arc::new(Shared {
                id,
                strategy,
                tx,
                scheduler: RwLock::new(None),
                config: RwLock::new(None),
                parent,
            }),
        };

        info!(
            supervisor_id = %supervisor.id(),
            strategy = ?supervisor.strategy().kind,
            parent = ?supervisor.parent().map(Supervisor::id),
            "Starting supervisor"
        );

        let worker = SupervisorLoop::new(supervisor.clone(), rx);
        tokio::spawn(worker.run());
        supervisor
    }

    pub fn id(&self) -> &ActorId {
        &self.shared.id
    }

    pub fn strategy(&self) -> &SupervisorStrategy {
        &self.shared.strategy
    }

    pub fn parent(&self) -> Option<&Supervisor> {
        self.shared.parent.as_ref()
    }

    /// Places a child under this supervisor, replacing any child with the same id.
    pub fn add_child(&self, child: Box<dyn SupervisedChild>) {
        self.post(SupervisorMessage::AddChild(child));
    }

    /// Channel executors use to report failures.
    pub fn message_channel(&self) -> mpsc::UnboundedSender<SupervisorMessage> {
        self.shared.tx.clone()
    }

    pub fn set_scheduler(&self, scheduler: Arc<dyn Scheduler>) {
        *self
            .shared
            .scheduler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(scheduler);
    }

    /// Sets the scheduler unless one was set already.
    pub(crate) fn adopt_scheduler(&self, scheduler: Arc<dyn Scheduler>) {
        let mut slot = self
            .shared
            .scheduler
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert(scheduler);
    }

    pub fn scheduler(&self) -> Option<Arc<dyn Scheduler>> {
        self.shared
            .scheduler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_config(&self, config: Config) {
        *self
            .shared
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(config);
    }

    pub fn config(&self) -> Option<Config> {
        self.shared
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn status(&self) -> Result<SupervisorStatus, SupervisionError> {
        let (reply, rx) = oneshot::channel();
        self.shared
            .tx
            .send(SupervisorMessage::GetStatus { reply })
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())
    }

    /// Terminates every child and stops the loop.
    pub async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self
            .shared
            .tx
            .send(SupervisorMessage::Shutdown { ack })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Asks the loop to stop without waiting for it.
    pub(crate) fn request_stop(&self) {
        let (ack, _) = oneshot::channel();
        let _ = self.shared.tx.send(SupervisorMessage::Shutdown { ack });
    }

    fn post(&self, message: SupervisorMessage) {
        if self.shared.tx.send(message).is_err() {
            warn!(supervisor_id = %self.id(), "Supervisor has stopped, message dropped");
        }
    }

    fn stopped(&self) -> SupervisionError {
        SupervisionError::Stopped(self.id().clone())
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("id", self.id())
            .field("strategy", self.strategy())
            .field("parent", &self.parent().map(Supervisor::id))
            .finish()
    }
}

// =============================================================================
// Loop
// =============================================================================

struct SupervisorLoop {
    handle: Supervisor,
    rx: mpsc::UnboundedReceiver<SupervisorMessage>,
    children: HashMap<ActorId, Box<dyn SupervisedChild>>,
    failures: HashMap<ActorId, u32>,
    /// Escalations counted per child supervisor.
    escalations: HashMap<ActorId, u32>,
    restarts: u64,
    removals: u64,
    escalated: u64,
}

impl SupervisorLoop {
    fn new(handle: Supervisor, rx: mpsc::UnboundedReceiver<SupervisorMessage>) -> Self {
        Self {
            handle,
            rx,
            children: HashMap::new(),
            failures: HashMap::new(),
            escalations: HashMap::new(),
            restarts: 0,
            removals: 0,
            escalated: 0,
        }
    }

    fn id(&self) -> &ActorId {
        self.handle.id()
    }

    fn strategy(&self) -> &SupervisorStrategy {
        self.handle.strategy()
    }

    async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            match message {
                SupervisorMessage::ActorFailed { executor, error } => {
                    self.on_failure(executor, error).await;
                }
                SupervisorMessage::AddChild(child) => {
                    let id = child.actor_id().clone();
                    if self.children.insert(id.clone(), child).is_some() {
                        debug!(supervisor_id = %self.id(), actor_id = %id, "Child replaced");
                    } else {
                        debug!(supervisor_id = %self.id(), actor_id = %id, "Child added");
                    }
                }
                SupervisorMessage::RestartDue {
                    actor_id,
                    incarnation,
                } => self.on_restart_due(actor_id, incarnation).await,
                SupervisorMessage::Escalated {
                    from,
                    actor_id,
                    error,
                } => self.on_escalated(from, actor_id, error),
                SupervisorMessage::RestartChildren => self.restart_all().await,
                SupervisorMessage::StopChildren => self.remove_all().await,
                SupervisorMessage::GetStatus { reply } => {
                    let _ = reply.send(self.status());
                }
                SupervisorMessage::Shutdown { ack } => {
                    self.stop_children().await;
                    info!(supervisor_id = %self.id(), "Supervisor stopped");
                    let _ = ack.send(());
                    return;
                }
            }
        }
    }

    async fn on_failure(&mut self, executor: Arc<dyn Schedulable>, error: ActorError) {
        let actor_id = executor.actor_id().clone();
        let incarnation = executor.incarnation();

        match self.children.get(&actor_id) {
            Some(child) if child.incarnation() == incarnation => {}
            Some(_) => {
                debug!(actor_id = %actor_id, %incarnation, "Ignoring failure of a replaced incarnation");
                return;
            }
            None => {
                warn!(supervisor_id = %self.id(), actor_id = %actor_id, "Failure reported for unknown child");
                return;
            }
        }

        if self.strategy().kind == StrategyKind::Escalate {
            if let Some(parent) = self.handle.parent() {
                self.escalated += 1;
                warn!(
                    supervisor_id = %self.id(),
                    parent_id = %parent.id(),
                    actor_id = %actor_id,
                    error = %error,
                    "Escalating failure"
                );
                parent.post(SupervisorMessage::Escalated {
                    from: self.handle.clone(),
                    actor_id,
                    error,
                });
                return;
            }
        }

        let retries = self.failures.get(&actor_id).copied().unwrap_or(0);
        if retries >= self.strategy().max_retries {
            error!(
                supervisor_id = %self.id(),
                actor_id = %actor_id,
                retries,
                error = %error,
                "Actor exceeded max retries, removing"
            );
            self.remove_child(&actor_id).await;
            return;
        }

        self.failures.insert(actor_id.clone(), retries + 1);
        let delay = self.strategy().backoff(retries);
        warn!(
            supervisor_id = %self.id(),
            actor_id = %actor_id,
            attempt = retries + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Scheduling actor restart"
        );

        let tx = self.handle.message_channel();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SupervisorMessage::RestartDue {
                actor_id,
                incarnation,
            });
        });
    }

    async fn on_restart_due(&mut self, actor_id: ActorId, incarnation: IncarnationId) {
        let current = self.children.get(&actor_id).map(|child| child.incarnation());
        if current != Some(incarnation) {
            debug!(actor_id = %actor_id, "Restart no longer needed");
            return;
        }

        match self.strategy().kind {
            StrategyKind::AllForOne => self.restart_all().await,
            StrategyKind::OneForOne | StrategyKind::Escalate => self.restart_child(&actor_id).await,
        }
    }

    fn on_escalated(&mut self, from: Supervisor, actor_id: ActorId, error: ActorError) {
        // Pass it further up; the supervisor that acts still orders `from`.
        if self.strategy().kind == StrategyKind::Escalate {
            if let Some(parent) = self.handle.parent() {
                self.escalated += 1;
                warn!(
                    supervisor_id = %self.id(),
                    parent_id = %parent.id(),
                    child_supervisor = %from.id(),
                    actor_id = %actor_id,
                    "Escalating failure of child supervisor"
                );
                parent.post(SupervisorMessage::Escalated {
                    from,
                    actor_id,
                    error,
                });
                return;
            }
        }

        let child_supervisor = from.id().clone();
        let retries = self.escalations.get(&child_supervisor).copied().unwrap_or(0);

        if retries >= self.strategy().max_retries {
            error!(
                supervisor_id = %self.id(),
                child_supervisor = %child_supervisor,
                actor_id = %actor_id,
                error = %error,
                "Child supervisor exceeded max retries, stopping its children"
            );
            self.escalations.remove(&child_supervisor);
            self.removals += 1;
            from.post(SupervisorMessage::StopChildren);
            return;
        }

        self.escalations.insert(child_supervisor.clone(), retries + 1);
        let delay = self.strategy().backoff(retries);
        warn!(
            supervisor_id = %self.id(),
            child_supervisor = %child_supervisor,
            actor_id = %actor_id,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Restarting children of escalating supervisor"
        );

        self.restarts += 1;
        let tx = from.message_channel();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SupervisorMessage::RestartChildren);
        });
    }

    async fn restart_child(&mut self, actor_id: &ActorId) {
        let Some(child) = self.children.get(actor_id) else {
            return;
        };

        let restarted = child.restart().await;
        match restarted {
            Ok(executor) => {
                self.restarts += 1;
                // Wakes that arrived while the child was down went nowhere.
                if executor.has_messages() {
                    if let Some(scheduler) = self.handle.scheduler() {
                        scheduler.enqueue(executor);
                    }
                }
            }
            Err(e) => {
                error!(
                    supervisor_id = %self.id(),
                    actor_id = %actor_id,
                    error = %e,
                    "Failed to recreate actor"
                );
                match self.handle.parent().cloned() {
                    Some(parent) => {
                        self.escalated += 1;
                        parent.post(SupervisorMessage::Escalated {
                            from: self.handle.clone(),
                            actor_id: actor_id.clone(),
                            error: e.into(),
                        });
                    }
                    None => self.remove_child(actor_id).await,
                }
            }
        }
    }

    async fn restart_all(&mut self) {
        let mut ids: Vec<ActorId> = self.children.keys().cloned().collect();
        ids.sort();
        info!(supervisor_id = %self.id(), children = ids.len(), "Restarting all children");

        for id in ids {
            self.restart_child(&id).await;
        }
    }

    /// Removes a child permanently and evicts it from the scheduler.
    ///
    /// Eviction runs while the child still holds its registry entry, so no
    /// newer actor with the same id can be caught by it.
    async fn remove_child(&mut self, actor_id: &ActorId) {
        if let Some(scheduler) = self.handle.scheduler() {
            scheduler.remove_actor(actor_id);
        }
        if let Some(child) = self.children.remove(actor_id) {
            child.terminate().await;
        }
        self.failures.remove(actor_id);
        self.removals += 1;
    }

    async fn remove_all(&mut self) {
        let mut ids: Vec<ActorId> = self.children.keys().cloned().collect();
        ids.sort();
        for id in ids {
            self.remove_child(&id).await;
        }
    }

    async fn stop_children(&mut self) {
        let scheduler = self.handle.scheduler();
        for (actor_id, child) in self.children.drain() {
            if let Some(scheduler) = &scheduler {
                scheduler.remove_actor(&actor_id);
            }
            child.terminate().await;
        }
        self.failures.clear();
    }

    fn status(&self) -> SupervisorStatus {
        let mut children: Vec<ActorId> = self.children.keys().cloned().collect();
        children.sort();

        SupervisorStatus {
            id: self.id().clone(),
            strategy: self.strategy().kind,
            children,
            failure_counts: self
                .failures
                .iter()
                .map(|(id, count)| (id.clone(), *count))
                .collect(),
            restarts: self.restarts,
            removals: self.removals,
            escalations: self.escalated,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
