//! Per-actor execution unit.
//!
//! An executor pairs one actor incarnation with its mailbox. Senders push
//! into the mailbox and wake the executor on its scheduler; a worker then
//! drains a bounded batch through the adapter. A failed executor never runs
//! again; its supervisor builds a successor that shares the same mailbox.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use ember_id::{ActorId, IncarnationId, RequestId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::actor::Actor;
use crate::adapter::ActorAdapter;
use crate::envelope::Envelope;
use crate::error::{ActorError, MailboxError};
use crate::mailbox::Mailbox;
use crate::pending::PendingRequests;
use crate::scheduler::{Priority, Schedulable, Scheduler};
use crate::supervisor::SupervisorMessage;

// =============================================================================
// Suspension
// =============================================================================

/// Single-slot suspension point.
///
/// A drained executor is parked by registering a suspension; `enqueue`
/// resumes it. Workers never await the [`Resumed`] future themselves, so the
/// slot is the record of whether the executor is parked off-queue.
#[derive(Debug, Default)]
pub struct Suspension {
    slot: Mutex<Option<oneshot::Sender<()>>>,
}

impl Suspension {
    /// Registers a suspension, releasing any earlier one.
    pub fn suspend(&self) -> Resumed {
        let (tx, rx) = oneshot::channel();
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(tx);
        if let Some(previous) = previous {
            let _ = previous.send(());
        }
        Resumed(rx)
    }

    /// Returns `false` when nothing was suspended.
    pub fn resume(&self) -> bool {
        let waiter = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        match waiter {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Completes when the matching suspension is resumed.
#[derive(Debug)]
pub struct Resumed(oneshot::Receiver<()>);

impl Future for Resumed {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<()> {
        // A dropped sender also counts as a release.
        Pin::new(&mut self.0).poll(cx).map(|_| ())
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Connections an executor needs into the rest of the system.
#[derive(Clone)]
pub struct ExecutorWiring {
    pub scheduler: Weak<dyn Scheduler>,
    pub supervisor: mpsc::UnboundedSender<SupervisorMessage>,
    pub pending: Arc<PendingRequests>,
    pub priority: Priority,
}

/// Counters for one executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub processed: u64,
    pub failed: u64,
}

/// Runs one incarnation of an actor.
pub struct ActorExecutor<A: Actor> {
    me: Weak<Self>,
    incarnation: IncarnationId,
    adapter: ActorAdapter<A>,
    mailbox: Arc<Mailbox<Envelope<A::Message>>>,
    wiring: ExecutorWiring,
    active: AtomicBool,
    closed: AtomicBool,
    scheduled: AtomicBool,
    suspension: Suspension,
    activation: tokio::sync::Mutex<()>,
    successor: OnceLock<Weak<Self>>,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl<A: Actor> ActorExecutor<A> {
    pub(crate) fn new(
        adapter: ActorAdapter<A>,
        mailbox: Arc<Mailbox<Envelope<A::Message>>>,
        wiring: ExecutorWiring,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            incarnation: IncarnationId::new(),
            adapter,
            mailbox,
            wiring,
            active: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
            suspension: Suspension::default(),
            activation: tokio::sync::Mutex::new(()),
            successor: OnceLock::new(),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> &ActorId {
        self.adapter.id()
    }

    /// Queues a message and wakes the executor.
    pub async fn send(&self, envelope: Envelope<A::Message>) -> Result<(), MailboxError> {
        self.mailbox.send(envelope).await?;
        self.wake();

        // Raced with removal: nobody else will drain this mailbox.
        if self.is_closed() {
            self.drain_pending(&ActorError::Removed);
        }
        Ok(())
    }

    /// Puts this executor, or the incarnation that replaced it, on the scheduler.
    pub(crate) fn wake(&self) -> bool {
        if self.is_active() {
            match (self.wiring.scheduler.upgrade(), self.me.upgrade()) {
                (Some(scheduler), Some(me)) => scheduler.enqueue(me),
                _ => false,
            }
        } else {
            self.successor
                .get()
                .and_then(Weak::upgrade)
                .is_some_and(|next| next.wake())
        }
    }

    pub fn dequeue_message(&self) -> Result<Option<Envelope<A::Message>>, MailboxError> {
        self.mailbox.receive()
    }

    pub fn has_messages(&self) -> bool {
        self.mailbox.has_messages()
    }

    /// Dispatches one envelope; failures deactivate the executor and go to
    /// the supervisor.
    pub async fn process_message(&self, envelope: Envelope<A::Message>) {
        let (request_id, payload) = envelope.into_parts();
        trace!(actor_id = %self.id(), ?request_id, message = ?payload, "Processing message");

        match self.adapter.dispatch(payload).await {
            Ok(reply) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                if let Some(request_id) = request_id {
                    if !self.wiring.pending.complete(request_id, Box::new(reply)) {
                        debug!(actor_id = %self.id(), %request_id, "Reply dropped, asker is gone");
                    }
                }
            }
            Err(e) => self.fail(e, request_id),
        }
    }

    fn fail(&self, error: ActorError, request_id: Option<RequestId>) {
        self.active.store(false, Ordering::SeqCst);
        self.failed.fetch_add(1, Ordering::Relaxed);
        warn!(
            actor_id = %self.id(),
            incarnation = %self.incarnation,
            error = %error,
            "Actor failed"
        );

        if let Some(request_id) = request_id {
            self.wiring.pending.fail(request_id, error.clone());
        }

        let Some(me) = self.me.upgrade() else {
            return;
        };
        let report = SupervisorMessage::ActorFailed {
            executor: me,
            error,
        };
        if self.wiring.supervisor.send(report).is_err() {
            error!(actor_id = %self.id(), "Supervisor is gone, failure not reported");
        }
    }

    /// Deactivates and waits for any in-flight activation to finish.
    pub(crate) async fn quiesce(&self) {
        self.deactivate();
        let _activation = self.activation.lock().await;
    }

    /// Fails every ask still queued in the mailbox.
    pub(crate) fn drain_pending(&self, error: &ActorError) -> usize {
        let mut failed = 0;
        loop {
            match self.mailbox.receive() {
                Ok(Some(envelope)) => {
                    if let Some(request_id) = envelope.request_id() {
                        if self.wiring.pending.fail(request_id, error.clone()) {
                            failed += 1;
                        }
                    }
                }
                Ok(None) => break,
                Err(MailboxError::Decode(_)) => continue,
                Err(_) => break,
            }
        }
        failed
    }

    /// Permanently retires this incarnation and fails its queued asks.
    pub(crate) fn close(&self) -> usize {
        self.deactivate();
        self.closed.store(true, Ordering::SeqCst);
        self.drain_pending(&ActorError::Removed)
    }

    /// Whether this executor, or the incarnation that replaced it, was retired.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
            || self
                .successor
                .get()
                .and_then(Weak::upgrade)
                .is_some_and(|next| next.is_closed())
    }

    pub(crate) fn stop(&self) {
        self.adapter.stop();
    }

    /// Routes wakeups for a deactivated executor to its replacement.
    pub(crate) fn set_successor(&self, next: &Arc<Self>) {
        if self.successor.set(Arc::downgrade(next)).is_err() {
            warn!(actor_id = %self.id(), "Executor already has a successor");
        }
    }

    pub(crate) fn mailbox(&self) -> Arc<Mailbox<Envelope<A::Message>>> {
        Arc::clone(&self.mailbox)
    }

    pub(crate) fn wiring(&self) -> ExecutorWiring {
        self.wiring.clone()
    }

    pub fn last_state(&self) -> A::State {
        self.adapter.last_state()
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl<A: Actor> Schedulable for ActorExecutor<A> {
    fn actor_id(&self) -> &ActorId {
        self.id()
    }

    fn incarnation(&self) -> IncarnationId {
        self.incarnation
    }

    fn priority(&self) -> Priority {
        self.wiring.priority
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn has_messages(&self) -> bool {
        self.mailbox.has_messages()
    }

    async fn process_next(&self) -> bool {
        match self.dequeue_message() {
            Ok(Some(envelope)) => {
                self.process_message(envelope).await;
                true
            }
            Ok(None) => false,
            Err(MailboxError::Decode(e)) => {
                let error = ActorError::TypeMismatch {
                    expected: std::any::type_name::<A::Message>(),
                    reason: e.to_string(),
                };
                self.fail(error, None);
                true
            }
            Err(e) => {
                self.fail(e.into(), None);
                true
            }
        }
    }

    fn suspend_execution(&self) -> Resumed {
        self.suspension.suspend()
    }

    fn resume_execution(&self) -> bool {
        self.suspension.resume()
    }

    fn is_suspended(&self) -> bool {
        self.suspension.is_suspended()
    }

    fn try_mark_scheduled(&self) -> bool {
        self.scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn release_scheduled(&self) {
        self.scheduled.store(false, Ordering::SeqCst);
    }

    fn activation_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.activation
    }
}

impl<A: Actor> std::fmt::Debug for ActorExecutor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorExecutor")
            .field("actor_id", self.id())
            .field("incarnation", &self.incarnation)
            .field("active", &self.is_active())
            .field("mailbox", &self.mailbox)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
