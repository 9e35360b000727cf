//! Typed handles to actors.

use std::marker::PhantomData;
use std::time::Duration;

use ember_id::ActorId;
use tracing::debug;

use crate::actor::Actor;
use crate::envelope::Envelope;
use crate::error::{AskError, DeliveryError};
use crate::system::ActorSystem;

/// Address of an actor of type `A` within a system.
///
/// Every call resolves the actor by id, so a pointer keeps working across
/// restarts and fails with [`DeliveryError::NotFound`] once the actor is
/// removed.
pub struct ActorPointer<A: Actor> {
    id: ActorId,
    system: ActorSystem,
    _actor: PhantomData<fn() -> A>,
}

impl<A: Actor> ActorPointer<A> {
    pub(crate) fn new(id: ActorId, system: ActorSystem) -> Self {
        Self {
            id,
            system,
            _actor: PhantomData,
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// `<id>`, lower-cased.
    pub fn address(&self) -> String {
        self.id.address()
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// Fire-and-forget send; the reply is discarded.
    pub async fn send(&self, message: A::Message) -> Result<(), DeliveryError> {
        let executor = self.system.inner().executor_of::<A>(&self.id)?;
        executor.send(Envelope::tell(message)).await?;
        Ok(())
    }

    /// Sends a request and waits up to the configured `ask_timeout` for the reply.
    pub async fn ask(&self, message: A::Message) -> Result<A::Reply, AskError> {
        let timeout = self.system.config().ask_timeout();
        self.ask_with_timeout(message, timeout).await
    }

    pub async fn ask_with_timeout(
        &self,
        message: A::Message,
        timeout: Duration,
    ) -> Result<A::Reply, AskError> {
        let inner = self.system.inner();
        let executor = inner.executor_of::<A>(&self.id)?;
        let pending = inner.pending();

        let (request_id, reply) = pending.register();
        if let Err(e) = executor.send(Envelope::ask(request_id, message)).await {
            pending.cancel(request_id);
            return Err(DeliveryError::from(e).into());
        }

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(Ok(reply))) => reply
                .downcast::<A::Reply>()
                .map(|reply| *reply)
                .map_err(|_| AskError::ReplyType),
            Ok(Ok(Err(error))) => Err(AskError::Failed(error)),
            Ok(Err(_)) => Err(AskError::Cancelled),
            Err(_) => {
                pending.cancel(request_id);
                debug!(actor_id = %self.id, %request_id, ?timeout, "Ask timed out");
                Err(AskError::Timeout(timeout))
            }
        }
    }

    /// State after the last message the current incarnation handled.
    pub fn last_known_state(&self) -> Result<A::State, DeliveryError> {
        Ok(self.system.inner().executor_of::<A>(&self.id)?.last_state())
    }
}

impl<A: Actor> Clone for ActorPointer<A> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone(), self.system.clone())
    }
}

impl<A: Actor> std::fmt::Debug for ActorPointer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorPointer")
            .field("id", &self.id)
            .field("actor", &std::any::type_name::<A>())
            .finish()
    }
}
