//! Bridges an [`Actor`] to its executor: context threading, panic capture
//! and state persistence.

use std::any::{type_name, Any};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError, Weak};

use ember_id::ActorId;
use tracing::{debug, error};

use crate::actor::{Actor, ActorFactory, Context};
use crate::error::{ActorError, CodecError, StoreError};
use crate::store::StateStore;
use crate::system::SystemInner;

struct Cell<A: Actor> {
    actor: A,
    context: Option<Context<A::State>>,
}

/// Owns one actor instance and its context.
pub struct ActorAdapter<A: Actor> {
    id: ActorId,
    cell: Mutex<Cell<A>>,
    store: Option<StateStore<A::State>>,
    last_state: Mutex<A::State>,
    system: Weak<SystemInner>,
}

impl<A: Actor> ActorAdapter<A> {
    /// Builds and starts an actor from the best state available.
    ///
    /// State is taken from `known` (the previous incarnation), then the
    /// store, then `initial`.
    pub(crate) async fn rehydrate(
        id: ActorId,
        factory: &ActorFactory<A>,
        known: Option<A::State>,
        initial: &A::State,
        store: Option<StateStore<A::State>>,
        system: Weak<SystemInner>,
    ) -> Result<Self, ActorError> {
        let state = match (known, &store) {
            (Some(state), _) => state,
            (None, Some(store)) => store
                .load(&id)
                .await
                .map_err(load_failure::<A::State>)?
                .unwrap_or_else(|| initial.clone()),
            (None, None) => initial.clone(),
        };

        let mut actor = guard(|| factory(&id, state.clone()))?;
        let ctx = Context::new(Some(state.clone()), system.clone());
        let ctx = guard(|| actor.on_start(ctx))?;
        let last_state = ctx.state().cloned().unwrap_or(state);

        debug!(actor_id = %id, state = ?last_state, "Actor rehydrated");

        Ok(Self {
            id,
            cell: Mutex::new(Cell {
                actor,
                context: Some(ctx),
            }),
            store,
            last_state: Mutex::new(last_state),
            system,
        })
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Runs the handler for one message and persists the resulting state.
    pub(crate) async fn dispatch(&self, message: A::Message) -> Result<A::Reply, ActorError> {
        let (reply, next_state) = {
            let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
            let cell = &mut *cell;
            let ctx = match cell.context.take() {
                Some(ctx) => ctx,
                None => Context::new(Some(self.last_state()), self.system.clone()),
            };

            let (ctx, reply) = guard(|| cell.actor.on_receive(message, ctx))??;
            let next_state = ctx.state().cloned();
            cell.context = Some(ctx);
            (reply, next_state)
        };

        self.mutate(next_state).await?;
        Ok(reply)
    }

    /// Records the new state and writes it through to the store.
    async fn mutate(&self, state: Option<A::State>) -> Result<(), ActorError> {
        let Some(state) = state else {
            return Ok(());
        };

        *self.last_state.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
        if let Some(store) = &self.store {
            store.save(&self.id, &state).await?;
        }
        Ok(())
    }

    /// State after the last successful message.
    pub fn last_state(&self) -> A::State {
        self.last_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn stop(&self) {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = guard(|| cell.actor.on_stop()) {
            error!(actor_id = %self.id, error = %e, "on_stop panicked");
        }
        cell.context = None;
    }
}

/// Runs actor code, converting a panic into [`ActorError::Panicked`].
fn guard<T>(f: impl FnOnce() -> T) -> Result<T, ActorError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| ActorError::Panicked(panic_message(&*payload)))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn load_failure<S>(err: StoreError) -> ActorError {
    match err {
        StoreError::Codec(CodecError::Decode(reason)) => ActorError::TypeMismatch {
            expected: type_name::<S>(),
            reason,
        },
        other => ActorError::Store(other),
    }
}
