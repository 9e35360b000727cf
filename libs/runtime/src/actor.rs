//! The actor contract.
//!
//! Actors:
//! - Process one message at a time, synchronously, within an activation
//! - Own their state through a [`Context`] threaded through every call
//! - Are recreated from their last known state after a crash

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use ember_id::ActorId;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ActorError;
use crate::system::{ActorSystem, SystemInner};

// =============================================================================
// Actor
// =============================================================================

/// Behavior of an actor.
pub trait Actor: Send + 'static {
    /// Persisted, restart-surviving state.
    type State: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Messages this actor accepts.
    type Message: Debug + Serialize + DeserializeOwned + Send + 'static;

    /// Reply produced for every message; discarded for tells.
    type Reply: Debug + Send + 'static;

    /// Called when the actor starts (or restarts) with its recovered state.
    fn on_start(&mut self, ctx: Context<Self::State>) -> Context<Self::State> {
        ctx
    }

    /// Handle a single message, returning the next context and a reply.
    ///
    /// An `Err` (or a panic) fails the actor and hands it to its supervisor.
    fn on_receive(
        &mut self,
        message: Self::Message,
        ctx: Context<Self::State>,
    ) -> Result<(Context<Self::State>, Self::Reply), ActorError>;

    /// Called once before the actor is discarded for good.
    fn on_stop(&mut self) {}
}

/// Builds an actor instance from its id and recovered state.
pub type ActorFactory<A> = Arc<dyn Fn(&ActorId, <A as Actor>::State) -> A + Send + Sync>;

// =============================================================================
// Context
// =============================================================================

/// State plus a handle back to the owning system.
pub struct Context<S> {
    state: Option<S>,
    system: Weak<SystemInner>,
}

impl<S> Context<S> {
    pub(crate) fn new(state: Option<S>, system: Weak<SystemInner>) -> Self {
        Self { state, system }
    }

    /// A context with no owning system, for driving actors directly.
    pub fn detached(state: Option<S>) -> Self {
        Self::new(state, Weak::new())
    }

    /// Returns a context carrying `state`, keeping the system handle.
    #[must_use]
    pub fn with_state(self, state: S) -> Self {
        Self {
            state: Some(state),
            system: self.system,
        }
    }

    pub fn state(&self) -> Option<&S> {
        self.state.as_ref()
    }

    pub fn into_state(self) -> Option<S> {
        self.state
    }

    /// The owning system, if it is still running.
    pub fn system(&self) -> Option<ActorSystem> {
        self.system.upgrade().map(ActorSystem::from_inner)
    }
}

impl<S: Clone> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            system: self.system.clone(),
        }
    }
}

impl<S: Debug> Debug for Context<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("state", &self.state)
            .field("attached", &(self.system.strong_count() > 0))
            .finish()
    }
}
