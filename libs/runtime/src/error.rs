//! Error types for the actor runtime.
//!
//! Errors that travel between tasks (executor → supervisor, executor → ask
//! caller) are `Clone`, so a single failure can be reported to both.

use std::time::Duration;

use ember_id::{ActorId, IdError};
use thiserror::Error;

use crate::config::ConfigError;

// =============================================================================
// Codec / Mailbox / Store
// =============================================================================

/// Failure to encode or decode a value at a serializer boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Errors raised by a mailbox transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailboxError {
    /// The transport has been closed.
    #[error("mailbox closed")]
    Closed,

    /// The message could not be encoded for transport.
    #[error("mailbox encode: {0}")]
    Encode(CodecError),

    /// A queued message could not be decoded.
    #[error("mailbox decode: {0}")]
    Decode(CodecError),
}

/// Errors raised by a state store backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store I/O: {0}")]
    Io(String),

    #[error("store codec: {0}")]
    Codec(#[from] CodecError),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Errors that fail an actor activation.
///
/// Any of these marks the executor inactive and is reported to its
/// supervisor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActorError {
    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Handler(String),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// A value at a codec boundary did not match the expected type.
    #[error("type mismatch, expected {expected}: {reason}")]
    TypeMismatch {
        expected: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The actor exhausted its restarts and was removed.
    #[error("actor removed by its supervisor")]
    Removed,

    /// The actor system is shutting down.
    #[error("actor stopped")]
    Stopped,
}

impl ActorError {
    /// Builds a handler failure from any displayable cause.
    pub fn handler(cause: impl std::fmt::Display) -> Self {
        Self::Handler(cause.to_string())
    }
}

// =============================================================================
// Delivery / Ask
// =============================================================================

/// Errors returned when a message cannot be handed to an actor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("actor '{0}' not found")]
    NotFound(ActorId),

    #[error("actor '{0}' is registered with a different actor type")]
    ActorType(ActorId),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}

/// Errors returned by a request/response exchange.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AskError {
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// The actor failed while handling the request.
    #[error("actor failed: {0}")]
    Failed(ActorError),

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The reply slot was dropped without an answer.
    #[error("request cancelled")]
    Cancelled,

    /// The reply had a different type than the pointer expects.
    #[error("reply type mismatch")]
    ReplyType,
}

// =============================================================================
// Supervision / System
// =============================================================================

/// Errors raised while a supervisor recreates a child.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SupervisionError {
    #[error("actor system is gone")]
    SystemGone,

    #[error("failed to recreate actor '{id}': {source}")]
    Recreate { id: ActorId, source: ActorError },

    #[error("supervisor '{0}' has stopped")]
    Stopped(ActorId),
}

impl From<SupervisionError> for ActorError {
    fn from(err: SupervisionError) -> Self {
        match err {
            SupervisionError::Recreate { source, .. } => source,
            SupervisionError::SystemGone | SupervisionError::Stopped(_) => ActorError::Stopped,
        }
    }
}

/// Errors returned by [`crate::ActorSystem`] operations.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("actor system must be created inside a Tokio runtime")]
    NoRuntime,

    #[error("actor system is shut down")]
    NotRunning,

    #[error("invalid actor id: {0}")]
    InvalidId(#[from] IdError),

    #[error("actor '{0}' already exists")]
    DuplicateActor(ActorId),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("actor failed to start: {0}")]
    Start(#[from] ActorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
