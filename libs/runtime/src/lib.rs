//! # ember-runtime
//!
//! Actor runtime with a work-stealing, reduction-budgeted scheduler and
//! let-it-crash supervision.
//!
//! ## Pieces
//!
//! - [`Actor`] / [`Context`]: the user contract. Handlers are synchronous and
//!   thread their state through the context.
//! - [`Mailbox`]: per-actor FIFO over a pluggable [`MailboxQueue`].
//! - [`ActorExecutor`]: one incarnation of an actor, schedulable on any worker.
//! - [`WorkStealingScheduler`]: worker loops over per-worker queues. An
//!   activation drains at most `max_reductions` worth of messages before the
//!   executor goes back on a queue.
//! - [`Supervisor`]: restarts failed actors with randomized exponential
//!   backoff, removes them past `max_retries`, escalates on request.
//! - [`ActorSystem`]: composition root; creates actors and hands out
//!   [`ActorPointer`]s for `send` and `ask`.
//!
//! ## Guarantees
//!
//! - Messages to one actor are handled in send order.
//! - No two activations of one actor overlap, across stealing and restarts.
//! - A failure never takes down a worker; it becomes a supervisor message.

mod actor;
mod adapter;
mod codec;
mod config;
mod envelope;
mod error;
mod executor;
mod mailbox;
mod pending;
mod pointer;
mod scheduler;
mod store;
mod supervisor;
mod system;

pub use actor::{Actor, ActorFactory, Context};
pub use codec::{JsonSerializer, MessageSerializer};
pub use config::{Config, ConfigError, MailboxKind, Placement, SerializerKind, StoreKind};
pub use envelope::Envelope;
pub use error::{
    ActorError, AskError, CodecError, DeliveryError, MailboxError, StoreError, SupervisionError,
    SystemError,
};
pub use executor::{ActorExecutor, ExecutorStats, ExecutorWiring, Resumed, Suspension};
pub use mailbox::{BoundedQueue, ChannelQueue, Mailbox, MailboxQueue, SerializedQueue};
pub use pending::{PendingRequests, Reply, ReplyReceiver};
pub use pointer::ActorPointer;
pub use scheduler::{
    Priority, Schedulable, Scheduler, SchedulerSettings, SchedulerStats, WorkStealingScheduler,
    WorkerQueue,
};
pub use store::{backend_for, FileStore, InMemoryStore, StateStore, StoreBackend};
pub use supervisor::{
    StrategyKind, SupervisedChild, Supervisor, SupervisorMessage, SupervisorStatus,
    SupervisorStrategy,
};
pub use system::{ActorSystem, SpawnOptions, ROOT_SUPERVISOR};

pub use ember_id::{ActorId, IncarnationId, RequestId, SystemId};
