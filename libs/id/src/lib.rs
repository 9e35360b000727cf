//! # ember-id
//!
//! Typed identifiers used throughout the ember actor runtime.
//!
//! ## ID kinds
//!
//! - [`ActorId`]: user-chosen, non-empty label naming an actor. Stable across
//!   restarts; the address of an actor is derived from it.
//! - [`RequestId`]: UUID v4 correlating an ask with its reply.
//! - [`IncarnationId`] / [`SystemId`]: prefixed ULIDs (`{prefix}_{ulid}`)
//!   minted by the runtime. A restarted actor gets a fresh incarnation.
//!
//! ULID-based ids are time-ordered, so incarnations of one actor sort in the
//! order they were created.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
