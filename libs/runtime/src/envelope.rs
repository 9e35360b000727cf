//! What sits in an actor's mailbox.

use ember_id::RequestId;
use serde::{Deserialize, Serialize};

/// A queued message, either fire-and-forget or awaiting a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope<M> {
    Tell { payload: M },
    Ask { request_id: RequestId, payload: M },
}

impl<M> Envelope<M> {
    pub fn tell(payload: M) -> Self {
        Self::Tell { payload }
    }

    pub fn ask(request_id: RequestId, payload: M) -> Self {
        Self::Ask {
            request_id,
            payload,
        }
    }

    /// The request awaiting this message's reply, if any.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Tell { .. } => None,
            Self::Ask { request_id, .. } => Some(*request_id),
        }
    }

    pub fn into_parts(self) -> (Option<RequestId>, M) {
        match self {
            Self::Tell { payload } => (None, payload),
            Self::Ask {
                request_id,
                payload,
            } => (Some(request_id), payload),
        }
    }
}
