//! Per-actor FIFO mailboxes over pluggable transports.

mod transport;

pub use transport::{BoundedQueue, ChannelQueue, SerializedQueue};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::JsonSerializer;
use crate::config::MailboxKind;
use crate::error::MailboxError;

/// A FIFO transport backing a [`Mailbox`].
///
/// `send` may be called from many tasks at once. `receive` and
/// `has_messages` never wait.
#[async_trait]
pub trait MailboxQueue<M: Send + 'static>: Send + Sync {
    async fn send(&self, message: M) -> Result<(), MailboxError>;

    /// Dequeues the head, or `None` when empty.
    fn receive(&self) -> Result<Option<M>, MailboxError>;

    fn has_messages(&self) -> bool;

    fn len(&self) -> usize;
}

/// An actor's inbox.
pub struct Mailbox<M: Send + 'static> {
    queue: Box<dyn MailboxQueue<M>>,
}

impl<M: Send + 'static> Mailbox<M> {
    pub fn new(queue: impl MailboxQueue<M> + 'static) -> Self {
        Self {
            queue: Box::new(queue),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(ChannelQueue::new())
    }

    pub async fn send(&self, message: M) -> Result<(), MailboxError> {
        self.queue.send(message).await
    }

    pub fn receive(&self) -> Result<Option<M>, MailboxError> {
        self.queue.receive()
    }

    pub fn has_messages(&self) -> bool {
        self.queue.has_messages()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_messages()
    }
}

impl<M> Mailbox<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    /// Builds the transport selected in configuration.
    pub fn from_kind(kind: MailboxKind, serializer: JsonSerializer) -> Self {
        match kind {
            MailboxKind::Unbounded => Self::unbounded(),
            MailboxKind::Bounded { capacity } => Self::new(BoundedQueue::new(capacity)),
            MailboxKind::Serialized => {
                Self::new(SerializedQueue::new(ChannelQueue::new(), serializer))
            }
        }
    }
}

impl<M: Send + 'static> std::fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MailboxKind::Unbounded)]
    #[case(MailboxKind::Bounded { capacity: 8 })]
    #[case(MailboxKind::Serialized)]
    #[tokio::test]
    async fn test_fifo_for_every_transport(#[case] kind: MailboxKind) {
        let mailbox = Mailbox::<u32>::from_kind(kind, JsonSerializer);
        assert!(!mailbox.has_messages());

        for n in 0..5 {
            mailbox.send(n).await.unwrap();
        }
        assert!(mailbox.has_messages());
        assert_eq!(mailbox.len(), 5);

        let drained: Vec<u32> = std::iter::from_fn(|| mailbox.receive().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(mailbox.is_empty());
        assert_eq!(mailbox.receive().unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_senders_all_delivered() {
        let mailbox = std::sync::Arc::new(Mailbox::<u64>::unbounded());

        let tasks: Vec<_> = (0..8u64)
            .map(|t| {
                let mailbox = mailbox.clone();
                tokio::spawn(async move {
                    for i in 0..100 {
                        mailbox.send(t * 1000 + i).await.unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(mailbox.len(), 800);
    }
}
