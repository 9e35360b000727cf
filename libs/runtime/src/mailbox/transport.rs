//! Mailbox transports.

use std::marker::PhantomData;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::MailboxQueue;
use crate::codec::MessageSerializer;
use crate::error::MailboxError;

// =============================================================================
// Unbounded channel
// =============================================================================

/// In-process unbounded channel; `send` never waits.
pub struct ChannelQueue<M> {
    tx: mpsc::UnboundedSender<M>,
    rx: Mutex<mpsc::UnboundedReceiver<M>>,
}

impl<M> ChannelQueue<M> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

impl<M> Default for ChannelQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Send + 'static> MailboxQueue<M> for ChannelQueue<M> {
    async fn send(&self, message: M) -> Result<(), MailboxError> {
        self.tx.send(message).map_err(|_| MailboxError::Closed)
    }

    fn receive(&self) -> Result<Option<M>, MailboxError> {
        let mut rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        match rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(MailboxError::Closed),
        }
    }

    fn has_messages(&self) -> bool {
        !self.rx.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn len(&self) -> usize {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// =============================================================================
// Bounded channel
// =============================================================================

/// In-process bounded channel; `send` waits for space.
pub struct BoundedQueue<M> {
    tx: mpsc::Sender<M>,
    rx: Mutex<mpsc::Receiver<M>>,
}

impl<M> BoundedQueue<M> {
    /// `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl<M: Send + 'static> MailboxQueue<M> for BoundedQueue<M> {
    async fn send(&self, message: M) -> Result<(), MailboxError> {
        self.tx.send(message).await.map_err(|_| MailboxError::Closed)
    }

    fn receive(&self) -> Result<Option<M>, MailboxError> {
        let mut rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        match rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(MailboxError::Closed),
        }
    }

    fn has_messages(&self) -> bool {
        !self.rx.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn len(&self) -> usize {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// =============================================================================
// Serialized
// =============================================================================

/// Encodes messages on send and decodes them on receive, over any byte
/// transport.
pub struct SerializedQueue<M, C> {
    bytes: Box<dyn MailboxQueue<Vec<u8>>>,
    serializer: C,
    _message: PhantomData<fn() -> M>,
}

impl<M, C: MessageSerializer> SerializedQueue<M, C> {
    pub fn new(bytes: impl MailboxQueue<Vec<u8>> + 'static, serializer: C) -> Self {
        Self {
            bytes: Box::new(bytes),
            serializer,
            _message: PhantomData,
        }
    }
}

#[async_trait]
impl<M, C> MailboxQueue<M> for SerializedQueue<M, C>
where
    M: Serialize + DeserializeOwned + Send + 'static,
    C: MessageSerializer,
{
    async fn send(&self, message: M) -> Result<(), MailboxError> {
        let encoded = self
            .serializer
            .serialize(&message)
            .map_err(MailboxError::Encode)?;
        self.bytes.send(encoded).await
    }

    fn receive(&self) -> Result<Option<M>, MailboxError> {
        match self.bytes.receive()? {
            None => Ok(None),
            Some(encoded) => self
                .serializer
                .deserialize(&encoded)
                .map(Some)
                .map_err(MailboxError::Decode),
        }
    }

    fn has_messages(&self) -> bool {
        self.bytes.has_messages()
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonSerializer;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bounded_send_waits_when_full() {
        let queue = BoundedQueue::new(1);
        queue.send(1u8).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), queue.send(2)).await;
        assert!(blocked.is_err(), "send should wait while the queue is full");

        assert_eq!(queue.receive().unwrap(), Some(1));
        queue.send(3).await.unwrap();
        assert_eq!(queue.receive().unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_serialized_decode_failure_propagates() {
        let bytes = ChannelQueue::new();
        bytes.send(b"{not json".to_vec()).await.unwrap();
        let queue: SerializedQueue<String, _> = SerializedQueue::new(bytes, JsonSerializer);

        assert!(queue.has_messages());
        let err = queue.receive().unwrap_err();
        assert!(matches!(err, MailboxError::Decode(_)));
        assert!(!queue.has_messages(), "the bad payload is consumed, not retried");
    }

    #[tokio::test]
    async fn test_serialized_rejects_mismatched_payload_type() {
        let bytes = ChannelQueue::new();
        bytes.send(b"42".to_vec()).await.unwrap();
        let queue: SerializedQueue<Vec<String>, _> = SerializedQueue::new(bytes, JsonSerializer);

        assert!(matches!(queue.receive(), Err(MailboxError::Decode(_))));
    }
}
