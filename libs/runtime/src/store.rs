//! Actor state persistence.
//!
//! Backends store opaque bytes keyed by actor id; [`StateStore`] adds the
//! typed `save`/`load` contract on top with the configured serializer.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ember_id::ActorId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::codec::{JsonSerializer, MessageSerializer};
use crate::config::StoreKind;
use crate::error::StoreError;

/// Byte-level persistence backend.
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
    async fn persist(&self, id: &ActorId, bytes: Vec<u8>) -> Result<(), StoreError>;

    async fn retrieve(&self, id: &ActorId) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Builds the backend selected in configuration.
pub fn backend_for(kind: &StoreKind) -> Option<Arc<dyn StoreBackend>> {
    match kind {
        StoreKind::None => None,
        StoreKind::Memory => Some(Arc::new(InMemoryStore::new())),
        StoreKind::File { dir } => Some(Arc::new(FileStore::new(dir))),
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local store; contents are lost with the process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<ActorId, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn persist(&self, id: &ActorId, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.entries.write().await.insert(id.clone(), bytes);
        Ok(())
    }

    async fn retrieve(&self, id: &ActorId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().await.get(id).cloned())
    }
}

// =============================================================================
// File
// =============================================================================

/// One file per actor under a directory.
///
/// File names are the hex-encoded actor id, so any id maps to a safe path.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, id: &ActorId) -> PathBuf {
        self.dir
            .join(format!("{}.state", hex::encode(id.as_str().as_bytes())))
    }
}

#[async_trait]
impl StoreBackend for FileStore {
    async fn persist(&self, id: &ActorId, bytes: Vec<u8>) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so a reader never sees a torn file.
        let path = self.path_for(id);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn retrieve(&self, id: &ActorId) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Typed facade
// =============================================================================

/// Typed `save`/`load` over a backend.
pub struct StateStore<S> {
    backend: Arc<dyn StoreBackend>,
    serializer: JsonSerializer,
    _state: PhantomData<fn() -> S>,
}

impl<S> Clone for StateStore<S> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            serializer: self.serializer,
            _state: PhantomData,
        }
    }
}

impl<S> StateStore<S>
where
    S: Serialize + DeserializeOwned,
{
    pub fn new(backend: Arc<dyn StoreBackend>, serializer: JsonSerializer) -> Self {
        Self {
            backend,
            serializer,
            _state: PhantomData,
        }
    }

    pub async fn save(&self, id: &ActorId, state: &S) -> Result<(), StoreError> {
        let bytes = self.serializer.serialize(state)?;
        self.backend.persist(id, bytes).await
    }

    /// Stored state that no longer decodes as `S` is an error, not `None`.
    pub async fn load(&self, id: &ActorId) -> Result<Option<S>, StoreError> {
        let Some(bytes) = self.backend.retrieve(id).await? else {
            debug!(actor_id = %id, "No stored state");
            return Ok(None);
        };
        Ok(Some(self.serializer.deserialize(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    fn id(s: &str) -> ActorId {
        ActorId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_memory_save_load() {
        let backend = Arc::new(InMemoryStore::new());
        let store: StateStore<Vec<u32>> = StateStore::new(backend.clone(), JsonSerializer);

        assert_eq!(store.load(&id("a")).await.unwrap(), None);
        store.save(&id("a"), &vec![1, 2, 3]).await.unwrap();
        store.save(&id("a"), &vec![4]).await.unwrap();

        assert_eq!(store.load(&id("a")).await.unwrap(), Some(vec![4]));
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_load_with_wrong_type_fails() {
        let backend: Arc<dyn StoreBackend> = Arc::new(InMemoryStore::new());
        StateStore::<String>::new(backend.clone(), JsonSerializer)
            .save(&id("a"), &"text".to_string())
            .await
            .unwrap();

        let err = StateStore::<u64>::new(backend, JsonSerializer)
            .load(&id("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Codec(CodecError::Decode(_))));
    }

    #[tokio::test]
    async fn test_file_store_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let weird = id("../Counter/1");

        let first: StateStore<u64> =
            StateStore::new(Arc::new(FileStore::new(dir.path())), JsonSerializer);
        first.save(&weird, &41).await.unwrap();
        first.save(&weird, &42).await.unwrap();

        let second: StateStore<u64> =
            StateStore::new(Arc::new(FileStore::new(dir.path())), JsonSerializer);
        assert_eq!(second.load(&weird).await.unwrap(), Some(42));
        assert_eq!(second.load(&id("missing")).await.unwrap(), None);

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1, "no temp files left behind");
    }

    #[test]
    fn test_backend_for_none() {
        assert!(backend_for(&StoreKind::None).is_none());
        assert!(backend_for(&StoreKind::Memory).is_some());
    }
}
