//! Cache generation storage with in-memory and on-disk backends, plus the
//! pending form-submission store used by background sync.

pub mod codec;
pub mod disk;
pub mod generation;
pub mod memory;
pub mod pending;

use async_trait::async_trait;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::RequestKey;
use hb_net::Response;
use std::path::PathBuf;
use std::sync::Arc;

pub use disk::DiskCacheStore;
pub use generation::Generation;
pub use generation::GenerationSet;
pub use memory::MemoryCacheStore;
pub use pending::FilePendingStore;
pub use pending::MemoryPendingStore;
pub use pending::PendingStore;
pub use pending::PendingSubmission;

/// Backend holding named cache generations.
///
/// Every method is atomic per call; no transaction spans two calls. A
/// generation that does not exist reads as empty.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Creates the generation if absent. Idempotent.
    async fn open(&self, generation: &str) -> WorkerResult<()>;

    /// Generation names in creation order.
    async fn names(&self) -> WorkerResult<Vec<String>>;

    /// Removes a generation with all of its entries. Returns whether it existed.
    async fn delete(&self, generation: &str) -> WorkerResult<bool>;

    /// Inserts or overwrites one entry, creating the generation if needed.
    async fn put(&self, generation: &str, key: RequestKey, response: Response)
    -> WorkerResult<()>;

    /// Inserts a batch in order; either every entry lands or none does.
    async fn put_all(
        &self,
        generation: &str,
        entries: Vec<(RequestKey, Response)>,
    ) -> WorkerResult<()>;

    async fn get(&self, generation: &str, key: &RequestKey) -> WorkerResult<Option<Response>>;

    /// First match across all generations, in creation order.
    async fn find(&self, key: &RequestKey) -> WorkerResult<Option<Response>>;

    /// Keys in insertion order.
    async fn keys(&self, generation: &str) -> WorkerResult<Vec<RequestKey>>;

    /// Removes one entry. Returns whether it existed.
    async fn remove(&self, generation: &str, key: &RequestKey) -> WorkerResult<bool>;
}

/// Storage backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageConfig {
    pub persistent_root: Option<PathBuf>,
    /// Keep everything in memory; nothing survives the process.
    pub ephemeral_mode: bool,
}

/// Builds the cache store described by `config`.
pub fn open_cache_store(config: &StorageConfig) -> WorkerResult<Arc<dyn CacheStore>> {
    if config.ephemeral_mode {
        return Ok(Arc::new(MemoryCacheStore::default()));
    }

    let root = config.persistent_root.as_ref().ok_or_else(|| {
        WorkerError::new(
            "storage.persistence_unconfigured",
            "persistent storage root is not configured",
        )
    })?;

    Ok(Arc::new(DiskCacheStore::load(root.clone())?))
}
