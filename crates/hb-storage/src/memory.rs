//! Process-local cache store.

use crate::CacheStore;
use crate::generation::GenerationSet;
use async_trait::async_trait;
use hb_core::WorkerResult;
use hb_net::RequestKey;
use hb_net::Response;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    state: RwLock<GenerationSet>,
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, generation: &str) -> WorkerResult<()> {
        self.state.write().await.open(generation);
        Ok(())
    }

    async fn names(&self) -> WorkerResult<Vec<String>> {
        Ok(self.state.read().await.names())
    }

    async fn delete(&self, generation: &str) -> WorkerResult<bool> {
        Ok(self.state.write().await.remove(generation))
    }

    async fn put(
        &self,
        generation: &str,
        key: RequestKey,
        response: Response,
    ) -> WorkerResult<()> {
        self.state.write().await.open(generation).insert(key, response);
        Ok(())
    }

    async fn put_all(
        &self,
        generation: &str,
        entries: Vec<(RequestKey, Response)>,
    ) -> WorkerResult<()> {
        let mut state = self.state.write().await;
        let target = state.open(generation);
        for (key, response) in entries {
            target.insert(key, response);
        }
        Ok(())
    }

    async fn get(&self, generation: &str, key: &RequestKey) -> WorkerResult<Option<Response>> {
        let state = self.state.read().await;
        Ok(state
            .get(generation)
            .and_then(|found| found.get(key))
            .cloned())
    }

    async fn find(&self, key: &RequestKey) -> WorkerResult<Option<Response>> {
        Ok(self.state.read().await.find(key).cloned())
    }

    async fn keys(&self, generation: &str) -> WorkerResult<Vec<RequestKey>> {
        let state = self.state.read().await;
        Ok(state
            .get(generation)
            .map(|found| found.keys())
            .unwrap_or_default())
    }

    async fn remove(&self, generation: &str, key: &RequestKey) -> WorkerResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .get_mut(generation)
            .is_some_and(|found| found.remove(key)))
    }
}
