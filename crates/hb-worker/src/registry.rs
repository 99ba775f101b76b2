//! Named cache generations over a [`CacheStore`].

use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::RequestKey;
use hb_net::Response;
use hb_storage::CacheStore;
use std::sync::Arc;
use tracing::debug;
use tracing::info;

/// Opened generation. Holding one does not keep the generation alive; a
/// concurrent delete leaves later reads empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationHandle {
    name: String,
}

impl GenerationHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Cache registry for one worker version: knows which static and dynamic
/// generation names are current and treats every other name as stale.
#[derive(Clone)]
pub struct CacheRegistry {
    store: Arc<dyn CacheStore>,
    static_name: String,
    dynamic_name: String,
}

impl CacheRegistry {
    pub fn new(store: Arc<dyn CacheStore>, static_name: String, dynamic_name: String) -> Self {
        Self {
            store,
            static_name,
            dynamic_name,
        }
    }

    pub fn static_name(&self) -> &str {
        &self.static_name
    }

    pub fn dynamic_name(&self) -> &str {
        &self.dynamic_name
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name
    }

    pub async fn open(&self, name: &str) -> WorkerResult<GenerationHandle> {
        self.store.open(name).await?;
        Ok(GenerationHandle {
            name: name.to_owned(),
        })
    }

    pub async fn open_static(&self) -> WorkerResult<GenerationHandle> {
        self.open(&self.static_name).await
    }

    pub async fn open_dynamic(&self) -> WorkerResult<GenerationHandle> {
        self.open(&self.dynamic_name).await
    }

    /// Stores `response` under `key`. Only 2xx responses are accepted.
    pub async fn put(
        &self,
        handle: &GenerationHandle,
        key: RequestKey,
        response: Response,
    ) -> WorkerResult<()> {
        ensure_storable(&key, &response)?;
        debug!(generation = %handle.name, url = %key.url, "storing cache entry");
        self.store.put(&handle.name, key, response).await
    }

    /// Stores every entry or none of them.
    pub async fn put_all(
        &self,
        handle: &GenerationHandle,
        entries: Vec<(RequestKey, Response)>,
    ) -> WorkerResult<()> {
        for (key, response) in &entries {
            ensure_storable(key, response)?;
        }
        self.store.put_all(&handle.name, entries).await
    }

    /// First match across every generation, oldest generation first.
    pub async fn lookup(&self, key: &RequestKey) -> WorkerResult<Option<Response>> {
        self.store.find(key).await
    }

    pub async fn lookup_in(
        &self,
        handle: &GenerationHandle,
        key: &RequestKey,
    ) -> WorkerResult<Option<Response>> {
        self.store.get(&handle.name, key).await
    }

    /// Returns `false` when the generation did not exist.
    pub async fn delete(&self, name: &str) -> WorkerResult<bool> {
        let deleted = self.store.delete(name).await?;
        if deleted {
            info!(generation = name, "deleted cache generation");
        }
        Ok(deleted)
    }

    pub async fn keys(&self, handle: &GenerationHandle) -> WorkerResult<Vec<RequestKey>> {
        self.store.keys(&handle.name).await
    }

    pub async fn delete_entry(
        &self,
        handle: &GenerationHandle,
        key: &RequestKey,
    ) -> WorkerResult<bool> {
        self.store.remove(&handle.name, key).await
    }

    pub async fn generation_names(&self) -> WorkerResult<Vec<String>> {
        self.store.names().await
    }

    /// Entry count summed over every generation, stale ones included.
    pub async fn total_entries(&self) -> WorkerResult<usize> {
        let mut total = 0;
        for name in self.store.names().await? {
            total += self.store.keys(&name).await?.len();
        }
        Ok(total)
    }

    /// Deletes every generation. Returns how many were removed.
    pub async fn clear_all(&self) -> WorkerResult<usize> {
        let mut removed = 0;
        for name in self.store.names().await? {
            if self.delete(&name).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn ensure_storable(key: &RequestKey, response: &Response) -> WorkerResult<()> {
    if response.status.is_success() {
        return Ok(());
    }

    Err(WorkerError::new(
        "cache.put.unsuccessful_status",
        format!(
            "refusing to cache `{}` with status {}",
            key.url,
            response.status.as_u16()
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::CacheRegistry;
    use hb_net::RequestKey;
    use hb_net::RequestUrl;
    use hb_net::Response;
    use hb_net::StatusCode;
    use hb_storage::MemoryCacheStore;
    use std::sync::Arc;

    fn registry() -> CacheRegistry {
        CacheRegistry::new(
            Arc::new(MemoryCacheStore::default()),
            "site-v1-static".to_owned(),
            "site-v1-dynamic".to_owned(),
        )
    }

    fn key(raw: &str) -> RequestKey {
        match RequestUrl::parse(raw) {
            Ok(url) => RequestKey::get(&url),
            Err(error) => panic!("{error}"),
        }
    }

    #[tokio::test]
    async fn stored_response_reads_back_identically() {
        let registry = registry();
        let handle = match registry.open_static().await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let response = match Response::ok(vec![0_u8, 159, 146, 150])
            .with_header("Content-Type", "image/webp")
        {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };

        let stored = registry
            .put(&handle, key("https://landing.test/img/a.webp"), response.clone())
            .await;
        assert!(stored.is_ok());

        let found = registry.lookup(&key("https://landing.test/img/a.webp")).await;
        assert_eq!(found, Ok(Some(response)));
    }

    #[tokio::test]
    async fn unsuccessful_status_is_never_stored() {
        let registry = registry();
        let handle = match registry.open_dynamic().await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let missing = match StatusCode::new(404) {
            Ok(status) => Response::new(status, Vec::new()),
            Err(error) => panic!("{error}"),
        };

        let stored = registry
            .put(&handle, key("https://landing.test/gone"), missing)
            .await;
        assert!(stored.is_err());
        if let Err(error) = stored {
            assert_eq!(error.code, "cache.put.unsuccessful_status");
        }
        assert_eq!(registry.keys(&handle).await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn put_all_rejects_the_whole_batch() {
        let registry = registry();
        let handle = match registry.open_static().await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let failed = Response::new(StatusCode::SERVICE_UNAVAILABLE, Vec::new());

        let stored = registry
            .put_all(
                &handle,
                vec![
                    (key("https://landing.test/a.css"), Response::ok("a")),
                    (key("https://landing.test/b.css"), failed),
                ],
            )
            .await;
        assert!(stored.is_err());
        assert_eq!(registry.total_entries().await, Ok(0));
    }

    #[tokio::test]
    async fn deleting_absent_generation_returns_false() {
        let registry = registry();
        assert_eq!(registry.delete("never-created").await, Ok(false));
    }

    #[tokio::test]
    async fn totals_and_clear_span_every_generation() {
        let registry = registry();
        let old = match registry.open("site-v0-static").await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let current = match registry.open_static().await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(registry
            .put(&old, key("https://landing.test/a"), Response::ok("a"))
            .await
            .is_ok());
        assert!(registry
            .put(&current, key("https://landing.test/b"), Response::ok("b"))
            .await
            .is_ok());
        assert!(registry
            .put(&current, key("https://landing.test/c"), Response::ok("c"))
            .await
            .is_ok());

        assert_eq!(registry.total_entries().await, Ok(3));
        assert!(registry.is_current("site-v1-static"));
        assert!(!registry.is_current("site-v0-static"));

        assert_eq!(registry.clear_all().await, Ok(2));
        assert_eq!(registry.generation_names().await, Ok(Vec::new()));
        assert_eq!(registry.total_entries().await, Ok(0));
    }

    #[tokio::test]
    async fn delete_entry_reports_presence() {
        let registry = registry();
        let handle = match registry.open_dynamic().await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(registry
            .put(&handle, key("https://unpkg.com/x.js"), Response::ok("x"))
            .await
            .is_ok());

        assert_eq!(
            registry
                .delete_entry(&handle, &key("https://unpkg.com/x.js"))
                .await,
            Ok(true)
        );
        assert_eq!(
            registry
                .delete_entry(&handle, &key("https://unpkg.com/x.js"))
                .await,
            Ok(false)
        );
    }
}
