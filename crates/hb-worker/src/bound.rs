//! Entry-count bound for the dynamic generation.

use crate::registry::CacheRegistry;
use crate::registry::GenerationHandle;
use hb_core::WorkerResult;
use tracing::debug;

/// Evicts the oldest entries until at most `max_entries` remain. Returns how
/// many were evicted.
///
/// Reads keys then deletes them one by one, so a concurrent store can leave
/// the generation briefly over the limit; the next bounded store trims it.
pub async fn enforce_limit(
    registry: &CacheRegistry,
    handle: &GenerationHandle,
    max_entries: usize,
) -> WorkerResult<usize> {
    let keys = registry.keys(handle).await?;
    if keys.len() <= max_entries {
        return Ok(0);
    }

    let excess = keys.len() - max_entries;
    let mut evicted = 0;
    for key in keys.into_iter().take(excess) {
        if registry.delete_entry(handle, &key).await? {
            evicted += 1;
        }
    }

    debug!(
        generation = handle.name(),
        evicted, max_entries, "trimmed cache generation"
    );
    Ok(evicted)
}

#[cfg(test)]
mod tests {
    use super::enforce_limit;
    use crate::registry::CacheRegistry;
    use hb_net::RequestKey;
    use hb_net::RequestUrl;
    use hb_net::Response;
    use hb_storage::MemoryCacheStore;
    use std::sync::Arc;

    fn key(index: usize) -> RequestKey {
        match RequestUrl::parse(&format!("https://fonts.gstatic.com/s/{index}.woff2")) {
            Ok(url) => RequestKey::get(&url),
            Err(error) => panic!("{error}"),
        }
    }

    #[tokio::test]
    async fn one_over_the_limit_evicts_the_oldest() {
        let registry = CacheRegistry::new(
            Arc::new(MemoryCacheStore::default()),
            "v1-static".to_owned(),
            "v1-dynamic".to_owned(),
        );
        let handle = match registry.open_dynamic().await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        for index in 0..51 {
            let stored = registry
                .put(&handle, key(index), Response::ok(format!("font {index}")))
                .await;
            assert!(stored.is_ok());
        }

        assert_eq!(enforce_limit(&registry, &handle, 50).await, Ok(1));

        let keys = match registry.keys(&handle).await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(keys.len(), 50);
        assert_eq!(keys.first(), Some(&key(1)));
        assert_eq!(keys.last(), Some(&key(50)));
    }

    #[tokio::test]
    async fn under_the_limit_is_untouched() {
        let registry = CacheRegistry::new(
            Arc::new(MemoryCacheStore::default()),
            "v1-static".to_owned(),
            "v1-dynamic".to_owned(),
        );
        let handle = match registry.open_dynamic().await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(registry.put(&handle, key(0), Response::ok("a")).await.is_ok());

        assert_eq!(enforce_limit(&registry, &handle, 50).await, Ok(0));
        assert_eq!(registry.total_entries().await, Ok(1));
    }

    #[tokio::test]
    async fn overwrite_keeps_original_position() {
        let registry = CacheRegistry::new(
            Arc::new(MemoryCacheStore::default()),
            "v1-static".to_owned(),
            "v1-dynamic".to_owned(),
        );
        let handle = match registry.open_dynamic().await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        for index in 0..3 {
            assert!(registry.put(&handle, key(index), Response::ok("v1")).await.is_ok());
        }
        assert!(registry.put(&handle, key(0), Response::ok("v2")).await.is_ok());

        assert_eq!(enforce_limit(&registry, &handle, 2).await, Ok(1));
        let keys = match registry.keys(&handle).await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(keys, vec![key(1), key(2)]);
    }
}
