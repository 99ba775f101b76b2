//! Cache-first, network-first and stale-while-revalidate.

use crate::bound::enforce_limit;
use crate::classify::Classification;
use crate::registry::CacheRegistry;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::Fetcher;
use hb_net::Request;
use hb_net::Response;
use hb_net::fetch_with_timeout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

/// Response produced by a strategy, plus the background refresh it started.
#[derive(Debug)]
pub struct Served {
    pub response: Response,
    pub revalidation: Option<Revalidation>,
}

impl Served {
    fn direct(response: Response) -> Self {
        Self {
            response,
            revalidation: None,
        }
    }
}

/// How a background revalidation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevalidationOutcome {
    Stored,
    /// Fetched fine but the status was not 200.
    Skipped { status: u16 },
    NetworkFailed(WorkerError),
    StoreFailed(WorkerError),
    /// The task panicked or was cancelled.
    Aborted(WorkerError),
}

/// Detached stale-while-revalidate refresh. Dropping the handle leaves the
/// task running.
#[derive(Debug)]
pub struct Revalidation {
    task: JoinHandle<RevalidationOutcome>,
}

impl Revalidation {
    pub async fn finished(self) -> RevalidationOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(error) => RevalidationOutcome::Aborted(WorkerError::new(
                "worker.revalidation.join_failed",
                error.to_string(),
            )),
        }
    }
}

/// Runs the three caching strategies against one registry and fetcher.
#[derive(Clone)]
pub struct StrategyExecutor {
    registry: CacheRegistry,
    fetcher: Arc<dyn Fetcher>,
    fetch_timeout: Option<Duration>,
    max_dynamic_entries: usize,
    bound_background_stores: bool,
}

impl StrategyExecutor {
    pub fn new(
        registry: CacheRegistry,
        fetcher: Arc<dyn Fetcher>,
        fetch_timeout: Option<Duration>,
        max_dynamic_entries: usize,
    ) -> Self {
        Self {
            registry,
            fetcher,
            fetch_timeout,
            max_dynamic_entries,
            bound_background_stores: false,
        }
    }

    pub fn with_bounded_background_stores(mut self, enabled: bool) -> Self {
        self.bound_background_stores = enabled;
        self
    }

    pub async fn execute(
        &self,
        classification: Classification,
        request: &Request,
    ) -> WorkerResult<Served> {
        match classification {
            Classification::StaticListed => self.cache_first(request).await.map(Served::direct),
            Classification::DynamicPattern => {
                self.network_first(request).await.map(Served::direct)
            }
            Classification::Other => self.stale_while_revalidate(request).await,
        }
    }

    /// Serves from any generation when possible; the network is only asked on
    /// a miss and a 200 answer goes into the static generation.
    pub async fn cache_first(&self, request: &Request) -> WorkerResult<Response> {
        if let Some(hit) = self.cached(request).await {
            debug!(url = request.url.as_str(), "cache-first hit");
            return Ok(hit);
        }

        let response = self.fetch(request).await?;
        if response.is_ok() {
            let stored = match self.registry.open_static().await {
                Ok(handle) => {
                    self.registry
                        .put(&handle, request.key(), response.clone())
                        .await
                }
                Err(error) => Err(error),
            };
            if let Err(error) = stored {
                warn!(url = request.url.as_str(), %error, "failed to store static response");
            }
        }
        Ok(response)
    }

    /// Prefers the network and keeps the dynamic generation bounded; falls
    /// back to the cache only on transport failure.
    pub async fn network_first(&self, request: &Request) -> WorkerResult<Response> {
        match self.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    let stored = self
                        .store_dynamic(request, response.clone(), true)
                        .await;
                    if let Err(error) = stored {
                        warn!(url = request.url.as_str(), %error, "failed to store dynamic response");
                    }
                }
                Ok(response)
            }
            Err(error) => match self.cached(request).await {
                Some(hit) => {
                    debug!(url = request.url.as_str(), %error, "network-first served from cache");
                    Ok(hit)
                }
                None => Err(error),
            },
        }
    }

    /// Answers from the cache when possible while a background task refreshes
    /// the dynamic generation; without a cached copy the page waits for that
    /// task's network response, not for its store.
    pub async fn stale_while_revalidate(&self, request: &Request) -> WorkerResult<Served> {
        let cached = self.cached(request).await;

        let (sender, receiver) = oneshot::channel();
        let task = tokio::spawn(self.clone().revalidate(request.clone(), sender));
        let revalidation = Revalidation { task };

        if let Some(response) = cached {
            return Ok(Served {
                response,
                revalidation: Some(revalidation),
            });
        }

        let fetched = receiver.await.unwrap_or_else(|_| {
            Err(WorkerError::new(
                "worker.revalidation.aborted",
                format!(
                    "revalidation of `{}` ended without a response",
                    request.url.as_str()
                ),
            ))
        });
        let response = fetched?;
        Ok(Served {
            response,
            revalidation: Some(revalidation),
        })
    }

    async fn revalidate(
        self,
        request: Request,
        sender: oneshot::Sender<WorkerResult<Response>>,
    ) -> RevalidationOutcome {
        let response = match self.fetch(&request).await {
            Ok(response) => response,
            Err(error) => {
                debug!(url = request.url.as_str(), %error, "revalidation fetch failed");
                // The receiver is gone whenever a cached copy was served.
                let _ = sender.send(Err(error.clone()));
                return RevalidationOutcome::NetworkFailed(error);
            }
        };

        let status = response.status.as_u16();
        let copy = response.is_ok().then(|| response.clone());
        let _ = sender.send(Ok(response));

        let Some(copy) = copy else {
            return RevalidationOutcome::Skipped { status };
        };

        match self
            .store_dynamic(&request, copy, self.bound_background_stores)
            .await
        {
            Ok(()) => RevalidationOutcome::Stored,
            Err(error) => {
                warn!(url = request.url.as_str(), %error, "failed to store revalidated response");
                RevalidationOutcome::StoreFailed(error)
            }
        }
    }

    async fn store_dynamic(
        &self,
        request: &Request,
        response: Response,
        bound: bool,
    ) -> WorkerResult<()> {
        let handle = self.registry.open_dynamic().await?;
        self.registry.put(&handle, request.key(), response).await?;
        if bound {
            enforce_limit(&self.registry, &handle, self.max_dynamic_entries).await?;
        }
        Ok(())
    }

    async fn fetch(&self, request: &Request) -> WorkerResult<Response> {
        fetch_with_timeout(self.fetcher.as_ref(), request, self.fetch_timeout).await
    }

    /// Cache read failures count as misses.
    async fn cached(&self, request: &Request) -> Option<Response> {
        match self.registry.lookup(&request.key()).await {
            Ok(found) => found,
            Err(error) => {
                warn!(url = request.url.as_str(), %error, "cache lookup failed");
                None
            }
        }
    }
}
