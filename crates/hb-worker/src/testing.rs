//! Scripted collaborators shared by the unit tests.

use async_trait::async_trait;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::Fetcher;
use hb_net::Request;
use hb_net::RequestUrl;
use hb_net::Response;
use hb_net::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::Mutex;

/// Fetcher answering from a fixed route table. Unknown URLs get a 404;
/// while offline every fetch fails at the transport level.
#[derive(Debug, Default)]
pub(crate) struct ScriptedFetcher {
    routes: HashMap<String, Response>,
    offline: AtomicBool,
    delay: Option<Duration>,
    calls: Mutex<Vec<Request>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(mut self, url: &str, response: Response) -> Self {
        self.routes.insert(url.to_owned(), response);
        self
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub(crate) async fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|called| called.url.as_str() == url)
            .count()
    }

    pub(crate) async fn last_request(&self) -> Option<Request> {
        self.calls.lock().await.last().cloned()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> WorkerResult<Response> {
        self.calls.lock().await.push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(WorkerError::new(
                "net.fetch.failed",
                format!("offline: {}", request.url.as_str()),
            ));
        }

        match self.routes.get(request.url.as_str()) {
            Some(response) => Ok(response.clone()),
            None => match StatusCode::new(404) {
                Ok(status) => Ok(Response::new(status, Vec::new())),
                Err(error) => Err(error),
            },
        }
    }
}

pub(crate) fn request(raw: &str) -> Request {
    match Request::get_str(raw) {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    }
}

pub(crate) fn url(raw: &str) -> RequestUrl {
    match RequestUrl::parse(raw) {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    }
}
