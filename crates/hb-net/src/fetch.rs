//! Network boundary: the `Fetcher` trait and its `ureq` implementation.

use crate::http::Header;
use crate::http::Request;
use crate::http::Response;
use crate::http::StatusCode;
use async_trait::async_trait;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

const DEFAULT_MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;
const DEFAULT_USER_AGENT: &str = concat!("harbor-worker/", env!("CARGO_PKG_VERSION"));

/// Anything that can turn a request into a fully received response.
///
/// Non-2xx responses are successful fetches; only transport-level failures
/// (DNS, connect, reset, timeout) surface as errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> WorkerResult<Response>;
}

/// Runs `fetcher` with an optional deadline. `None` waits indefinitely.
pub async fn fetch_with_timeout(
    fetcher: &dyn Fetcher,
    request: &Request,
    timeout: Option<Duration>,
) -> WorkerResult<Response> {
    let Some(limit) = timeout else {
        return fetcher.fetch(request).await;
    };

    match tokio::time::timeout(limit, fetcher.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(WorkerError::new(
            "net.fetch.timeout",
            format!(
                "fetch of `{}` did not complete within {}ms",
                request.url.as_str(),
                limit.as_millis()
            ),
        )),
    }
}

/// Transport limits for [`HttpFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFetcherConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: String,
    /// Larger bodies fail the fetch rather than being cut short.
    pub max_body_bytes: u64,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Blocking `ureq` agent driven from the blocking thread pool.
#[derive(Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
    max_body_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.read_timeout)
            .user_agent(&config.user_agent)
            .build();
        Self {
            agent,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(HttpFetcherConfig::default())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> WorkerResult<Response> {
        let agent = self.agent.clone();
        let max_body_bytes = self.max_body_bytes;
        let request = request.clone();
        let url = request.url.as_str().to_owned();

        let joined =
            tokio::task::spawn_blocking(move || blocking_fetch(&agent, &request, max_body_bytes))
                .await;
        match joined {
            Ok(result) => result,
            Err(error) => Err(WorkerError::new(
                "net.fetch.task_failed",
                format!("fetch task for `{url}` did not complete: {error}"),
            )),
        }
    }
}

fn blocking_fetch(
    agent: &ureq::Agent,
    request: &Request,
    max_body_bytes: u64,
) -> WorkerResult<Response> {
    let url = request.url.as_str();
    let mut outgoing = agent.request(request.method.as_str(), url);
    for header in &request.headers {
        outgoing = outgoing.set(&header.name, &header.value);
    }

    let sent = if request.body.is_empty() {
        outgoing.call()
    } else {
        outgoing.send_bytes(&request.body)
    };
    let incoming = match sent {
        Ok(response) => response,
        // ureq reports 4xx/5xx as errors; for the cache layer they are responses.
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(error)) => {
            return Err(WorkerError::new(
                "net.fetch.failed",
                format!("network request to `{url}` failed: {error}"),
            ));
        }
    };

    let status = StatusCode::new(incoming.status())?;
    let status_text = incoming.status_text().to_owned();
    let mut headers = Vec::new();
    for name in incoming.headers_names() {
        if let Some(value) = incoming.header(&name) {
            // Servers occasionally send values we refuse to re-emit; skip those.
            if let Ok(header) = Header::new(&name, value) {
                headers.push(header);
            }
        }
    }

    // One byte past the limit tells a full body from an oversized one.
    let mut body = Vec::new();
    incoming
        .into_reader()
        .take(max_body_bytes.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|error| {
            WorkerError::new(
                "net.fetch.read_body_failed",
                format!("failed to read response body from `{url}`: {error}"),
            )
        })?;
    if body.len() as u64 > max_body_bytes {
        return Err(WorkerError::new(
            "net.fetch.body_too_large",
            format!("response body from `{url}` exceeds {max_body_bytes} bytes"),
        ));
    }

    debug!(
        url,
        status = status.as_u16(),
        bytes = body.len(),
        "network response received"
    );

    Ok(Response {
        status,
        status_text,
        headers,
        body,
    })
}
