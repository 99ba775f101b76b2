//! Last-resort responses once both network and strategy have failed.

use crate::registry::CacheRegistry;
use hb_net::Header;
use hb_net::Request;
use hb_net::RequestKey;
use hb_net::Response;
use hb_net::StatusCode;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

#[derive(Debug, Serialize)]
struct OfflineBody<'a> {
    error: &'static str,
    message: &'a str,
}

/// Resolves a response for a failed request. Never fails.
#[derive(Clone)]
pub struct OfflineFallback {
    registry: CacheRegistry,
    offline_document: RequestKey,
    message: String,
}

impl OfflineFallback {
    /// `offline_document` is the already-resolved URL of the cached root
    /// document served to failed navigations.
    pub fn new(registry: CacheRegistry, offline_document: RequestKey, message: String) -> Self {
        Self {
            registry,
            offline_document,
            message,
        }
    }

    pub async fn resolve(&self, request: &Request) -> Response {
        if request.is_navigation() {
            if let Some(document) = self.lookup(&self.offline_document).await {
                debug!(url = request.url.as_str(), "serving offline document");
                return document;
            }
        }

        if let Some(cached) = self.lookup(&request.key()).await {
            return cached;
        }

        debug!(url = request.url.as_str(), "no cached fallback");
        self.unavailable()
    }

    fn unavailable(&self) -> Response {
        let body = OfflineBody {
            error: "Offline",
            message: &self.message,
        };
        let body = serde_json::to_vec(&body)
            .unwrap_or_else(|_| br#"{"error":"Offline"}"#.to_vec());

        let mut response = Response::new(StatusCode::SERVICE_UNAVAILABLE, body);
        response.headers.push(Header {
            name: "Content-Type".to_owned(),
            value: "application/json".to_owned(),
        });
        response
    }

    async fn lookup(&self, key: &RequestKey) -> Option<Response> {
        match self.registry.lookup(key).await {
            Ok(found) => found,
            Err(error) => {
                warn!(url = %key.url, %error, "cache lookup failed during fallback");
                None
            }
        }
    }
}
