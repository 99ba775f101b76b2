//! Per-request strategy selection.

use crate::config::WorkerConfig;
use hb_core::WorkerResult;
use hb_net::Method;
use hb_net::Request;
use hb_net::RequestUrl;
use std::collections::HashSet;

/// Which caching strategy a request gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Listed in the manifest: cache-first.
    StaticListed,
    /// Served by a known CDN origin: network-first.
    DynamicPattern,
    /// Everything else: stale-while-revalidate.
    Other,
}

/// Stateless classifier built once from the config.
#[derive(Debug, Clone)]
pub struct Classifier {
    static_paths: HashSet<String>,
    static_urls: HashSet<String>,
    dynamic_origins: Vec<String>,
}

impl Classifier {
    pub fn new(config: &WorkerConfig) -> WorkerResult<Self> {
        let mut static_paths = HashSet::new();
        let mut static_urls = HashSet::new();
        for entry in &config.manifest {
            // Absolute entries compare against the full URL, the rest
            // against the path alone.
            match RequestUrl::parse(entry) {
                Ok(url) => {
                    static_urls.insert(url.as_str().to_owned());
                }
                Err(_) => {
                    static_paths.insert(entry.clone());
                }
            }
        }

        let dynamic_origins = config
            .dynamic_origins
            .iter()
            .map(|raw| RequestUrl::parse(raw).map(|url| url.origin()))
            .collect::<WorkerResult<Vec<_>>>()?;

        Ok(Self {
            static_paths,
            static_urls,
            dynamic_origins,
        })
    }

    /// GET over http(s) only; anything else goes straight to the network.
    pub fn should_intercept(&self, request: &Request) -> bool {
        request.method == Method::Get && request.url.is_network()
    }

    pub fn classify(&self, request: &Request) -> Classification {
        let url = &request.url;
        if self.static_paths.contains(url.path()) || self.static_urls.contains(url.as_str()) {
            return Classification::StaticListed;
        }

        let origin = url.origin();
        if self.dynamic_origins.iter().any(|known| *known == origin) {
            return Classification::DynamicPattern;
        }

        Classification::Other
    }
}
