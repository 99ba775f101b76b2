//! Immutable worker configuration.

use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::RequestUrl;
use serde::Deserialize;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CACHE_NAME: &str = "harbor-landing-v1.0.0";
pub const DEFAULT_MAX_DYNAMIC_ENTRIES: usize = 50;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

const DEFAULT_OFFLINE_MESSAGE: &str = "Você está offline. Verifique sua conexão com a internet.";

/// Everything the worker reads at construction time. Loaded once, never
/// mutated; a new version means a new `cache_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Version tag; generation names derive from it.
    pub cache_name: String,
    /// Site origin that relative manifest entries resolve against.
    pub origin: String,
    /// Resources pre-cached at install and served cache-first.
    pub manifest: Vec<String>,
    /// Origins (`scheme://host[:port]`) served network-first.
    pub dynamic_origins: Vec<String>,
    pub max_dynamic_entries: usize,
    /// `None` waits on the network indefinitely.
    pub fetch_timeout_ms: Option<u64>,
    pub offline_document: String,
    pub offline_message: String,
    /// Where background sync posts queued contact forms.
    pub contact_endpoint: String,
    pub skip_waiting_on_install: bool,
    /// Also bound the dynamic generation after stale-while-revalidate stores.
    pub bound_background_stores: bool,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: "/img/icon-192x192.png".to_owned(),
            badge: "/img/badge-72x72.png".to_owned(),
            vibrate: vec![100, 50, 100],
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_owned(),
            origin: "http://localhost:8080/".to_owned(),
            manifest: default_manifest(),
            dynamic_origins: vec![
                "https://fonts.googleapis.com".to_owned(),
                "https://fonts.gstatic.com".to_owned(),
                "https://unpkg.com".to_owned(),
            ],
            max_dynamic_entries: DEFAULT_MAX_DYNAMIC_ENTRIES,
            fetch_timeout_ms: Some(DEFAULT_FETCH_TIMEOUT_MS),
            offline_document: "/index.html".to_owned(),
            offline_message: DEFAULT_OFFLINE_MESSAGE.to_owned(),
            contact_endpoint: "/api/contact".to_owned(),
            skip_waiting_on_install: true,
            bound_background_stores: false,
            notifications: NotificationConfig::default(),
        }
    }
}

fn default_manifest() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/css/critical.css",
        "/css/main.css",
        "/js/main.js",
        "/img/portrait.webp",
        "/img/portrait.jpg",
        "/manifest.json",
        "https://fonts.googleapis.com/css2?family=Poppins:wght@300;400;500;600;700&family=Playfair+Display:wght@700&display=swap",
        "https://unpkg.com/aos@2.3.1/dist/aos.css",
        "https://unpkg.com/aos@2.3.1/dist/aos.js",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

impl WorkerConfig {
    /// Reads a JSON config file; absent fields keep their defaults.
    pub fn load(path: &Path) -> WorkerResult<Self> {
        let raw = fs::read_to_string(path).map_err(|error| {
            WorkerError::new(
                "config.read_failed",
                format!("failed to read config `{}`: {error}", path.display()),
            )
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> WorkerResult<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|error| {
            WorkerError::new("config.parse_failed", format!("invalid config: {error}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WorkerResult<()> {
        if self.cache_name.trim().is_empty() {
            return Err(WorkerError::new(
                "config.cache_name_empty",
                "cache_name must not be empty",
            ));
        }

        if self.max_dynamic_entries == 0 {
            return Err(WorkerError::new(
                "config.max_dynamic_entries_zero",
                "max_dynamic_entries must be at least 1",
            ));
        }

        if self.fetch_timeout_ms == Some(0) {
            return Err(WorkerError::new(
                "config.fetch_timeout_zero",
                "fetch_timeout_ms must be positive or null",
            ));
        }

        let origin = self.origin_url()?;
        for entry in &self.manifest {
            RequestUrl::resolve(&origin, entry)?;
        }
        RequestUrl::resolve(&origin, &self.offline_document)?;
        RequestUrl::resolve(&origin, &self.contact_endpoint)?;

        for raw in &self.dynamic_origins {
            let parsed = RequestUrl::parse(raw)?;
            if !parsed.is_network() {
                return Err(WorkerError::new(
                    "config.dynamic_origin_invalid",
                    format!("dynamic origin `{raw}` is not http(s)"),
                ));
            }
        }

        Ok(())
    }

    pub fn origin_url(&self) -> WorkerResult<RequestUrl> {
        let origin = RequestUrl::parse(&self.origin)?;
        if !origin.is_network() {
            return Err(WorkerError::new(
                "config.origin_invalid",
                format!("origin `{}` is not http(s)", self.origin),
            ));
        }
        Ok(origin)
    }

    pub fn contact_endpoint_url(&self) -> WorkerResult<RequestUrl> {
        RequestUrl::resolve(&self.origin_url()?, &self.contact_endpoint)
    }

    pub fn static_cache_name(&self) -> String {
        format!("{}-static", self.cache_name)
    }

    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-dynamic", self.cache_name)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Manifest entries resolved against the origin, in declaration order.
    pub fn manifest_urls(&self) -> WorkerResult<Vec<RequestUrl>> {
        let origin = self.origin_url()?;
        self.manifest
            .iter()
            .map(|entry| RequestUrl::resolve(&origin, entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::DEFAULT_MAX_DYNAMIC_ENTRIES;
    use super::WorkerConfig;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.static_cache_name(), "harbor-landing-v1.0.0-static");
        assert_eq!(config.dynamic_cache_name(), "harbor-landing-v1.0.0-dynamic");
        assert_eq!(config.fetch_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.max_dynamic_entries, DEFAULT_MAX_DYNAMIC_ENTRIES);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = WorkerConfig::from_json(
            r#"{"cache_name":"landing-v2","origin":"https://landing.test/","fetch_timeout_ms":null}"#,
        );
        assert!(config.is_ok());
        let config = match config {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };

        assert_eq!(config.static_cache_name(), "landing-v2-static");
        assert_eq!(config.fetch_timeout(), None);
        assert_eq!(config.manifest.len(), 11);
        assert!(config.skip_waiting_on_install);
    }

    #[test]
    fn manifest_urls_resolve_against_origin() {
        let config = WorkerConfig {
            origin: "https://landing.test/".to_owned(),
            manifest: vec![
                "/css/main.css".to_owned(),
                "https://unpkg.com/aos@2.3.1/dist/aos.js".to_owned(),
            ],
            ..WorkerConfig::default()
        };

        let urls = match config.manifest_urls() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let urls = urls.iter().map(|url| url.as_str()).collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec![
                "https://landing.test/css/main.css",
                "https://unpkg.com/aos@2.3.1/dist/aos.js",
            ]
        );
    }

    #[test]
    fn zero_entry_limit_is_rejected() {
        let result = WorkerConfig::from_json(r#"{"max_dynamic_entries":0}"#);
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "config.max_dynamic_entries_zero");
        }
    }

    #[test]
    fn non_network_dynamic_origin_is_rejected() {
        let config = WorkerConfig {
            dynamic_origins: vec!["data:text/plain,hi".to_owned()],
            ..WorkerConfig::default()
        };
        let result = config.validate();
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "config.dynamic_origin_invalid");
        }
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let result = WorkerConfig::from_json("{not json");
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "config.parse_failed");
        }
    }
}
