//! URL canonicalisation for request identities.

use hb_core::WorkerError;
use hb_core::WorkerResult;
use url::Url;

/// URL schemes the worker distinguishes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    /// Any non-network scheme (`chrome-extension:`, `data:`, `blob:`, ...).
    Other,
}

impl Scheme {
    fn from_name(name: &str) -> Self {
        match name {
            "http" => Self::Http,
            "https" => Self::Https,
            _ => Self::Other,
        }
    }

    pub fn is_network(self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

/// Canonical URL of an intercepted request.
///
/// Fragments are dropped at parse time, so two URLs differing only by
/// `#section` share one cache identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestUrl {
    parsed: Url,
    scheme: Scheme,
}

impl RequestUrl {
    pub fn parse(input: &str) -> WorkerResult<Self> {
        let parsed = Url::parse(input).map_err(|error| {
            WorkerError::new(
                "net.url.invalid",
                format!("failed to parse URL `{input}`: {error}"),
            )
        })?;

        Ok(Self::from_url(parsed))
    }

    /// Resolves `reference` against `base`; absolute references are kept as-is.
    pub fn resolve(base: &RequestUrl, reference: &str) -> WorkerResult<Self> {
        let joined = base.parsed.join(reference).map_err(|error| {
            WorkerError::new(
                "net.url.invalid_reference",
                format!(
                    "failed to resolve `{reference}` against `{}`: {error}",
                    base.as_str()
                ),
            )
        })?;

        Ok(Self::from_url(joined))
    }

    fn from_url(mut parsed: Url) -> Self {
        let scheme = Scheme::from_name(parsed.scheme());
        parsed.set_fragment(None);
        Self { parsed, scheme }
    }

    pub fn as_str(&self) -> &str {
        self.parsed.as_str()
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn is_network(&self) -> bool {
        self.scheme.is_network()
    }

    pub fn host(&self) -> Option<&str> {
        self.parsed.host_str()
    }

    pub fn path(&self) -> &str {
        if self.parsed.path().is_empty() {
            "/"
        } else {
            self.parsed.path()
        }
    }

    /// `scheme://host[:port]`, with the port omitted when it is the default.
    pub fn origin(&self) -> String {
        self.parsed.origin().ascii_serialization()
    }

    pub fn path_and_query(&self) -> String {
        match self.parsed.query() {
            Some(query) => format!("{}?{query}", self.path()),
            None => self.path().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RequestUrl;
    use super::Scheme;

    fn parse(input: &str) -> RequestUrl {
        match RequestUrl::parse(input) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn parses_https_url() {
        let parsed = parse("https://example.com/path?q=1");
        assert_eq!(parsed.host(), Some("example.com"));
        assert_eq!(parsed.path(), "/path");
        assert_eq!(parsed.path_and_query(), "/path?q=1");
        assert_eq!(parsed.scheme(), Scheme::Https);
        assert_eq!(parsed.origin(), "https://example.com");
    }

    #[test]
    fn removes_fragment_from_canonical_url() {
        let parsed = parse("https://example.com/path#section");
        assert_eq!(parsed.as_str(), "https://example.com/path");
    }

    #[test]
    fn extension_urls_are_not_network_urls() {
        let parsed = parse("chrome-extension://abcdef/script.js");
        assert_eq!(parsed.scheme(), Scheme::Other);
        assert!(!parsed.is_network());
    }

    #[test]
    fn resolves_relative_manifest_entries() {
        let origin = parse("https://landing.example/");
        let resolved = RequestUrl::resolve(&origin, "/css/main.css");
        assert!(resolved.is_ok());
        let resolved = match resolved {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(resolved.as_str(), "https://landing.example/css/main.css");
    }

    #[test]
    fn resolving_absolute_entry_keeps_foreign_origin() {
        let origin = parse("https://landing.example/");
        let resolved = RequestUrl::resolve(&origin, "https://unpkg.com/aos@2.3.1/dist/aos.js");
        let resolved = match resolved {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(resolved.host(), Some("unpkg.com"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(RequestUrl::parse("not a url").is_err());
    }
}
