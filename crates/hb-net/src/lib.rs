//! Networking contracts: URL canonicalisation, request/response model, and
//! the fetch boundary the worker intercepts.

pub mod fetch;
pub mod http;
pub mod url;

pub use fetch::Fetcher;
pub use fetch::HttpFetcher;
pub use fetch::HttpFetcherConfig;
pub use fetch::fetch_with_timeout;
pub use http::Header;
pub use http::Method;
pub use http::Request;
pub use http::RequestKey;
pub use http::RequestMode;
pub use http::Response;
pub use http::StatusCode;
pub use url::RequestUrl;
pub use url::Scheme;
