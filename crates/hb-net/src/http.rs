//! Request/response model shared by the interception layer and cache store.

use crate::url::RequestUrl;
use hb_core::WorkerError;
use hb_core::WorkerResult;

/// Request methods seen at the interception boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }

    pub fn parse(value: &str) -> WorkerResult<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(WorkerError::new(
                "net.http.method_unsupported",
                format!("unsupported request method `{value}`"),
            )),
        }
    }
}

/// How the page issued the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level document load.
    Navigate,
    #[default]
    SameOrigin,
    NoCors,
    Cors,
}

/// Single HTTP header with validated wire-safe name/value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: &str, value: &str) -> WorkerResult<Self> {
        if !is_valid_header_name(name) {
            return Err(WorkerError::new(
                "net.http.header_name_invalid",
                format!("invalid HTTP header name `{name}`"),
            ));
        }

        if value.bytes().any(|byte| matches!(byte, b'\r' | b'\n' | 0)) {
            return Err(WorkerError::new(
                "net.http.header_value_invalid",
                format!("invalid characters found in HTTP header `{name}`"),
            ));
        }

        Ok(Self {
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }
}

/// Request identity used as the cache key: method plus canonical URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: Method,
    pub url: String,
}

impl RequestKey {
    pub fn get(url: &RequestUrl) -> Self {
        Self {
            method: Method::Get,
            url: url.as_str().to_owned(),
        }
    }
}

/// Intercepted outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: RequestUrl,
    pub mode: RequestMode,
    pub headers: Vec<Header>,
    /// Sent only for methods that carry one; never part of the cache key.
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, url: RequestUrl) -> Self {
        Self {
            method,
            url,
            mode: RequestMode::default(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn get(url: RequestUrl) -> Self {
        Self::new(Method::Get, url)
    }

    /// Parses `raw_url` and builds a GET request for it.
    pub fn get_str(raw_url: &str) -> WorkerResult<Self> {
        Ok(Self::get(RequestUrl::parse(raw_url)?))
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> WorkerResult<Self> {
        self.headers.push(Header::new(name, value)?);
        Ok(self)
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn key(&self) -> RequestKey {
        RequestKey {
            method: self.method,
            url: self.url.as_str().to_owned(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// HTTP status code wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: Self = Self(200);
    pub const SERVICE_UNAVAILABLE: Self = Self(503);

    pub fn new(code: u16) -> WorkerResult<Self> {
        if (100..=599).contains(&code) {
            return Ok(Self(code));
        }

        Err(WorkerError::new(
            "net.http.status_invalid",
            format!("status code must be 100-599, got `{code}`"),
        ))
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        (200..=299).contains(&self.0)
    }
}

/// Fully received response. Bodies are buffered, so cloning yields an
/// independent readable copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            status,
            status_text: default_reason(status.as_u16()).to_owned(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::OK, body.into())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> WorkerResult<Self> {
        self.headers.push(Header::new(name, value)?);
        Ok(self)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Exactly 200, the only status the caching strategies store.
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }
}

fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(|header| header.value.as_str())
}

fn default_reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

fn is_valid_header_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    name.bytes().all(is_token_char)
}

fn is_token_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}
