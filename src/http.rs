//! Request and response types seen by the interception layer.
//!
//! These mirror the small part of the host's request/response model the
//! policies actually use: method, absolute URL, navigation flag, status,
//! headers and a fully buffered body.

use std::fmt;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};

use crate::error::{Error, Result};

/// How the host issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMode {
    /// A top-level document load or refresh.
    Navigate,
    /// Any other fetch issued by a page (scripts, styles, XHR, images).
    Subresource,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Navigation flag.
    pub mode: RequestMode,
    /// Request headers forwarded to the network.
    pub headers: HeaderMap,
    /// Request body; empty for GET.
    pub body: Bytes,
}

impl Request {
    /// Creates a sub-resource GET request.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::Subresource,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a navigation GET request.
    #[must_use]
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Parses `url` and creates a sub-resource GET request for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` is not an absolute URL.
    pub fn parse_get(url: &str) -> Result<Self> {
        Url::parse(url).map(Self::get).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Replaces the method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Replaces the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Returns true if this is a top-level document load.
    #[must_use]
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Returns the cache key for this request, or `None` for non-GET methods.
    #[must_use]
    pub fn key(&self) -> Option<RequestKey> {
        (self.method == Method::GET).then(|| RequestKey::get(self.url.clone()))
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Creates a `200 OK` response with the given body.
    #[must_use]
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// The synthetic response returned when neither the cache nor the
    /// network can answer: `503 Service Unavailable`, empty body.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, Bytes::new())
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if this looks like [`Response::unavailable`].
    #[must_use]
    pub fn is_synthetic_unavailable(&self) -> bool {
        self.status == StatusCode::SERVICE_UNAVAILABLE && self.body.is_empty()
    }
}

/// Cache key: method plus URL, GET only.
///
/// The fragment is dropped so `/app.js#v` and `/app.js` share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: Method,
    url: Url,
}

impl RequestKey {
    /// Builds the GET key for `url`.
    #[must_use]
    pub fn get(mut url: Url) -> Self {
        url.set_fragment(None);
        Self {
            method: Method::GET,
            url,
        }
    }

    /// Returns the method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
