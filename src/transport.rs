//! Network transport abstraction.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::http::{Request, Response};

/// Abstraction over the network below the interception layer.
///
/// Any `Err` returned by [`fetch`](Transport::fetch) is treated as a network
/// failure. HTTP error statuses are *not* failures; they come back as a
/// normal [`Response`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and buffers the full response.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Timeouts applied by [`HttpTransport`]. Both default to none.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportTimeouts {
    /// Connection establishment timeout.
    pub connect: Option<Duration>,
    /// Whole-request timeout.
    pub request: Option<Duration>,
}

/// [`Transport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport with a configured connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeouts: TransportTimeouts) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(10));
        if let Some(connect) = timeouts.connect {
            builder = builder.connect_timeout(connect);
        }
        if let Some(request) = timeouts.request {
            builder = builder.timeout(request);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{} {}: {e}", request.method, request.url)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("reading body of {}: {e}", request.url)))?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_timeouts() {
        let transport = HttpTransport::new(TransportTimeouts {
            connect: Some(Duration::from_secs(5)),
            request: Some(Duration::from_secs(30)),
        });
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let transport = HttpTransport::new(TransportTimeouts {
            connect: Some(Duration::from_millis(500)),
            request: Some(Duration::from_secs(2)),
        })
        .unwrap();
        // Port 9 (discard) on loopback is essentially never listening.
        let request = Request::parse_get("http://127.0.0.1:9/").unwrap();
        let err = transport.fetch(&request).await.unwrap_err();
        assert!(err.is_network());
    }
}
