//! Local HTTP front that routes browser traffic through the interceptor.
//!
//! Point a browser at the bound address (or configure it as an HTTP proxy)
//! and every GET is answered by the active generation's strategies. Other
//! methods are forwarded to the network untouched.
//!
//! On SIGHUP the server builds the next generation through its [`Reload`]
//! hook, installs and activates it, and routes every later request to it.
//! Activation claims the clients already connected, so open documents move
//! to the new version without reconnecting.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use reqwest::Url;
use tokio::sync::RwLock;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::http::{Request, RequestMode, Response};
use crate::interceptor::Interceptor;
use crate::lifecycle::{ActivationReport, ClientRegistry, Lifecycle};
use crate::transport::Transport;

/// Largest request body forwarded for pass-through requests.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Builds the lifecycle of the generation to switch to on reload.
pub type Reload = Box<dyn Fn() -> Result<Lifecycle> + Send + Sync>;

/// The generation currently answering requests, swappable while serving.
#[derive(Clone)]
pub struct ActiveGeneration {
    current: Arc<RwLock<Interceptor>>,
}

impl ActiveGeneration {
    /// Starts with `interceptor` as the active generation.
    #[must_use]
    pub fn new(interceptor: Interceptor) -> Self {
        Self {
            current: Arc::new(RwLock::new(interceptor)),
        }
    }

    /// Returns the interceptor of the active generation.
    pub async fn current(&self) -> Interceptor {
        self.current.read().await.clone()
    }

    /// Installs and activates `lifecycle`, then routes new requests to it.
    ///
    /// Waits for the replaced generation's background writes before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the new generation's interceptor cannot be built;
    /// the previous generation then keeps serving.
    pub async fn replace(&self, lifecycle: &mut Lifecycle) -> Result<ActivationReport> {
        let installed = lifecycle.install().await;
        if !installed.is_complete() {
            log::warn!(
                "Generation {} installed with {} missing shell assets",
                lifecycle.version(),
                installed.failed.len()
            );
        }
        let report = lifecycle.activate().await;
        let next = lifecycle.interceptor()?;

        let previous = std::mem::replace(&mut *self.current.write().await, next);
        log::info!(
            "Switched from generation {} to {} ({} clients claimed)",
            previous.partitions().version(),
            lifecycle.version(),
            report.claimed
        );
        previous.settle().await;
        Ok(report)
    }
}

#[derive(Clone)]
struct AppState {
    generation: ActiveGeneration,
    transport: Arc<dyn Transport>,
    clients: Arc<ClientRegistry>,
}

/// Decides whether a browser request is a top-level document load.
///
/// `Sec-Fetch-Mode: navigate` is authoritative when present; older clients
/// that omit it are treated as navigating when they accept HTML.
fn request_mode(headers: &HeaderMap) -> RequestMode {
    if let Some(mode) = headers.get("sec-fetch-mode") {
        return if mode.as_bytes().eq_ignore_ascii_case(b"navigate") {
            RequestMode::Navigate
        } else {
            RequestMode::Subresource
        };
    }
    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));
    if accepts_html {
        RequestMode::Navigate
    } else {
        RequestMode::Subresource
    }
}

/// Resolves the request target: absolute-form URIs (proxy requests) are used
/// as-is, origin-form paths are resolved against the application origin.
fn target_url(uri: &axum::http::Uri, origin: &Url) -> Result<Url> {
    let text = uri.to_string();
    let resolved = if uri.scheme().is_some() {
        Url::parse(&text)
    } else {
        let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
        origin.join(path)
    };
    resolved.map_err(|e| Error::InvalidUrl {
        url: text,
        reason: e.to_string(),
    })
}

/// Copies `headers` without the ones that describe a single hop.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    for name in [
        header::CONNECTION,
        header::HOST,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
    headers
}

fn into_http(response: Response) -> axum::response::Response {
    let mut out = axum::response::Response::new(Body::from(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = forwardable(&response.headers);
    out.headers_mut().remove(header::CONTENT_LENGTH);
    out
}

async fn intercept(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: axum::extract::Request,
) -> axum::response::Response {
    state.clients.register(&peer.ip().to_string());
    let interceptor = state.generation.current().await;

    let (parts, body) = req.into_parts();
    let url = match target_url(&parts.uri, interceptor.origin()) {
        Ok(url) => url,
        Err(e) => {
            log::warn!("Rejecting request from {peer}: {e}");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            log::warn!("Could not read request body for {url}: {e}");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let request = Request {
        method: parts.method,
        url,
        mode: request_mode(&parts.headers),
        headers: forwardable(&parts.headers),
        body,
    };

    if let Some(response) = interceptor.handle(&request).await {
        return into_http(response);
    }

    match state.transport.fetch(&request).await {
        Ok(response) => into_http(response),
        Err(e) => {
            log::warn!("Pass-through {} {} failed: {e}", request.method, request.url);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    log::warn!("Could not install SIGTERM handler: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                    log::info!("Received SIGINT");
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("Received SIGINT");
    }
}

#[cfg(unix)]
async fn reload_on_hangup(generation: ActiveGeneration, reload: Reload) {
    let mut hangup =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                log::warn!("Could not install SIGHUP handler, reload disabled: {e}");
                return;
            }
        };
    while hangup.recv().await.is_some() {
        log::info!("Received SIGHUP, reloading");
        let mut lifecycle = match reload() {
            Ok(lifecycle) => lifecycle,
            Err(e) => {
                log::warn!("Reload failed, keeping the current generation: {e}");
                continue;
            }
        };
        if let Err(e) = generation.replace(&mut lifecycle).await {
            log::warn!("Could not switch to {}: {e}", lifecycle.version());
        }
    }
}

/// Serves `generation` on the configured address until SIGINT/SIGTERM, then
/// waits for pending background writes.
///
/// `clients` must be the registry the generations' lifecycles claim through.
/// With a `reload` hook, SIGHUP switches to the generation it builds.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn run(
    config: &ServerConfig,
    generation: ActiveGeneration,
    transport: Arc<dyn Transport>,
    clients: Arc<ClientRegistry>,
    reload: Option<Reload>,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("bad listen address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    #[cfg(unix)]
    let reloader = reload.map(|reload| tokio::spawn(reload_on_hangup(generation.clone(), reload)));
    #[cfg(not(unix))]
    {
        if reload.is_some() {
            log::warn!("Reload on SIGHUP is not supported on this platform");
        }
    }

    let app = router(AppState {
        generation: generation.clone(),
        transport,
        clients,
    });

    let serving = generation.current().await;
    log::info!(
        "Serving {} (generation {}) on http://{addr}",
        serving.origin(),
        serving.partitions().version()
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    #[cfg(unix)]
    {
        if let Some(reloader) = reloader {
            reloader.abort();
        }
    }

    let last = generation.current().await;
    last.settle().await;
    log::info!("Shutdown complete: {}", last.stats());
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new().fallback(intercept).with_state(state)
}
