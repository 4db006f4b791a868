//! Per-request dispatch: classify, then answer with exactly one strategy.

use reqwest::Url;

use crate::classify::{RequestClass, classify};
use crate::http::{Request, Response};
use crate::partition::Partitions;
use crate::stats::{Outcome, StatsSnapshot};
use crate::strategy::{StrategyContext, cross_origin, navigation, same_origin};

/// The request-interception entry point of one generation.
///
/// Build one with [`Lifecycle::interceptor`](crate::lifecycle::Lifecycle::interceptor).
/// It holds no per-request state, so a single instance can serve any number
/// of concurrent requests.
#[derive(Clone)]
pub struct Interceptor {
    origin: Url,
    ctx: StrategyContext,
}

impl Interceptor {
    /// Creates an interceptor for requests relative to `origin`.
    #[must_use]
    pub const fn new(origin: Url, ctx: StrategyContext) -> Self {
        Self { origin, ctx }
    }

    /// Handles an intercepted request.
    ///
    /// Returns `None` for non-GET requests, which the host should handle as
    /// if nothing had intercepted them. Never fails: the worst case is
    /// [`Response::unavailable`].
    pub async fn handle(&self, request: &Request) -> Option<Response> {
        let Some(class) = classify(request, &self.origin) else {
            log::debug!("Passing through {} {}", request.method, request.url);
            self.ctx.stats.record(Outcome::PassThrough);
            return None;
        };

        log::debug!("{class:?} {}", request.url);
        let response = match class {
            RequestClass::Navigation => navigation::respond(&self.ctx, request).await,
            RequestClass::SameOrigin => same_origin::respond(&self.ctx, request).await,
            RequestClass::CrossOrigin => cross_origin::respond(&self.ctx, request).await,
        };
        Some(response)
    }

    /// Waits for every background cache write scheduled so far.
    pub async fn settle(&self) {
        let pending = self.ctx.writes.pending();
        if pending > 0 {
            log::debug!("Waiting for {pending} background writes");
        }
        self.ctx.writes.settle().await;
    }

    /// Number of background writes still running.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.ctx.writes.pending()
    }

    /// Current outcome counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// The origin requests are classified against.
    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }

    /// The partitions this interceptor reads and writes.
    #[must_use]
    pub const fn partitions(&self) -> &Partitions {
        &self.ctx.partitions
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::Method;

    use super::*;
    use crate::config::LayerConfig;
    use crate::lifecycle::{ClientRegistry, Lifecycle, NoClients};
    use crate::storage::{CacheStorage, MemoryStorage};
    use crate::strategy::testing::{MockTransport, key, url};

    fn config(version: &str) -> LayerConfig {
        LayerConfig::new()
            .with_version(version)
            .with_origin("https://app.test")
            .with_shell_assets(["/", "/index.html"])
    }

    #[tokio::test]
    async fn non_get_passes_through() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(MockTransport::new());
        let lc = Lifecycle::new(config("v1"), storage, transport.clone(), Arc::new(NoClients))
            .unwrap();
        let interceptor = lc.interceptor().unwrap();

        let post = Request::get(url("/api/save")).with_method(Method::POST);
        assert!(interceptor.handle(&post).await.is_none());
        assert_eq!(transport.call_count(), 0);
        assert_eq!(interceptor.stats().pass_through, 1);
    }

    #[tokio::test]
    async fn end_to_end_generation() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(MockTransport::new());
        transport.respond(url("/").as_str(), Response::ok("root"));
        transport.respond(url("/index.html").as_str(), Response::ok("<html>v1</html>"));

        let registry = Arc::new(ClientRegistry::new());
        registry.register("tab-1");
        let mut lc = Lifecycle::new(
            config("v1"),
            storage.clone(),
            transport.clone(),
            registry.clone(),
        )
        .unwrap();

        let installed = lc.install().await;
        assert!(installed.is_complete());
        assert_eq!(storage.len("shell-v1"), Some(2));

        let activated = lc.activate().await;
        assert!(activated.deleted.is_empty());
        assert_eq!(activated.claimed, 1);

        let interceptor = lc.interceptor().unwrap();

        // Offline navigation serves the installed boot document.
        let nav = interceptor.handle(&Request::navigate(url("/"))).await.unwrap();
        assert!(nav.is_success());
        assert_eq!(nav.body, "<html>v1</html>");

        // Cold cache, network up.
        transport.respond(url("/app.js").as_str(), Response::ok("X"));
        let first = interceptor.handle(&Request::get(url("/app.js"))).await.unwrap();
        assert_eq!(first.body, "X");
        assert!(storage.lookup("runtime-v1", &key("/app.js")).await.unwrap().is_some());

        // Warm cache: stale response now, fresh entry afterwards.
        transport.respond(url("/app.js").as_str(), Response::ok("Y"));
        let second = interceptor.handle(&Request::get(url("/app.js"))).await.unwrap();
        assert_eq!(second.body, "X");
        interceptor.settle().await;
        assert_eq!(interceptor.pending_writes(), 0);
        let refreshed = storage
            .lookup("runtime-v1", &key("/app.js"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.body, "Y");
    }

    #[tokio::test]
    async fn new_generation_never_serves_old_entries() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(MockTransport::new());
        transport.respond(url("/index.html").as_str(), Response::ok("v1 shell"));
        transport.respond(url("/app.js").as_str(), Response::ok("v1 app"));

        let mut v1 = Lifecycle::new(
            config("v1"),
            storage.clone(),
            transport.clone(),
            Arc::new(NoClients),
        )
        .unwrap();
        v1.install().await;
        v1.activate().await;
        let old = v1.interceptor().unwrap();
        old.handle(&Request::get(url("/app.js"))).await;

        let mut v2 = Lifecycle::new(
            config("v2"),
            storage.clone(),
            transport.clone(),
            Arc::new(NoClients),
        )
        .unwrap();
        v2.install().await;
        v2.activate().await;

        let names = storage.names().await.unwrap();
        assert!(!names.iter().any(|n| n.ends_with("-v1")));

        // Offline and nothing installed for v2: no v1 content leaks through.
        let interceptor = v2.interceptor().unwrap();
        let app = interceptor.handle(&Request::get(url("/app.js"))).await.unwrap();
        assert!(app.is_synthetic_unavailable());
        let nav = interceptor.handle(&Request::navigate(url("/"))).await.unwrap();
        assert!(nav.is_synthetic_unavailable());
    }

    #[tokio::test]
    async fn foreign_navigation_keeps_app_shell() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(MockTransport::new());
        transport.respond(url("/").as_str(), Response::ok("app root"));
        transport.respond(url("/index.html").as_str(), Response::ok("app shell"));
        let mut lc = Lifecycle::new(config("v1"), storage.clone(), transport.clone(), Arc::new(NoClients))
            .unwrap();
        lc.install().await;
        lc.activate().await;
        let interceptor = lc.interceptor().unwrap();

        transport.respond("https://other.example/", Response::ok("third party page"));
        let foreign = Request::navigate(reqwest::Url::parse("https://other.example/").unwrap());
        let live = interceptor.handle(&foreign).await.unwrap();
        assert_eq!(live.body, "third party page");
        interceptor.settle().await;

        let boot = storage
            .lookup("shell-v1", &key("/index.html"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(boot.body, "app shell");
        let offline = interceptor.handle(&Request::navigate(url("/"))).await.unwrap();
        assert_eq!(offline.body, "app shell");
    }

    #[tokio::test]
    async fn cross_origin_never_writes() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(MockTransport::new());
        transport.respond("https://cdn.example/lib.js", Response::ok("lib"));
        let mut lc = Lifecycle::new(config("v1"), storage.clone(), transport, Arc::new(NoClients))
            .unwrap();
        lc.activate().await;
        let interceptor = lc.interceptor().unwrap();

        let cdn = Request::parse_get("https://cdn.example/lib.js").unwrap();
        assert_eq!(interceptor.handle(&cdn).await.unwrap().body, "lib");
        assert!(interceptor.handle(&cdn).await.unwrap().is_synthetic_unavailable());
        interceptor.settle().await;

        assert_eq!(storage.len("shell-v1"), Some(0));
        assert_eq!(storage.len("runtime-v1"), Some(0));
    }
}
