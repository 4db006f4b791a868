//! Network-first handling of document loads.
//!
//! Online, the live document is returned. If it belongs to the application's
//! origin, a copy is written to the Shell under the boot-document key in the
//! background, so the offline copy keeps up with deployments. Documents from
//! other origins are never stored. Offline, the Shell's boot document is served, then the
//! root entry, then the synthetic unavailable response.

use super::StrategyContext;
use crate::http::{Request, Response};
use crate::partition::PartitionKind;
use crate::stats::Outcome;
use crate::storage::lookup_any;

/// Answers a navigation request.
pub async fn respond(ctx: &StrategyContext, request: &Request) -> Response {
    match ctx.transport.fetch(request).await {
        Ok(response) => {
            ctx.stats.record(Outcome::Network);
            if !response.is_success() {
                log::debug!(
                    "Not refreshing boot document from {} ({})",
                    request.url,
                    response.status
                );
            } else if request.url.origin() != ctx.boot_key.url().origin() {
                log::debug!("Not refreshing boot document from foreign {}", request.url);
            } else {
                ctx.store_later(PartitionKind::Shell, ctx.boot_key.clone(), response.clone());
            }
            response
        }
        Err(e) => {
            log::info!("Navigation to {} failed, serving cached shell: {e}", request.url);
            offline_shell(ctx).await
        }
    }
}

/// Boot document from the Shell, else the root entry, else unavailable.
async fn offline_shell(ctx: &StrategyContext) -> Response {
    let shell = ctx.partitions.shell();
    let boot = match ctx.storage.lookup(shell, &ctx.boot_key).await {
        Ok(hit) => hit,
        Err(e) => {
            log::warn!("Cache read of {} from {shell} failed: {e}", ctx.boot_key);
            None
        }
    };

    let cached = match boot {
        Some(response) => Some(response),
        None => lookup_any(ctx.storage.as_ref(), &ctx.partitions, &ctx.root_key).await,
    };

    if let Some(response) = cached {
        ctx.stats.record(Outcome::OfflineFallback);
        response
    } else {
        log::warn!("No cached shell available for offline navigation");
        ctx.stats.record(Outcome::Unavailable);
        Response::unavailable()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::{StatusCode, Url};

    use super::*;
    use crate::storage::{CacheStorage, MemoryStorage};
    use crate::strategy::testing::{MockTransport, ReadOnlyStorage, context, key, url};

    #[tokio::test]
    async fn online_returns_live_and_refreshes_shell() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(MockTransport::new());
        transport.respond(url("/settings").as_str(), Response::ok("live settings"));
        let ctx = context(storage.clone(), transport).await;

        let response = respond(&ctx, &Request::navigate(url("/settings"))).await;
        assert_eq!(response.body, "live settings");

        ctx.writes.settle().await;
        let shell = storage
            .lookup("shell-v1", &key("/index.html"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shell.body, "live settings");
        assert_eq!(ctx.stats.snapshot().network, 1);
    }

    #[tokio::test]
    async fn foreign_navigation_does_not_replace_boot_document() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(MockTransport::new());
        transport.respond("https://other.example/", Response::ok("third party page"));
        let ctx = context(storage.clone(), transport).await;
        storage
            .put("shell-v1", &key("/index.html"), &Response::ok("app shell"))
            .await
            .unwrap();

        let foreign = Request::navigate(Url::parse("https://other.example/").unwrap());
        let response = respond(&ctx, &foreign).await;
        assert_eq!(response.body, "third party page");

        ctx.writes.settle().await;
        let shell = storage
            .lookup("shell-v1", &key("/index.html"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shell.body, "app shell");
        assert_eq!(ctx.stats.snapshot().write_failures, 0);

        // Offline, the app still gets its own shell back.
        let offline = respond(&ctx, &Request::navigate(url("/"))).await;
        assert_eq!(offline.body, "app shell");
    }

    #[tokio::test]
    async fn error_status_does_not_replace_boot_document() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            url("/").as_str(),
            Response::new(StatusCode::INTERNAL_SERVER_ERROR, "oops"),
        );
        let ctx = context(storage.clone(), transport).await;
        storage
            .put("shell-v1", &key("/index.html"), &Response::ok("good shell"))
            .await
            .unwrap();

        let response = respond(&ctx, &Request::navigate(url("/"))).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

        ctx.writes.settle().await;
        let shell = storage
            .lookup("shell-v1", &key("/index.html"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shell.body, "good shell");
    }

    #[tokio::test]
    async fn offline_serves_boot_document() {
        let storage = Arc::new(MemoryStorage::new());
        let ctx = context(storage.clone(), Arc::new(MockTransport::new())).await;
        storage
            .put("shell-v1", &key("/index.html"), &Response::ok("boot"))
            .await
            .unwrap();
        storage
            .put("shell-v1", &key("/"), &Response::ok("root"))
            .await
            .unwrap();

        let response = respond(&ctx, &Request::navigate(url("/deep/link"))).await;
        assert!(response.is_success());
        assert_eq!(response.body, "boot");
        assert_eq!(ctx.stats.snapshot().offline_fallbacks, 1);
    }

    #[tokio::test]
    async fn offline_falls_back_to_root_entry() {
        let storage = Arc::new(MemoryStorage::new());
        let ctx = context(storage.clone(), Arc::new(MockTransport::new())).await;
        storage
            .put("shell-v1", &key("/"), &Response::ok("root"))
            .await
            .unwrap();

        let response = respond(&ctx, &Request::navigate(url("/"))).await;
        assert_eq!(response.body, "root");
    }

    #[tokio::test]
    async fn offline_without_shell_is_unavailable() {
        let storage = Arc::new(MemoryStorage::new());
        let ctx = context(storage, Arc::new(MockTransport::new())).await;

        let response = respond(&ctx, &Request::navigate(url("/"))).await;
        assert!(response.is_synthetic_unavailable());
        assert_eq!(ctx.stats.snapshot().unavailable, 1);
    }

    #[tokio::test]
    async fn failed_refresh_does_not_affect_response() {
        let storage = Arc::new(ReadOnlyStorage(MemoryStorage::new()));
        let transport = Arc::new(MockTransport::new());
        transport.respond(url("/").as_str(), Response::ok("live"));
        let ctx = context(storage, transport).await;

        let response = respond(&ctx, &Request::navigate(url("/"))).await;
        assert_eq!(response.body, "live");

        ctx.writes.settle().await;
        assert_eq!(ctx.stats.snapshot().write_failures, 1);
    }
}
