//! Stale-while-revalidate for the layer's own sub-resources.
//!
//! A cached entry is returned immediately and refreshed in the background,
//! so the fresh copy serves the *next* request. A miss goes to the network
//! and a successful response is written to Runtime before it is returned.

use std::sync::Arc;

use super::StrategyContext;
use crate::error::Result;
use crate::http::{Request, RequestKey, Response};
use crate::partition::PartitionKind;
use crate::stats::Outcome;
use crate::storage::lookup_any;

/// Answers a same-origin GET request.
pub async fn respond(ctx: &StrategyContext, request: &Request) -> Response {
    let Some(key) = request.key() else {
        // Non-GET never reaches a strategy; answer conservatively if it does.
        ctx.stats.record(Outcome::Unavailable);
        return Response::unavailable();
    };

    if let Some(cached) = lookup_any(ctx.storage.as_ref(), &ctx.partitions, &key).await {
        ctx.stats.record(Outcome::CacheHit);
        revalidate_later(ctx, request.clone(), key);
        return cached;
    }

    match ctx.transport.fetch(request).await {
        Ok(response) => {
            ctx.stats.record(Outcome::Network);
            if response.is_success() {
                ctx.store(PartitionKind::Runtime, &key, &response).await;
            }
            response
        }
        Err(e) => {
            log::warn!("{} not cached and network failed: {e}", request.url);
            ctx.stats.record(Outcome::Unavailable);
            Response::unavailable()
        }
    }
}

/// Fetches `request` in the background and overwrites its Runtime entry on a
/// successful status. Network failures are ignored.
fn revalidate_later(ctx: &StrategyContext, request: Request, key: RequestKey) {
    let transport = Arc::clone(&ctx.transport);
    let storage = Arc::clone(&ctx.storage);
    let stats = Arc::clone(&ctx.stats);
    let runtime = ctx.partitions.runtime().to_string();
    let label = format!("revalidate {key}");

    ctx.spawn_write(label, async move {
        let response = match transport.fetch(&request).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                log::debug!("Keeping cached {key}: revalidation got {}", response.status);
                return Ok(());
            }
            Err(e) => {
                log::debug!("Keeping cached {key}: {e}");
                return Ok(());
            }
        };

        let result: Result<()> = storage.put(&runtime, &key, &response).await;
        stats.record(if result.is_ok() {
            Outcome::Revalidated
        } else {
            Outcome::WriteFailure
        });
        result
    });
}
