//! Network-only pass-through for third-party origins. No partition is read
//! or written.

use super::StrategyContext;
use crate::http::{Request, Response};
use crate::stats::Outcome;

/// Answers a cross-origin GET request.
pub async fn respond(ctx: &StrategyContext, request: &Request) -> Response {
    match ctx.transport.fetch(request).await {
        Ok(response) => {
            ctx.stats.record(Outcome::Network);
            response
        }
        Err(e) => {
            log::debug!("Cross-origin fetch of {} failed: {e}", request.url);
            ctx.stats.record(Outcome::Unavailable);
            Response::unavailable()
        }
    }
}
