//! HTTP handlers

pub mod health;
pub mod message;

use delivery::CallContext;
use std::time::Duration;
use tokio_util::sync::DropGuard;

/// Context for one request, bounded by `timeout`.
///
/// The guard cancels the context when dropped, so work started for a request
/// stops once its handler future is gone.
pub(crate) fn request_context(timeout: Duration) -> (CallContext, DropGuard) {
    let ctx = CallContext::new().bounded(timeout);
    let guard = ctx.token().clone().drop_guard();
    (ctx, guard)
}
