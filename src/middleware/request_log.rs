//! Request logging.

use tracing::info;

use crate::error::Result;
use crate::pipeline::Middleware;
use crate::request::RequestContext;

/// Label of the timer started by [`RequestLogger`].
pub const REQUEST_TIMER: &str = "request";

/// Logs each incoming request and starts the [`REQUEST_TIMER`] timer.
///
/// The runner stops the timer once a response exists and logs the status
/// with the elapsed time. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn name(&self) -> &str {
        "request_log"
    }

    fn handle(&self, ctx: &mut RequestContext) -> Result<()> {
        ctx.start_timer(REQUEST_TIMER);
        info!(
            method = %ctx.method,
            path = %ctx.path,
            trigger = %ctx.trigger,
            event = ctx.event.as_deref().unwrap_or_default(),
            "request received"
        );
        Ok(())
    }
}
