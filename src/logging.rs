use std::fmt;

use crate::request::{RequestContext, TriggerKind};

/// A logging handle stamped with the invocation it belongs to.
///
/// `RequestLog` is obtained from [`RequestContext::log`]. Every event it emits
/// carries the method, path and trigger of that invocation, so middleware
/// and handlers do not have to repeat them.
///
/// [`Secret`](crate::Secret) values stay redacted when logged through their
/// `Debug` and `Display` implementations.
///
/// # Examples
///
/// ```
/// use invocation_core::RequestContext;
///
/// let ctx = RequestContext::new("GET", "/tasks");
/// let log = ctx.log();
/// log.info(format_args!("listing tasks"));
/// assert_eq!(log.path(), "/tasks");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequestLog<'a> {
    method: &'a str,
    path: &'a str,
    trigger: TriggerKind,
}

impl<'a> RequestLog<'a> {
    pub(crate) fn new(ctx: &'a RequestContext) -> Self {
        Self {
            method: &ctx.method,
            path: &ctx.path,
            trigger: ctx.trigger,
        }
    }

    /// Method of the invocation.
    pub fn method(&self) -> &str {
        self.method
    }

    /// Path of the invocation.
    pub fn path(&self) -> &str {
        self.path
    }

    /// Logs an info-level message.
    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(method = %self.method, path = %self.path, trigger = %self.trigger, "{}", args);
    }

    /// Logs a warning-level message.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(method = %self.method, path = %self.path, trigger = %self.trigger, "{}", args);
    }

    /// Logs an error-level message.
    pub fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(method = %self.method, path = %self.path, trigger = %self.trigger, "{}", args);
    }

    /// Logs a debug-level message.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(method = %self.method, path = %self.path, trigger = %self.trigger, "{}", args);
    }
}
