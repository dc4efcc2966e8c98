//! Conversion boundary from platform payloads to [`RequestContext`].

use crate::request::RequestContext;

/// Converts a platform-specific invocation payload into a [`RequestContext`].
///
/// [`App::invoke`](crate::App::invoke) accepts anything implementing this
/// trait, so a host other than the default one only needs to describe how its
/// payload maps onto the context.
///
/// # Examples
///
/// ```
/// use invocation_core::web::IntoRequestContext;
/// use invocation_core::{RequestContext, TriggerKind};
///
/// struct CronTick {
///     job: String,
/// }
///
/// impl IntoRequestContext for CronTick {
///     fn into_request_context(self) -> RequestContext {
///         RequestContext::new("POST", format!("/jobs/{}", self.job))
///             .with_trigger(TriggerKind::Schedule, None)
///     }
/// }
///
/// let ctx = CronTick { job: "cleanup".into() }.into_request_context();
/// assert_eq!(ctx.path, "/jobs/cleanup");
/// assert_eq!(ctx.trigger, TriggerKind::Schedule);
/// ```
pub trait IntoRequestContext {
    /// Builds the context for one invocation.
    fn into_request_context(self) -> RequestContext;
}

impl IntoRequestContext for RequestContext {
    fn into_request_context(self) -> RequestContext {
        self
    }
}
