//! The invocation runner.

use tracing::{error, info};

use crate::error::Error;
use crate::middleware::REQUEST_TIMER;
use crate::pipeline::Pipeline;
use crate::request::RequestContext;
use crate::response::Response;
use crate::router::Router;
use crate::web::IntoRequestContext;

/// Body sent for faults that are not an [`ApiError`](crate::ApiError) or a
/// [`ValidationError`](crate::ValidationError).
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// A pipeline and a router, run once per invocation.
///
/// [`handle`](Self::handle) runs the pipeline, dispatches to the matched
/// route and turns every error into a response:
///
/// - [`Error::Api`] becomes `{"success": false, "error": message}` with the
///   error's status, plus `retry-after` when the error carries one
/// - [`Error::Validation`] becomes [`Response::validation`]
/// - [`Error::Internal`] is logged in full and becomes a bare 500
///
/// Headers middleware placed in `response_headers` are added to every
/// response, error responses included, unless the handler set the same
/// header itself.
///
/// # Examples
///
/// ```
/// use invocation_core::{App, Params, Pipeline, RequestContext, Response, Router};
/// use invocation_core::middleware::Cors;
/// use serde_json::json;
///
/// let mut router = Router::new();
/// router
///     .get("/ping", |_ctx: &mut RequestContext, _params: &Params| Ok(Response::text("pong")))
///     .unwrap();
///
/// let app = App::new(Pipeline::new().with(Cors::default()), router);
///
/// let res = app.handle(&mut RequestContext::new("GET", "/ping"));
/// assert_eq!(res.status, 200);
/// assert_eq!(res.headers.get("access-control-allow-origin"), Some("*"));
///
/// let missing = app.handle(&mut RequestContext::new("GET", "/nope"));
/// assert_eq!(missing.status, 404);
/// ```
#[derive(Debug, Default)]
pub struct App {
    pipeline: Pipeline,
    router: Router,
}

impl App {
    /// Creates a runner.
    pub fn new(pipeline: Pipeline, router: Router) -> Self {
        Self { pipeline, router }
    }

    /// The middleware pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The routing table.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Builds a context from `payload` and handles it.
    pub fn invoke<P: IntoRequestContext>(&self, payload: P) -> Response {
        let mut ctx = payload.into_request_context();
        self.handle(&mut ctx)
    }

    /// Runs the pipeline and the matched handler for `ctx`.
    pub fn handle(&self, ctx: &mut RequestContext) -> Response {
        let outcome = match self.pipeline.execute(ctx) {
            Ok(()) => self.router.dispatch(ctx),
            Err(err) => Err(err),
        };

        let mut res = match outcome {
            Ok(res) => res,
            Err(err) => error_response(ctx, err),
        };

        for (name, value) in ctx.response_headers.iter() {
            if !res.headers.contains(name) {
                res.headers.insert(name, value);
            }
        }

        if let Some(elapsed) = ctx.stop_timer(REQUEST_TIMER) {
            info!(
                method = %ctx.method,
                path = %ctx.path,
                status = res.status,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "request completed"
            );
        }
        res
    }
}

fn error_response(ctx: &RequestContext, err: Error) -> Response {
    match err {
        Error::Api(api) => {
            let res = Response::error(api.message, api.status);
            match api.retry_after {
                Some(wait) => {
                    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
                    res.with_header("retry-after", secs.to_string())
                }
                None => res,
            }
        }
        Error::Validation(errors) => Response::validation(&errors),
        Error::Internal(source) => {
            error!(
                method = %ctx.method,
                path = %ctx.path,
                error = ?source,
                "unhandled error"
            );
            Response::error(INTERNAL_ERROR_MESSAGE, 500)
        }
    }
}
