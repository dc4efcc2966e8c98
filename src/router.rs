//! Path-pattern routing.
//!
//! Routes are scanned in registration order and the first one whose method
//! and pattern both match wins. There is no specificity ranking: a
//! parameter route registered before a literal route shadows it. Paths are
//! compared segment by segment with no trailing-slash normalization, so
//! `/tasks` and `/tasks/` are different paths.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::{ApiError, Result};
use crate::request::RequestContext;
use crate::response::Response;

/// Prefix marking a named-capture segment, e.g. `:id`.
pub const CAPTURE_PREFIX: char = ':';

/// Errors in a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// A capture segment has no name (`/tasks/:`).
    #[error("pattern '{0}' has a capture without a name")]
    EmptyCapture(String),
    /// Two captures share a name.
    #[error("pattern '{pattern}' captures '{name}' more than once")]
    DuplicateCapture {
        /// Pattern as written
        pattern: String,
        /// Repeated name
        name: String,
    },
}

/// One segment of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the path segment exactly.
    Literal(String),
    /// Matches any non-empty path segment and binds it to the name.
    Capture(String),
}

/// A compiled path pattern.
///
/// # Examples
///
/// ```
/// use invocation_core::PathPattern;
///
/// let pattern = PathPattern::parse("/tasks/:id").unwrap();
/// let params = pattern.matches("/tasks/42").unwrap();
/// assert_eq!(params.get("id"), Some("42"));
///
/// assert!(pattern.matches("/tasks").is_none());
/// assert!(pattern.matches("/tasks/").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compiles a `/`-delimited pattern.
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();

        for part in pattern.split('/') {
            match part.strip_prefix(CAPTURE_PREFIX) {
                Some("") => return Err(RouteError::EmptyCapture(pattern.to_string())),
                Some(name) => {
                    if names.contains(&name) {
                        return Err(RouteError::DuplicateCapture {
                            pattern: pattern.to_string(),
                            name: name.to_string(),
                        });
                    }
                    names.push(name);
                    segments.push(Segment::Capture(name.to_string()));
                }
                None => segments.push(Segment::Literal(part.to_string())),
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Compiled segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Matches `path`, returning the captured parameters on success.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Params::default();
        for (segment, actual) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(expected) if expected == actual => {}
                Segment::Capture(name) if !actual.is_empty() => {
                    params.insert(name.clone(), actual.to_string());
                }
                _ => return None,
            }
        }
        Some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parameters captured from the path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    inner: HashMap<String, String>,
}

impl Params {
    /// Returns the value captured under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(String::as_str)
    }

    /// Returns the value captured under `name`, or a 400 error naming it.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| ApiError::bad_request(format!("Missing path parameter '{name}'")).into())
    }

    /// Number of captured parameters.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn insert(&mut self, name: String, value: String) {
        self.inner.insert(name, value);
    }
}

/// Code that answers a matched request.
///
/// Implemented for every `Fn(&mut RequestContext, &Params) -> Result<Response>`.
pub trait Handler: Send + Sync {
    /// Handles the request.
    fn call(&self, ctx: &mut RequestContext, params: &Params) -> Result<Response>;
}

impl<F> Handler for F
where
    F: Fn(&mut RequestContext, &Params) -> Result<Response> + Send + Sync,
{
    fn call(&self, ctx: &mut RequestContext, params: &Params) -> Result<Response> {
        self(ctx, params)
    }
}

/// A method and pattern bound to a handler.
pub struct Route {
    method: String,
    pattern: PathPattern,
    handler: Box<dyn Handler>,
}

impl Route {
    /// Uppercase method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Compiled pattern.
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    fn matches(&self, method: &str, path: &str) -> Option<Params> {
        if !self.method.eq_ignore_ascii_case(method) {
            return None;
        }
        self.pattern.matches(path)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

/// Ordered routing table.
///
/// # Examples
///
/// ```
/// use invocation_core::{Params, RequestContext, Response, Router};
/// use serde_json::json;
///
/// let mut router = Router::new();
/// router
///     .register("GET", "/tasks/:id", |_ctx: &mut RequestContext, params: &Params| {
///         Ok(Response::success(json!({ "id": params.get("id") })))
///     })
///     .unwrap();
///
/// let mut ctx = RequestContext::new("GET", "/tasks/42");
/// let res = router.dispatch(&mut ctx).unwrap();
/// assert_eq!(res.status, 200);
///
/// let mut missing = RequestContext::new("GET", "/projects");
/// assert_eq!(router.dispatch(&mut missing).unwrap_err().status(), 404);
/// ```
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a closure route. Earlier routes take precedence.
    pub fn register<F>(&mut self, method: &str, pattern: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(&mut RequestContext, &Params) -> Result<Response> + Send + Sync + 'static,
    {
        self.register_handler(method, pattern, handler)
    }

    /// Appends a route backed by any [`Handler`] implementation.
    pub fn register_handler<H>(
        &mut self,
        method: &str,
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self, RouteError>
    where
        H: Handler + 'static,
    {
        let pattern = PathPattern::parse(pattern)?;
        self.routes.push(Route {
            method: method.to_ascii_uppercase(),
            pattern,
            handler: Box::new(handler),
        });
        Ok(self)
    }

    /// Registers a `GET` route.
    pub fn get<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(&mut RequestContext, &Params) -> Result<Response> + Send + Sync + 'static,
    {
        self.register("GET", pattern, handler)
    }

    /// Registers a `POST` route.
    pub fn post<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(&mut RequestContext, &Params) -> Result<Response> + Send + Sync + 'static,
    {
        self.register("POST", pattern, handler)
    }

    /// Registers a `PUT` route.
    pub fn put<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(&mut RequestContext, &Params) -> Result<Response> + Send + Sync + 'static,
    {
        self.register("PUT", pattern, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(&mut RequestContext, &Params) -> Result<Response> + Send + Sync + 'static,
    {
        self.register("PATCH", pattern, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(&mut RequestContext, &Params) -> Result<Response> + Send + Sync + 'static,
    {
        self.register("DELETE", pattern, handler)
    }

    /// Registered routes in order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Finds the first route matching `method` and `path`.
    pub fn find(&self, method: &str, path: &str) -> Option<(&Route, Params)> {
        self.routes
            .iter()
            .find_map(|route| route.matches(method, path).map(|params| (route, params)))
    }

    /// Invokes the first matching handler.
    ///
    /// Returns a 404 [`ApiError`] when nothing matches. Whatever the handler
    /// returns, success or error, is passed through unchanged.
    pub fn dispatch(&self, ctx: &mut RequestContext) -> Result<Response> {
        let Some((route, params)) = self.find(&ctx.method, &ctx.path) else {
            debug!(method = %ctx.method, path = %ctx.path, "no route matched");
            return Err(ApiError::not_found(format!("Route not found: {} {}", ctx.method, ctx.path)).into());
        };

        debug!(
            method = %ctx.method,
            path = %ctx.path,
            pattern = %route.pattern,
            "route matched"
        );
        route.handler.call(ctx, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    fn tagged(
        tag: &'static str,
    ) -> impl Fn(&mut RequestContext, &Params) -> Result<Response> + Send + Sync + 'static {
        move |_ctx: &mut RequestContext, params: &Params| -> Result<Response> {
            let captured: HashMap<&str, &str> = params.iter().collect();
            Ok(Response::success(json!({ "route": tag, "params": captured })))
        }
    }

    fn route_tag(res: &Response) -> String {
        match &res.body {
            crate::response::Body::Json(v) => v["data"]["route"].as_str().unwrap_or_default().to_string(),
            _ => String::new(),
        }
    }

    #[test]
    fn pattern_captures_named_segments() {
        let pattern = PathPattern::parse("/projects/:project/tasks/:task").unwrap();
        let params = pattern.matches("/projects/p1/tasks/t9").unwrap();

        assert_eq!(params.get("project"), Some("p1"));
        assert_eq!(params.get("task"), Some("t9"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn segment_count_must_match() {
        let pattern = PathPattern::parse("/tasks/:id").unwrap();
        assert!(pattern.matches("/tasks").is_none());
        assert!(pattern.matches("/tasks/1/comments").is_none());
    }

    #[test]
    fn capture_rejects_empty_segment() {
        let pattern = PathPattern::parse("/tasks/:id").unwrap();
        assert!(pattern.matches("/tasks/").is_none());
    }

    #[test]
    fn literal_segments_are_case_sensitive() {
        let pattern = PathPattern::parse("/Tasks").unwrap();
        assert!(pattern.matches("/tasks").is_none());
    }

    #[test]
    fn no_trailing_slash_normalization() {
        let pattern = PathPattern::parse("/tasks").unwrap();
        assert!(pattern.matches("/tasks").is_some());
        assert!(pattern.matches("/tasks/").is_none());
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(matches!(
            PathPattern::parse("/tasks/:"),
            Err(RouteError::EmptyCapture(_))
        ));
        assert!(matches!(
            PathPattern::parse("/:id/x/:id"),
            Err(RouteError::DuplicateCapture { .. })
        ));
    }

    #[test]
    fn first_registered_match_wins() {
        let mut router = Router::new();
        router.get("/tasks/:id", tagged("param")).unwrap();
        router.get("/tasks/latest", tagged("literal")).unwrap();

        let mut ctx = RequestContext::new("GET", "/tasks/latest");
        let res = router.dispatch(&mut ctx).unwrap();

        assert_eq!(route_tag(&res), "param");
    }

    #[test]
    fn method_comparison_ignores_case() {
        let mut router = Router::new();
        router.register("post", "/tasks", tagged("create")).unwrap();

        let mut ctx = RequestContext::new("POST", "/tasks");
        assert!(router.dispatch(&mut ctx).is_ok());

        assert!(router.find("Post", "/tasks").is_some());
        assert!(router.find("GET", "/tasks").is_none());
    }

    #[test]
    fn unmatched_request_is_not_found() {
        let mut router = Router::new();
        router.get("/tasks", tagged("list")).unwrap();

        let mut ctx = RequestContext::new("DELETE", "/tasks");
        match router.dispatch(&mut ctx) {
            Err(Error::Api(err)) => assert_eq!(err.status, 404),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn handler_errors_pass_through_unchanged() {
        let mut router = Router::new();
        router
            .get("/boom", |_ctx: &mut RequestContext, _params: &Params| {
                Err(ApiError::forbidden("nope").into())
            })
            .unwrap();

        let mut ctx = RequestContext::new("GET", "/boom");
        match router.dispatch(&mut ctx) {
            Err(Error::Api(err)) => {
                assert_eq!(err.status, 403);
                assert_eq!(err.message, "nope");
            }
            other => panic!("expected forbidden, got {other:?}"),
        }
    }

    #[test]
    fn handler_sees_context_mutations() {
        let mut router = Router::new();
        router
            .get("/whoami", |ctx: &mut RequestContext, _params: &Params| {
                ctx.set("visited", true);
                Ok(Response::text(ctx.user_id.clone().unwrap_or_default()))
            })
            .unwrap();

        let mut ctx = RequestContext::new("GET", "/whoami").with_user("u-1");
        let res = router.dispatch(&mut ctx).unwrap();

        assert_eq!(res.body, crate::response::Body::Text("u-1".to_string()));
        assert!(ctx.contains("visited"));
    }

    #[test]
    fn params_require_reports_missing_name() {
        let params = Params::default();
        assert_eq!(params.require("id").unwrap_err().status(), 400);
    }
}
