//! Request-processing runtime for serverless function invocations.
//!
//! One invocation flows through four stages:
//! - **Boundary**: the platform payload becomes a [`RequestContext`]
//!   ([`web`])
//! - **Pipeline**: ordered [`Middleware`] units run over the context and may
//!   abort with an error ([`Pipeline`], [`middleware`])
//! - **Routing**: the first route whose method and `:param` pattern match
//!   handles the request ([`Router`])
//! - **Validation**: handlers check body, query and header input against
//!   rule strings such as `required|string|min:3` ([`validation`])
//!
//! [`App`] ties these together and turns every error into a [`Response`].
//!
//! # Core Types
//!
//! - [`RequestContext`]: everything known about one invocation
//! - [`Pipeline`] / [`Middleware`]: abortable, ordered cross-cutting steps
//! - [`Router`] / [`PathPattern`] / [`Params`]: first-match dispatch
//! - [`validation::Schema`]: compiled per-field rule chains
//! - [`ApiError`] / [`ValidationError`]: the two expected failure kinds
//! - [`Secret<T>`]: keeps tokens out of logs
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use invocation_core::config::RuntimeConfig;
//! use invocation_core::validation::validate;
//! use invocation_core::web::Invocation;
//! use invocation_core::{App, ManualClock, Params, RequestContext, Response, Router};
//! use serde_json::json;
//!
//! let mut router = Router::new();
//! router
//!     .post("/greet/:name", |ctx: &mut RequestContext, params: &Params| {
//!         let body = ctx.body.clone().unwrap_or_default();
//!         validate([("greeting", "required|string|max:20")], &body)?;
//!         Ok(Response::success(json!({
//!             "message": format!("{}, {}!", body["greeting"].as_str().unwrap_or_default(), params.require("name")?),
//!         })))
//!     })
//!     .unwrap();
//!
//! let config = RuntimeConfig::default();
//! let app = App::new(config.pipeline(Arc::new(ManualClock::new())), router);
//!
//! let res = app.invoke(Invocation::new("POST", "/greet/Ada").with_body(r#"{"greeting":"Hello"}"#));
//! assert_eq!(res.status, 200);
//!
//! let res = app.invoke(Invocation::new("POST", "/greet/Ada").with_body("{}"));
//! assert_eq!(res.status, 400);
//! assert_eq!(res.to_platform_json()["statusCode"], 400);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod app;
mod clock;
pub mod config;
pub mod document;
mod error;
mod logging;
pub mod middleware;
mod pipeline;
mod request;
mod response;
mod router;
mod secret;
pub mod validation;
pub mod web;

pub use app::{App, INTERNAL_ERROR_MESSAGE};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ApiError, Error, Result, ValidationError};
pub use logging::RequestLog;
pub use pipeline::{Middleware, Pipeline};
pub use request::{HeaderMap, RequestContext, TriggerKind, ANONYMOUS_CLIENT};
pub use response::{Body, Response};
pub use router::{Handler, Params, PathPattern, Route, RouteError, Router, Segment, CAPTURE_PREFIX};
pub use secret::Secret;
