//! Built-in middleware units.
//!
//! Each unit is configured through an explicit configuration value and
//! plugs into a [`Pipeline`](crate::Pipeline) through
//! [`Middleware`](crate::Middleware):
//!
//! - [`RequestLogger`]: logs the request and starts the request timer
//! - [`Cors`]: attaches `access-control-allow-*` response headers
//! - [`RateLimit`]: fixed-window limiting per client identifier
//! - [`Auth`]: JWT verification

mod auth;
mod cors;
mod rate_limit;
mod request_log;

pub use auth::{Auth, AuthConfig, Claims, JwtVerifier, TokenVerifier};
pub use cors::{Cors, CorsConfig};
pub use rate_limit::{RateDecision, RateLimit, RateLimitConfig, RateLimiter, PURGE_INTERVAL};
pub use request_log::{RequestLogger, REQUEST_TIMER};
