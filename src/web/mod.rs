//! Invocation boundary.
//!
//! This module turns the payload handed over by the hosting platform into a
//! [`RequestContext`](crate::RequestContext). It contains no transport code:
//! the host delivers one payload per invocation and receives the rendered
//! [`Response::to_platform_json`](crate::Response::to_platform_json) envelope
//! back.
//!
//! # Integration Flow
//!
//! ```text
//! Platform payload
//!   ↓
//! Invocation (serde) → InvocationAdapter → RequestContext
//!   ↓
//! App::handle: Pipeline::execute → Router::dispatch → handler
//!   ↓
//! Response → to_platform_json()
//! ```
//!
//! Hosts with a different payload shape implement [`IntoRequestContext`]
//! for it and call [`App::invoke`](crate::App::invoke) directly.

mod adapter;
pub mod example_handler;
mod extract;

pub use adapter::{
    Invocation, InvocationAdapter, EVENT_HEADER, TRIGGER_HEADER, USER_ID_HEADER, USER_JWT_HEADER,
};
pub use extract::IntoRequestContext;
