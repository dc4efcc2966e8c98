//! Adapter from the raw platform payload to a [`RequestContext`].

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::request::{HeaderMap, RequestContext, TriggerKind};

use super::IntoRequestContext;

/// Header carrying the trigger kind (`http`, `schedule` or `event`).
pub const TRIGGER_HEADER: &str = "x-appwrite-trigger";
/// Header carrying the event name of event-triggered invocations.
pub const EVENT_HEADER: &str = "x-appwrite-event";
/// Header carrying the calling user's id.
pub const USER_ID_HEADER: &str = "x-appwrite-user-id";
/// Header carrying the calling user's JWT.
pub const USER_JWT_HEADER: &str = "x-appwrite-user-jwt";

/// The invocation payload as supplied by the hosting platform.
///
/// Every field is optional on the wire.
///
/// # Examples
///
/// ```
/// use invocation_core::web::{Invocation, IntoRequestContext};
///
/// let invocation: Invocation = serde_json::from_str(r#"{
///     "method": "post",
///     "path": "/tasks",
///     "headers": { "Content-Type": "application/json", "x-appwrite-user-id": "u-1" },
///     "queryString": "page=2",
///     "bodyRaw": "{\"title\":\"Ship it\"}"
/// }"#).unwrap();
///
/// let ctx = invocation.into_request_context();
/// assert_eq!(ctx.method, "POST");
/// assert_eq!(ctx.query_param("page"), Some("2"));
/// assert_eq!(ctx.body_field("title").unwrap(), "Ship it");
/// assert_eq!(ctx.user_id.as_deref(), Some("u-1"));
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Invocation {
    /// HTTP method
    pub method: String,
    /// Request headers, any case
    pub headers: HashMap<String, String>,
    /// Decoded query parameters, when the platform already parsed them
    pub query: HashMap<String, String>,
    /// Raw query string without the leading `?`
    pub query_string: String,
    /// Raw body text
    pub body_raw: String,
    /// Pre-parsed body, when the platform supplies one
    pub body: Option<Value>,
    /// Request path
    pub path: String,
    /// Full request URL
    pub url: String,
    /// Host name
    pub host: String,
    /// `http` or `https`
    pub scheme: String,
}

impl Invocation {
    /// Creates a payload for `method` and `path`.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the raw query string.
    pub fn with_query_string(mut self, query: impl Into<String>) -> Self {
        self.query_string = query.into();
        self
    }

    /// Sets the raw body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body_raw = body.into();
        self
    }
}

/// Maps an [`Invocation`] onto a [`RequestContext`].
///
/// - header names are lowercased
/// - the query map is used as given, or parsed from the query string (or
///   the URL) when empty
/// - the body is parsed as JSON when possible; otherwise only the raw text
///   is kept
/// - trigger kind, event name, user id and JWT come from the platform
///   headers, with unknown trigger values treated as `http`
///
/// The context always starts unauthenticated; the auth middleware decides.
#[derive(Debug, Clone)]
pub struct InvocationAdapter {
    trigger_header: String,
    event_header: String,
    user_id_header: String,
    user_jwt_header: String,
}

impl Default for InvocationAdapter {
    fn default() -> Self {
        Self {
            trigger_header: TRIGGER_HEADER.to_string(),
            event_header: EVENT_HEADER.to_string(),
            user_id_header: USER_ID_HEADER.to_string(),
            user_jwt_header: USER_JWT_HEADER.to_string(),
        }
    }
}

impl InvocationAdapter {
    /// Creates an adapter reading the default platform headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the trigger kind from `name` instead.
    pub fn trigger_header(mut self, name: &str) -> Self {
        self.trigger_header = name.to_ascii_lowercase();
        self
    }

    /// Reads the event name from `name` instead.
    pub fn event_header(mut self, name: &str) -> Self {
        self.event_header = name.to_ascii_lowercase();
        self
    }

    /// Reads the user id from `name` instead.
    pub fn user_id_header(mut self, name: &str) -> Self {
        self.user_id_header = name.to_ascii_lowercase();
        self
    }

    /// Reads the JWT from `name` instead.
    pub fn user_jwt_header(mut self, name: &str) -> Self {
        self.user_jwt_header = name.to_ascii_lowercase();
        self
    }

    /// Builds the context for `invocation`.
    pub fn adapt(&self, invocation: Invocation) -> RequestContext {
        let parsed_url = Url::parse(&invocation.url).ok();

        let path = if !invocation.path.is_empty() {
            invocation.path
        } else {
            parsed_url
                .as_ref()
                .map(|u| u.path().to_string())
                .unwrap_or_else(|| "/".to_string())
        };
        let method = if invocation.method.is_empty() {
            "GET".to_string()
        } else {
            invocation.method
        };

        let mut ctx = RequestContext::new(method, path);
        ctx.headers = invocation.headers.into_iter().collect::<HeaderMap>();
        ctx.query = if !invocation.query.is_empty() {
            invocation.query
        } else {
            let raw = if !invocation.query_string.is_empty() {
                invocation.query_string.trim_start_matches('?').to_string()
            } else {
                parsed_url
                    .as_ref()
                    .and_then(|u| u.query())
                    .unwrap_or_default()
                    .to_string()
            };
            parse_query(&raw)
        };

        ctx.body = match invocation.body {
            Some(Value::Null) | Some(Value::String(_)) | None => parse_body(&invocation.body_raw),
            Some(value) => Some(value),
        };
        ctx.body_raw = invocation.body_raw;
        ctx.url = invocation.url;
        ctx.host = if invocation.host.is_empty() {
            parsed_url
                .as_ref()
                .and_then(|u| u.host_str())
                .unwrap_or_default()
                .to_string()
        } else {
            invocation.host
        };

        ctx.trigger = match ctx.header(&self.trigger_header) {
            Some(raw) => raw.parse().unwrap_or_else(|err: String| {
                debug!(reason = %err, "unrecognized trigger, treating as http");
                TriggerKind::Http
            }),
            None => TriggerKind::Http,
        };
        ctx.event = non_empty(ctx.header(&self.event_header));
        ctx.user_id = non_empty(ctx.header(&self.user_id_header));
        if let Some(jwt) = non_empty(ctx.header(&self.user_jwt_header)) {
            ctx = ctx.with_jwt(jwt);
        }

        ctx
    }
}

impl IntoRequestContext for Invocation {
    fn into_request_context(self) -> RequestContext {
        InvocationAdapter::default().adapt(self)
    }
}

fn parse_query(raw: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}

fn parse_body(raw: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }
    serde_json::from_str(raw).ok()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_names_are_lowercased() {
        let ctx = Invocation::new("GET", "/")
            .with_header("X-Request-Id", "abc")
            .into_request_context();

        assert_eq!(ctx.headers.iter().next(), Some(("x-request-id", "abc")));
    }

    #[test]
    fn query_string_is_decoded_when_map_is_empty() {
        let ctx = Invocation::new("GET", "/search")
            .with_query_string("?q=hello%20world&tag=a+b")
            .into_request_context();

        assert_eq!(ctx.query_param("q"), Some("hello world"));
        assert_eq!(ctx.query_param("tag"), Some("a b"));
    }

    #[test]
    fn supplied_query_map_wins_over_query_string() {
        let mut invocation = Invocation::new("GET", "/").with_query_string("page=9");
        invocation.query.insert("page".to_string(), "1".to_string());

        assert_eq!(invocation.into_request_context().query_param("page"), Some("1"));
    }

    #[test]
    fn non_json_body_keeps_raw_text_only() {
        let ctx = Invocation::new("POST", "/")
            .with_body("plain words")
            .into_request_context();

        assert!(ctx.body.is_none());
        assert_eq!(ctx.body_raw, "plain words");
    }

    #[test]
    fn json_body_is_parsed() {
        let ctx = Invocation::new("POST", "/")
            .with_body(r#"{"done":true}"#)
            .into_request_context();

        assert_eq!(ctx.body, Some(json!({ "done": true })));
    }

    #[test]
    fn platform_headers_populate_identity_and_trigger() {
        let ctx = Invocation::new("POST", "/hooks")
            .with_header("X-Appwrite-Trigger", "event")
            .with_header("X-Appwrite-Event", "databases.*.documents.*.create")
            .with_header("X-Appwrite-User-Id", "user-9")
            .with_header("X-Appwrite-User-JWT", "aaa.bbb.ccc")
            .into_request_context();

        assert_eq!(ctx.trigger, TriggerKind::Event);
        assert_eq!(ctx.event.as_deref(), Some("databases.*.documents.*.create"));
        assert_eq!(ctx.user_id.as_deref(), Some("user-9"));
        assert_eq!(ctx.jwt.as_ref().unwrap().expose_secret(), "aaa.bbb.ccc");
        assert!(!ctx.authenticated);
    }

    #[test]
    fn unknown_trigger_falls_back_to_http() {
        let ctx = Invocation::new("GET", "/")
            .with_header(TRIGGER_HEADER, "webhook")
            .into_request_context();

        assert_eq!(ctx.trigger, TriggerKind::Http);
    }

    #[test]
    fn path_query_and_host_fall_back_to_url() {
        let mut invocation = Invocation::default();
        invocation.url = "https://fn.example.com/tasks/7?expand=1".to_string();

        let ctx = invocation.into_request_context();

        assert_eq!(ctx.method, "GET");
        assert_eq!(ctx.path, "/tasks/7");
        assert_eq!(ctx.query_param("expand"), Some("1"));
        assert_eq!(ctx.host, "fn.example.com");
    }

    #[test]
    fn custom_identity_headers() {
        let adapter = InvocationAdapter::new().user_id_header("X-User");
        let ctx = adapter.adapt(Invocation::new("GET", "/").with_header("x-user", "u-2"));

        assert_eq!(ctx.user_id.as_deref(), Some("u-2"));
    }

    #[test]
    fn custom_trigger_headers() {
        let adapter = InvocationAdapter::new()
            .trigger_header("X-Source")
            .event_header("X-Source-Event");
        let ctx = adapter.adapt(
            Invocation::new("POST", "/hooks")
                .with_header("X-Source", "event")
                .with_header("X-Source-Event", "buckets.uploads.files.create")
                .with_header("X-Appwrite-Event", "ignored"),
        );

        assert_eq!(ctx.trigger, TriggerKind::Event);
        assert_eq!(ctx.event.as_deref(), Some("buckets.uploads.files.create"));
    }
}
