//! The per-invocation request context.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::logging::RequestLog;
use crate::secret::Secret;

/// Identifier used by [`RequestContext::client_id`] when nothing better is known.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// What caused the invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// An HTTP request.
    #[default]
    Http,
    /// A scheduled (cron) execution.
    Schedule,
    /// A platform event.
    Event,
}

impl TriggerKind {
    /// Lowercase wire name of the trigger.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Http => "http",
            TriggerKind::Schedule => "schedule",
            TriggerKind::Event => "event",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(TriggerKind::Http),
            "schedule" => Ok(TriggerKind::Schedule),
            "event" => Ok(TriggerKind::Event),
            other => Err(format!("unknown trigger kind '{other}'")),
        }
    }
}

/// Header map with case-insensitive keys.
///
/// Keys are stored lowercased; lookups lowercase the requested name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    inner: BTreeMap<String, String>,
}

impl HeaderMap {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any value stored under the same name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Returns the value stored under `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns `true` if a header named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&name.to_ascii_lowercase())
    }

    /// Removes and returns the header named `name`.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.inner.remove(&name.to_ascii_lowercase())
    }

    /// Iterates over `(lowercase name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Copies every header of `other` into `self`, overwriting duplicates.
    pub fn extend_from(&mut self, other: &HeaderMap) {
        for (k, v) in &other.inner {
            self.inner.insert(k.clone(), v.clone());
        }
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    started: Instant,
    stopped: Option<Duration>,
}

/// Everything known about one invocation.
///
/// Built once at the invocation boundary, then threaded mutably through the
/// middleware pipeline and into the matched handler. Middleware writes are
/// visible to every later unit and to the handler.
#[derive(Debug)]
pub struct RequestContext {
    /// HTTP method, uppercase
    pub method: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
    /// Raw body text
    pub body_raw: String,
    /// Parsed JSON body, if the raw body was JSON
    pub body: Option<Value>,
    /// Request path, without query string
    pub path: String,
    /// Full request URL
    pub url: String,
    /// Host the request was addressed to
    pub host: String,
    /// Identifier of the calling user, if any
    pub user_id: Option<String>,
    /// The caller's JWT, if supplied
    pub jwt: Option<Secret<String>>,
    /// Set by the auth middleware once the JWT was verified
    pub authenticated: bool,
    /// What caused this invocation
    pub trigger: TriggerKind,
    /// Event name for event-triggered invocations
    pub event: Option<String>,
    /// Headers middleware wants attached to the eventual response
    pub response_headers: HeaderMap,
    store: HashMap<String, Value>,
    timers: HashMap<String, Timer>,
}

impl RequestContext {
    /// Creates a context for `method` and `path` with every other field empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use invocation_core::{RequestContext, TriggerKind};
    ///
    /// let ctx = RequestContext::new("get", "/tasks/42");
    /// assert_eq!(ctx.method, "GET");
    /// assert_eq!(ctx.trigger, TriggerKind::Http);
    /// assert!(!ctx.authenticated);
    /// ```
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            headers: HeaderMap::new(),
            query: HashMap::new(),
            body_raw: String::new(),
            body: None,
            path: path.into(),
            url: String::new(),
            host: String::new(),
            user_id: None,
            jwt: None,
            authenticated: false,
            trigger: TriggerKind::Http,
            event: None,
            response_headers: HeaderMap::new(),
            store: HashMap::new(),
            timers: HashMap::new(),
        }
    }

    /// Adds a request header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Sets a JSON body; the raw body becomes its serialization.
    pub fn with_json_body(mut self, body: Value) -> Self {
        self.body_raw = body.to_string();
        self.body = Some(body);
        self
    }

    /// Sets the caller's user id.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the caller's JWT.
    pub fn with_jwt(mut self, token: impl Into<String>) -> Self {
        self.jwt = Some(Secret::new(token.into()));
        self
    }

    /// Sets the trigger kind and optional event name.
    pub fn with_trigger(mut self, trigger: TriggerKind, event: Option<String>) -> Self {
        self.trigger = trigger;
        self.event = event;
        self
    }

    /// Returns a request header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Returns a top-level field of the JSON body.
    pub fn body_field(&self, key: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|b| b.get(key))
    }

    /// Query parameters as a JSON object, for schema validation.
    pub fn query_json(&self) -> Value {
        Value::Object(
            self.query
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }

    /// Headers as a JSON object with lowercase keys, for schema validation.
    pub fn headers_json(&self) -> Value {
        Value::Object(
            self.headers
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
        )
    }

    /// A logger stamped with this invocation's method, path and trigger.
    pub fn log(&self) -> RequestLog<'_> {
        RequestLog::new(self)
    }

    /// Identifier used to attribute requests to a client.
    ///
    /// The user id when known, otherwise the first `x-forwarded-for` address,
    /// otherwise `x-real-ip`, otherwise [`ANONYMOUS_CLIENT`].
    pub fn client_id(&self) -> String {
        if let Some(user) = self.user_id.as_deref().filter(|u| !u.is_empty()) {
            return user.to_string();
        }
        let forwarded = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
        self.header("x-real-ip")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(ANONYMOUS_CLIENT)
            .to_string()
    }

    // ------------------------------------------------------------------
    // Context store
    // ------------------------------------------------------------------

    /// Stores a value for later middleware or the handler.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.store.insert(key.into(), value.into());
    }

    /// Reads a stored value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.store.get(key)
    }

    /// Removes a stored value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.store.remove(key)
    }

    /// Returns `true` if `key` is stored.
    pub fn contains(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Starts (or restarts) the timer named `label`.
    pub fn start_timer(&mut self, label: impl Into<String>) {
        self.timers.insert(
            label.into(),
            Timer {
                started: Instant::now(),
                stopped: None,
            },
        );
    }

    /// Stops the timer named `label` and returns its elapsed time.
    ///
    /// Stopping an already stopped timer returns the recorded duration.
    pub fn stop_timer(&mut self, label: &str) -> Option<Duration> {
        let timer = self.timers.get_mut(label)?;
        let started = timer.started;
        let elapsed = *timer.stopped.get_or_insert_with(|| started.elapsed());
        Some(elapsed)
    }

    /// Elapsed time of `label`: the recorded duration once stopped, the
    /// running time otherwise.
    pub fn elapsed(&self, label: &str) -> Option<Duration> {
        self.timers
            .get(label)
            .map(|t| t.stopped.unwrap_or_else(|| t.started.elapsed()))
    }

    /// Labels of every timer, stopped or running.
    pub fn timer_labels(&self) -> impl Iterator<Item = &str> {
        self.timers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let ctx = RequestContext::new("GET", "/").with_header("Content-Type", "application/json");

        assert_eq!(ctx.header("content-type"), Some("application/json"));
        assert_eq!(ctx.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn method_is_uppercased() {
        assert_eq!(RequestContext::new("patch", "/").method, "PATCH");
    }

    #[test]
    fn store_round_trips_values() {
        let mut ctx = RequestContext::new("GET", "/");
        ctx.set("tenant", "acme");
        ctx.set("attempt", 3);

        assert_eq!(ctx.get("tenant"), Some(&json!("acme")));
        assert!(ctx.contains("attempt"));
        assert_eq!(ctx.remove("attempt"), Some(json!(3)));
        assert!(!ctx.contains("attempt"));
    }

    #[test]
    fn client_id_prefers_user_then_forwarded_then_real_ip() {
        let ctx = RequestContext::new("GET", "/")
            .with_header("x-forwarded-for", "10.0.0.1, 10.0.0.2")
            .with_header("x-real-ip", "10.0.0.9");
        assert_eq!(ctx.client_id(), "10.0.0.1");

        let ctx = ctx.with_user("user-7");
        assert_eq!(ctx.client_id(), "user-7");

        let ctx = RequestContext::new("GET", "/").with_header("x-real-ip", "10.0.0.9");
        assert_eq!(ctx.client_id(), "10.0.0.9");

        assert_eq!(RequestContext::new("GET", "/").client_id(), ANONYMOUS_CLIENT);
    }

    #[test]
    fn stopped_timer_keeps_its_duration() {
        let mut ctx = RequestContext::new("GET", "/");
        ctx.start_timer("db");

        let first = ctx.stop_timer("db").unwrap();
        let second = ctx.stop_timer("db").unwrap();

        assert_eq!(first, second);
        assert_eq!(ctx.elapsed("db"), Some(first));
        assert!(ctx.stop_timer("missing").is_none());
    }

    #[test]
    fn body_field_reads_json_body() {
        let ctx = RequestContext::new("POST", "/").with_json_body(json!({ "title": "Write docs" }));

        assert_eq!(ctx.body_field("title"), Some(&json!("Write docs")));
        assert!(ctx.body_raw.contains("Write docs"));
    }

    #[test]
    fn jwt_is_redacted_in_debug_output() {
        let ctx = RequestContext::new("GET", "/").with_jwt("aaa.bbb.ccc");
        let out = format!("{:?}", ctx);

        assert!(!out.contains("aaa.bbb.ccc"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn trigger_kind_parses_wire_names() {
        assert_eq!("schedule".parse::<TriggerKind>(), Ok(TriggerKind::Schedule));
        assert_eq!("EVENT".parse::<TriggerKind>(), Ok(TriggerKind::Event));
        assert!("cron".parse::<TriggerKind>().is_err());
    }

    #[test]
    fn query_and_headers_render_as_json_objects() {
        let ctx = RequestContext::new("GET", "/tasks")
            .with_query("status", "open")
            .with_header("X-Api-Version", "2");

        assert_eq!(ctx.query_json(), json!({ "status": "open" }));
        assert_eq!(ctx.headers_json(), json!({ "x-api-version": "2" }));
    }
}
