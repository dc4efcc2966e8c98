//! Response descriptors returned by handlers.

use base64::Engine as _;
use serde_json::{json, Value};

use crate::error::ValidationError;
use crate::request::HeaderMap;

/// Response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// JSON document
    Json(Value),
    /// Plain text
    Text(String),
    /// Raw bytes
    Binary(Vec<u8>),
    /// No body
    Empty,
}

/// A status code, headers and a body.
///
/// # Examples
///
/// ```
/// use invocation_core::{Body, Response};
/// use serde_json::json;
///
/// let res = Response::success(json!({ "id": "42" }));
/// assert_eq!(res.status, 200);
/// assert_eq!(res.body, Body::Json(json!({ "success": true, "data": { "id": "42" } })));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Payload
    pub body: Body,
}

impl Response {
    /// Creates a response with no headers.
    pub fn new(status: u16, body: Body) -> Self {
        let mut res = Self {
            status,
            headers: HeaderMap::new(),
            body,
        };
        if let Some(content_type) = res.default_content_type() {
            res.headers.insert("content-type", content_type);
        }
        res
    }

    /// 200 with `{"success": true, "data": data}`.
    pub fn success(data: Value) -> Self {
        Self::new(200, Body::Json(json!({ "success": true, "data": data })))
    }

    /// 201 with `{"success": true, "data": data}`.
    pub fn created(data: Value) -> Self {
        Self::new(201, Body::Json(json!({ "success": true, "data": data })))
    }

    /// `status` with `{"success": false, "error": message}`.
    pub fn error(message: impl Into<String>, status: u16) -> Self {
        Self::new(
            status,
            Body::Json(json!({ "success": false, "error": message.into() })),
        )
    }

    /// 401 error response.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::error(message, 401)
    }

    /// Validation failure listing every failing field.
    pub fn validation(errors: &ValidationError) -> Self {
        Self::new(
            ValidationError::STATUS,
            Body::Json(json!({
                "success": false,
                "error": "Validation failed",
                "errors": errors,
            })),
        )
    }

    /// 204 with no body.
    pub fn empty() -> Self {
        Self::new(204, Body::Empty)
    }

    /// 200 with a plain-text body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(200, Body::Text(body.into()))
    }

    /// 301 (permanent) or 302 redirect to `location`.
    pub fn redirect(location: impl Into<String>, permanent: bool) -> Self {
        let status = if permanent { 301 } else { 302 };
        Self::new(status, Body::Empty).with_header("location", location)
    }

    /// 200 with raw bytes of the given content type.
    pub fn binary(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self::new(200, Body::Binary(bytes)).with_header("content-type", content_type)
    }

    /// Sets a header, replacing any existing value.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Overrides the status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Renders the envelope handed back to the hosting platform.
    ///
    /// Binary bodies are base64-encoded and flagged with `isBase64Encoded`.
    pub fn to_platform_json(&self) -> Value {
        let headers: serde_json::Map<String, Value> = self
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();

        let (body, is_base64) = match &self.body {
            Body::Json(value) => (value.to_string(), false),
            Body::Text(text) => (text.clone(), false),
            Body::Binary(bytes) => (
                base64::engine::general_purpose::STANDARD.encode(bytes),
                true,
            ),
            Body::Empty => (String::new(), false),
        };

        json!({
            "statusCode": self.status,
            "headers": headers,
            "body": body,
            "isBase64Encoded": is_base64,
        })
    }

    fn default_content_type(&self) -> Option<&'static str> {
        match self.body {
            Body::Json(_) => Some("application/json"),
            Body::Text(_) => Some("text/plain; charset=utf-8"),
            Body::Binary(_) => Some("application/octet-stream"),
            Body::Empty => None,
        }
    }
}
