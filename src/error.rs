use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;

/// Convenience alias used by middleware, handlers and the router.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can abort an invocation.
///
/// `Api` and `Validation` are the two expected failure kinds: the invoking
/// layer translates them into structured error responses. `Internal` covers
/// every other fault; it is logged in full and surfaced only as a generic
/// internal-error response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A business or protocol failure with an explicit status code.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// One or more input fields failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// An unexpected fault.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Wraps any error as an unexpected internal fault.
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Internal(anyhow::Error::new(err))
    }

    /// Status code the invoking layer should respond with.
    pub fn status(&self) -> u16 {
        match self {
            Error::Api(e) => e.status,
            Error::Validation(_) => ValidationError::STATUS,
            Error::Internal(_) => 500,
        }
    }
}

/// An error carrying a message and an HTTP-style status code.
///
/// # Examples
///
/// ```
/// use invocation_core::ApiError;
///
/// let err = ApiError::not_found("Task not found");
/// assert_eq!(err.status, 404);
/// assert_eq!(err.to_string(), "404: Task not found");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    /// Status code for the response
    pub status: u16,
    /// Human-readable message, safe to show to the caller
    pub message: String,
    /// How long the caller should wait before retrying, if known
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// Creates an error with an arbitrary status code.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    /// 401 Unauthorized.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message)
    }

    /// 403 Forbidden.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, message)
    }

    /// 404 Not Found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    /// 429 Too Many Requests, with the time left until the caller may retry.
    pub fn too_many_requests(message: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(429, message)
        }
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }
}

/// Aggregated validation failures, keyed by field name.
///
/// Fields keep the order in which they were evaluated; each field holds its
/// violation messages in the order they were recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationError {
    fields: IndexMap<String, Vec<String>>,
}

impl ValidationError {
    /// Status code used when a validation failure is turned into a response.
    pub const STATUS: u16 = 400;

    /// Creates an empty error with no failing fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a violation message for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Merges every violation of `other` into `self`.
    pub fn merge(&mut self, other: ValidationError) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    /// Returns `true` if no field failed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of failing fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Messages recorded for `field`, if it failed.
    pub fn messages(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Iterates over failing fields in evaluation order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    /// Returns `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed")?;
        for (i, (field, messages)) in self.fields.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}
