use std::fmt;

use serde::{Deserialize, Deserializer};

/// A wrapper that keeps tokens and signing keys out of logs.
///
/// The request context stores the caller's JWT as a `Secret<String>` and the
/// auth configuration stores its signing key the same way, so a context or a
/// config can be passed to `tracing::debug!(?ctx)` without leaking either.
///
/// # Examples
///
/// ```
/// use invocation_core::Secret;
///
/// let token = Secret::new("eyJhbGciOiJIUzI1NiJ9.e30.sig".to_string());
///
/// assert_eq!(format!("{:?}", token), "[REDACTED]");
/// assert_eq!(format!("{}", token), "[REDACTED]");
/// assert!(token.expose_secret().starts_with("eyJ"));
/// ```
pub struct Secret<T> {
    inner: T,
}

impl<T> Secret<T> {
    /// Wraps a sensitive value.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    /// Returns the wrapped value. Callers must not log the result.
    pub fn expose_secret(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Secret<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Secret::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_redacts_debug() {
        let jwt = Secret::new("header.payload.signature".to_string());
        let debug_output = format!("{:?}", jwt);

        assert_eq!(debug_output, "[REDACTED]");
        assert!(!debug_output.contains("payload"));
        assert!(!debug_output.contains("String"));
    }

    #[test]
    fn secret_redacts_display() {
        let key = Secret::new("signing-key");
        assert_eq!(format!("{}", key), "[REDACTED]");
    }

    #[test]
    fn secret_redacts_inside_derived_debug() {
        #[derive(Debug)]
        struct Holder {
            token: Option<Secret<String>>,
        }

        let holder = Holder {
            token: Some(Secret::new("abc.def.ghi".to_string())),
        };
        let out = format!("{:?}", holder);

        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("abc.def.ghi"));
    }

    #[test]
    fn secret_deserializes_transparently() {
        let secret: Secret<String> = serde_json::from_str("\"top-secret\"").unwrap();
        assert_eq!(secret.expose_secret(), "top-secret");
    }
}
