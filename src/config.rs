//! Runtime configuration.
//!
//! Every setting has a default, so an empty environment yields a working
//! configuration. [`RuntimeConfig::from_env`] overlays environment variables
//! on top of the defaults:
//!
//! | variable | setting |
//! |---|---|
//! | `CORS_ALLOW_ORIGIN` | [`CorsConfig::allow_origin`] |
//! | `CORS_ALLOW_METHODS` | [`CorsConfig::allow_methods`] |
//! | `CORS_ALLOW_HEADERS` | [`CorsConfig::allow_headers`] |
//! | `RATE_LIMIT_MAX_REQUESTS` | [`RateLimitConfig::max_requests`] |
//! | `RATE_LIMIT_WINDOW_MINUTES` | [`RateLimitConfig::window_minutes`] |
//! | `JWT_SECRET` | [`AuthConfig::jwt_secret`] |
//! | `JWT_LEEWAY_SECS` | [`AuthConfig::leeway_secs`] |
//! | `DATABASE_ID` | [`DocumentStoreConfig::default_database_id`] |

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::clock::Clock;
use crate::document::DocumentStoreConfig;
use crate::middleware::{Auth, AuthConfig, Cors, CorsConfig, RateLimit, RateLimitConfig, RateLimiter, RequestLogger};
use crate::pipeline::Pipeline;
use crate::secret::Secret;

/// Errors reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable holds a value that does not parse.
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        /// Variable name
        var: String,
        /// Offending value
        value: String,
        /// Parser message
        reason: String,
    },
}

/// All runtime settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// CORS headers
    pub cors: CorsConfig,
    /// Rate limiting
    pub rate_limit: RateLimitConfig,
    /// Token verification
    pub auth: AuthConfig,
    /// Document store
    pub documents: DocumentStoreConfig,
}

impl RuntimeConfig {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads settings through `lookup`, which returns a variable's value.
    ///
    /// # Examples
    ///
    /// ```
    /// use invocation_core::config::RuntimeConfig;
    ///
    /// let config = RuntimeConfig::from_lookup(|var| match var {
    ///     "RATE_LIMIT_MAX_REQUESTS" => Some("3".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(config.rate_limit.max_requests, 3);
    /// assert_eq!(config.cors.allow_origin, "*");
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = lookup("CORS_ALLOW_ORIGIN") {
            config.cors.allow_origin = v;
        }
        if let Some(v) = lookup("CORS_ALLOW_METHODS") {
            config.cors.allow_methods = v;
        }
        if let Some(v) = lookup("CORS_ALLOW_HEADERS") {
            config.cors.allow_headers = v;
        }
        if let Some(v) = lookup("RATE_LIMIT_MAX_REQUESTS") {
            config.rate_limit.max_requests = parse("RATE_LIMIT_MAX_REQUESTS", &v)?;
        }
        if let Some(v) = lookup("RATE_LIMIT_WINDOW_MINUTES") {
            config.rate_limit.window_minutes = parse("RATE_LIMIT_WINDOW_MINUTES", &v)?;
        }
        if let Some(v) = lookup("JWT_SECRET") {
            config.auth.jwt_secret = Some(Secret::new(v));
        }
        if let Some(v) = lookup("JWT_LEEWAY_SECS") {
            config.auth.leeway_secs = parse("JWT_LEEWAY_SECS", &v)?;
        }
        if let Some(v) = lookup("DATABASE_ID") {
            config.documents.default_database_id = v;
        }

        debug!(
            max_requests = config.rate_limit.max_requests,
            window_minutes = config.rate_limit.window_minutes,
            auth_enabled = config.auth.jwt_secret.is_some(),
            "runtime configuration loaded"
        );
        Ok(config)
    }

    /// Assembles the standard pipeline: request logging, CORS, rate
    /// limiting, then authentication when a JWT secret is configured.
    pub fn pipeline(&self, clock: Arc<dyn Clock>) -> Pipeline {
        let limiter = Arc::new(RateLimiter::with_clock(self.rate_limit, clock));
        let pipeline = Pipeline::new()
            .with(RequestLogger)
            .with(Cors::new(self.cors.clone()))
            .with(RateLimit::new(limiter));

        match Auth::from_config(&self.auth) {
            Some(auth) => pipeline.with(auth),
            None => pipeline,
        }
    }
}

fn parse<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        var: var.to_string(),
        value: value.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.cors, CorsConfig::default());
        assert_eq!(config.rate_limit, RateLimitConfig::default());
        assert!(config.auth.jwt_secret.is_none());
        assert_eq!(config.documents.default_database_id, "default");
    }

    #[test]
    fn variables_override_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("CORS_ALLOW_ORIGIN", "https://app.example.com"),
            ("RATE_LIMIT_MAX_REQUESTS", "3"),
            ("RATE_LIMIT_WINDOW_MINUTES", "1"),
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_ID", "prod"),
        ]))
        .unwrap();

        assert_eq!(config.cors.allow_origin, "https://app.example.com");
        assert_eq!(config.rate_limit.max_requests, 3);
        assert_eq!(config.rate_limit.window_minutes, 1);
        assert_eq!(config.auth.jwt_secret.as_ref().unwrap().expose_secret(), "s3cret");
        assert_eq!(config.documents.default_database_id, "prod");
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = RuntimeConfig::from_lookup(lookup(&[("JWT_SECRET", "  ")])).unwrap();
        assert!(config.auth.jwt_secret.is_none());
    }

    #[test]
    fn unparsable_number_is_an_error() {
        let err = RuntimeConfig::from_lookup(lookup(&[("RATE_LIMIT_MAX_REQUESTS", "lots")])).unwrap_err();

        match err {
            ConfigError::Invalid { var, value, .. } => {
                assert_eq!(var, "RATE_LIMIT_MAX_REQUESTS");
                assert_eq!(value, "lots");
            }
        }
    }

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let config = RuntimeConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn pipeline_includes_auth_only_with_secret() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());

        let open = RuntimeConfig::default().pipeline(Arc::clone(&clock));
        assert_eq!(open.names().collect::<Vec<_>>(), ["request_log", "cors", "rate_limit"]);

        let secured = RuntimeConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")]))
            .unwrap()
            .pipeline(clock);
        assert_eq!(
            secured.names().collect::<Vec<_>>(),
            ["request_log", "cors", "rate_limit", "auth"]
        );
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{ "rate_limit": { "max_requests": 10 } }"#).unwrap();

        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window_minutes, 15);
    }
}
