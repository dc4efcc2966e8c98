//! JWT authentication.

use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::pipeline::Middleware;
use crate::request::RequestContext;
use crate::secret::Secret;

fn default_leeway_secs() -> u64 {
    60
}

/// Settings for token verification.
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret; the auth unit is disabled without one
    #[serde(default)]
    pub jwt_secret: Option<Secret<String>>,
    /// Clock skew tolerated on `exp`, in seconds
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            leeway_secs: default_leeway_secs(),
        }
    }
}

/// Claims read from a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id
    pub sub: String,
    /// Expiry, seconds since the Unix epoch
    pub exp: u64,
    /// Issued-at, seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

/// Checks a bearer token and returns its claims.
pub trait TokenVerifier: Send + Sync {
    /// Verifies `token`. Failures are reported as 401 errors.
    fn verify(&self, token: &str) -> std::result::Result<Claims, ApiError>;
}

/// HS256 verifier requiring `exp` and `sub`.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Creates a verifier for tokens signed with `secret`.
    pub fn hs256(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }

    /// Sets the tolerated clock skew.
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.validation.leeway = secs;
        self
    }
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithm", &Algorithm::HS256)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> std::result::Result<Claims, ApiError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                debug!(reason = %err, "token rejected");
                ApiError::unauthorized("Invalid token")
            })
    }
}

/// Requires a valid JWT on every request.
///
/// On success the context's `user_id` becomes the token subject and
/// `authenticated` is set. A missing token fails with 401
/// `"Authentication required"`, a rejected one with 401 `"Invalid token"`.
#[derive(Clone)]
pub struct Auth {
    verifier: Arc<dyn TokenVerifier>,
}

impl Auth {
    /// Creates the unit around a verifier.
    pub fn new(verifier: impl TokenVerifier + 'static) -> Self {
        Self {
            verifier: Arc::new(verifier),
        }
    }

    /// Creates the unit from configuration, or `None` when no secret is set.
    pub fn from_config(config: &AuthConfig) -> Option<Self> {
        let secret = config.jwt_secret.as_ref()?;
        let verifier = JwtVerifier::hs256(secret.expose_secret()).with_leeway(config.leeway_secs);
        Some(Self::new(verifier))
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth").finish_non_exhaustive()
    }
}

impl Middleware for Auth {
    fn name(&self) -> &str {
        "auth"
    }

    fn handle(&self, ctx: &mut RequestContext) -> Result<()> {
        let token = ctx
            .jwt
            .as_ref()
            .map(|t| t.expose_secret().as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

        let claims = self.verifier.verify(token)?;
        debug!(user_id = %claims.sub, "request authenticated");
        ctx.user_id = Some(claims.sub);
        ctx.authenticated = true;
        Ok(())
    }
}
