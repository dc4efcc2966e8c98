//! CORS response headers.

use serde::Deserialize;

use crate::error::Result;
use crate::pipeline::Middleware;
use crate::request::RequestContext;

fn default_allow_origin() -> String {
    "*".to_string()
}

fn default_allow_methods() -> String {
    "GET, POST, PUT, PATCH, DELETE, OPTIONS".to_string()
}

fn default_allow_headers() -> String {
    "Content-Type, Authorization".to_string()
}

/// Values advertised in the `access-control-allow-*` headers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CorsConfig {
    /// `access-control-allow-origin`
    #[serde(default = "default_allow_origin")]
    pub allow_origin: String,
    /// `access-control-allow-methods`
    #[serde(default = "default_allow_methods")]
    pub allow_methods: String,
    /// `access-control-allow-headers`
    #[serde(default = "default_allow_headers")]
    pub allow_headers: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: default_allow_origin(),
            allow_methods: default_allow_methods(),
            allow_headers: default_allow_headers(),
        }
    }
}

/// Attaches the configured CORS headers to the eventual response.
///
/// Never fails, whatever the request.
#[derive(Debug, Clone, Default)]
pub struct Cors {
    config: CorsConfig,
}

impl Cors {
    /// Creates the unit from its configuration.
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }
}

impl Middleware for Cors {
    fn name(&self) -> &str {
        "cors"
    }

    fn handle(&self, ctx: &mut RequestContext) -> Result<()> {
        let headers = &mut ctx.response_headers;
        headers.insert("access-control-allow-origin", self.config.allow_origin.as_str());
        headers.insert("access-control-allow-methods", self.config.allow_methods.as_str());
        headers.insert("access-control-allow-headers", self.config.allow_headers.as_str());
        Ok(())
    }
}
