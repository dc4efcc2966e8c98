//! Ordered, abortable middleware execution.
//!
//! A [`Pipeline`] holds middleware units in registration order and runs them
//! one after another over the same [`RequestContext`]. The first unit that
//! returns an error aborts the run: no later unit is invoked and the error is
//! handed back to the caller unchanged.

use std::fmt;

use tracing::{debug, warn};

use crate::error::Result;
use crate::request::RequestContext;

/// A pipeline step that inspects or mutates the context and may abort.
///
/// Implemented for every `Fn(&mut RequestContext) -> Result<()>`; closures
/// report the name `"anonymous"`.
pub trait Middleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Runs the unit. Returning an error aborts the pipeline.
    fn handle(&self, ctx: &mut RequestContext) -> Result<()>;
}

impl<F> Middleware for F
where
    F: Fn(&mut RequestContext) -> Result<()> + Send + Sync,
{
    fn handle(&self, ctx: &mut RequestContext) -> Result<()> {
        self(ctx)
    }
}

/// Ordered list of middleware units.
///
/// # Examples
///
/// ```
/// use invocation_core::{ApiError, Pipeline, RequestContext};
///
/// let mut pipeline = Pipeline::new();
/// pipeline
///     .add(|ctx: &mut RequestContext| {
///         ctx.set("seen", true);
///         Ok(())
///     })
///     .add(|_ctx: &mut RequestContext| Err(ApiError::forbidden("closed").into()))
///     .add(|ctx: &mut RequestContext| {
///         ctx.set("unreachable", true);
///         Ok(())
///     });
///
/// let mut ctx = RequestContext::new("GET", "/");
/// let err = pipeline.execute(&mut ctx).unwrap_err();
///
/// assert_eq!(err.status(), 403);
/// assert!(ctx.contains("seen"));
/// assert!(!ctx.contains("unreachable"));
/// ```
#[derive(Default)]
pub struct Pipeline {
    units: Vec<Box<dyn Middleware>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a closure unit.
    pub fn add<F>(&mut self, unit: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> Result<()> + Send + Sync + 'static,
    {
        self.push(unit)
    }

    /// Appends any [`Middleware`] implementation.
    pub fn push<M>(&mut self, unit: M) -> &mut Self
    where
        M: Middleware + 'static,
    {
        self.units.push(Box::new(unit));
        self
    }

    /// Builder-style [`push`](Self::push).
    pub fn with<M>(mut self, unit: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.units.push(Box::new(unit));
        self
    }

    /// Number of registered units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if no unit is registered.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Names of the registered units, in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|u| u.name())
    }

    /// Runs every unit in order, stopping at the first error.
    pub fn execute(&self, ctx: &mut RequestContext) -> Result<()> {
        for unit in &self.units {
            debug!(middleware = unit.name(), "running middleware");
            if let Err(err) = unit.handle(ctx) {
                warn!(
                    middleware = unit.name(),
                    status = err.status(),
                    error = %err,
                    "middleware aborted the pipeline"
                );
                return Err(err);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
