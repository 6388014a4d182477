//! Route and handler definitions.
//!
//! # Design Decisions
//! - Handlers take no arguments and return `Result<Response, E>`
//! - Handler errors are boxed; their text stays server-side
//! - A `Route` is immutable once built

use std::fmt;
use std::sync::Arc;

use crate::http::Response;

/// Boxed error returned by a failing handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A zero-argument request handler.
pub trait Handler: Send + Sync + 'static {
    /// Produce a response, or fail.
    fn call(&self) -> Result<Response, HandlerError>;
}

impl<F, E> Handler for F
where
    F: Fn() -> Result<Response, E> + Send + Sync + 'static,
    E: Into<HandlerError>,
{
    fn call(&self) -> Result<Response, HandlerError> {
        self().map_err(Into::into)
    }
}

/// Immutable (path, handler) pair.
#[derive(Clone)]
pub struct Route {
    path: String,
    handler: Arc<dyn Handler>,
}

impl Route {
    pub(crate) fn new(path: String, handler: Arc<dyn Handler>) -> Self {
        Self { path, handler }
    }

    /// The exact path this route serves.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route").field("path", &self.path).finish_non_exhaustive()
    }
}
