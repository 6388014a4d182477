//! Route table and dispatch.
//!
//! # Responsibilities
//! - Collect routes at startup, rejecting duplicates
//! - Freeze them into an immutable `Dispatcher`
//! - Resolve a request to its handler and produce a response
//! - Contain handler failures (errors and panics) as opaque 500s
//!
//! # Design Decisions
//! - Immutable after `build()` (thread-safe without locks)
//! - O(1) exact-path lookup via HashMap
//! - Explicit not-found rather than a silent default route

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use crate::http::{Request, Response};
use crate::routing::route::{Handler, Route};

/// Errors raised while building the route table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route already registered: {0}")]
    Duplicate(String),

    #[error("invalid route path {0:?}: must start with '/'")]
    InvalidPath(String),
}

/// Mutable route table used during startup.
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    routes: HashMap<String, Route>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for the exact path `path`.
    pub fn register<H: Handler>(
        &mut self,
        path: impl Into<String>,
        handler: H,
    ) -> Result<&mut Self, RouteError> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(RouteError::InvalidPath(path));
        }
        if self.routes.contains_key(&path) {
            return Err(RouteError::Duplicate(path));
        }

        tracing::debug!(path = %path, "Route registered");
        self.routes
            .insert(path.clone(), Route::new(path, Arc::new(handler)));
        Ok(self)
    }

    /// Freeze the table.
    pub fn build(self) -> Dispatcher {
        tracing::info!(routes = self.routes.len(), "Route table frozen");
        Dispatcher {
            routes: self.routes,
        }
    }
}

/// Immutable route table.
#[derive(Debug)]
pub struct Dispatcher {
    routes: HashMap<String, Route>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Look up the route serving `path`.
    pub fn route(&self, path: &str) -> Option<&Route> {
        self.routes.get(path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolve `request` and run its handler.
    pub fn dispatch(&self, request: &Request) -> Response {
        let Some(route) = self.route(&request.path) else {
            tracing::debug!(path = %request.path, method = %request.method, "No route matched");
            return Response::not_found();
        };

        match panic::catch_unwind(AssertUnwindSafe(|| route.handler().call())) {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(path = %request.path, error = %e, "Handler failed");
                Response::internal_error()
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("unknown panic");
                tracing::error!(path = %request.path, panic = %reason, "Handler panicked");
                Response::internal_error()
            }
        }
    }
}
