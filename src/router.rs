//! Longest-prefix route table and dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, trace};

use crate::error::{Error, Result};
use crate::handlers::{HandlerError, RequestHandler};
use crate::request::Request;
use crate::response::Response;

/// Routes keyed by path prefix. Built before the server starts; read-only
/// (and therefore lock-free) while serving.
#[derive(Default, Clone)]
pub struct RouteTable {
    routes: BTreeMap<String, Arc<dyn RequestHandler>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a prefix. Re-registering a prefix replaces
    /// the previous handler; prefixes are never removed.
    pub fn add(&mut self, prefix: impl Into<String>, handler: Arc<dyn RequestHandler>) -> Result<()> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(Error::EmptyRoute);
        }
        self.routes.insert(prefix, handler);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Longest matching prefix for a target: the prefix must equal the
    /// target or be followed by a `/` in it.
    pub fn resolve(&self, target: &str) -> Option<(&str, &Arc<dyn RequestHandler>)> {
        let mut best: Option<(&str, &Arc<dyn RequestHandler>)> = None;
        for (route, handler) in &self.routes {
            let len = route.len();
            if target.len() < len {
                continue;
            }
            if target.len() != len && target.as_bytes()[len] != b'/' {
                continue;
            }
            if !target.starts_with(route.as_str()) {
                continue;
            }
            if best.map_or(true, |(b, _)| b.len() < len) {
                best = Some((route.as_str(), handler));
            }
        }
        best
    }

    /// Resolve and invoke. Fills `request.route`, maps the handler's error
    /// channel (early replies verbatim, internal errors and panics to 500)
    /// and turns a routing miss into a 404.
    pub fn dispatch(&self, request: &mut Request) -> Response {
        let Some((route, handler)) = self.resolve(&request.target) else {
            return Response::not_found();
        };
        trace!(route, target = %request.target, "route resolved");
        request.route = route.to_string();

        let handler = Arc::clone(handler);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handler.handle(request)
        }));

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(HandlerError::Reply(response))) => response,
            Ok(Err(HandlerError::Internal(err))) => {
                error!(
                    request_id = %request.uuid,
                    handler = std::any::type_name_of_val(handler.as_ref()),
                    error = %err,
                    "handler failed"
                );
                Response::new(500, "Internal server error")
            }
            Err(panic) => {
                error!(
                    request_id = %request.uuid,
                    handler = std::any::type_name_of_val(handler.as_ref()),
                    panic = ?panic,
                    "handler panicked"
                );
                Response::new(500, "Internal server error")
            }
        }
    }
}
