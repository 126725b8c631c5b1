//! Exact-match routing tables.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::http::request::Request;
use crate::http::response::{Response, welcome_page};
use crate::server::context::Context;

/// A request handler. It describes the outcome by mutating the response.
pub type Handler = Arc<dyn Fn(&Context, &Request, &mut Response) + Send + Sync>;

/// Wraps a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Context, &Request, &mut Response) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Fallback that answers `404 Not Found`.
pub fn not_found() -> Handler {
    handler(|_, _, response| {
        *response = Response::not_found();
    })
}

/// Serves the canned welcome page.
pub fn welcome() -> Handler {
    handler(|_, _, response| {
        response.content_type("text/html; charset=UTF-8").body(welcome_page());
    })
}

/// Resource path to handler. Entries can be replaced but never removed.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, Handler>,
}

impl RouteTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            routes: HashMap::with_capacity(capacity),
        }
    }

    /// Registers `handler` for `resource`. Returns true if an earlier
    /// handler was replaced.
    pub fn insert(&mut self, resource: impl Into<String>, handler: Handler) -> bool {
        self.routes.insert(resource.into(), handler).is_some()
    }

    pub fn lookup(&self, resource: &str) -> Option<Handler> {
        self.routes.get(resource).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered resources, sorted.
    pub fn resources(&self) -> Vec<String> {
        let mut resources: Vec<String> = self.routes.keys().cloned().collect();
        resources.sort();
        resources
    }

    pub(crate) fn clear(&mut self) {
        self.routes.clear();
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.resources()).finish()
    }
}
