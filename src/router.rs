//! Route table and the fluent [`Router`] builder.
//!
//! Routes are grouped per method and kept in registration order. A lookup
//! runs every pattern for the method through the segment matcher and keeps
//! the most specific hit: at the leftmost position where two matching
//! patterns differ, a literal beats a placeholder. Between equally specific
//! patterns the one registered first wins.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::error::RouteError;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::pattern::{PathPattern, PathVars};
use crate::signature::Signature;

/// A registered (method, pattern) → handler binding.
pub struct Route {
    method: Method,
    pattern: PathPattern,
    signature: Signature,
    handler: BoxedHandler,
}

impl Route {
    pub fn method(&self) -> Method { self.method }
    pub fn pattern(&self) -> &PathPattern { &self.pattern }
    pub fn signature(&self) -> &Signature { &self.signature }
    pub(crate) fn handler(&self) -> &BoxedHandler { &self.handler }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("params", &self.signature.params().len())
            .finish_non_exhaustive()
    }
}

/// The route a request resolved to, with its captured path variables.
#[derive(Debug)]
pub struct MatchResult {
    route: Arc<Route>,
    vars: PathVars,
}

impl MatchResult {
    pub fn route(&self) -> &Route { &self.route }
    pub fn vars(&self) -> &PathVars { &self.vars }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

/// All registered routes.
///
/// Built once, then shared read-only; see
/// [`Dispatcher::replace_routes`](crate::Dispatcher::replace_routes) for
/// swapping in a new table at runtime.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<Method, Vec<Arc<Route>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route.
    ///
    /// Fails when the pattern does not parse, the signature does not fit the
    /// pattern, or a route with the same method and pattern shape exists.
    pub fn register(
        &mut self,
        method: Method,
        pattern: &str,
        signature: Signature,
        handler: impl Handler,
    ) -> Result<(), RouteError> {
        let pattern = PathPattern::parse(pattern)?;
        signature.validate(&pattern)?;

        let routes = self.routes.entry(method).or_default();
        if let Some(existing) = routes.iter().find(|r| r.pattern.same_shape(&pattern)) {
            return Err(RouteError::Duplicate {
                method,
                pattern: pattern.as_str().to_owned(),
                existing: existing.pattern.as_str().to_owned(),
            });
        }

        info!(%method, %pattern, params = signature.params().len(), "route registered");
        routes.push(Arc::new(Route {
            method,
            pattern,
            signature,
            handler: handler.into_boxed_handler(),
        }));
        Ok(())
    }

    /// Finds the route for `method` and `path`, or `None` for not found.
    pub fn lookup(&self, method: Method, path: &str) -> Option<MatchResult> {
        let mut best: Option<(&Arc<Route>, PathVars)> = None;

        for route in self.routes.get(&method)? {
            let Some(vars) = route.pattern.matches(path) else {
                continue;
            };
            let better = match &best {
                Some((current, _)) => route.pattern.specificity_cmp(&current.pattern) == Ordering::Less,
                None => true,
            };
            if better {
                best = Some((route, vars));
            }
        }

        best.map(|(route, vars)| MatchResult { route: Arc::clone(route), vars })
    }

    /// Methods under which some route matches `path`, sorted.
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = self.routes.iter()
            .filter(|(_, routes)| routes.iter().any(|r| r.pattern.matches(path).is_some()))
            .map(|(method, _)| *method)
            .collect();
        methods.sort();
        methods
    }

    /// All routes, grouped by method, each group in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values().flatten().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fluent builder over [`RouteTable`].
///
/// Registration mistakes are programming errors made at startup, so the
/// chaining methods panic on them. Use [`Router::try_route`] to handle them.
///
/// ```rust
/// use keel::{Args, Router, Scalar, Signature};
///
/// async fn show(args: Args) -> String {
///     format!("User ID: {}", args.int("id").unwrap_or_default())
/// }
///
/// async fn search(_args: Args) -> &'static str { "search" }
///
/// let routes = Router::new()
///     .get("/user/{id}", Signature::new().path("id", Scalar::Integer), show)
///     .get("/user/search", Signature::new(), search)
///     .into_table();
/// assert_eq!(routes.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct Router {
    table: RouteTable,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics if the route cannot be registered.
    pub fn route(self, method: Method, pattern: &str, signature: Signature, handler: impl Handler) -> Self {
        self.try_route(method, pattern, signature, handler)
            .unwrap_or_else(|e| panic!("invalid route {method} `{pattern}`: {e}"))
    }

    pub fn try_route(
        mut self,
        method: Method,
        pattern: &str,
        signature: Signature,
        handler: impl Handler,
    ) -> Result<Self, RouteError> {
        self.table.register(method, pattern, signature, handler)?;
        Ok(self)
    }

    pub fn get(self, pattern: &str, signature: Signature, handler: impl Handler) -> Self {
        self.route(Method::Get, pattern, signature, handler)
    }

    pub fn post(self, pattern: &str, signature: Signature, handler: impl Handler) -> Self {
        self.route(Method::Post, pattern, signature, handler)
    }

    pub fn put(self, pattern: &str, signature: Signature, handler: impl Handler) -> Self {
        self.route(Method::Put, pattern, signature, handler)
    }

    pub fn patch(self, pattern: &str, signature: Signature, handler: impl Handler) -> Self {
        self.route(Method::Patch, pattern, signature, handler)
    }

    pub fn delete(self, pattern: &str, signature: Signature, handler: impl Handler) -> Self {
        self.route(Method::Delete, pattern, signature, handler)
    }

    pub fn into_table(self) -> RouteTable {
        self.table
    }
}

impl From<Router> for RouteTable {
    fn from(router: Router) -> Self {
        router.into_table()
    }
}
