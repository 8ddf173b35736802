//! The dispatcher: one [`Request`] in, one [`Response`] out.
//!
//! Every request walks the same stages:
//!
//! ```text
//! Received → Routed → Bound → Invoked → Encoded → Sent
//!     └──────────┴────────┴─────────┴─────────┴──→ Failed(kind)
//! ```
//!
//! A failure at any stage is turned into a response with a JSON body of the
//! form `{"error": "<kind>", "message": "…"}`. Nothing escapes to the
//! transport: binder and codec errors, handler faults, handler panics and
//! timeouts all end up as a status code.
//!
//! The route table lives behind an [`ArcSwap`]. Lookups take a snapshot
//! without locking; [`Dispatcher::replace_routes`] publishes a whole new
//! table while requests already in flight finish against the old one.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::FutureExt;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::binder::{self, Args, BindError};
use crate::codec;
use crate::fault::{DefaultFaultPolicy, FailureKind, FaultPolicy, HandlerFault};
use crate::method::Method;
use crate::reply::{Reply, View};
use crate::request::Request;
use crate::response::{ContentType, Response};
use crate::router::{Route, RouteTable};
use crate::view::{RenderError, ViewRenderer};

/// Where a request is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Received,
    Routed,
    Bound,
    Invoked,
    Encoded,
    Sent,
}

/// Turns requests into responses against a shared route table.
pub struct Dispatcher {
    routes: ArcSwap<RouteTable>,
    renderer: Option<Arc<dyn ViewRenderer>>,
    faults: Arc<dyn FaultPolicy>,
    timeout: Option<Duration>,
    expose_internal_errors: bool,
}

/// Configures a [`Dispatcher`].
///
/// ```rust
/// use std::time::Duration;
/// use keel::{Dispatcher, Router};
///
/// let dispatcher = Dispatcher::builder()
///     .handler_timeout(Duration::from_secs(30))
///     .build(Router::new());
/// assert!(dispatcher.routes().is_empty());
/// ```
pub struct DispatcherBuilder {
    renderer: Option<Arc<dyn ViewRenderer>>,
    faults: Arc<dyn FaultPolicy>,
    timeout: Option<Duration>,
    expose_internal_errors: bool,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            renderer: None,
            faults: Arc::new(DefaultFaultPolicy),
            timeout: None,
            expose_internal_errors: false,
        }
    }
}

impl DispatcherBuilder {
    /// Cancels handlers that run longer than `limit` and answers `503`.
    /// No limit by default.
    pub fn handler_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn view_renderer(mut self, renderer: impl ViewRenderer) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn fault_policy(mut self, policy: impl FaultPolicy) -> Self {
        self.faults = Arc::new(policy);
        self
    }

    /// Include the underlying message in `5xx` error bodies. Off by default:
    /// server-side failures answer with a generic message and are only
    /// detailed in the logs.
    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    pub fn build(self, routes: impl Into<RouteTable>) -> Dispatcher {
        Dispatcher {
            routes: ArcSwap::from_pointee(routes.into()),
            renderer: self.renderer,
            faults: self.faults,
            timeout: self.timeout,
            expose_internal_errors: self.expose_internal_errors,
        }
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// A dispatcher with default settings.
    pub fn new(routes: impl Into<RouteTable>) -> Self {
        Self::builder().build(routes)
    }

    /// Snapshot of the current route table.
    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }

    /// Atomically replaces the route table.
    pub fn replace_routes(&self, routes: impl Into<RouteTable>) {
        let routes = routes.into();
        info!(routes = routes.len(), "route table replaced");
        self.routes.store(Arc::new(routes));
    }

    /// Routes, binds, invokes and encodes one request.
    pub async fn dispatch(&self, req: Request) -> Response {
        let span = info_span!("request", method = %req.method(), path = %req.path());
        async move {
            debug!(stage = ?Stage::Received);
            let response = match self.run(&req).await {
                Ok(response) => response,
                Err(failure) => failure.into_response(self.expose_internal_errors),
            };
            debug!(stage = ?Stage::Sent, status = response.status_code().as_u16());
            response
        }
        .instrument(span)
        .await
    }

    async fn run(&self, req: &Request) -> Result<Response, Failure> {
        let table = self.routes.load_full();

        let Some(matched) = table.lookup(req.method(), req.path()) else {
            return Err(unrouted(&table, req.method(), req.path()));
        };
        let route = matched.route();
        debug!(stage = ?Stage::Routed, pattern = %route.pattern());

        let args = binder::bind(route.signature(), matched.vars(), req)
            .map_err(|e| Failure::bind(e, route))?;
        debug!(stage = ?Stage::Bound, args = args.len());

        let reply = self.invoke(route, args).await?;
        debug!(stage = ?Stage::Invoked);

        let response = self.encode(reply)?;
        debug!(stage = ?Stage::Encoded);
        Ok(response)
    }

    async fn invoke(&self, route: &Route, args: Args) -> Result<Reply, Failure> {
        // A handler can panic while building its future as well as while polling it.
        let handler = route.handler();
        let call = match panic::catch_unwind(AssertUnwindSafe(|| handler.call(args))) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind(),
            Err(payload) => return Err(Failure::panic(payload)),
        };

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Failure::timeout(limit))?,
            None => call.await,
        };

        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(fault)) => Err(Failure::fault(&fault, self.faults.status_for(&fault))),
            Err(payload) => Err(Failure::panic(payload)),
        }
    }

    /// Answers a request the transport turned away, in the same error format
    /// as any other failure.
    pub(crate) fn reject(&self, path: &str, rejection: Rejection) -> Response {
        let _span = info_span!("request", path = %path).entered();
        let failure = match rejection {
            Rejection::UnknownMethod(method) => unrouted(&self.routes.load(), method, path),
            Rejection::UnreadableBody(reason) => Failure::new(
                FailureKind::BadRequest,
                Stage::Received,
                format!("failed to read request body: {reason}"),
            ),
            Rejection::BodyTooLarge(limit) => {
                let mut failure = Failure::new(
                    FailureKind::BadRequest,
                    Stage::Received,
                    format!("request body exceeds {limit} bytes"),
                );
                failure.status = StatusCode::PAYLOAD_TOO_LARGE;
                failure
            }
        };
        failure.into_response(self.expose_internal_errors)
    }

    fn encode(&self, reply: Reply) -> Result<Response, Failure> {
        match reply {
            Reply::Data(Value::String(text)) => Ok(Response::text(text)),
            Reply::Data(value) => codec::encode(&value)
                .map(Response::json)
                .map_err(|e| Failure::new(FailureKind::HandlerError, Stage::Encoded, e.to_string())),
            Reply::View(view) => self.render(&view).map(Response::html),
        }
    }

    fn render(&self, view: &View) -> Result<String, Failure> {
        let renderer = self.renderer.as_ref()
            .ok_or_else(|| Failure::render(RenderError::NoRenderer(view.name().to_owned())))?;
        renderer.render(view).map_err(Failure::render)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.load().len())
            .field("renderer", &self.renderer.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn unrouted(table: &RouteTable, method: impl fmt::Display, path: &str) -> Failure {
    let allowed = table.allowed_methods(path);
    if allowed.is_empty() {
        return Failure::new(FailureKind::NotFound, Stage::Received, format!("no route for {path}"));
    }
    let mut failure = Failure::new(
        FailureKind::MethodNotAllowed,
        Stage::Received,
        format!("{method} is not allowed for {path}"),
    );
    failure.allow = allowed;
    failure
}

/// Why the transport could not turn an HTTP request into a [`Request`].
#[derive(Debug)]
pub(crate) enum Rejection {
    UnknownMethod(String),
    UnreadableBody(String),
    BodyTooLarge(usize),
}

// ── Failures ──────────────────────────────────────────────────────────────────

/// A request that left the happy path, and where it did.
#[derive(Debug)]
struct Failure {
    kind: FailureKind,
    status: StatusCode,
    stage: Stage,
    message: String,
    allow: Vec<Method>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: FailureKind,
    message: &'a str,
}

impl Failure {
    fn new(kind: FailureKind, stage: Stage, message: impl Into<String>) -> Self {
        Self { kind, status: kind.default_status(), stage, message: message.into(), allow: Vec::new() }
    }

    fn bind(err: BindError, route: &Route) -> Self {
        if err.is_internal() {
            error!(pattern = %route.pattern(), "route table and matcher disagree: {err}");
            return Self::new(FailureKind::InternalInconsistency, Stage::Routed, err.to_string());
        }
        Self::new(FailureKind::BadRequest, Stage::Routed, err.to_string())
    }

    fn fault(fault: &HandlerFault, status: StatusCode) -> Self {
        let mut failure = Self::new(FailureKind::HandlerError, Stage::Bound, fault.message());
        failure.status = status;
        failure
    }

    fn panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload.downcast_ref::<&str>().map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_owned());
        Self::new(FailureKind::HandlerError, Stage::Bound, format!("handler panicked: {message}"))
    }

    fn timeout(limit: Duration) -> Self {
        let mut failure = Self::new(
            FailureKind::HandlerError,
            Stage::Bound,
            format!("handler did not finish within {limit:?}"),
        );
        failure.status = StatusCode::SERVICE_UNAVAILABLE;
        failure
    }

    fn render(err: RenderError) -> Self {
        Self::new(FailureKind::RenderError, Stage::Invoked, err.to_string())
    }

    fn into_response(self, expose_internal_errors: bool) -> Response {
        let Failure { kind, status, stage, message, allow } = self;

        if status.is_server_error() {
            error!(kind = %kind, failed_at = ?stage, status = status.as_u16(), "{message}");
        } else {
            warn!(kind = %kind, failed_at = ?stage, status = status.as_u16(), "{message}");
        }

        let public = if status.is_server_error() && !expose_internal_errors {
            status.canonical_reason().unwrap_or("server error")
        } else {
            message.as_str()
        };
        let body = codec::encode_as(&ErrorBody { error: kind, message: public }).unwrap_or_default();

        let mut builder = Response::builder().status(status);
        if !allow.is_empty() {
            let methods: Vec<&str> = allow.iter().map(|m| m.as_str()).collect();
            builder = builder.header("allow", &methods.join(", "));
        }
        builder.body(ContentType::Json, body)
    }
}
