//! hyper transport and graceful shutdown.
//!
//! The dispatcher itself knows nothing about sockets. [`Server`] is the thin
//! layer that accepts connections, turns each hyper request into a
//! [`Request`], runs it through the [`Dispatcher`] and writes the
//! [`Response`](crate::Response) back.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C (or when the future passed to
//! [`Server::run`] resolves) the server:
//! 1. Immediately stops accepting new connections.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns, which lets `main` exit cleanly.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::dispatcher::{Dispatcher, Rejection};
use crate::error::Error;
use crate::method::Method;
use crate::request::Request;

/// Largest request body the server buffers unless told otherwise (2 MiB).
const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// The HTTP server.
#[derive(Debug)]
pub struct Server {
    addr: SocketAddr,
    body_limit: usize,
}

impl Server {
    /// Configures the server to listen on `addr` (`host:port`).
    ///
    /// ```rust
    /// use keel::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// assert_eq!(server.addr().port(), 3000);
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        Ok(Self { addr: addr.parse()?, body_limit: DEFAULT_BODY_LIMIT })
    }

    /// Caps how many body bytes are buffered per request. Larger bodies are
    /// answered with `413 Payload Too Large`.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves `dispatcher` until SIGTERM or Ctrl-C, then drains.
    pub async fn serve(self, dispatcher: Dispatcher) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.run(listener, Arc::new(dispatcher), shutdown_signal()).await
    }

    /// Serves connections from an already bound `listener` until `shutdown`
    /// resolves, then waits for in-flight connections to finish. The address
    /// given to [`Server::bind`] is not used here.
    pub async fn run(
        &self,
        listener: TcpListener,
        dispatcher: Arc<Dispatcher>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let local = listener.local_addr()?;
        info!(addr = %local, routes = dispatcher.routes().len(), "keel listening");

        let body_limit = self.body_limit;
        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting at once,
                // even with connections queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = Arc::clone(&dispatcher);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let dispatcher = Arc::clone(&dispatcher);
                            async move { handle(dispatcher, body_limit, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(%peer, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("keel stopped");
        Ok(())
    }
}

async fn handle(
    dispatcher: Arc<Dispatcher>,
    body_limit: usize,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_owned();
    let response = match read_request(req, body_limit).await {
        Ok(req) => dispatcher.dispatch(req).await,
        Err(rejection) => dispatcher.reject(&path, rejection),
    };
    Ok(response.into_http())
}

/// Converts a hyper request, or says why it cannot reach the dispatcher.
async fn read_request(req: hyper::Request<Incoming>, body_limit: usize) -> Result<Request, Rejection> {
    let (parts, body) = req.into_parts();

    let method = Method::try_from(&parts.method)
        .map_err(|_| Rejection::UnknownMethod(parts.method.to_string()))?;

    let body = Limited::new(body, body_limit).collect().await.map_err(|e| {
        if e.is::<LengthLimitError>() {
            Rejection::BodyTooLarge(body_limit)
        } else {
            Rejection::UnreadableBody(e.to_string())
        }
    })?;

    let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut request = Request::from_target(method, target).with_body(body.to_bytes());
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => request = request.with_header(name.as_str(), value),
            Err(_) => warn!(header = %name, "skipping non-ASCII header value"),
        }
    }
    Ok(request)
}

/// Resolves on the first of SIGTERM (Unix) or Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
