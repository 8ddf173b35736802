//! # keel
//!
//! A small MVC-style request dispatcher. The machinery that annotation-driven
//! frameworks hide, written out as plain values:
//!
//! - **Routes** are registered explicitly: method, path pattern, handler
//!   signature, handler. No scanning, no reflection.
//! - **Signatures** say where every handler argument comes from: a path
//!   placeholder, a query parameter, or the JSON body.
//! - **Replies** are either data, encoded as JSON, or a named view handed to
//!   a pluggable renderer.
//!
//! A request goes through route lookup, path matching, parameter binding,
//! handler invocation and reply encoding. Any failure along the way becomes
//! an HTTP status with a machine-readable error body (`404` for unknown
//! paths, `400` for bad parameters or bodies, `500` for handler faults).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use keel::codec::Shape;
//! use keel::{Args, Dispatcher, HandlerFault, Router, Scalar, Server, Signature};
//!
//! #[tokio::main]
//! async fn main() {
//!     let routes = Router::new()
//!         .get("/user/{id}", Signature::new().path("id", Scalar::Integer), show_user)
//!         .post(
//!             "/user",
//!             Signature::new().body("user", Shape::object().field("name", Shape::String)),
//!             create_user,
//!         );
//!
//!     Server::bind("0.0.0.0:3000")
//!         .unwrap()
//!         .serve(Dispatcher::new(routes))
//!         .await
//!         .unwrap();
//! }
//!
//! async fn show_user(args: Args) -> String {
//!     format!("User ID: {}", args.int("id").unwrap_or_default())
//! }
//!
//! async fn create_user(args: Args) -> Result<String, HandlerFault> {
//!     let name = args.body().and_then(|b| b["name"].as_str()).unwrap_or_default();
//!     Ok(format!("User created: {name}"))
//! }
//! ```

mod binder;
mod dispatcher;
mod error;
mod fault;
mod handler;
mod method;
mod reply;
mod request;
mod response;
mod router;
mod server;
mod signature;
mod view;

pub mod codec;
pub mod pattern;

pub use binder::{Arg, Args, BindError, bind, coerce};
pub use dispatcher::{Dispatcher, DispatcherBuilder, Stage};
pub use error::{Error, RouteError};
pub use fault::{DefaultFaultPolicy, FailureKind, FaultPolicy, HandlerFault};
pub use handler::Handler;
pub use http::StatusCode;
pub use method::{Method, UnknownMethod};
pub use pattern::{PathPattern, PathVars, PatternError};
pub use reply::{IntoReply, Json, Reply, View};
pub use request::Request;
pub use response::{ContentType, Response, ResponseBuilder};
pub use router::{MatchResult, Route, RouteTable, Router};
pub use server::Server;
pub use signature::{Binding, Param, Scalar, Signature, SignatureError};
pub use view::{RenderError, ViewRenderer};
