//! Handler return values and the [`IntoReply`] conversion trait.
//!
//! A handler either returns data, which the dispatcher encodes, or asks for
//! a named view, which is handed to the configured
//! [`ViewRenderer`](crate::ViewRenderer).

use serde::Serialize;
use serde_json::{Map, Value};

use crate::fault::HandlerFault;

/// What a handler produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Structured data, sent as JSON. A bare string is sent as plain text.
    Data(Value),
    /// A view to render with its model.
    View(View),
}

/// A named view and the context it is rendered with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct View {
    name: String,
    context: Map<String, Value>,
}

impl View {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), context: Map::new() }
    }

    /// Adds a context entry. Returns `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }
}

/// Wraps any `Serialize` type so it can be returned from a handler.
///
/// ```rust
/// use keel::{Args, Json};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct User { id: i64, name: String }
///
/// async fn get_user(args: Args) -> Json<User> {
///     Json(User { id: args.int("id").unwrap_or_default(), name: "alice".into() })
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Json<T>(pub T);

/// Conversion into a [`Reply`].
///
/// Implemented for the usual handler return types; `Result<T, HandlerFault>`
/// lets handlers use `?`.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, HandlerFault>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, HandlerFault> { Ok(self) }
}

impl IntoReply for View {
    fn into_reply(self) -> Result<Reply, HandlerFault> { Ok(Reply::View(self)) }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, HandlerFault> { Ok(Reply::Data(self)) }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, HandlerFault> { Ok(Reply::Data(Value::String(self))) }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, HandlerFault> { self.to_owned().into_reply() }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, HandlerFault> {
        serde_json::to_value(&self.0)
            .map(Reply::Data)
            .map_err(|e| HandlerFault::new(format!("failed to serialize reply: {e}")))
    }
}

impl<T: IntoReply> IntoReply for Result<T, HandlerFault> {
    fn into_reply(self) -> Result<Reply, HandlerFault> {
        self.and_then(IntoReply::into_reply)
    }
}
