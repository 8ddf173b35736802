//! View rendering seam.
//!
//! keel does not ship a template engine. When a handler replies with a
//! [`View`], the dispatcher hands it to the [`ViewRenderer`] installed on the
//! [`DispatcherBuilder`](crate::DispatcherBuilder) and sends the result as
//! HTML.

use thiserror::Error;

use crate::reply::View;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no view renderer is configured (view `{0}`)")]
    NoRenderer(String),

    #[error("unknown view `{0}`")]
    UnknownView(String),

    #[error("failed to render view `{view}`: {message}")]
    Failed { view: String, message: String },
}

/// Renders a named view with its context into an HTML document.
pub trait ViewRenderer: Send + Sync + 'static {
    fn render(&self, view: &View) -> Result<String, RenderError>;
}

impl<F> ViewRenderer for F
where
    F: Fn(&View) -> Result<String, RenderError> + Send + Sync + 'static,
{
    fn render(&self, view: &View) -> Result<String, RenderError> {
        self(view)
    }
}
