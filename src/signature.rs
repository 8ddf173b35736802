//! Handler signatures: which arguments a handler takes and where each comes from.
//!
//! A signature replaces parameter annotations. It is built once, next to the
//! route it belongs to, and checked against the route's pattern at
//! registration time:
//!
//! ```rust
//! use keel::{Scalar, Signature};
//! use keel::codec::Shape;
//!
//! let update_user = Signature::new()
//!     .path("id", Scalar::Integer)
//!     .query_or("notify", Scalar::Bool, "false")
//!     .body("user", Shape::object().field("name", Shape::String));
//! assert_eq!(update_user.params().len(), 3);
//! ```

use std::fmt;

use thiserror::Error;

use crate::codec::Shape;
use crate::pattern::PathPattern;

/// Target type for values taken from the path or the query string.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scalar {
    Integer,
    Float,
    Bool,
    String,
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integer => "integer",
            Self::Float   => "float",
            Self::Bool    => "bool",
            Self::String  => "string",
        })
    }
}

/// Where a parameter's value comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum Binding {
    /// The path placeholder with the same name as the parameter.
    Path(Scalar),
    /// The query parameter with the same name as the parameter.
    Query { ty: Scalar, required: bool, default: Option<String> },
    /// The decoded request body.
    Body(Shape),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub binding: Binding,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum SignatureError {
    #[error("parameter `{0}` is declared twice")]
    DuplicateParam(String),

    #[error("body is bound twice (`{first}` and `{second}`)")]
    MultipleBodies { first: String, second: String },

    #[error("path parameter `{name}` has no placeholder in `{pattern}`")]
    UnknownPathVariable { name: String, pattern: String },

    #[error("default `{default}` for query parameter `{name}` is not a valid {ty}")]
    InvalidDefault { name: String, default: String, ty: Scalar },
}

/// The ordered parameter list of a handler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(self, name: impl Into<String>, ty: Scalar) -> Self {
        self.param(name, Binding::Path(ty))
    }

    /// Optional query parameter; binds [`Arg::Absent`](crate::Arg::Absent) when missing.
    pub fn query(self, name: impl Into<String>, ty: Scalar) -> Self {
        self.param(name, Binding::Query { ty, required: false, default: None })
    }

    /// Query parameter that must be present.
    pub fn query_required(self, name: impl Into<String>, ty: Scalar) -> Self {
        self.param(name, Binding::Query { ty, required: true, default: None })
    }

    /// Query parameter with a fallback used when it is missing.
    pub fn query_or(self, name: impl Into<String>, ty: Scalar, default: impl Into<String>) -> Self {
        self.param(name, Binding::Query { ty, required: false, default: Some(default.into()) })
    }

    pub fn body(self, name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        self.param(name, Binding::Body(shape.into()))
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    fn param(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.params.push(Param { name: name.into(), binding });
        self
    }

    pub(crate) fn validate(&self, pattern: &PathPattern) -> Result<(), SignatureError> {
        let mut body: Option<&str> = None;

        for (i, param) in self.params.iter().enumerate() {
            if self.params[..i].iter().any(|p| p.name == param.name) {
                return Err(SignatureError::DuplicateParam(param.name.clone()));
            }

            match &param.binding {
                Binding::Path(_) if !pattern.has_placeholder(&param.name) => {
                    return Err(SignatureError::UnknownPathVariable {
                        name: param.name.clone(),
                        pattern: pattern.as_str().to_owned(),
                    });
                }
                Binding::Query { ty, default: Some(default), .. }
                    if crate::binder::coerce(default, *ty).is_none() =>
                {
                    return Err(SignatureError::InvalidDefault {
                        name: param.name.clone(),
                        default: default.clone(),
                        ty: *ty,
                    });
                }
                Binding::Body(_) => {
                    if let Some(first) = body {
                        return Err(SignatureError::MultipleBodies {
                            first: first.to_owned(),
                            second: param.name.clone(),
                        });
                    }
                    body = Some(param.name.as_str());
                }
                _ => {}
            }
        }

        Ok(())
    }
}
