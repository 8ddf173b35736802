//! Parameter binding: turns a matched request into handler arguments.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::fault::HandlerFault;
use crate::pattern::PathVars;
use crate::request::Request;
use crate::signature::{Binding, Scalar, Signature};

/// A single bound argument.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Body(Value),
    /// An optional query parameter that was not sent and has no default.
    Absent,
}

/// The arguments of one handler call, in signature order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    values: Vec<(String, Arg)>,
}

impl Args {
    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, arg)| arg)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Arg::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Arg::Float(v) => Some(*v),
            Arg::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Arg::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            Arg::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// The decoded body, if the signature binds one.
    pub fn body(&self) -> Option<&Value> {
        self.values.iter().find_map(|(_, arg)| match arg {
            Arg::Body(v) => Some(v),
            _ => None,
        })
    }

    /// Deserializes the decoded body into `T`.
    ///
    /// Fails with a `400` fault when there is no body or it does not fit `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, HandlerFault> {
        let body = self.body().ok_or_else(|| HandlerFault::bad_request("no request body is bound"))?;
        T::deserialize(body).map_err(|e| HandlerFault::bad_request(format!("unexpected body: {e}")))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arg)> {
        self.values.iter().map(|(n, a)| (n.as_str(), a))
    }
}

#[derive(Debug, Error)]
pub enum BindError {
    #[error("path variable `{0}` was not captured by the matched route")]
    MissingPathVariable(String),

    #[error("required query parameter `{0}` is missing")]
    MissingQueryParam(String),

    #[error("malformed body: {0}")]
    MalformedBody(#[from] CodecError),

    #[error("unsupported content type `{0}`, expected JSON")]
    UnsupportedContentType(String),

    #[error("parameter `{param}`: cannot convert `{raw}` to {target}")]
    TypeCoercion { param: String, raw: String, target: Scalar },
}

impl BindError {
    /// `true` for errors that point at a routing bug rather than a bad request.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::MissingPathVariable(_))
    }
}

/// Binds every parameter of `signature`, in declared order.
pub fn bind(signature: &Signature, vars: &PathVars, req: &Request) -> Result<Args, BindError> {
    let mut values = Vec::with_capacity(signature.params().len());

    for param in signature.params() {
        let arg = match &param.binding {
            Binding::Path(ty) => {
                let raw = vars
                    .get(&param.name)
                    .ok_or_else(|| BindError::MissingPathVariable(param.name.clone()))?;
                coerce_param(&param.name, raw, *ty)?
            }
            Binding::Query { ty, required, default } => {
                match (req.query(&param.name), default) {
                    (Some(raw), _) => coerce_param(&param.name, raw, *ty)?,
                    (None, _) if *required => {
                        return Err(BindError::MissingQueryParam(param.name.clone()));
                    }
                    (None, Some(default)) => coerce_param(&param.name, default, *ty)?,
                    (None, None) => Arg::Absent,
                }
            }
            Binding::Body(shape) => {
                if let Some(ct) = req.header("content-type") {
                    if !codec::is_json_content_type(ct) {
                        return Err(BindError::UnsupportedContentType(ct.to_owned()));
                    }
                }
                Arg::Body(codec::decode(req.body(), shape)?)
            }
        };
        values.push((param.name.clone(), arg));
    }

    Ok(Args { values })
}

/// Converts a raw path or query string. `None` when it does not parse.
pub fn coerce(raw: &str, ty: Scalar) -> Option<Arg> {
    match ty {
        Scalar::Integer => raw.parse().ok().map(Arg::Int),
        Scalar::Float => raw.parse::<f64>().ok().filter(|f| f.is_finite()).map(Arg::Float),
        Scalar::Bool => match raw {
            "true" => Some(Arg::Bool(true)),
            "false" => Some(Arg::Bool(false)),
            _ => None,
        },
        Scalar::String => Some(Arg::Str(raw.to_owned())),
    }
}

fn coerce_param(name: &str, raw: &str, ty: Scalar) -> Result<Arg, BindError> {
    coerce(raw, ty).ok_or_else(|| BindError::TypeCoercion {
        param: name.to_owned(),
        raw: raw.to_owned(),
        target: ty,
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::codec::Shape;
    use crate::method::Method;

    fn vars(pairs: &[(&str, &str)]) -> PathVars {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn binds_in_declared_order() {
        let sig = Signature::new()
            .query("q", Scalar::String)
            .path("id", Scalar::Integer);
        let req = Request::new(Method::Get, "/user/5").with_query("q", "x");
        let args = bind(&sig, &vars(&[("id", "5")]), &req).unwrap();
        let names: Vec<&str> = args.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["q", "id"]);
        assert_eq!(args.int("id"), Some(5));
        assert_eq!(args.str("q"), Some("x"));
    }

    #[test]
    fn coercion_failure_carries_raw_value() {
        let sig = Signature::new().path("id", Scalar::Integer);
        let req = Request::new(Method::Get, "/user/abc");
        match bind(&sig, &vars(&[("id", "abc")]), &req).unwrap_err() {
            BindError::TypeCoercion { raw, target, .. } => {
                assert_eq!(raw, "abc");
                assert_eq!(target, Scalar::Integer);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_path_variable_is_internal() {
        let sig = Signature::new().path("id", Scalar::Integer);
        let err = bind(&sig, &PathVars::new(), &Request::new(Method::Get, "/")).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn query_defaults_and_absence() {
        let sig = Signature::new()
            .query_or("page", Scalar::Integer, "1")
            .query("sort", Scalar::String)
            .query_required("limit", Scalar::Integer);
        let req = Request::new(Method::Get, "/items").with_query("limit", "10");
        let args = bind(&sig, &PathVars::new(), &req).unwrap();
        assert_eq!(args.int("page"), Some(1));
        assert_eq!(args.get("sort"), Some(&Arg::Absent));
        assert_eq!(args.int("limit"), Some(10));

        let err = bind(&sig, &PathVars::new(), &Request::new(Method::Get, "/items")).unwrap_err();
        assert!(matches!(err, BindError::MissingQueryParam(ref k) if k == "limit"));
    }

    #[test]
    fn bool_and_float_coercion() {
        assert_eq!(coerce("true", Scalar::Bool), Some(Arg::Bool(true)));
        assert_eq!(coerce("yes", Scalar::Bool), None);
        assert_eq!(coerce("2.5", Scalar::Float), Some(Arg::Float(2.5)));
        assert_eq!(coerce("NaN", Scalar::Float), None);
    }

    #[test]
    fn decodes_body_into_shape() {
        let sig = Signature::new().body("user", Shape::object().field("name", Shape::String));
        let req = Request::new(Method::Post, "/user")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"name":"Asad","extra":1}"#);
        let args = bind(&sig, &PathVars::new(), &req).unwrap();
        assert_eq!(args.body(), Some(&json!({"name": "Asad"})));

        #[derive(Deserialize)]
        struct NewUser { name: String }
        assert_eq!(args.body_as::<NewUser>().unwrap().name, "Asad");
    }

    #[test]
    fn body_errors_are_malformed_body() {
        let sig = Signature::new().body("user", Shape::object().field("name", Shape::String));
        for body in ["", "{", r#"{"nick":"a"}"#] {
            let req = Request::new(Method::Put, "/user/1").with_body(body);
            let err = bind(&sig, &PathVars::new(), &req).unwrap_err();
            assert!(matches!(err, BindError::MalformedBody(_)), "{body:?}: {err}");
        }
    }

    #[test]
    fn rejects_non_json_content_type() {
        let sig = Signature::new().body("user", Shape::Any);
        let req = Request::new(Method::Post, "/user")
            .with_header("content-type", "text/plain")
            .with_body("{}");
        assert!(matches!(
            bind(&sig, &PathVars::new(), &req),
            Err(BindError::UnsupportedContentType(_))
        ));
    }
}
