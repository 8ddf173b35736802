//! JSON body codec.
//!
//! Request bodies are parsed into a [`Value`] and then projected onto a
//! [`Shape`] describing what the handler expects. Projection keeps the
//! original key order, drops fields the shape does not mention and fails on
//! missing required fields or values of the wrong kind.
//!
//! ```rust
//! use keel::codec::{self, Shape};
//!
//! let shape = Shape::object().field("name", Shape::String).optional("age", Shape::Integer);
//! let user = codec::decode(br#"{"name":"Asad","admin":true}"#, &shape.into()).unwrap();
//! assert_eq!(user["name"], "Asad");
//! assert!(user.get("admin").is_none());
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use serde_json::{Map, Value};

/// What a decoded body must look like.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// Any JSON value, passed through untouched.
    Any,
    String,
    /// A number without a fractional part.
    Integer,
    Number,
    Bool,
    Array(Box<Shape>),
    Object(Vec<Field>),
}

/// A named member of an object shape.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub shape: Shape,
    /// Optional fields may be absent or `null`.
    pub required: bool,
}

/// Builder for [`Shape::Object`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectShape {
    fields: Vec<Field>,
}

impl ObjectShape {
    /// Adds a required field.
    pub fn field(mut self, name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        self.fields.push(Field { name: name.into(), shape: shape.into(), required: true });
        self
    }

    /// Adds an optional field.
    pub fn optional(mut self, name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        self.fields.push(Field { name: name.into(), shape: shape.into(), required: false });
        self
    }
}

impl From<ObjectShape> for Shape {
    fn from(object: ObjectShape) -> Self {
        Shape::Object(object.fields)
    }
}

impl Shape {
    pub fn object() -> ObjectShape {
        ObjectShape::default()
    }

    pub fn array(items: impl Into<Shape>) -> Self {
        Shape::Array(Box::new(items.into()))
    }

    fn describe(&self) -> &'static str {
        match self {
            Shape::Any       => "any value",
            Shape::String    => "a string",
            Shape::Integer   => "an integer",
            Shape::Number    => "a number",
            Shape::Bool      => "a boolean",
            Shape::Array(_)  => "an array",
            Shape::Object(_) => "an object",
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("body is empty")]
    Empty,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("`{path}` should be {expected}, found {found}")]
    TypeMismatch { path: String, expected: &'static str, found: &'static str },
}

/// Parses `bytes` as JSON and projects the result onto `shape`.
pub fn decode(bytes: &[u8], shape: &Shape) -> Result<Value, CodecError> {
    ensure_not_blank(bytes)?;
    let value: Value = serde_json::from_slice(bytes)?;
    project(value, shape, "")
}

/// Parses `bytes` straight into a `serde` type.
pub fn decode_as<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    ensure_not_blank(bytes)?;
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(value)?)
}

pub fn encode_as<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(value)?)
}

/// `application/json`, `application/json-seq` and any `+json` suffix type.
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    essence == "application/json"
        || essence == "application/json-seq"
        || essence.ends_with("+json")
}

fn ensure_not_blank(bytes: &[u8]) -> Result<(), CodecError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(CodecError::Empty);
    }
    Ok(())
}

fn project(value: Value, shape: &Shape, path: &str) -> Result<Value, CodecError> {
    match (shape, value) {
        (Shape::Any, value) => Ok(value),
        (Shape::String, value @ Value::String(_)) => Ok(value),
        (Shape::Bool, value @ Value::Bool(_)) => Ok(value),
        (Shape::Number, value @ Value::Number(_)) => Ok(value),
        (Shape::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
        (Shape::Array(items), Value::Array(values)) => values
            .into_iter()
            .enumerate()
            .map(|(i, v)| project(v, items, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (Shape::Object(fields), Value::Object(map)) => project_object(map, fields, path),
        (shape, other) => Err(CodecError::TypeMismatch {
            path: display_path(path),
            expected: shape.describe(),
            found: describe_value(&other),
        }),
    }
}

fn project_object(map: Map<String, Value>, fields: &[Field], path: &str) -> Result<Value, CodecError> {
    let mut out = Map::new();

    for (key, value) in map {
        let Some(field) = fields.iter().find(|f| f.name == key) else {
            continue;
        };
        let child = join(path, &key);
        let value = match value {
            Value::Null if !field.required => Value::Null,
            value => project(value, &field.shape, &child)?,
        };
        out.insert(key, value);
    }

    if let Some(missing) = fields.iter().find(|f| f.required && !out.contains_key(&f.name)) {
        return Err(CodecError::MissingField(join(path, &missing.name)));
    }

    Ok(Value::Object(out))
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() { key.to_owned() } else { format!("{path}.{key}") }
}

fn display_path(path: &str) -> String {
    if path.is_empty() { "body".to_owned() } else { path.to_owned() }
}

fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null      => "null",
        Value::Bool(_)   => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_)  => "an array",
        Value::Object(_) => "an object",
    }
}
