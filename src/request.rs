//! Incoming request type.

use std::collections::HashMap;

use bytes::Bytes;

use crate::method::Method;

/// An incoming request as handed over by the transport.
///
/// Built once, then read-only: the dispatcher and the binder only borrow it.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Builds a request from a request target such as `/users?page=2&q=a%20b`.
    ///
    /// Query values are percent-decoded. When a key repeats, the first value wins.
    pub fn from_target(method: Method, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let mut req = Self::new(method, path);
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            req.query.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
        req
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query_params(&self) -> &HashMap<String, String> { &self.query }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
