//! Request data exposed to redirect templates.
//!
//! Templates never see the raw HTTP request. Handlers build a
//! [`RequestContext`] holding the fixed set of fields templates may read,
//! and the engine binds it together with the matched service.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderMap, Method, Uri, Version};
use percent_encoding::percent_decode_str;

/// Percent-decode a request path. Invalid UTF-8 is replaced, not rejected.
pub fn decode_path(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw).decode_utf8_lossy()
}

/// Ordered multi-map of query or form values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues {
    inner: BTreeMap<String, Vec<String>>,
}

impl FormValues {
    /// Parse `application/x-www-form-urlencoded` input.
    pub fn parse(input: &[u8]) -> Self {
        let mut values = Self::default();
        values.extend_from(input);
        values
    }

    fn extend_from(&mut self, input: &[u8]) {
        for (key, value) in url::form_urlencoded::parse(input) {
            self.inner
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
    }

    /// First value for `key`, or empty.
    pub fn get(&self, key: &str) -> &str {
        self.inner
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.inner.get(key).map(Vec::as_slice)
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Display for FormValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.inner {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        f.write_str(&serializer.finish())
    }
}

/// Everything a template can observe about one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    /// Decoded form of `uri.path()`.
    path: String,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    query: FormValues,
    form: FormValues,
}

impl RequestContext {
    pub fn new(method: Method, uri: Uri, version: Version, headers: HeaderMap) -> Self {
        let query = FormValues::parse(uri.query().unwrap_or("").as_bytes());
        let path = decode_path(uri.path()).into_owned();
        Self {
            method,
            uri,
            path,
            version,
            headers,
            remote_addr: None,
            form: query.clone(),
            query,
        }
    }

    /// Shorthand for a bodiless HTTP/1.1 request without headers.
    pub fn from_uri(method: Method, uri: &str) -> Result<Self, axum::http::uri::InvalidUri> {
        Ok(Self::new(method, uri.parse()?, Version::HTTP_11, HeaderMap::new()))
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Merge an url-encoded request body into the form values.
    /// Body values come before query values for the same key.
    pub fn with_form_body(mut self, body: &[u8]) -> Self {
        let mut form = FormValues::parse(body);
        for (key, values) in &self.query.inner {
            form.inner
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        self.form = form;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Percent-decoded request path, including leading slash.
    /// [`RequestContext::request_uri`] keeps the encoded form.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query(&self) -> &FormValues {
        &self.query
    }

    pub fn form(&self) -> &FormValues {
        &self.form
    }

    pub fn host(&self) -> &str {
        self.headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or("")
    }

    pub fn request_uri(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    pub fn proto(&self) -> &'static str {
        match self.version {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_2 => "HTTP/2.0",
            Version::HTTP_3 => "HTTP/3.0",
            _ => "HTTP/1.1",
        }
    }

    pub fn remote_addr(&self) -> String {
        self.remote_addr.map(|a| a.to_string()).unwrap_or_default()
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }
}

/// A request bound to the rule that matched it.
#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    pub request: &'a RequestContext,
    /// Matched service name.
    pub service: &'a str,
    /// Path left over after the service prefix; empty on an exact match.
    pub path: &'a str,
}
