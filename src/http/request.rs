//! Request handling.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for every inbound request
//! - Turn an axum request into the [`RequestContext`] templates observe
//! - Read url-encoded bodies so templates can see form values
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Bodies are only read for form content types, and only up to a limit

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::template::RequestContext;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Largest form body read for template evaluation.
pub const MAX_FORM_BODY: usize = 1024 * 1024;

/// Assigns a fresh UUID v4 to requests that arrive without an ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Request ID of `request`, or `"unknown"` before the request-id layer ran.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn carries_form(request: &Request<Body>) -> bool {
    let method = request.method();
    if *method != Method::POST && *method != Method::PUT && *method != Method::PATCH {
        return false;
    }
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Build the template view of `request`, consuming its body when it is a form.
///
/// An unreadable or oversized body leaves the form with query values only.
pub async fn request_context(request: Request<Body>, remote: Option<SocketAddr>) -> RequestContext {
    let with_form = carries_form(&request);
    let (parts, body) = request.into_parts();
    let mut context = RequestContext::new(parts.method, parts.uri, parts.version, parts.headers);
    if let Some(addr) = remote {
        context = context.with_remote_addr(addr);
    }

    if with_form {
        match axum::body::to_bytes(body, MAX_FORM_BODY).await {
            Ok(bytes) => context = context.with_form_body(&bytes),
            Err(e) => tracing::debug!(error = %e, "Ignoring unreadable form body"),
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let mut maker = UuidRequestId;
        let request = Request::new(());
        let a = maker.make_request_id(&request).unwrap();
        let b = maker.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
        assert_eq!(a.header_value().len(), 36);
    }

    #[tokio::test]
    async fn test_form_body_is_merged() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/svc?k=query")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("k=body&other=1"))
            .unwrap();
        let context = request_context(request, None).await;
        assert_eq!(context.form().get("k"), "body");
        assert_eq!(context.form().values("k").unwrap().len(), 2);
        assert_eq!(context.query().get("k"), "query");
    }

    #[tokio::test]
    async fn test_get_body_is_ignored() {
        let request = Request::builder()
            .uri("/svc")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("k=v"))
            .unwrap();
        let remote: SocketAddr = "10.0.0.1:5555".parse().unwrap();
        let context = request_context(request, Some(remote)).await;
        assert!(context.form().is_empty());
        assert_eq!(context.remote_addr(), "10.0.0.1:5555");
    }
}
