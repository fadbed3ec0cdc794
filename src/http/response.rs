//! Response mapping for redirect outcomes.
//!
//! | Outcome        | Status | Headers                         | Body                  |
//! |----------------|--------|---------------------------------|-----------------------|
//! | `Found`        | 302    | `Location`, `Content-Length: 0` | empty                 |
//! | `Location`     | 200    | `Location`                      | empty                 |
//! | `NotFound`     | 404    |                                 | `404 page not found`  |
//! | `RenderFailed` | 500    |                                 | render error text     |

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::rules::RedirectOutcome;

pub const NOT_FOUND_BODY: &str = "404 page not found";

fn with_location(status: StatusCode, target: &str) -> Response {
    let location = match HeaderValue::from_str(target) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(location = %target, "Rendered target is not a valid header value");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("invalid redirect target {:?}", target),
            )
                .into_response();
        }
    };

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response.headers_mut().insert(header::LOCATION, location);
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

impl IntoResponse for RedirectOutcome {
    fn into_response(self) -> Response {
        match self {
            RedirectOutcome::Found(target) => with_location(StatusCode::FOUND, &target),
            RedirectOutcome::Location(target) => with_location(StatusCode::OK, &target),
            RedirectOutcome::NotFound => (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response(),
            RedirectOutcome::RenderFailed(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found_is_bodiless_302() {
        let response = RedirectOutcome::Found("https://golang.org/doc".into()).into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://golang.org/doc");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "0");
    }

    #[test]
    fn test_head_gets_200_with_location() {
        let response = RedirectOutcome::Location("https://x".into()).into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::LOCATION], "https://x");
    }

    #[test]
    fn test_control_characters_in_target_are_rejected() {
        let response = RedirectOutcome::Found("https://x/\nSet-Cookie: a=b".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::LOCATION).is_none());
    }
}
