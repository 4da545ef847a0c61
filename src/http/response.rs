//! Locally generated HTTP responses.

use std::fmt::Display;

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};

pub const INFO_TEXT: &str = "CoAP gateway";

/// Plain-text error response; nothing upstream was contacted.
pub fn error_response(status: StatusCode, message: impl Display) -> Response<Body> {
    text(status, message.to_string())
}

/// Static answer for paths outside the proxy prefixes.
pub fn info_response() -> Response<Body> {
    text(StatusCode::OK, INFO_TEXT.to_string())
}

fn text(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
