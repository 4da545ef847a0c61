//! CoAP ↔ HTTP translation.
//!
//! # Responsibilities
//! - Outbound: CoAP request → HTTP request, HTTP response → CoAP response
//! - Ingress: HTTP request → CoAP request, CoAP response → HTTP response
//!
//! # Design Decisions
//! - Only the headers the mapping table names cross the boundary
//! - ETags travel as quoted lowercase hex on the HTTP side
//! - An unmapped request media type fails; an unmapped response media type
//!   is simply left out

use std::time::SystemTime;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{request, Method, Request, Response, StatusCode, Uri};
use bytes::Bytes;

use crate::coap::message::{CoapRequest, CoapResponse, Code};
use crate::coap::option::{self, decode_uint, OptionSet};
use crate::mapping::MappingTable;
use crate::translate::coap::decode_component;
use crate::translate::error::TranslationError;

/// Build the HTTP request for a CoAP request aimed at `target`.
pub fn coap_to_http_request(
    table: &MappingTable,
    request: &CoapRequest,
    target: &str,
) -> Result<Request<Body>, TranslationError> {
    let method = table
        .http_method(request.method)
        .ok_or_else(|| TranslationError::UnsupportedMethod(request.method.to_string()))?;

    let uri: Uri = target
        .parse()
        .map_err(|e| TranslationError::MalformedProxyTarget(format!("{}: {}", target, e)))?;
    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => return Err(TranslationError::UnsupportedScheme(other.to_string())),
        None => {
            return Err(TranslationError::MalformedProxyTarget(format!(
                "{}: missing scheme",
                target
            )))
        }
    }
    if uri.host().map_or(true, str::is_empty) {
        return Err(TranslationError::MalformedProxyTarget(format!(
            "{}: missing host",
            target
        )));
    }

    // An origin cannot be told what the payload is without a media type.
    if let Some(format) = request.options.uint(option::CONTENT_FORMAT) {
        if media_type_of(table, format).is_none() {
            return Err(TranslationError::UnsupportedMediaType(format.to_string()));
        }
    }

    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        options_to_headers(table, &request.options, headers, false);
    }
    builder
        .body(Body::from(request.payload.clone()))
        .map_err(|e| TranslationError::InvalidMessage(e.to_string()))
}

/// Translate an origin server's response back to CoAP, stamped with the
/// time it was received.
pub fn http_to_coap_response(
    table: &MappingTable,
    status: StatusCode,
    headers: &HeaderMap,
    body: Bytes,
    original: &CoapRequest,
) -> CoapResponse {
    let mut code = table.coap_code(status);
    // 2.05 is only defined for GET.
    if code == Code::CONTENT && original.method != Code::GET {
        code = Code::CHANGED;
    }

    let mut response = CoapResponse::new(code);
    response.options = headers_to_options(table, headers, true);
    if let Some(location) = headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) {
        push_location(&mut response.options, location);
    }
    response.payload = body;
    response.timestamp = Some(SystemTime::now());
    response
}

/// Build a CoAP request from an HTTP request arriving at the ingress.
///
/// `prefix` is the route prefix (`/proxy/` or `/local/`) stripped from the
/// path. With `proxying` the remainder becomes the Proxy-Uri, otherwise it
/// addresses a local resource by Uri-Path.
pub fn http_to_coap_request(
    table: &MappingTable,
    parts: &request::Parts,
    body: Bytes,
    prefix: &str,
    proxying: bool,
) -> Result<CoapRequest, TranslationError> {
    let method = table
        .coap_method(&parts.method)
        .ok_or_else(|| TranslationError::UnsupportedMethod(parts.method.to_string()))?;

    let target = parts
        .uri
        .path()
        .strip_prefix(prefix)
        .unwrap_or_default()
        .trim_start_matches('/');
    if target.is_empty() {
        return Err(TranslationError::MissingProxyTarget);
    }

    let mut request = CoapRequest::new(method);
    request.set_confirmable(true);

    if let Some(content_type) = parts.headers.get(header::CONTENT_TYPE) {
        let media = content_type.to_str().unwrap_or_default();
        let format = table
            .content_format(media)
            .ok_or_else(|| TranslationError::UnsupportedMediaType(media.to_string()))?;
        request.options.set_content_format(format);
    }
    let mut options = headers_to_options(table, &parts.headers, false);
    options.remove(option::CONTENT_FORMAT);
    for opt in options.iter() {
        request.options.push(opt.number, opt.value.clone());
    }

    if proxying {
        let mut uri = if target.contains("://") {
            target.to_string()
        } else {
            format!("coap://{}", target)
        };
        if let Some(query) = parts.uri.query() {
            uri.push('?');
            uri.push_str(query);
        }
        request.options.set_proxy_uri(&uri);
    } else {
        for segment in target.split('/').filter(|s| !s.is_empty()) {
            request.options.push(option::URI_PATH, decode_component(segment));
        }
        if let Some(query) = parts.uri.query() {
            for param in query.split('&').filter(|p| !p.is_empty()) {
                request.options.push(option::URI_QUERY, decode_component(param));
            }
        }
    }

    if parts.method != Method::HEAD {
        request.payload = body;
    }
    Ok(request)
}

/// Build the HTTP response for a CoAP response.
pub fn coap_to_http_response(table: &MappingTable, response: &CoapResponse) -> Response<Body> {
    let mut http = Response::new(Body::from(response.payload.clone()));
    *http.status_mut() = table.http_status(response.code);
    options_to_headers(table, &response.options, http.headers_mut(), true);
    http
}

fn options_to_headers(
    table: &MappingTable,
    options: &OptionSet,
    headers: &mut HeaderMap,
    is_response: bool,
) {
    for opt in options.iter() {
        let Some(name) = table.header_for_option(opt.number) else {
            continue;
        };
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        let value = match opt.number {
            option::CONTENT_FORMAT | option::ACCEPT => {
                match media_type_of(table, decode_uint(&opt.value)) {
                    Some(media) => media.to_string(),
                    None => continue,
                }
            }
            option::MAX_AGE => format!("max-age={}", decode_uint(&opt.value)),
            option::ETAG | option::IF_MATCH => format!("\"{}\"", to_hex(&opt.value)),
            option::IF_NONE_MATCH => "*".to_string(),
            option::LOCATION_PATH | option::LOCATION_QUERY => {
                if !is_response || headers.contains_key(&name) {
                    continue;
                }
                location_of(options)
            }
            _ => match std::str::from_utf8(&opt.value) {
                Ok(text) => text.to_string(),
                Err(_) => continue,
            },
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.append(name, value);
        }
    }
}

fn headers_to_options(table: &MappingTable, headers: &HeaderMap, is_response: bool) -> OptionSet {
    let mut options = OptionSet::new();
    for (name, value) in headers {
        let Some(number) = table.option_for_header(name.as_str()) else {
            continue;
        };
        let Ok(text) = value.to_str() else {
            continue;
        };
        match number {
            option::CONTENT_FORMAT => {
                if let Some(format) = table.content_format(text) {
                    options.set_content_format(format);
                }
            }
            option::ACCEPT => {
                if is_response || options.contains(option::ACCEPT) {
                    continue;
                }
                let format = text
                    .split(',')
                    .map(|range| range.split(';').next().unwrap_or_default().trim())
                    .find_map(|media| table.content_format(media));
                if let Some(format) = format {
                    options.set_uint(option::ACCEPT, u32::from(format));
                }
            }
            option::MAX_AGE => {
                if let Some(max_age) = parse_max_age(text) {
                    options.set_uint(option::MAX_AGE, max_age);
                }
            }
            option::ETAG | option::IF_MATCH => {
                for tag in text.split(',') {
                    options.push(number, etag_bytes(tag));
                }
            }
            option::IF_NONE_MATCH => options.set(option::IF_NONE_MATCH, Bytes::new()),
            _ => options.push(number, Bytes::copy_from_slice(text.as_bytes())),
        }
    }
    options
}

fn parse_max_age(cache_control: &str) -> Option<u32> {
    cache_control.split(',').find_map(|directive| {
        let (key, value) = directive.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("max-age") {
            value.trim().trim_matches('"').parse().ok()
        } else {
            None
        }
    })
}

fn location_of(options: &OptionSet) -> String {
    let mut location = format!("/{}", options.strings(option::LOCATION_PATH).join("/"));
    let query = options.strings(option::LOCATION_QUERY);
    if !query.is_empty() {
        location.push('?');
        location.push_str(&query.join("&"));
    }
    location
}

fn push_location(options: &mut OptionSet, location: &str) {
    // Absolute URIs have no CoAP Location-* equivalent.
    if location.contains("://") {
        return;
    }
    let (path, query) = match location.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (location, None),
    };
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        options.push(option::LOCATION_PATH, decode_component(segment));
    }
    for param in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
        options.push(option::LOCATION_QUERY, decode_component(param));
    }
}

/// Media type for a raw Content-Format or Accept value; out-of-range values are unmapped.
fn media_type_of(table: &MappingTable, format: u32) -> Option<&str> {
    u16::try_from(format).ok().and_then(|f| table.media_type(f))
}

fn etag_bytes(tag: &str) -> Bytes {
    let tag = tag.trim().trim_start_matches("W/").trim_matches('"');
    match from_hex(tag) {
        Some(bytes) => Bytes::from(bytes),
        None => Bytes::copy_from_slice(tag.as_bytes()),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// ETags are at most 8 bytes on the CoAP side.
fn from_hex(text: &str) -> Option<Vec<u8>> {
    if text.is_empty() || text.len() > 16 {
        return None;
    }
    hex::decode(text).ok()
}
